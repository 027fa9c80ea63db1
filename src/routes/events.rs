use actix_web::{http::header, web, HttpResponse};
use futures_util::stream;
use std::convert::Infallible;

use crate::core::{LiveConnection, ServerEvent};
use crate::routes::auth::AuthUser;
use crate::routes::AppState;

/// Configure the live event stream
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/events", web::get().to(events));
}

/// Encode one event as a server-sent-events frame
pub fn sse_frame(event: &ServerEvent) -> Result<web::Bytes, serde_json::Error> {
    let data = serde_json::to_string(event)?;
    Ok(web::Bytes::from(format!("event: {}\ndata: {}\n\n", event.name(), data)))
}

/// Live connection for the caller
///
/// GET /api/v1/events
///
/// Opening a new stream replaces any earlier one for the same user. The
/// connection unregisters itself when the client goes away and the body
/// stream is dropped.
async fn events(state: web::Data<AppState>, user: AuthUser) -> HttpResponse {
    let connection = state.engine.connect(user.id());
    tracing::info!("Live connection {} opened for {}", connection.id(), user.id());

    let body = stream::unfold(connection, |mut connection: LiveConnection| async move {
        loop {
            let event = connection.recv().await?;
            match sse_frame(&event) {
                Ok(frame) => return Some((Ok::<_, Infallible>(frame), connection)),
                Err(e) => {
                    tracing::error!("Failed to encode {} event for {}: {}", event.name(), connection.user_id(), e);
                }
            }
        }
    });

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        // Keeps the compression middleware from buffering frames
        .insert_header((header::CONTENT_ENCODING, "identity"))
        .streaming(body)
}
