use actix_web::{web, HttpResponse};
use uuid::Uuid;
use validator::Validate;

use crate::models::{MessageKind, SendMessageRequest, StatusResponse};
use crate::routes::auth::AuthUser;
use crate::routes::matches::validation_error;
use crate::routes::{ApiError, AppState};

/// Configure messaging routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/messages", web::post().to(send_message))
        .route("/messages", web::get().to(conversations))
        .route("/messages/{other_user_id}", web::get().to(history))
        .route("/messages/{message_id}/read", web::put().to(mark_read))
        .route("/messages/{message_id}", web::delete().to(delete_message));
}

/// Send a message to a matched user
///
/// POST /api/v1/messages
///
/// Request body:
/// ```json
/// { "receiverId": "string", "content": "hi", "messageType": "text" }
/// ```
async fn send_message(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    let kind = match req.message_type.as_deref() {
        Some(raw) => raw.parse::<MessageKind>()?,
        None => MessageKind::default(),
    };

    let message = state
        .engine
        .send(user.id(), &req.receiver_id, &req.content, kind)
        .await?;

    Ok(HttpResponse::Created().json(message))
}

/// One summary per conversation partner
///
/// GET /api/v1/messages
async fn conversations(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let conversations = state.engine.conversations(user.id()).await?;
    Ok(HttpResponse::Ok().json(conversations))
}

/// Full conversation with one matched user, oldest first
///
/// GET /api/v1/messages/{otherUserId}
async fn history(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let other = path.into_inner();
    let messages = state.engine.history(user.id(), &other).await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// PUT /api/v1/messages/{messageId}/read
async fn mark_read(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    state.engine.mark_read(user.id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(StatusResponse {
        message: "Message marked as read".to_string(),
    }))
}

/// DELETE /api/v1/messages/{messageId}
async fn delete_message(
    state: web::Data<AppState>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    state.engine.delete(user.id(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(StatusResponse {
        message: "Message deleted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeliveryHub, EngineLimits, MatchEngine};
    use crate::models::{Intent, Profile, Year};
    use crate::routes::auth::{Claims, JwtVerifier};
    use crate::services::{MemoryMessageStore, MemoryRelationshipStore, StaticDirectory};
    use actix_web::{http::StatusCode, test, App};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::sync::Arc;

    const SECRET: &str = "test-secret";

    fn profile(id: &str) -> Profile {
        Profile {
            user_id: id.to_string(),
            first_name: id.to_string(),
            last_name: String::new(),
            major: "Physics".to_string(),
            year: Year::Pg1st,
            age: 20,
            interests: vec![],
            bio: None,
            is_active: true,
            is_verified: true,
        }
    }

    fn engine() -> MatchEngine {
        let directory = StaticDirectory::from_profiles(vec![profile("alice"), profile("bob"), profile("carol")]);
        MatchEngine::new(
            Arc::new(MemoryRelationshipStore::new()),
            Arc::new(MemoryMessageStore::new()),
            Arc::new(directory),
            Arc::new(DeliveryHub::new(8)),
            EngineLimits::default(),
        )
    }

    fn bearer(sub: &str) -> (&'static str, String) {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
        ("Authorization", format!("Bearer {}", token))
    }

    #[actix_web::test]
    async fn test_send_requires_match() {
        let engine = engine();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState { engine }))
                .app_data(web::Data::new(JwtVerifier::new(SECRET)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/messages")
            .insert_header(bearer("alice"))
            .set_json(serde_json::json!({ "receiverId": "carol", "content": "hello" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_send_then_read_history() {
        let engine = engine();
        engine.act("alice", "bob", Intent::Like).await.unwrap();
        engine.act("bob", "alice", Intent::Like).await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState { engine }))
                .app_data(web::Data::new(JwtVerifier::new(SECRET)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let send = test::TestRequest::post()
            .uri("/api/v1/messages")
            .insert_header(bearer("alice"))
            .set_json(serde_json::json!({ "receiverId": "bob", "content": "hello", "messageType": "text" }))
            .to_request();
        let resp = test::call_service(&app, send).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let history = test::TestRequest::get()
            .uri("/api/v1/messages/alice")
            .insert_header(bearer("bob"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, history).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["content"], "hello");
        assert_eq!(body[0]["isRead"], true);
    }

    #[actix_web::test]
    async fn test_unknown_message_type_is_bad_request() {
        let engine = engine();
        engine.act("alice", "bob", Intent::Like).await.unwrap();
        engine.act("bob", "alice", Intent::Like).await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState { engine }))
                .app_data(web::Data::new(JwtVerifier::new(SECRET)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/messages")
            .insert_header(bearer("alice"))
            .set_json(serde_json::json!({ "receiverId": "bob", "content": "hi", "messageType": "video" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_delete_unknown_message_is_not_found() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(AppState { engine: engine() }))
                .app_data(web::Data::new(JwtVerifier::new(SECRET)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/messages/{}", Uuid::new_v4()))
            .insert_header(bearer("alice"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
