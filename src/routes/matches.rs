use actix_web::{web, HttpResponse};
use validator::Validate;

use crate::error::EngineError;
use crate::models::{
    ActionRequest, ActionResponse, BlockRequest, CandidatesQuery, CandidatesResponse, HealthResponse,
    Intent, StatusResponse,
};
use crate::routes::auth::AuthUser;
use crate::routes::{ApiError, AppState};

/// Configure discovery and relationship routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/candidates", web::get().to(candidates))
        .route("/actions", web::post().to(act))
        .route("/blocks", web::post().to(block))
        .route("/matches", web::get().to(matches));
}

pub(crate) fn validation_error(errors: validator::ValidationErrors) -> ApiError {
    tracing::info!("Validation failed: field_errors={:?}", errors);
    ApiError::Engine(EngineError::Validation(errors.to_string()))
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let healthy = match state.engine.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            false
        }
    };

    let status = if healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        live_connections: state.engine.delivery().online_count(),
        timestamp: chrono::Utc::now(),
    })
}

/// Ranked candidates for the caller
///
/// GET /api/v1/candidates?limit=20
async fn candidates(
    state: web::Data<AppState>,
    user: AuthUser,
    query: web::Query<CandidatesQuery>,
) -> Result<HttpResponse, ApiError> {
    query.validate().map_err(validation_error)?;

    let limit = query.limit.map(usize::from);
    let candidates = state.engine.candidates(user.id(), limit).await?;

    Ok(HttpResponse::Ok().json(CandidatesResponse {
        count: candidates.len(),
        candidates,
    }))
}

/// Like or dislike another user
///
/// POST /api/v1/actions
///
/// Request body:
/// ```json
/// { "targetUserId": "string", "action": "like" }
/// ```
async fn act(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<ActionRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate().map_err(validation_error)?;
    let intent: Intent = req.action.parse()?;

    let outcome = state.engine.act(user.id(), &req.target_user_id, intent).await?;

    let message = outcome.matched.then(|| "It's a match!".to_string());
    Ok(HttpResponse::Ok().json(ActionResponse {
        matched: outcome.matched,
        message,
    }))
}

/// Block another user
///
/// POST /api/v1/blocks
async fn block(
    state: web::Data<AppState>,
    user: AuthUser,
    req: web::Json<BlockRequest>,
) -> Result<HttpResponse, ApiError> {
    req.validate().map_err(validation_error)?;

    state.engine.block(user.id(), &req.user_id).await?;

    Ok(HttpResponse::Ok().json(StatusResponse {
        message: "User blocked".to_string(),
    }))
}

/// The caller's active matches
///
/// GET /api/v1/matches
async fn matches(state: web::Data<AppState>, user: AuthUser) -> Result<HttpResponse, ApiError> {
    let matches = state.engine.matches(user.id()).await?;
    Ok(HttpResponse::Ok().json(matches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeliveryHub, EngineLimits, MatchEngine};
    use crate::models::{Profile, Year};
    use crate::routes::auth::{Claims, JwtVerifier};
    use crate::services::{MemoryMessageStore, MemoryRelationshipStore, StaticDirectory};
    use actix_web::{test, App};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::sync::Arc;

    const SECRET: &str = "test-secret";

    fn profile(id: &str, age: u8) -> Profile {
        Profile {
            user_id: id.to_string(),
            first_name: id.to_string(),
            last_name: String::new(),
            major: "Computer Science".to_string(),
            year: Year::Graduate,
            age,
            interests: vec!["music".to_string()],
            bio: None,
            is_active: true,
            is_verified: true,
        }
    }

    fn state() -> AppState {
        let directory = StaticDirectory::from_profiles(vec![profile("alice", 24), profile("bob", 25)]);
        AppState {
            engine: MatchEngine::new(
                Arc::new(MemoryRelationshipStore::new()),
                Arc::new(MemoryMessageStore::new()),
                Arc::new(directory),
                Arc::new(DeliveryHub::new(8)),
                EngineLimits::default(),
            ),
        }
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
    async fn test_mutual_like_over_http() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .app_data(web::Data::new(JwtVerifier::new(SECRET)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let first = test::TestRequest::post()
            .uri("/api/v1/actions")
            .insert_header(bearer("alice"))
            .set_json(serde_json::json!({ "targetUserId": "bob", "action": "like" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, first).await;
        assert_eq!(body["match"], false);

        let second = test::TestRequest::post()
            .uri("/api/v1/actions")
            .insert_header(bearer("bob"))
            .set_json(serde_json::json!({ "targetUserId": "alice", "action": "like" }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, second).await;
        assert_eq!(body["match"], true);
    }

    #[actix_web::test]
    async fn test_unknown_action_is_bad_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .app_data(web::Data::new(JwtVerifier::new(SECRET)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/actions")
            .insert_header(bearer("alice"))
            .set_json(serde_json::json!({ "targetUserId": "bob", "action": "superlike" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_candidates_require_token() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .app_data(web::Data::new(JwtVerifier::new(SECRET)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/candidates").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_candidates_are_scored() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .app_data(web::Data::new(JwtVerifier::new(SECRET)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/candidates?limit=5")
            .insert_header(bearer("alice"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["candidates"][0]["profile"]["userId"], "bob");
        assert_eq!(body["candidates"][0]["compatibilityScore"], 80);
    }

    #[actix_web::test]
    async fn test_candidates_limit_above_max_is_clamped() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state()))
                .app_data(web::Data::new(JwtVerifier::new(SECRET)))
                .configure(crate::routes::configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/v1/candidates?limit=150")
            .insert_header(bearer("alice"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/api/v1/candidates?limit=0")
            .insert_header(bearer("alice"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }
}
