pub mod auth;
pub mod doctors;
pub mod extract;
pub mod patients;
pub mod records;
pub mod users;

use axum::{
    extract::Extension,
    http::{header::AUTHORIZATION, HeaderMap},
    response::Json as RespJson,
    routing::get,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::{AppError, AppResult};
use crate::model::CustomUser;
use crate::services::accounts;
use crate::state::AppState;

/// Full HTTP surface with shared state, CORS and request tracing applied.
pub fn app_router(state: AppState, cors_allow_any: bool) -> Router {
    let cors = if cors_allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    Router::new()
        .nest("/auth", users::users_router().merge(auth::auth_router()))
        .nest("/api/doctors", doctors::doctors_router())
        .nest("/api/patients", patients::patients_router())
        .nest("/api/records", records::records_router())
        .route("/health", get(health))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> RespJson<serde_json::Value> {
    RespJson(serde_json::json!({ "status": "ok" }))
}

/// Raw key from an `Authorization: Token <key>` header.
pub(crate) fn auth_token(headers: &HeaderMap) -> AppResult<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Token "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthorized)
}

/// Account behind the request's auth token.
pub(crate) async fn current_user(headers: &HeaderMap, state: &AppState) -> AppResult<CustomUser> {
    let token = auth_token(headers)?;
    accounts::user_for_token(state, token).await
}
