use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Json as RespJson,
    routing::post,
    Router,
};

use crate::error::AppResult;
use crate::model::user::{LoginRequest, TokenResponse};
use crate::routes::auth_token;
use crate::routes::extract::Json;
use crate::services::accounts;
use crate::state::AppState;

// Mounted under /auth
pub fn auth_router() -> Router {
    Router::new()
        .route("/token/login/", post(login))
        .route("/token/logout/", post(logout))
}

async fn login(
    Extension(state): Extension<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<RespJson<TokenResponse>> {
    let auth_token = accounts::login(&state, &payload.email, &payload.password).await?;
    Ok(RespJson(TokenResponse { auth_token }))
}

async fn logout(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let user = crate::routes::current_user(&headers, &state).await?;
    accounts::logout(&state, auth_token(&headers)?).await?;
    tracing::info!(user_id = %user.id, "token revoked");
    Ok(StatusCode::NO_CONTENT)
}
