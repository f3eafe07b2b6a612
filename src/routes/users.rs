use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Json as RespJson,
    routing::{get, post},
    Router,
};

use crate::error::AppResult;
use crate::model::user::{
    ActivationRequest, ResendActivationRequest, SetPasswordRequest, UserCreate, UserResponse,
    UserUpdate,
};
use crate::routes::current_user;
use crate::routes::extract::Json;
use crate::services::accounts;
use crate::state::AppState;

// Mounted under /auth
pub fn users_router() -> Router {
    Router::new()
        .route("/users/", post(register))
        .route("/users/activation/", post(activate))
        .route("/users/resend_activation/", post(resend_activation))
        .route("/users/me/", get(me).patch(update_me).delete(delete_me))
        .route("/users/set_password/", post(set_password))
}

async fn register(
    Extension(state): Extension<AppState>,
    Json(payload): Json<UserCreate>,
) -> AppResult<(StatusCode, RespJson<UserResponse>)> {
    let registration = accounts::create_user(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        RespJson(UserResponse::from(&registration.user)),
    ))
}

async fn activate(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ActivationRequest>,
) -> AppResult<StatusCode> {
    accounts::activate_user(&state, payload.uid, &payload.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Always 204 so the response says nothing about the email
async fn resend_activation(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ResendActivationRequest>,
) -> AppResult<StatusCode> {
    accounts::resend_activation(&state, &payload.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> AppResult<RespJson<UserResponse>> {
    let user = current_user(&headers, &state).await?;
    Ok(RespJson(UserResponse::from(&user)))
}

async fn update_me(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UserUpdate>,
) -> AppResult<RespJson<UserResponse>> {
    let user = current_user(&headers, &state).await?;
    let updated = accounts::update_user(&state, user.id, payload).await?;
    Ok(RespJson(UserResponse::from(&updated)))
}

async fn delete_me(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let user = current_user(&headers, &state).await?;
    accounts::delete_user(&state, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_password(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SetPasswordRequest>,
) -> AppResult<StatusCode> {
    let mut user = current_user(&headers, &state).await?;
    accounts::set_password(&state, &mut user, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}
