use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Json as RespJson,
    routing::{delete, get},
    Router,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::doctor::{
    DoctorCreate, DoctorResponse, DoctorUpdate, OpeningHoursCreate, OpeningHoursResponse,
};
use crate::model::{CustomUser, Doctor};
use crate::routes::current_user;
use crate::routes::extract::{Json, Path};
use crate::services::doctors;
use crate::state::AppState;

// Mounted under /api/doctors
pub fn doctors_router() -> Router {
    Router::new()
        .route("/", get(list_doctors).post(create_doctor))
        .route("/:id", get(get_doctor).put(update_doctor).delete(delete_doctor))
        .route("/:id/hours", get(list_hours).post(add_hours))
        .route("/:id/hours/:hours_id", delete(remove_hours))
}

async fn response(state: &AppState, doctor: &Doctor) -> AppResult<DoctorResponse> {
    let hours = doctors::list_opening_hours(state, doctor.id).await?;
    Ok(DoctorResponse::new(doctor, &hours))
}

/// Doctor profile owned by the caller, loaded for a write.
async fn owned(state: &AppState, user: &CustomUser, id: Uuid) -> AppResult<Doctor> {
    let doctor = doctors::get_doctor(state, id).await?;
    if doctor.user.id != user.id {
        return Err(AppError::Forbidden(
            "Only the doctor can change this profile.".into(),
        ));
    }
    Ok(doctor)
}

async fn create_doctor(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DoctorCreate>,
) -> AppResult<(StatusCode, RespJson<DoctorResponse>)> {
    let user = current_user(&headers, &state).await?;
    let doctor = doctors::create_doctor(&state, user.id, payload).await?;
    Ok((StatusCode::CREATED, RespJson(DoctorResponse::new(&doctor, &[]))))
}

async fn list_doctors(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> AppResult<RespJson<Vec<DoctorResponse>>> {
    current_user(&headers, &state).await?;
    let mut out = Vec::new();
    for doctor in doctors::list_doctors(&state).await? {
        out.push(response(&state, &doctor).await?);
    }
    Ok(RespJson(out))
}

async fn get_doctor(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<RespJson<DoctorResponse>> {
    current_user(&headers, &state).await?;
    let doctor = doctors::get_doctor(&state, id).await?;
    Ok(RespJson(response(&state, &doctor).await?))
}

async fn update_doctor(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<DoctorUpdate>,
) -> AppResult<RespJson<DoctorResponse>> {
    let user = current_user(&headers, &state).await?;
    owned(&state, &user, id).await?;
    let doctor = doctors::update_doctor(&state, id, payload).await?;
    Ok(RespJson(response(&state, &doctor).await?))
}

async fn delete_doctor(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user = current_user(&headers, &state).await?;
    owned(&state, &user, id).await?;
    doctors::delete_doctor(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_hours(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<RespJson<Vec<OpeningHoursResponse>>> {
    current_user(&headers, &state).await?;
    // 404 for an unknown doctor rather than an empty calendar
    doctors::get_doctor(&state, id).await?;
    let hours = doctors::list_opening_hours(&state, id).await?;
    Ok(RespJson(hours.iter().map(OpeningHoursResponse::from).collect()))
}

async fn add_hours(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<OpeningHoursCreate>,
) -> AppResult<(StatusCode, RespJson<OpeningHoursResponse>)> {
    let user = current_user(&headers, &state).await?;
    owned(&state, &user, id).await?;
    let hours = doctors::add_opening_hours(&state, id, payload).await?;
    Ok((StatusCode::CREATED, RespJson(OpeningHoursResponse::from(&hours))))
}

async fn remove_hours(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path((id, hours_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let user = current_user(&headers, &state).await?;
    owned(&state, &user, id).await?;
    doctors::remove_opening_hours(&state, id, hours_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
