use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Json as RespJson,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::patient::{PatientCreate, PatientResponse, PatientUpdate};
use crate::model::{CustomUser, Patient};
use crate::routes::current_user;
use crate::routes::extract::{Json, Path};
use crate::services::{doctors, patients};
use crate::state::AppState;

// Mounted under /api/patients
pub fn patients_router() -> Router {
    Router::new()
        .route("/", post(create_patient))
        .route("/me", get(my_patient))
        .route("/:id", get(get_patient).put(update_patient).delete(delete_patient))
}

/// Patient profile belonging to the caller.
async fn owned(state: &AppState, user: &CustomUser, id: Uuid) -> AppResult<Patient> {
    let patient = patients::get_patient(state, id).await?;
    if patient.user.id != user.id {
        return Err(AppError::Forbidden(
            "Only the patient can change this profile.".into(),
        ));
    }
    Ok(patient)
}

async fn create_patient(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PatientCreate>,
) -> AppResult<(StatusCode, RespJson<PatientResponse>)> {
    let user = current_user(&headers, &state).await?;
    let patient = patients::create_patient(&state, user.id, payload).await?;
    Ok((StatusCode::CREATED, RespJson(PatientResponse::from(&patient))))
}

async fn my_patient(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
) -> AppResult<RespJson<PatientResponse>> {
    let user = current_user(&headers, &state).await?;
    let patient = patients::patient_for_user(&state, user.id)
        .await?
        .ok_or(AppError::NotFound("patient"))?;
    Ok(RespJson(PatientResponse::from(&patient)))
}

// Readable by the patient and by doctors
async fn get_patient(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<RespJson<PatientResponse>> {
    let user = current_user(&headers, &state).await?;
    let patient = patients::get_patient(&state, id).await?;
    if patient.user.id != user.id && doctors::doctor_for_user(&state, user.id).await?.is_none() {
        return Err(AppError::Forbidden(
            "You do not have access to this patient.".into(),
        ));
    }
    Ok(RespJson(PatientResponse::from(&patient)))
}

async fn update_patient(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<PatientUpdate>,
) -> AppResult<RespJson<PatientResponse>> {
    let user = current_user(&headers, &state).await?;
    owned(&state, &user, id).await?;
    let patient = patients::update_patient(&state, id, payload).await?;
    Ok(RespJson(PatientResponse::from(&patient)))
}

async fn delete_patient(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user = current_user(&headers, &state).await?;
    owned(&state, &user, id).await?;
    patients::delete_patient(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
