use axum::{
    body::Bytes,
    extract::Extension,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json as RespJson},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::record::{RecordCreate, RecordQuery, RecordResponse, RecordUpdate};
use crate::model::{CustomUser, Doctor, Record};
use crate::routes::current_user;
use crate::routes::extract::{Json, Path, Query};
use crate::services::{doctors, patients, records};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

// Mounted under /api/records
pub fn records_router() -> Router {
    Router::new()
        .route("/", post(create_record).get(list_records))
        .route("/:id", get(get_record).put(update_record).delete(delete_record))
        .route("/:id/file", get(download_file).put(upload_file))
}

async fn caller_doctor(state: &AppState, user: &CustomUser) -> AppResult<Doctor> {
    doctors::doctor_for_user(state, user.id)
        .await?
        .ok_or_else(|| AppError::Forbidden("Only doctors can manage records.".into()))
}

/// Record the caller may read.
async fn readable(state: &AppState, user: &CustomUser, id: Uuid) -> AppResult<Record> {
    let record = records::get_record(state, id).await?;
    if !records::can_access(state, user, &record).await? {
        return Err(AppError::Forbidden(
            "You do not have access to this record.".into(),
        ));
    }
    Ok(record)
}

/// Record authored by the caller.
async fn authored(state: &AppState, user: &CustomUser, id: Uuid) -> AppResult<Record> {
    let doctor = caller_doctor(state, user).await?;
    let record = records::get_record(state, id).await?;
    if record.doctor_author != doctor.id {
        return Err(AppError::Forbidden(
            "Only the authoring doctor can change this record.".into(),
        ));
    }
    Ok(record)
}

async fn create_record(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RecordCreate>,
) -> AppResult<(StatusCode, RespJson<RecordResponse>)> {
    let user = current_user(&headers, &state).await?;
    let doctor = caller_doctor(&state, &user).await?;
    let record = records::create_record(&state, &doctor, payload).await?;
    Ok((StatusCode::CREATED, RespJson(RecordResponse::from(&record))))
}

// Without a patient filter, doctors see what they wrote and patients see their own file
async fn list_records(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Query(params): Query<RecordQuery>,
) -> AppResult<RespJson<Vec<RecordResponse>>> {
    let user = current_user(&headers, &state).await?;

    let found = match params.patient {
        Some(patient_id) => {
            let mut visible = Vec::new();
            for record in records::list_records_for_patient(&state, patient_id).await? {
                if records::can_access(&state, &user, &record).await? {
                    visible.push(record);
                }
            }
            visible
        }
        None => {
            if let Some(doctor) = doctors::doctor_for_user(&state, user.id).await? {
                records::list_records_by_doctor(&state, doctor.id).await?
            } else if let Some(patient) = patients::patient_for_user(&state, user.id).await? {
                records::list_records_for_patient(&state, patient.id).await?
            } else {
                Vec::new()
            }
        }
    };
    Ok(RespJson(found.iter().map(RecordResponse::from).collect()))
}

async fn get_record(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<RespJson<RecordResponse>> {
    let user = current_user(&headers, &state).await?;
    let record = readable(&state, &user, id).await?;
    Ok(RespJson(RecordResponse::from(&record)))
}

async fn update_record(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordUpdate>,
) -> AppResult<RespJson<RecordResponse>> {
    let user = current_user(&headers, &state).await?;
    authored(&state, &user, id).await?;
    let record = records::update_record(&state, id, payload).await?;
    Ok(RespJson(RecordResponse::from(&record)))
}

async fn delete_record(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let user = current_user(&headers, &state).await?;
    authored(&state, &user, id).await?;
    records::delete_record(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_file(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(params): Query<UploadQuery>,
    body: Bytes,
) -> AppResult<RespJson<RecordResponse>> {
    let user = current_user(&headers, &state).await?;
    authored(&state, &user, id).await?;
    if body.is_empty() {
        return Err(AppError::validation("file_analysis", "The submitted file is empty."));
    }
    let record = records::attach_file(&state, id, &params.filename, &body).await?;
    Ok(RespJson(RecordResponse::from(&record)))
}

async fn download_file(
    Extension(state): Extension<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let user = current_user(&headers, &state).await?;
    let record = readable(&state, &user, id).await?;
    let (name, bytes) = records::read_file(&state, &record).await?;
    let disposition = format!("attachment; filename=\"{name}\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
