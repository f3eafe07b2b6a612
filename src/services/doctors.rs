use uuid::Uuid;
use validator::Validate;

use crate::db::{DoctorRow, OpeningHoursRow};
use crate::error::{AppError, AppResult};
use crate::model::doctor::{DoctorCreate, DoctorUpdate, OpeningHoursCreate};
use crate::model::{Doctor, OpeningHours, Weekday};
use crate::services::{accounts, required};
use crate::state::AppState;

/// Attach a doctor profile to an existing account.
pub async fn create_doctor(state: &AppState, user_id: Uuid, req: DoctorCreate) -> AppResult<Doctor> {
    req.validate()?;
    let user = accounts::get_user(state, user_id).await?;

    let doctor = Doctor {
        id: Uuid::new_v4(),
        user,
        specialty: required("specialty", &req.specialty)?,
        phone_general: required("phone_general", &req.phone_general)?,
        cabinet: required("cabinet", &req.cabinet)?,
    };
    state
        .store
        .insert_doctor(&DoctorRow::from_doctor(&doctor))
        .await?;

    tracing::info!(doctor_id = %doctor.id, user_id = %user_id, "doctor profile created");
    Ok(doctor)
}

async fn load(state: &AppState, row: DoctorRow) -> AppResult<Doctor> {
    let user = accounts::get_user(state, row.user_id).await?;
    Ok(row.into_doctor(user))
}

pub async fn get_doctor(state: &AppState, id: Uuid) -> AppResult<Doctor> {
    let row = state
        .store
        .get_doctor(id)
        .await?
        .ok_or(AppError::NotFound("doctor"))?;
    load(state, row).await
}

pub async fn doctor_for_user(state: &AppState, user_id: Uuid) -> AppResult<Option<Doctor>> {
    match state.store.doctor_for_user(user_id).await? {
        Some(row) => Ok(Some(load(state, row).await?)),
        None => Ok(None),
    }
}

pub async fn list_doctors(state: &AppState) -> AppResult<Vec<Doctor>> {
    let rows = state.store.list_doctors().await?;
    let mut doctors = Vec::with_capacity(rows.len());
    for row in rows {
        doctors.push(load(state, row).await?);
    }
    Ok(doctors)
}

pub async fn update_doctor(state: &AppState, id: Uuid, req: DoctorUpdate) -> AppResult<Doctor> {
    req.validate()?;
    let mut doctor = get_doctor(state, id).await?;

    if let Some(specialty) = req.specialty {
        doctor.specialty = required("specialty", &specialty)?;
    }
    if let Some(phone) = req.phone_general {
        doctor.phone_general = required("phone_general", &phone)?;
    }
    if let Some(cabinet) = req.cabinet {
        doctor.cabinet = required("cabinet", &cabinet)?;
    }

    if !state
        .store
        .update_doctor(&DoctorRow::from_doctor(&doctor))
        .await?
    {
        return Err(AppError::NotFound("doctor"));
    }
    tracing::info!(doctor_id = %id, "doctor profile updated");
    Ok(doctor)
}

/// Rejected while the doctor still authors clinical records.
pub async fn delete_doctor(state: &AppState, id: Uuid) -> AppResult<()> {
    if !state.store.delete_doctor(id).await? {
        return Err(AppError::NotFound("doctor"));
    }
    tracing::info!(doctor_id = %id, "doctor profile deleted");
    Ok(())
}

pub async fn add_opening_hours(
    state: &AppState,
    doctor_id: Uuid,
    req: OpeningHoursCreate,
) -> AppResult<OpeningHours> {
    let weekday = Weekday::try_from(req.weekday)?;
    if req.to_hour <= req.from_hour {
        return Err(AppError::validation(
            "to_hour",
            "closing time must be after opening time",
        ));
    }
    if state.store.get_doctor(doctor_id).await?.is_none() {
        return Err(AppError::NotFound("doctor"));
    }

    let hours = OpeningHours {
        id: Uuid::new_v4(),
        doctor_id,
        weekday,
        from_hour: req.from_hour,
        to_hour: req.to_hour,
    };
    state
        .store
        .insert_opening_hours(&OpeningHoursRow::from_hours(&hours))
        .await?;

    tracing::info!(doctor_id = %doctor_id, window = %hours, "opening hours added");
    Ok(hours)
}

/// Windows in ascending (weekday, from_hour) order.
pub async fn list_opening_hours(state: &AppState, doctor_id: Uuid) -> AppResult<Vec<OpeningHours>> {
    let rows = state.store.list_opening_hours(doctor_id).await?;
    let mut hours = rows
        .into_iter()
        .map(OpeningHoursRow::into_hours)
        .collect::<Result<Vec<_>, _>>()?;
    hours.sort_by_key(OpeningHours::sort_key);
    Ok(hours)
}

pub async fn remove_opening_hours(state: &AppState, doctor_id: Uuid, id: Uuid) -> AppResult<()> {
    if !state.store.delete_opening_hours(doctor_id, id).await? {
        return Err(AppError::NotFound("opening hours"));
    }
    tracing::info!(doctor_id = %doctor_id, hours_id = %id, "opening hours removed");
    Ok(())
}
