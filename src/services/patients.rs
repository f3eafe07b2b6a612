use uuid::Uuid;
use validator::Validate;

use crate::db::PatientRow;
use crate::error::{AppError, AppResult};
use crate::model::patient::{blank_to_none, PatientCreate, PatientUpdate};
use crate::model::{BloodType, Patient};
use crate::services::{accounts, records, required};
use crate::state::AppState;

pub async fn create_patient(state: &AppState, user_id: Uuid, req: PatientCreate) -> AppResult<Patient> {
    req.validate()?;
    let blood_type: BloodType = req.blood_type.parse()?;
    let user = accounts::get_user(state, user_id).await?;

    let patient = Patient {
        id: Uuid::new_v4(),
        user,
        region: required("region", &req.region)?,
        neighborhood: required("neighborhood", &req.neighborhood)?,
        city: required("city", &req.city)?,
        street: blank_to_none(req.street),
        house: blank_to_none(req.house),
        apartment: blank_to_none(req.apartment),
        allergy: req.allergy,
        blood_type,
        medical_insurance_number: blank_to_none(req.medical_insurance_number),
    };
    let row = PatientRow::seal(&patient, state.cipher.as_ref())?;
    state.store.insert_patient(&row).await?;

    tracing::info!(patient_id = %patient.id, user_id = %user_id, "patient profile created");
    Ok(patient)
}

async fn load(state: &AppState, row: PatientRow) -> AppResult<Patient> {
    let user = accounts::get_user(state, row.user_id).await?;
    Ok(row.open(user, state.cipher.as_ref())?)
}

pub async fn get_patient(state: &AppState, id: Uuid) -> AppResult<Patient> {
    let row = state
        .store
        .get_patient(id)
        .await?
        .ok_or(AppError::NotFound("patient"))?;
    load(state, row).await
}

pub async fn patient_for_user(state: &AppState, user_id: Uuid) -> AppResult<Option<Patient>> {
    match state.store.patient_for_user(user_id).await? {
        Some(row) => Ok(Some(load(state, row).await?)),
        None => Ok(None),
    }
}

pub async fn update_patient(state: &AppState, id: Uuid, req: PatientUpdate) -> AppResult<Patient> {
    req.validate()?;
    let mut patient = get_patient(state, id).await?;

    if let Some(region) = req.region {
        patient.region = required("region", &region)?;
    }
    if let Some(neighborhood) = req.neighborhood {
        patient.neighborhood = required("neighborhood", &neighborhood)?;
    }
    if let Some(city) = req.city {
        patient.city = required("city", &city)?;
    }
    if req.street.is_some() {
        patient.street = blank_to_none(req.street);
    }
    if req.house.is_some() {
        patient.house = blank_to_none(req.house);
    }
    if req.apartment.is_some() {
        patient.apartment = blank_to_none(req.apartment);
    }
    if let Some(allergy) = req.allergy {
        patient.allergy = allergy;
    }
    if let Some(blood_type) = req.blood_type {
        patient.blood_type = blood_type.parse()?;
    }
    if req.medical_insurance_number.is_some() {
        patient.medical_insurance_number = blank_to_none(req.medical_insurance_number);
    }

    let row = PatientRow::seal(&patient, state.cipher.as_ref())?;
    if !state.store.update_patient(&row).await? {
        return Err(AppError::NotFound("patient"));
    }
    tracing::info!(patient_id = %id, "patient profile updated");
    Ok(patient)
}

/// Removes the profile together with its records and their attachments.
pub async fn delete_patient(state: &AppState, id: Uuid) -> AppResult<()> {
    let attachments = records::attachment_paths(state, id).await?;
    if !state.store.delete_patient(id).await? {
        return Err(AppError::NotFound("patient"));
    }
    records::remove_attachments(state, &attachments).await;
    tracing::info!(patient_id = %id, "patient profile deleted");
    Ok(())
}
