use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::db::RecordRow;
use crate::error::{AppError, AppResult};
use crate::files::display_name;
use crate::model::record::{RecordCreate, RecordUpdate, SELF_AUTHORSHIP_MESSAGE};
use crate::model::{CustomUser, Doctor, Record};
use crate::services::{patients, required};
use crate::state::AppState;

pub async fn create_record(state: &AppState, author: &Doctor, req: RecordCreate) -> AppResult<Record> {
    req.validate()?;
    let description = required("description", &req.description)?;
    let patient = patients::get_patient(state, req.patient).await?;

    if state.self_authorship_guard && patient.user.id == author.user.id {
        return Err(AppError::validation("doctor_author", SELF_AUTHORSHIP_MESSAGE));
    }

    let now = Utc::now();
    let record = Record {
        id: Uuid::new_v4(),
        description,
        doctor_author: author.id,
        patient: patient.id,
        created_at: now,
        updated_at: now,
        file_analysis: None,
    };
    let row = RecordRow::seal(&record, state.cipher.as_ref())?;
    state.store.insert_record(&row).await?;

    tracing::info!(record_id = %record.id, doctor_id = %author.id, patient_id = %patient.id, "record created");
    Ok(record)
}

pub async fn get_record(state: &AppState, id: Uuid) -> AppResult<Record> {
    let row = state
        .store
        .get_record(id)
        .await?
        .ok_or(AppError::NotFound("record"))?;
    Ok(row.open(state.cipher.as_ref())?)
}

async fn save(state: &AppState, record: &Record) -> AppResult<()> {
    let row = RecordRow::seal(record, state.cipher.as_ref())?;
    if !state.store.update_record(&row).await? {
        return Err(AppError::NotFound("record"));
    }
    Ok(())
}

pub async fn update_record(state: &AppState, id: Uuid, req: RecordUpdate) -> AppResult<Record> {
    req.validate()?;
    let mut record = get_record(state, id).await?;
    record.description = required("description", &req.description)?;
    record.updated_at = Utc::now();
    save(state, &record).await?;

    tracing::info!(record_id = %id, "record updated");
    Ok(record)
}

fn open_all(state: &AppState, rows: Vec<RecordRow>) -> AppResult<Vec<Record>> {
    let mut records = rows
        .into_iter()
        .map(|row| row.open(state.cipher.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    // timestamps are encrypted, so ordering happens after decryption
    records.sort_by_key(|r| (r.created_at, r.id));
    Ok(records)
}

/// Oldest first.
pub async fn list_records_for_patient(state: &AppState, patient_id: Uuid) -> AppResult<Vec<Record>> {
    let rows = state.store.list_records_for_patient(patient_id).await?;
    open_all(state, rows)
}

/// Oldest first.
pub async fn list_records_by_doctor(state: &AppState, doctor_id: Uuid) -> AppResult<Vec<Record>> {
    let rows = state.store.list_records_by_doctor(doctor_id).await?;
    open_all(state, rows)
}

pub async fn delete_record(state: &AppState, id: Uuid) -> AppResult<()> {
    let record = get_record(state, id).await?;
    if !state.store.delete_record(id).await? {
        return Err(AppError::NotFound("record"));
    }
    if let Some(path) = &record.file_analysis {
        remove_attachments(state, std::slice::from_ref(path)).await;
    }
    tracing::info!(record_id = %id, "record deleted");
    Ok(())
}

/// Store an encrypted attachment, replacing any previous one.
pub async fn attach_file(state: &AppState, id: Uuid, filename: &str, bytes: &[u8]) -> AppResult<Record> {
    let mut record = get_record(state, id).await?;
    let stored = state
        .files
        .save_record_file(state.cipher.as_ref(), record.id, filename, bytes)
        .await?;

    let previous = record.file_analysis.replace(stored);
    record.updated_at = Utc::now();
    save(state, &record).await?;

    if let Some(old) = previous.filter(|old| Some(old) != record.file_analysis.as_ref()) {
        remove_attachments(state, &[old]).await;
    }
    tracing::info!(record_id = %id, size = bytes.len(), "record attachment stored");
    Ok(record)
}

/// Decrypted attachment with its original file name.
pub async fn read_file(state: &AppState, record: &Record) -> AppResult<(String, Vec<u8>)> {
    let path = record
        .file_analysis
        .as_deref()
        .ok_or(AppError::NotFound("attachment"))?;
    let bytes = match state.files.read(state.cipher.as_ref(), path).await {
        Ok(bytes) => bytes,
        Err(crate::files::FileError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound("attachment"));
        }
        Err(e) => return Err(e.into()),
    };
    Ok((display_name(path).to_string(), bytes))
}

/// Readable by the authoring doctor and by the patient's own account.
pub async fn can_access(state: &AppState, user: &CustomUser, record: &Record) -> AppResult<bool> {
    if let Some(doctor) = state.store.doctor_for_user(user.id).await? {
        if doctor.id == record.doctor_author {
            return Ok(true);
        }
    }
    Ok(state
        .store
        .patient_for_user(user.id)
        .await?
        .is_some_and(|patient| patient.id == record.patient))
}

/// Attachment paths of every record held by a patient.
pub async fn attachment_paths(state: &AppState, patient_id: Uuid) -> AppResult<Vec<String>> {
    Ok(list_records_for_patient(state, patient_id)
        .await?
        .into_iter()
        .filter_map(|r| r.file_analysis)
        .collect())
}

/// Best effort; failures are logged and skipped.
pub async fn remove_attachments(state: &AppState, paths: &[String]) {
    for path in paths {
        if let Err(e) = state.files.remove(path).await {
            tracing::warn!(path = %path, error = %e, "failed to remove attachment");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::doctor::DoctorCreate;
    use crate::model::patient::PatientCreate;
    use crate::model::Patient;
    use crate::services::testing::{state, user_create};
    use crate::services::{accounts, doctors};

    async fn doctor(state: &AppState) -> Doctor {
        let reg = accounts::create_user(
            state,
            user_create("John", "Doe", "1234567890", "john.doe@example.com"),
        )
        .await
        .unwrap();
        let req = DoctorCreate {
            specialty: "Cardiologist".into(),
            phone_general: "9876543210".into(),
            cabinet: "101".into(),
        };
        doctors::create_doctor(state, reg.user.id, req).await.unwrap()
    }

    fn patient_request() -> PatientCreate {
        PatientCreate {
            region: "Region1".into(),
            neighborhood: "Neighborhood1".into(),
            city: "City1".into(),
            street: None,
            house: None,
            apartment: None,
            allergy: "".into(),
            blood_type: "O-".into(),
            medical_insurance_number: None,
        }
    }

    async fn patient(state: &AppState) -> Patient {
        let reg = accounts::create_user(
            state,
            user_create("Jane", "Roe", "5550001111", "jane.roe@example.com"),
        )
        .await
        .unwrap();
        patients::create_patient(state, reg.user.id, patient_request()).await.unwrap()
    }

    fn note(patient: &Patient, text: &str) -> RecordCreate {
        RecordCreate {
            patient: patient.id,
            description: text.into(),
        }
    }

    #[tokio::test]
    async fn record_links_author_and_patient() {
        let state = state();
        let doctor = doctor(&state).await;
        let patient = patient(&state).await;
        let record = create_record(&state, &doctor, note(&patient, "Routine check")).await.unwrap();
        assert_eq!(record.doctor_author, doctor.id);
        assert_eq!(record.patient, patient.id);
        assert_eq!(record.created_at, record.updated_at);

        assert_eq!(get_record(&state, record.id).await.unwrap(), record);
        assert_eq!(list_records_by_doctor(&state, doctor.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn doctor_cannot_author_own_record() {
        let state = state();
        let doctor = doctor(&state).await;
        let own = patients::create_patient(&state, doctor.user.id, patient_request()).await.unwrap();

        let err = create_record(&state, &doctor, note(&own, "Self note")).await.unwrap_err();
        assert_eq!(err.field(), Some("doctor_author"));
        assert_eq!(err.to_string(), SELF_AUTHORSHIP_MESSAGE);
        assert!(list_records_for_patient(&state, own.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_guard_allows_self_authorship() {
        let mut state = state();
        state.self_authorship_guard = false;
        let doctor = doctor(&state).await;
        let own = patients::create_patient(&state, doctor.user.id, patient_request()).await.unwrap();
        create_record(&state, &doctor, note(&own, "Self note")).await.unwrap();
    }

    #[tokio::test]
    async fn update_advances_updated_at() {
        let state = state();
        let doctor = doctor(&state).await;
        let patient = patient(&state).await;
        let record = create_record(&state, &doctor, note(&patient, "Initial")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let updated = update_record(
            &state,
            record.id,
            RecordUpdate {
                description: "Revised".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.description, "Revised");
        assert_eq!(updated.created_at, record.created_at);
        assert!(updated.updated_at > record.updated_at);

        let stored = get_record(&state, record.id).await.unwrap();
        assert_eq!(stored.updated_at, updated.updated_at);
    }

    #[tokio::test]
    async fn blank_description_is_rejected() {
        let state = state();
        let doctor = doctor(&state).await;
        let patient = patient(&state).await;
        let err = create_record(&state, &doctor, note(&patient, "  ")).await.unwrap_err();
        assert_eq!(err.field(), Some("description"));
    }

    #[tokio::test]
    async fn unknown_patient_is_not_found() {
        let state = state();
        let doctor = doctor(&state).await;
        let req = RecordCreate {
            patient: Uuid::new_v4(),
            description: "Lost".into(),
        };
        assert!(matches!(
            create_record(&state, &doctor, req).await,
            Err(AppError::NotFound("patient"))
        ));
    }

    #[tokio::test]
    async fn listing_is_oldest_first() {
        let state = state();
        let doctor = doctor(&state).await;
        let patient = patient(&state).await;
        for text in ["first", "second", "third"] {
            create_record(&state, &doctor, note(&patient, text)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let listed: Vec<_> = list_records_for_patient(&state, patient.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.description)
            .collect();
        assert_eq!(listed, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn attachment_is_encrypted_at_rest() {
        let state = state();
        let doctor = doctor(&state).await;
        let patient = patient(&state).await;
        let record = create_record(&state, &doctor, note(&patient, "Blood panel")).await.unwrap();

        let body = b"hemoglobin 14.2 g/dL";
        let attached = attach_file(&state, record.id, "panel.txt", body).await.unwrap();
        let path = attached.file_analysis.clone().unwrap();
        assert!(path.starts_with("record/"));
        assert!(attached.updated_at >= record.updated_at);

        let on_disk = std::fs::read(state.files.root().join(&path)).unwrap();
        assert_ne!(on_disk.as_slice(), body.as_slice());

        let (name, bytes) = read_file(&state, &attached).await.unwrap();
        assert_eq!(name, "panel.txt");
        assert_eq!(bytes, body);

        delete_record(&state, record.id).await.unwrap();
        assert!(!state.files.root().join(&path).exists());
    }

    #[tokio::test]
    async fn access_is_limited_to_author_and_patient() {
        let state = state();
        let doctor = doctor(&state).await;
        let patient = patient(&state).await;
        let record = create_record(&state, &doctor, note(&patient, "Private")).await.unwrap();

        assert!(can_access(&state, &doctor.user, &record).await.unwrap());
        assert!(can_access(&state, &patient.user, &record).await.unwrap());

        let stranger = accounts::create_user(
            &state,
            user_create("Sam", "Poe", "2223334444", "sam@example.com"),
        )
        .await
        .unwrap()
        .user;
        assert!(!can_access(&state, &stranger, &record).await.unwrap());
    }

    #[tokio::test]
    async fn author_with_records_cannot_be_deleted() {
        let state = state();
        let doctor = doctor(&state).await;
        let patient = patient(&state).await;
        create_record(&state, &doctor, note(&patient, "Keep")).await.unwrap();

        let err = doctors::delete_doctor(&state, doctor.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { .. }));
    }

    #[tokio::test]
    async fn deleting_the_patient_account_drops_its_records() {
        let state = state();
        let doctor = doctor(&state).await;
        let patient = patient(&state).await;
        let record = create_record(&state, &doctor, note(&patient, "Gone")).await.unwrap();
        let attached = attach_file(&state, record.id, "scan.pdf", b"%PDF").await.unwrap();
        let path = attached.file_analysis.unwrap();

        accounts::delete_user(&state, patient.user.id).await.unwrap();
        assert!(matches!(get_record(&state, record.id).await, Err(AppError::NotFound(_))));
        assert!(!state.files.root().join(path).exists());
        doctors::delete_doctor(&state, doctor.id).await.unwrap();
    }
}
