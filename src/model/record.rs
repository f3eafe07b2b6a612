use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const SELF_AUTHORSHIP_MESSAGE: &str = "A doctor cannot create a record for himself/herself.";

/// Clinical note authored by a doctor about a patient.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Uuid,
    pub description: String,
    pub doctor_author: Uuid,
    pub patient: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Path relative to the media root, under `record/`.
    pub file_analysis: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordCreate {
    pub patient: Uuid,
    #[validate(length(min = 1))]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordUpdate {
    #[validate(length(min = 1))]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordQuery {
    pub patient: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub description: String,
    pub doctor_author: Uuid,
    pub patient: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub file_analysis: Option<String>,
}

impl From<&Record> for RecordResponse {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            description: record.description.clone(),
            doctor_author: record.doctor_author,
            patient: record.patient,
            created_at: record.created_at,
            updated_at: record.updated_at,
            file_analysis: record.file_analysis.clone(),
        }
    }
}
