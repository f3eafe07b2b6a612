use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::model::choices::BloodType;
use crate::model::user::{CustomUser, UserResponse};

/// Patient profile, a one-to-one extension of an account.
#[derive(Debug, Clone, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub user: CustomUser,
    pub region: String,
    pub neighborhood: String,
    pub city: String,
    pub street: Option<String>,
    pub house: Option<String>,
    pub apartment: Option<String>,
    pub allergy: String,
    pub blood_type: BloodType,
    pub medical_insurance_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PatientCreate {
    #[validate(length(min = 1, max = 50))]
    pub region: String,
    #[validate(length(min = 1, max = 50))]
    pub neighborhood: String,
    #[validate(length(min = 1, max = 50))]
    pub city: String,
    #[validate(length(max = 50))]
    pub street: Option<String>,
    #[validate(length(max = 50))]
    pub house: Option<String>,
    #[validate(length(max = 50))]
    pub apartment: Option<String>,
    #[serde(default)]
    pub allergy: String,
    pub blood_type: String,
    #[validate(length(max = 20))]
    pub medical_insurance_number: Option<String>,
}

// Absent fields are left untouched; nullable address fields are cleared with an empty string
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct PatientUpdate {
    #[validate(length(min = 1, max = 50))]
    pub region: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub neighborhood: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub city: Option<String>,
    #[validate(length(max = 50))]
    pub street: Option<String>,
    #[validate(length(max = 50))]
    pub house: Option<String>,
    #[validate(length(max = 50))]
    pub apartment: Option<String>,
    pub allergy: Option<String>,
    pub blood_type: Option<String>,
    #[validate(length(max = 20))]
    pub medical_insurance_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientResponse {
    pub id: Uuid,
    pub user: UserResponse,
    pub region: String,
    pub neighborhood: String,
    pub city: String,
    pub street: Option<String>,
    pub house: Option<String>,
    pub apartment: Option<String>,
    pub allergy: String,
    pub blood_type: BloodType,
    pub medical_insurance_number: Option<String>,
}

impl From<&Patient> for PatientResponse {
    fn from(patient: &Patient) -> Self {
        Self {
            id: patient.id,
            user: UserResponse::from(&patient.user),
            region: patient.region.clone(),
            neighborhood: patient.neighborhood.clone(),
            city: patient.city.clone(),
            street: patient.street.clone(),
            house: patient.house.clone(),
            apartment: patient.apartment.clone(),
            allergy: patient.allergy.clone(),
            blood_type: patient.blood_type,
            medical_insurance_number: patient.medical_insurance_number.clone(),
        }
    }
}

/// Trims optional fields; empty strings mean "no value".
pub fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
