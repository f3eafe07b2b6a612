use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::model::choices::Weekday;
use crate::model::user::{CustomUser, UserResponse};

/// Doctor profile, a one-to-one extension of an account.
#[derive(Debug, Clone, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub user: CustomUser,
    pub specialty: String,
    pub phone_general: String,
    pub cabinet: String,
}

/// One weekly availability window of a doctor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningHours {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub weekday: Weekday,
    pub from_hour: NaiveTime,
    pub to_hour: NaiveTime,
}

impl OpeningHours {
    pub fn sort_key(&self) -> (Weekday, NaiveTime) {
        (self.weekday, self.from_hour)
    }
}

impl fmt::Display for OpeningHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.weekday, self.from_hour, self.to_hour)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DoctorCreate {
    #[validate(length(min = 1, max = 100))]
    pub specialty: String,
    #[validate(length(min = 1, max = 20))]
    pub phone_general: String,
    #[validate(length(min = 1, max = 6))]
    pub cabinet: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DoctorUpdate {
    #[validate(length(min = 1, max = 100))]
    pub specialty: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub phone_general: Option<String>,
    #[validate(length(min = 1, max = 6))]
    pub cabinet: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpeningHoursCreate {
    pub weekday: u8,
    pub from_hour: NaiveTime,
    pub to_hour: NaiveTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpeningHoursResponse {
    pub id: Uuid,
    pub weekday: Weekday,
    pub weekday_display: &'static str,
    pub from_hour: NaiveTime,
    pub to_hour: NaiveTime,
}

impl From<&OpeningHours> for OpeningHoursResponse {
    fn from(hours: &OpeningHours) -> Self {
        Self {
            id: hours.id,
            weekday: hours.weekday,
            weekday_display: hours.weekday.name(),
            from_hour: hours.from_hour,
            to_hour: hours.to_hour,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorResponse {
    pub id: Uuid,
    pub user: UserResponse,
    pub specialty: String,
    pub phone_general: String,
    pub cabinet: String,
    pub opening_hours: Vec<OpeningHoursResponse>,
}

impl DoctorResponse {
    pub fn new(doctor: &Doctor, hours: &[OpeningHours]) -> Self {
        Self {
            id: doctor.id,
            user: UserResponse::from(&doctor.user),
            specialty: doctor.specialty.clone(),
            phone_general: doctor.phone_general.clone(),
            cabinet: doctor.cabinet.clone(),
            opening_hours: hours.iter().map(OpeningHoursResponse::from).collect(),
        }
    }
}
