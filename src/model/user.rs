use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::model::choices::Gender;

/// Account shared by doctors and patients. Fields are plaintext here;
/// they are sealed on the way into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    /// Argon2id PHC string once saved.
    pub password: String,
}

impl CustomUser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Emails compare case-insensitively; this form feeds the lookup index.
pub fn email_lookup_key(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_phone(value: &str) -> Result<(), ValidationError> {
    if value.len() == 10 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone_length");
        err.message = Some("phone number must be exactly 10 digits".into());
        Err(err)
    }
}

// Registration payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UserCreate {
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub last_name: String,
    #[validate(custom = "validate_phone")]
    pub phone_number: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    pub gender: String,
    pub birth_date: NaiveDate,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

// Partial update of the caller's own account; password changes go through set_password
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UserUpdate {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(custom = "validate_phone")]
    pub phone_number: Option<String>,
    #[validate(email, length(max = 255))]
    pub email: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetPasswordRequest {
    pub current_password: String,
    #[validate(length(min = 8, max = 128))]
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationRequest {
    pub uid: Uuid,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResendActivationRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub auth_token: String,
}

// Response never carries the password
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub email: String,
    pub gender: Gender,
    pub birth_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl From<&CustomUser> for UserResponse {
    fn from(user: &CustomUser) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone_number: user.phone_number.clone(),
            email: user.email.clone(),
            gender: user.gender,
            birth_date: user.birth_date,
            created_at: user.created_at,
            is_active: user.is_active,
        }
    }
}
