//! Persisted shapes. Encrypted columns hold ciphertext; `*_index` columns hold
//! the searchable tokens the uniqueness constraints are declared on.

use chrono::{DateTime, NaiveTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::model::{CustomUser, Doctor, OpeningHours, Patient, Record, Weekday};
use crate::model::user::email_lookup_key;
use crate::secured::{CipherError, FieldCipher};

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub first_name: String,
    pub first_name_index: String,
    pub last_name: String,
    pub last_name_index: String,
    pub phone_number: String,
    pub phone_index: String,
    pub email: String,
    pub email_index: String,
    pub gender: String,
    pub birth_date: String,
    pub created_at: String,
    pub is_active: bool,
    pub password: String,
}

impl UserRow {
    pub fn seal(user: &CustomUser, cipher: &dyn FieldCipher) -> Result<Self, CipherError> {
        Ok(Self {
            id: user.id,
            first_name: cipher.encrypt(&user.first_name)?,
            first_name_index: cipher.index_token(&user.first_name),
            last_name: cipher.encrypt(&user.last_name)?,
            last_name_index: cipher.index_token(&user.last_name),
            phone_number: cipher.encrypt(&user.phone_number)?,
            phone_index: cipher.index_token(&user.phone_number),
            email: cipher.encrypt(&user.email)?,
            email_index: cipher.index_token(&email_lookup_key(&user.email)),
            gender: cipher.encrypt_value(&user.gender)?,
            birth_date: cipher.encrypt_value(&user.birth_date)?,
            created_at: cipher.encrypt(&user.created_at.to_rfc3339())?,
            is_active: user.is_active,
            password: user.password.clone(),
        })
    }

    pub fn open(self, cipher: &dyn FieldCipher) -> Result<CustomUser, CipherError> {
        Ok(CustomUser {
            id: self.id,
            first_name: cipher.decrypt(&self.first_name)?,
            last_name: cipher.decrypt(&self.last_name)?,
            phone_number: cipher.decrypt(&self.phone_number)?,
            email: cipher.decrypt(&self.email)?,
            gender: cipher.decrypt_value(&self.gender)?,
            birth_date: cipher.decrypt_value(&self.birth_date)?,
            created_at: open_timestamp(cipher, &self.created_at)?,
            is_active: self.is_active,
            password: self.password,
        })
    }
}

/// Account columns with a unique lookup token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIndex {
    Phone,
    Email,
}

impl UserIndex {
    pub fn column(self) -> &'static str {
        match self {
            UserIndex::Phone => "phone_index",
            UserIndex::Email => "email_index",
        }
    }

    pub fn token_of(self, row: &UserRow) -> &str {
        match self {
            UserIndex::Phone => &row.phone_index,
            UserIndex::Email => &row.email_index,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub digest: String,
    pub user_id: Uuid,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DoctorRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub specialty: String,
    pub phone_general: String,
    pub cabinet: String,
}

impl DoctorRow {
    pub fn from_doctor(doctor: &Doctor) -> Self {
        Self {
            id: doctor.id,
            user_id: doctor.user.id,
            specialty: doctor.specialty.clone(),
            phone_general: doctor.phone_general.clone(),
            cabinet: doctor.cabinet.clone(),
        }
    }

    pub fn into_doctor(self, user: CustomUser) -> Doctor {
        Doctor {
            id: self.id,
            user,
            specialty: self.specialty,
            phone_general: self.phone_general,
            cabinet: self.cabinet,
        }
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct OpeningHoursRow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub weekday: i16,
    pub from_hour: NaiveTime,
    pub to_hour: NaiveTime,
}

impl OpeningHoursRow {
    pub fn from_hours(hours: &OpeningHours) -> Self {
        Self {
            id: hours.id,
            doctor_id: hours.doctor_id,
            weekday: i16::from(hours.weekday.number()),
            from_hour: hours.from_hour,
            to_hour: hours.to_hour,
        }
    }

    pub fn into_hours(self) -> Result<OpeningHours, CipherError> {
        let weekday = u8::try_from(self.weekday)
            .ok()
            .and_then(|n| Weekday::try_from(n).ok())
            .ok_or_else(|| {
                CipherError::InvalidPlaintext(format!("weekday {} out of range", self.weekday))
            })?;
        Ok(OpeningHours {
            id: self.id,
            doctor_id: self.doctor_id,
            weekday,
            from_hour: self.from_hour,
            to_hour: self.to_hour,
        })
    }

    /// Unique key of a window within its doctor's calendar.
    pub fn slot(&self) -> (Uuid, i16, NaiveTime, NaiveTime) {
        (self.doctor_id, self.weekday, self.from_hour, self.to_hour)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PatientRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub region: String,
    pub neighborhood: String,
    pub city: String,
    pub street: Option<String>,
    pub house: Option<String>,
    pub apartment: Option<String>,
    pub allergy: String,
    pub blood_type: String,
    pub medical_insurance_number: Option<String>,
    pub insurance_index: Option<String>,
}

impl PatientRow {
    pub fn seal(patient: &Patient, cipher: &dyn FieldCipher) -> Result<Self, CipherError> {
        Ok(Self {
            id: patient.id,
            user_id: patient.user.id,
            region: cipher.encrypt(&patient.region)?,
            neighborhood: cipher.encrypt(&patient.neighborhood)?,
            city: cipher.encrypt(&patient.city)?,
            street: cipher.encrypt_opt(patient.street.as_deref())?,
            house: cipher.encrypt_opt(patient.house.as_deref())?,
            apartment: cipher.encrypt_opt(patient.apartment.as_deref())?,
            allergy: cipher.encrypt(&patient.allergy)?,
            blood_type: cipher.encrypt_value(&patient.blood_type)?,
            medical_insurance_number: cipher
                .encrypt_opt(patient.medical_insurance_number.as_deref())?,
            insurance_index: patient
                .medical_insurance_number
                .as_deref()
                .map(|n| cipher.index_token(n)),
        })
    }

    pub fn open(self, user: CustomUser, cipher: &dyn FieldCipher) -> Result<Patient, CipherError> {
        Ok(Patient {
            id: self.id,
            user,
            region: cipher.decrypt(&self.region)?,
            neighborhood: cipher.decrypt(&self.neighborhood)?,
            city: cipher.decrypt(&self.city)?,
            street: cipher.decrypt_opt(self.street.as_deref())?,
            house: cipher.decrypt_opt(self.house.as_deref())?,
            apartment: cipher.decrypt_opt(self.apartment.as_deref())?,
            allergy: cipher.decrypt(&self.allergy)?,
            blood_type: cipher.decrypt_value(&self.blood_type)?,
            medical_insurance_number: cipher
                .decrypt_opt(self.medical_insurance_number.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub description: String,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub created_at: String,
    pub updated_at: String,
    pub file_analysis: Option<String>,
}

impl RecordRow {
    pub fn seal(record: &Record, cipher: &dyn FieldCipher) -> Result<Self, CipherError> {
        Ok(Self {
            id: record.id,
            description: cipher.encrypt(&record.description)?,
            doctor_id: record.doctor_author,
            patient_id: record.patient,
            created_at: cipher.encrypt(&record.created_at.to_rfc3339())?,
            updated_at: cipher.encrypt(&record.updated_at.to_rfc3339())?,
            file_analysis: cipher.encrypt_opt(record.file_analysis.as_deref())?,
        })
    }

    pub fn open(self, cipher: &dyn FieldCipher) -> Result<Record, CipherError> {
        Ok(Record {
            id: self.id,
            description: cipher.decrypt(&self.description)?,
            doctor_author: self.doctor_id,
            patient: self.patient_id,
            created_at: open_timestamp(cipher, &self.created_at)?,
            updated_at: open_timestamp(cipher, &self.updated_at)?,
            file_analysis: cipher.decrypt_opt(self.file_analysis.as_deref())?,
        })
    }
}

fn open_timestamp(cipher: &dyn FieldCipher, stored: &str) -> Result<DateTime<Utc>, CipherError> {
    let plain = cipher.decrypt(stored)?;
    DateTime::parse_from_rfc3339(&plain)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| CipherError::InvalidPlaintext(e.to_string()))
}
