use async_trait::async_trait;
use sqlx::postgres::{PgDatabaseError, PgPool, PgPoolOptions};
use uuid::Uuid;

use super::rows::{
    DoctorRow, OpeningHoursRow, PatientRow, RecordRow, TokenRow, UserIndex, UserRow,
};
use super::{ActivationCheck, Store, StoreError, StoreResult};

const USER_COLUMNS: &str = "id, first_name, first_name_index, last_name, last_name_index, \
     phone_number, phone_index, email, email_index, gender, birth_date, created_at, \
     is_active, password";
const DOCTOR_COLUMNS: &str = "id, user_id, specialty, phone_general, cabinet";
const HOURS_COLUMNS: &str = "id, doctor_id, weekday, from_hour, to_hour";
const PATIENT_COLUMNS: &str = "id, user_id, region, neighborhood, city, street, house, \
     apartment, allergy, blood_type, medical_insurance_number, insurance_index";
const RECORD_COLUMNS: &str =
    "id, description, doctor_id, patient_id, created_at, updated_at, file_analysis";

/// Postgres-backed store. Constraints live in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unique_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_phone_unique") => "phone_number",
        Some("users_email_unique") => "email",
        Some("doctors_user_unique") | Some("patients_user_unique") => "user",
        Some("opening_hours_slot_unique") => "opening_hours",
        Some("patients_insurance_unique") => "medical_insurance_number",
        Some("auth_tokens_pkey") => "token",
        _ => "id",
    }
}

fn referenced_entity(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("records_doctor_id_fkey") | Some("opening_hours_doctor_id_fkey") => "doctor",
        Some("records_patient_id_fkey") => "patient",
        _ => "user",
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(pg) = db_err.try_downcast_ref::<PgDatabaseError>() {
            match pg.code() {
                "23505" => return StoreError::Unique(unique_field(pg.constraint())),
                "23503" => {
                    return StoreError::MissingReference(referenced_entity(pg.constraint()))
                }
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

fn map_delete_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(pg) = db_err.try_downcast_ref::<PgDatabaseError>() {
            if matches!(pg.code(), "23503" | "23001") {
                return StoreError::Restricted(referenced_entity(pg.constraint()));
            }
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, row: &UserRow) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(row.id)
        .bind(&row.first_name)
        .bind(&row.first_name_index)
        .bind(&row.last_name)
        .bind(&row.last_name_index)
        .bind(&row.phone_number)
        .bind(&row.phone_index)
        .bind(&row.email)
        .bind(&row.email_index)
        .bind(&row.gender)
        .bind(&row.birth_date)
        .bind(&row.created_at)
        .bind(row.is_active)
        .bind(&row.password)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn update_user(&self, row: &UserRow) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET first_name = $2, first_name_index = $3, last_name = $4, \
             last_name_index = $5, phone_number = $6, phone_index = $7, email = $8, \
             email_index = $9, gender = $10, birth_date = $11, is_active = $12, password = $13 \
             WHERE id = $1",
        )
        .bind(row.id)
        .bind(&row.first_name)
        .bind(&row.first_name_index)
        .bind(&row.last_name)
        .bind(&row.last_name_index)
        .bind(&row.phone_number)
        .bind(&row.phone_index)
        .bind(&row.email)
        .bind(&row.email_index)
        .bind(&row.gender)
        .bind(&row.birth_date)
        .bind(row.is_active)
        .bind(&row.password)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_user(&self, index: UserIndex, token: &str) -> StoreResult<Option<UserRow>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} = $1 LIMIT 1",
            index.column()
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_delete_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_activation_code(&self, user_id: Uuid, digest: &str) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO activation_codes (user_id, digest) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET digest = EXCLUDED.digest, attempts = 0",
        )
        .bind(user_id)
        .bind(digest)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn check_activation_code(
        &self,
        user_id: Uuid,
        digest: &str,
        max_attempts: i32,
    ) -> StoreResult<ActivationCheck> {
        let consumed: Option<(Uuid,)> = sqlx::query_as(
            "DELETE FROM activation_codes \
             WHERE user_id = $1 AND digest = $2 AND attempts < $3 RETURNING user_id",
        )
        .bind(user_id)
        .bind(digest)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;
        if consumed.is_some() {
            return Ok(ActivationCheck::Accepted);
        }

        let failed: Option<(i32,)> = sqlx::query_as(
            "UPDATE activation_codes SET attempts = attempts + 1 \
             WHERE user_id = $1 AND attempts < $2 RETURNING attempts",
        )
        .bind(user_id)
        .bind(max_attempts)
        .fetch_optional(&self.pool)
        .await?;
        match failed {
            Some((attempts,)) if attempts < max_attempts => Ok(ActivationCheck::Rejected),
            Some(_) => Ok(ActivationCheck::Exhausted),
            None => {
                let exists: Option<(Uuid,)> =
                    sqlx::query_as("SELECT user_id FROM activation_codes WHERE user_id = $1")
                        .bind(user_id)
                        .fetch_optional(&self.pool)
                        .await?;
                Ok(if exists.is_some() {
                    ActivationCheck::Exhausted
                } else {
                    ActivationCheck::Missing
                })
            }
        }
    }

    async fn insert_token(&self, row: &TokenRow) -> StoreResult<()> {
        sqlx::query("INSERT INTO auth_tokens (digest, user_id, created) VALUES ($1, $2, $3)")
            .bind(&row.digest)
            .bind(row.user_id)
            .bind(row.created)
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn token_user(&self, digest: &str) -> StoreResult<Option<Uuid>> {
        let user: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM auth_tokens WHERE digest = $1")
                .bind(digest)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user.map(|u| u.0))
    }

    async fn delete_token(&self, digest: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM auth_tokens WHERE digest = $1")
            .bind(digest)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_doctor(&self, row: &DoctorRow) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO doctors ({DOCTOR_COLUMNS}) VALUES ($1, $2, $3, $4, $5)"
        ))
        .bind(row.id)
        .bind(row.user_id)
        .bind(&row.specialty)
        .bind(&row.phone_general)
        .bind(&row.cabinet)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn update_doctor(&self, row: &DoctorRow) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE doctors SET specialty = $2, phone_general = $3, cabinet = $4 WHERE id = $1",
        )
        .bind(row.id)
        .bind(&row.specialty)
        .bind(&row.phone_general)
        .bind(&row.cabinet)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_doctor(&self, id: Uuid) -> StoreResult<Option<DoctorRow>> {
        let row = sqlx::query_as::<_, DoctorRow>(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn doctor_for_user(&self, user_id: Uuid) -> StoreResult<Option<DoctorRow>> {
        let row = sqlx::query_as::<_, DoctorRow>(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_doctors(&self) -> StoreResult<Vec<DoctorRow>> {
        let rows = sqlx::query_as::<_, DoctorRow>(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors ORDER BY specialty, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_doctor(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM doctors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_delete_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_opening_hours(&self, row: &OpeningHoursRow) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO opening_hours ({HOURS_COLUMNS}) VALUES ($1, $2, $3, $4, $5)"
        ))
        .bind(row.id)
        .bind(row.doctor_id)
        .bind(row.weekday)
        .bind(row.from_hour)
        .bind(row.to_hour)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn list_opening_hours(&self, doctor_id: Uuid) -> StoreResult<Vec<OpeningHoursRow>> {
        let rows = sqlx::query_as::<_, OpeningHoursRow>(&format!(
            "SELECT {HOURS_COLUMNS} FROM opening_hours WHERE doctor_id = $1 \
             ORDER BY weekday, from_hour"
        ))
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_opening_hours(&self, doctor_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM opening_hours WHERE id = $1 AND doctor_id = $2")
            .bind(id)
            .bind(doctor_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_patient(&self, row: &PatientRow) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO patients ({PATIENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(row.id)
        .bind(row.user_id)
        .bind(&row.region)
        .bind(&row.neighborhood)
        .bind(&row.city)
        .bind(&row.street)
        .bind(&row.house)
        .bind(&row.apartment)
        .bind(&row.allergy)
        .bind(&row.blood_type)
        .bind(&row.medical_insurance_number)
        .bind(&row.insurance_index)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn update_patient(&self, row: &PatientRow) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE patients SET region = $2, neighborhood = $3, city = $4, street = $5, \
             house = $6, apartment = $7, allergy = $8, blood_type = $9, \
             medical_insurance_number = $10, insurance_index = $11 WHERE id = $1",
        )
        .bind(row.id)
        .bind(&row.region)
        .bind(&row.neighborhood)
        .bind(&row.city)
        .bind(&row.street)
        .bind(&row.house)
        .bind(&row.apartment)
        .bind(&row.allergy)
        .bind(&row.blood_type)
        .bind(&row.medical_insurance_number)
        .bind(&row.insurance_index)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_patient(&self, id: Uuid) -> StoreResult<Option<PatientRow>> {
        let row = sqlx::query_as::<_, PatientRow>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn patient_for_user(&self, user_id: Uuid) -> StoreResult<Option<PatientRow>> {
        let row = sqlx::query_as::<_, PatientRow>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_patient(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_delete_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_record(&self, row: &RecordRow) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO records ({RECORD_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(row.id)
        .bind(&row.description)
        .bind(row.doctor_id)
        .bind(row.patient_id)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .bind(&row.file_analysis)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn update_record(&self, row: &RecordRow) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE records SET description = $2, updated_at = $3, file_analysis = $4 \
             WHERE id = $1",
        )
        .bind(row.id)
        .bind(&row.description)
        .bind(&row.updated_at)
        .bind(&row.file_analysis)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_record(&self, id: Uuid) -> StoreResult<Option<RecordRow>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_records_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<RecordRow>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE patient_id = $1"
        ))
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_records_by_doctor(&self, doctor_id: Uuid) -> StoreResult<Vec<RecordRow>> {
        let rows = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE doctor_id = $1"
        ))
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_record(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
