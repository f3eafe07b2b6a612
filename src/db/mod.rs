//! Persistence boundary.
//!
//! `Store` is implemented by `PgStore` (Postgres via sqlx) and `MemoryStore`
//! (in-process tables used by tests and database-less local runs). Both enforce
//! the same uniqueness, foreign-key and delete rules so services behave the same
//! on either backend.

pub mod memory;
pub mod postgres;
pub mod rows;

use async_trait::async_trait;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use rows::{
    DoctorRow, OpeningHoursRow, PatientRow, RecordRow, TokenRow, UserIndex, UserRow,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("a row with this {0} already exists")]
    Unique(&'static str),

    #[error("referenced {0} does not exist")]
    MissingReference(&'static str),

    #[error("{0} is still referenced by other rows")]
    Restricted(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCheck {
    /// Code matched and was consumed.
    Accepted,
    Rejected,
    /// Too many failed attempts; a new code must be issued.
    Exhausted,
    Missing,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Accounts
    async fn insert_user(&self, row: &UserRow) -> StoreResult<()>;
    async fn update_user(&self, row: &UserRow) -> StoreResult<bool>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserRow>>;
    async fn find_user(&self, index: UserIndex, token: &str) -> StoreResult<Option<UserRow>>;
    /// Cascades to profiles, tokens, activation codes and the patient's records.
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool>;

    /// Stores a fresh code for the user, resetting its failed attempts.
    async fn put_activation_code(&self, user_id: Uuid, digest: &str) -> StoreResult<()>;
    /// Compares and consumes in one step. A mismatch counts as a failed attempt
    /// and the code stops matching once `max_attempts` failures are recorded.
    async fn check_activation_code(
        &self,
        user_id: Uuid,
        digest: &str,
        max_attempts: i32,
    ) -> StoreResult<ActivationCheck>;

    async fn insert_token(&self, row: &TokenRow) -> StoreResult<()>;
    async fn token_user(&self, digest: &str) -> StoreResult<Option<Uuid>>;
    async fn delete_token(&self, digest: &str) -> StoreResult<bool>;

    // Doctors and their calendar
    async fn insert_doctor(&self, row: &DoctorRow) -> StoreResult<()>;
    async fn update_doctor(&self, row: &DoctorRow) -> StoreResult<bool>;
    async fn get_doctor(&self, id: Uuid) -> StoreResult<Option<DoctorRow>>;
    async fn doctor_for_user(&self, user_id: Uuid) -> StoreResult<Option<DoctorRow>>;
    async fn list_doctors(&self) -> StoreResult<Vec<DoctorRow>>;
    /// Fails with `Restricted` while the doctor authors any record.
    async fn delete_doctor(&self, id: Uuid) -> StoreResult<bool>;

    async fn insert_opening_hours(&self, row: &OpeningHoursRow) -> StoreResult<()>;
    /// Ordered by (weekday, from_hour).
    async fn list_opening_hours(&self, doctor_id: Uuid) -> StoreResult<Vec<OpeningHoursRow>>;
    async fn delete_opening_hours(&self, doctor_id: Uuid, id: Uuid) -> StoreResult<bool>;

    // Patients
    async fn insert_patient(&self, row: &PatientRow) -> StoreResult<()>;
    async fn update_patient(&self, row: &PatientRow) -> StoreResult<bool>;
    async fn get_patient(&self, id: Uuid) -> StoreResult<Option<PatientRow>>;
    async fn patient_for_user(&self, user_id: Uuid) -> StoreResult<Option<PatientRow>>;
    async fn delete_patient(&self, id: Uuid) -> StoreResult<bool>;

    // Clinical records
    async fn insert_record(&self, row: &RecordRow) -> StoreResult<()>;
    async fn update_record(&self, row: &RecordRow) -> StoreResult<bool>;
    async fn get_record(&self, id: Uuid) -> StoreResult<Option<RecordRow>>;
    async fn list_records_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<RecordRow>>;
    async fn list_records_by_doctor(&self, doctor_id: Uuid) -> StoreResult<Vec<RecordRow>>;
    async fn delete_record(&self, id: Uuid) -> StoreResult<bool>;
}
