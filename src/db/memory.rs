use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::rows::{
    DoctorRow, OpeningHoursRow, PatientRow, RecordRow, TokenRow, UserIndex, UserRow,
};
use super::{ActivationCheck, Store, StoreError, StoreResult};

struct ActivationEntry {
    digest: String,
    attempts: i32,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRow>,
    activation_codes: HashMap<Uuid, ActivationEntry>,
    tokens: HashMap<String, TokenRow>,
    doctors: HashMap<Uuid, DoctorRow>,
    opening_hours: Vec<OpeningHoursRow>,
    patients: HashMap<Uuid, PatientRow>,
    records: HashMap<Uuid, RecordRow>,
}

impl Tables {
    fn check_user_unique(&self, row: &UserRow) -> StoreResult<()> {
        let others = self.users.values().filter(|u| u.id != row.id);
        for other in others {
            if other.phone_index == row.phone_index {
                return Err(StoreError::Unique("phone_number"));
            }
            if other.email_index == row.email_index {
                return Err(StoreError::Unique("email"));
            }
        }
        Ok(())
    }

    fn check_patient_unique(&self, row: &PatientRow) -> StoreResult<()> {
        for other in self.patients.values().filter(|p| p.id != row.id) {
            if other.user_id == row.user_id {
                return Err(StoreError::Unique("user"));
            }
            if row.insurance_index.is_some() && other.insurance_index == row.insurance_index {
                return Err(StoreError::Unique("medical_insurance_number"));
            }
        }
        Ok(())
    }

    fn remove_patient_cascade(&mut self, patient_id: Uuid) -> bool {
        let existed = self.patients.remove(&patient_id).is_some();
        self.records.retain(|_, r| r.patient_id != patient_id);
        existed
    }

    fn doctor_is_referenced(&self, doctor_id: Uuid) -> bool {
        self.records.values().any(|r| r.doctor_id == doctor_id)
    }
}

/// In-process store with the same constraint semantics as the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, row: &UserRow) -> StoreResult<()> {
        let mut t = self.lock();
        if t.users.contains_key(&row.id) {
            return Err(StoreError::Unique("id"));
        }
        t.check_user_unique(row)?;
        t.users.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_user(&self, row: &UserRow) -> StoreResult<bool> {
        let mut t = self.lock();
        if !t.users.contains_key(&row.id) {
            return Ok(false);
        }
        t.check_user_unique(row)?;
        t.users.insert(row.id, row.clone());
        Ok(true)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<UserRow>> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_user(&self, index: UserIndex, token: &str) -> StoreResult<Option<UserRow>> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| index.token_of(u) == token)
            .cloned())
    }

    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        let mut t = self.lock();
        if !t.users.contains_key(&id) {
            return Ok(false);
        }
        if let Some(doctor_id) = t.doctors.values().find(|d| d.user_id == id).map(|d| d.id) {
            if t.doctor_is_referenced(doctor_id) {
                return Err(StoreError::Restricted("doctor"));
            }
            t.doctors.remove(&doctor_id);
            t.opening_hours.retain(|h| h.doctor_id != doctor_id);
        }
        if let Some(patient_id) = t.patients.values().find(|p| p.user_id == id).map(|p| p.id) {
            t.remove_patient_cascade(patient_id);
        }
        t.tokens.retain(|_, tok| tok.user_id != id);
        t.activation_codes.remove(&id);
        t.users.remove(&id);
        Ok(true)
    }

    async fn put_activation_code(&self, user_id: Uuid, digest: &str) -> StoreResult<()> {
        let mut t = self.lock();
        if !t.users.contains_key(&user_id) {
            return Err(StoreError::MissingReference("user"));
        }
        t.activation_codes.insert(
            user_id,
            ActivationEntry {
                digest: digest.to_string(),
                attempts: 0,
            },
        );
        Ok(())
    }

    async fn check_activation_code(
        &self,
        user_id: Uuid,
        digest: &str,
        max_attempts: i32,
    ) -> StoreResult<ActivationCheck> {
        let mut t = self.lock();
        let Some(entry) = t.activation_codes.get_mut(&user_id) else {
            return Ok(ActivationCheck::Missing);
        };
        if entry.attempts >= max_attempts {
            return Ok(ActivationCheck::Exhausted);
        }
        if entry.digest == digest {
            t.activation_codes.remove(&user_id);
            return Ok(ActivationCheck::Accepted);
        }
        entry.attempts += 1;
        if entry.attempts >= max_attempts {
            Ok(ActivationCheck::Exhausted)
        } else {
            Ok(ActivationCheck::Rejected)
        }
    }

    async fn insert_token(&self, row: &TokenRow) -> StoreResult<()> {
        let mut t = self.lock();
        if !t.users.contains_key(&row.user_id) {
            return Err(StoreError::MissingReference("user"));
        }
        if t.tokens.contains_key(&row.digest) {
            return Err(StoreError::Unique("token"));
        }
        t.tokens.insert(row.digest.clone(), row.clone());
        Ok(())
    }

    async fn token_user(&self, digest: &str) -> StoreResult<Option<Uuid>> {
        Ok(self.lock().tokens.get(digest).map(|t| t.user_id))
    }

    async fn delete_token(&self, digest: &str) -> StoreResult<bool> {
        Ok(self.lock().tokens.remove(digest).is_some())
    }

    async fn insert_doctor(&self, row: &DoctorRow) -> StoreResult<()> {
        let mut t = self.lock();
        if !t.users.contains_key(&row.user_id) {
            return Err(StoreError::MissingReference("user"));
        }
        if t.doctors.values().any(|d| d.user_id == row.user_id) {
            return Err(StoreError::Unique("user"));
        }
        t.doctors.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_doctor(&self, row: &DoctorRow) -> StoreResult<bool> {
        let mut t = self.lock();
        match t.doctors.get_mut(&row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_doctor(&self, id: Uuid) -> StoreResult<Option<DoctorRow>> {
        Ok(self.lock().doctors.get(&id).cloned())
    }

    async fn doctor_for_user(&self, user_id: Uuid) -> StoreResult<Option<DoctorRow>> {
        Ok(self
            .lock()
            .doctors
            .values()
            .find(|d| d.user_id == user_id)
            .cloned())
    }

    async fn list_doctors(&self) -> StoreResult<Vec<DoctorRow>> {
        let mut doctors: Vec<DoctorRow> = self.lock().doctors.values().cloned().collect();
        doctors.sort_by(|a, b| a.specialty.cmp(&b.specialty).then(a.id.cmp(&b.id)));
        Ok(doctors)
    }

    async fn delete_doctor(&self, id: Uuid) -> StoreResult<bool> {
        let mut t = self.lock();
        if !t.doctors.contains_key(&id) {
            return Ok(false);
        }
        if t.doctor_is_referenced(id) {
            return Err(StoreError::Restricted("doctor"));
        }
        t.doctors.remove(&id);
        t.opening_hours.retain(|h| h.doctor_id != id);
        Ok(true)
    }

    async fn insert_opening_hours(&self, row: &OpeningHoursRow) -> StoreResult<()> {
        let mut t = self.lock();
        if !t.doctors.contains_key(&row.doctor_id) {
            return Err(StoreError::MissingReference("doctor"));
        }
        if t.opening_hours.iter().any(|h| h.slot() == row.slot()) {
            return Err(StoreError::Unique("opening_hours"));
        }
        t.opening_hours.push(row.clone());
        Ok(())
    }

    async fn list_opening_hours(&self, doctor_id: Uuid) -> StoreResult<Vec<OpeningHoursRow>> {
        let mut hours: Vec<OpeningHoursRow> = self
            .lock()
            .opening_hours
            .iter()
            .filter(|h| h.doctor_id == doctor_id)
            .cloned()
            .collect();
        hours.sort_by_key(|h| (h.weekday, h.from_hour));
        Ok(hours)
    }

    async fn delete_opening_hours(&self, doctor_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut t = self.lock();
        let before = t.opening_hours.len();
        t.opening_hours
            .retain(|h| !(h.id == id && h.doctor_id == doctor_id));
        Ok(t.opening_hours.len() != before)
    }

    async fn insert_patient(&self, row: &PatientRow) -> StoreResult<()> {
        let mut t = self.lock();
        if !t.users.contains_key(&row.user_id) {
            return Err(StoreError::MissingReference("user"));
        }
        t.check_patient_unique(row)?;
        t.patients.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_patient(&self, row: &PatientRow) -> StoreResult<bool> {
        let mut t = self.lock();
        if !t.patients.contains_key(&row.id) {
            return Ok(false);
        }
        t.check_patient_unique(row)?;
        t.patients.insert(row.id, row.clone());
        Ok(true)
    }

    async fn get_patient(&self, id: Uuid) -> StoreResult<Option<PatientRow>> {
        Ok(self.lock().patients.get(&id).cloned())
    }

    async fn patient_for_user(&self, user_id: Uuid) -> StoreResult<Option<PatientRow>> {
        Ok(self
            .lock()
            .patients
            .values()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn delete_patient(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.lock().remove_patient_cascade(id))
    }

    async fn insert_record(&self, row: &RecordRow) -> StoreResult<()> {
        let mut t = self.lock();
        if !t.doctors.contains_key(&row.doctor_id) {
            return Err(StoreError::MissingReference("doctor"));
        }
        if !t.patients.contains_key(&row.patient_id) {
            return Err(StoreError::MissingReference("patient"));
        }
        t.records.insert(row.id, row.clone());
        Ok(())
    }

    async fn update_record(&self, row: &RecordRow) -> StoreResult<bool> {
        let mut t = self.lock();
        match t.records.get_mut(&row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_record(&self, id: Uuid) -> StoreResult<Option<RecordRow>> {
        Ok(self.lock().records.get(&id).cloned())
    }

    async fn list_records_for_patient(&self, patient_id: Uuid) -> StoreResult<Vec<RecordRow>> {
        Ok(self
            .lock()
            .records
            .values()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn list_records_by_doctor(&self, doctor_id: Uuid) -> StoreResult<Vec<RecordRow>> {
        Ok(self
            .lock()
            .records
            .values()
            .filter(|r| r.doctor_id == doctor_id)
            .cloned()
            .collect())
    }

    async fn delete_record(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.lock().records.remove(&id).is_some())
    }
}
