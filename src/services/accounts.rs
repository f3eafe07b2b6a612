use chrono::Utc;
use rand::{Rng, RngCore};
use uuid::Uuid;
use validator::Validate;

use crate::db::{ActivationCheck, TokenRow, UserIndex, UserRow};
use crate::error::{AppError, AppResult};
use crate::model::user::{email_lookup_key, SetPasswordRequest, UserCreate, UserUpdate};
use crate::model::{CustomUser, Gender};
use crate::secured::password;
use crate::services::required;
use crate::state::AppState;

const TOKEN_BYTES: usize = 20;
const INVALID_CREDENTIALS: &str = "Unable to log in with provided credentials.";
const INVALID_ACTIVATION: &str = "Invalid token for given user.";
/// Wrong codes tolerated before the outstanding code is voided.
pub const MAX_ACTIVATION_ATTEMPTS: i32 = 5;

/// A freshly registered, still inactive account.
#[derive(Debug)]
pub struct Registration {
    pub user: CustomUser,
    /// Phone confirmation code; delivery is outside this service.
    pub activation_code: String,
}

pub async fn create_user(state: &AppState, req: UserCreate) -> AppResult<Registration> {
    req.validate()?;
    let gender: Gender = req.gender.parse()?;

    let mut user = CustomUser {
        id: Uuid::new_v4(),
        first_name: required("first_name", &req.first_name)?,
        last_name: required("last_name", &req.last_name)?,
        phone_number: req.phone_number,
        email: req.email.trim().to_string(),
        gender,
        birth_date: req.birth_date,
        created_at: Utc::now(),
        is_active: false,
        password: req.password,
    };
    insert_user(state, &mut user).await?;
    let activation_code = issue_activation_code(state, user.id).await?;

    tracing::info!(user_id = %user.id, "account registered");
    Ok(Registration {
        user,
        activation_code,
    })
}

/// Insert a new account. A raw password is hashed before it is stored.
pub async fn insert_user(state: &AppState, user: &mut CustomUser) -> AppResult<()> {
    user.password = password::ensure_hashed(std::mem::take(&mut user.password))?;
    let row = UserRow::seal(user, state.cipher.as_ref())?;
    state.store.insert_user(&row).await?;
    Ok(())
}

/// Persist changes to an existing account, hashing a replaced password.
pub async fn save_user(state: &AppState, user: &mut CustomUser) -> AppResult<()> {
    user.password = password::ensure_hashed(std::mem::take(&mut user.password))?;
    let row = UserRow::seal(user, state.cipher.as_ref())?;
    if !state.store.update_user(&row).await? {
        return Err(AppError::NotFound("user"));
    }
    Ok(())
}

pub async fn get_user(state: &AppState, id: Uuid) -> AppResult<CustomUser> {
    let row = state
        .store
        .get_user(id)
        .await?
        .ok_or(AppError::NotFound("user"))?;
    Ok(row.open(state.cipher.as_ref())?)
}

async fn find_by(state: &AppState, index: UserIndex, value: &str) -> AppResult<Option<CustomUser>> {
    let token = match index {
        UserIndex::Email => state.cipher.index_token(&email_lookup_key(value)),
        UserIndex::Phone => state.cipher.index_token(value.trim()),
    };
    match state.store.find_user(index, &token).await? {
        Some(row) => Ok(Some(row.open(state.cipher.as_ref())?)),
        None => Ok(None),
    }
}

pub async fn find_by_email(state: &AppState, email: &str) -> AppResult<Option<CustomUser>> {
    find_by(state, UserIndex::Email, email).await
}

pub async fn find_by_phone(state: &AppState, phone: &str) -> AppResult<Option<CustomUser>> {
    find_by(state, UserIndex::Phone, phone).await
}

pub async fn update_user(state: &AppState, id: Uuid, req: UserUpdate) -> AppResult<CustomUser> {
    req.validate()?;
    let mut user = get_user(state, id).await?;

    if let Some(first_name) = req.first_name {
        user.first_name = required("first_name", &first_name)?;
    }
    if let Some(last_name) = req.last_name {
        user.last_name = required("last_name", &last_name)?;
    }
    if let Some(phone) = req.phone_number {
        user.phone_number = phone;
    }
    if let Some(email) = req.email {
        user.email = email.trim().to_string();
    }
    if let Some(gender) = req.gender {
        user.gender = gender.parse()?;
    }
    if let Some(birth_date) = req.birth_date {
        user.birth_date = birth_date;
    }

    save_user(state, &mut user).await?;
    tracing::info!(user_id = %user.id, "account updated");
    Ok(user)
}

/// Removes the account with its profiles, tokens and the patient's records.
pub async fn delete_user(state: &AppState, id: Uuid) -> AppResult<()> {
    let attachments = match state.store.patient_for_user(id).await? {
        Some(patient) => crate::services::records::attachment_paths(state, patient.id).await?,
        None => Vec::new(),
    };

    if !state.store.delete_user(id).await? {
        return Err(AppError::NotFound("user"));
    }
    crate::services::records::remove_attachments(state, &attachments).await;
    tracing::info!(user_id = %id, "account deleted");
    Ok(())
}

pub async fn activate_user(state: &AppState, uid: Uuid, code: &str) -> AppResult<CustomUser> {
    let mut user = match get_user(state, uid).await {
        Ok(user) => user,
        Err(AppError::NotFound(_)) => {
            return Err(AppError::validation("uid", "Invalid user id or user doesn't exist."))
        }
        Err(e) => return Err(e),
    };
    if user.is_active {
        return Err(AppError::Forbidden("Stale token for given user.".into()));
    }

    let offered = state.cipher.index_token(code.trim());
    match state
        .store
        .check_activation_code(uid, &offered, MAX_ACTIVATION_ATTEMPTS)
        .await?
    {
        ActivationCheck::Accepted => {}
        ActivationCheck::Rejected | ActivationCheck::Missing => {
            return Err(AppError::validation("token", INVALID_ACTIVATION))
        }
        ActivationCheck::Exhausted => {
            tracing::warn!(user_id = %uid, "activation code voided after repeated failures");
            return Err(AppError::validation(
                "token",
                "Too many invalid attempts. Request a new activation code.",
            ));
        }
    }

    user.is_active = true;
    save_user(state, &mut user).await?;
    tracing::info!(user_id = %uid, "account activated");
    Ok(user)
}

/// Replaces the outstanding code of an inactive account. Returns `None` when
/// there is no such account so callers learn nothing about which emails are registered.
pub async fn resend_activation(state: &AppState, email: &str) -> AppResult<Option<String>> {
    match find_by_email(state, email).await? {
        Some(user) if !user.is_active => Ok(Some(issue_activation_code(state, user.id).await?)),
        _ => Ok(None),
    }
}

async fn issue_activation_code(state: &AppState, user_id: Uuid) -> AppResult<String> {
    let code = new_activation_code();
    state
        .store
        .put_activation_code(user_id, &state.cipher.index_token(&code))
        .await?;
    tracing::debug!(user_id = %user_id, code = %code, "phone confirmation code issued");
    Ok(code)
}

pub async fn set_password(
    state: &AppState,
    user: &mut CustomUser,
    req: SetPasswordRequest,
) -> AppResult<()> {
    req.validate()?;
    if !password::check_password(&req.current_password, &user.password) {
        return Err(AppError::validation("current_password", "Invalid password."));
    }
    user.password = req.new_password;
    save_user(state, user).await?;
    tracing::info!(user_id = %user.id, "password changed");
    Ok(())
}

/// Check credentials and issue a new auth token for an active account.
pub async fn login(state: &AppState, email: &str, raw_password: &str) -> AppResult<String> {
    let user = find_by_email(state, email)
        .await?
        .filter(|u| password::check_password(raw_password, &u.password))
        .ok_or_else(|| AppError::Validation {
            field: None,
            message: INVALID_CREDENTIALS.into(),
        })?;
    if !user.is_active {
        return Err(AppError::Validation {
            field: None,
            message: "User account is disabled.".into(),
        });
    }

    let mut key = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut key);
    let token = hex::encode(key);

    state
        .store
        .insert_token(&TokenRow {
            digest: state.cipher.index_token(&token),
            user_id: user.id,
            created: Utc::now(),
        })
        .await?;
    tracing::info!(user_id = %user.id, "token issued");
    Ok(token)
}

pub async fn logout(state: &AppState, token: &str) -> AppResult<()> {
    state
        .store
        .delete_token(&state.cipher.index_token(token))
        .await?;
    Ok(())
}

pub async fn user_for_token(state: &AppState, token: &str) -> AppResult<CustomUser> {
    let user_id = state
        .store
        .token_user(&state.cipher.index_token(token))
        .await?
        .ok_or(AppError::Unauthorized)?;
    match get_user(state, user_id).await {
        Ok(user) => Ok(user),
        Err(AppError::NotFound(_)) => Err(AppError::Unauthorized),
        Err(e) => Err(e),
    }
}

fn new_activation_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}
