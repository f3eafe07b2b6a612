//! Domain operations. Handlers in `routes` stay thin and call into these.

pub mod accounts;
pub mod doctors;
pub mod patients;
pub mod records;

use crate::error::{AppError, AppResult};

/// Trimmed value of a required text field; blank input is rejected.
pub(crate) fn required(field: &'static str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(field, format!("{field} may not be blank")));
    }
    Ok(trimmed.to_string())
}
