use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::db::StoreError;
use crate::files::FileError;
use crate::model::choices::InvalidChoice;
use crate::secured::{password::PasswordError, CipherError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    #[error("{message}")]
    Conflict {
        field: Option<String>,
        message: String,
    },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("storage error: {0}")]
    Store(StoreError),

    #[error("field encryption error: {0}")]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("file storage error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Store(_) | AppError::Cipher(_) | AppError::Password(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            AppError::Validation { field, .. } | AppError::Conflict { field, .. } => {
                field.as_deref()
            }
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unique(field) => AppError::Conflict {
                field: Some(field.to_string()),
                message: format!("a record with this {field} already exists"),
            },
            StoreError::MissingReference(entity) => AppError::Validation {
                field: Some(entity.to_string()),
                message: format!("{entity} does not exist"),
            },
            StoreError::Restricted(entity) => AppError::Conflict {
                field: None,
                message: format!("{entity} is still referenced by clinical records"),
            },
            other => AppError::Store(other),
        }
    }
}

impl From<FileError> for AppError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::InvalidPath(path) => {
                AppError::validation("file_analysis", format!("invalid attachment path: {path}"))
            }
            FileError::Io(e) => AppError::Io(e),
            FileError::Cipher(e) => AppError::Cipher(e),
        }
    }
}

impl From<InvalidChoice> for AppError {
    fn from(err: InvalidChoice) -> Self {
        AppError::validation(err.field, err.to_string())
    }
}

// Malformed bodies, paths and query strings are client errors like any other
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation {
            field: None,
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation {
            field: None,
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation {
            field: None,
            message: rejection.body_text(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<&&str> = field_errors.keys().collect();
        fields.sort();

        let Some(field) = fields.first().map(|f| **f) else {
            return AppError::Validation {
                field: None,
                message: errors.to_string(),
            };
        };
        let message = field_errors
            .get(field)
            .and_then(|errs| errs.first())
            .map(|e| match &e.message {
                Some(msg) => format!("{field}: {msg}"),
                None => format!("{field}: invalid value ({})", e.code),
            })
            .unwrap_or_else(|| format!("{field}: invalid value"));
        AppError::validation(field, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }

        // Internal details stay in the log
        let message = if status.is_server_error() {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = match self.field() {
            Some(field) => json!({ "error": message, "field": field }),
            None => json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}
