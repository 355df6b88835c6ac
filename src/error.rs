//! Error taxonomy for the store, managers and turn engine

use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Debug, Error)]
pub enum ChatError {
    /// A referenced user, conversation or template does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Duplicate username, or duplicate template name for one user.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The acting user does not own the conversation or template.
    #[error("user {user_id} may not access {entity} {id}")]
    PermissionDenied {
        user_id: i64,
        entity: &'static str,
        id: i64,
    },

    /// Every credential source came up empty; carries the user id or name.
    #[error("no API key available for {0}")]
    CredentialUnavailable(String),

    #[error("completion request failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
