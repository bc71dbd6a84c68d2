use shared::domain::EntityKind;
use thiserror::Error;

/// Failure of a gateway call or a coordinated write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx response. Displays as the service's message, untouched.
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("{field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },
    #[error("unexpected response from service: {0}")]
    InvalidResponse(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl SyncError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Http { status: 404, .. })
    }
}
