//! Error taxonomy for the care coordination core.
//!
//! Every operation returns either a successful result or a [`CareError`]. Callers that sit
//! at a transport boundary should branch on [`CareError::kind`] rather than on individual
//! variants, and render [`CareError::user_message`] rather than `Display`, which may carry
//! internal detail.

/// Coarse classification used by transports and retry policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input. Never retried.
    Validation,
    /// Target absent, or not owned by the caller. Deliberately indistinguishable.
    NotFound,
    /// Double booking, illegal lifecycle transition or uniqueness collision.
    Conflict,
    /// Transient persistence failure. Safe to retry with backoff.
    StoreUnavailable,
    /// Anything else: snapshot corruption, serialisation faults.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum CareError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("illegal {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("failed to create data directory: {0}")]
    DataDirCreation(std::io::Error),
    #[error("failed to read store snapshot: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write store snapshot: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record: {0}")]
    Deserialization(serde_json::Error),
    #[error("store snapshot schema mismatch at {path}: {message}")]
    SnapshotSchema { path: String, message: String },

    #[error("invalid identifier: {0}")]
    Identifier(#[from] care_uuid::UuidError),
    #[error("invalid text: {0}")]
    Text(#[from] care_types::TextError),
}

impl CareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CareError::InvalidInput(_) | CareError::Identifier(_) | CareError::Text(_) => {
                ErrorKind::Validation
            }
            CareError::NotFound(_) => ErrorKind::NotFound,
            CareError::Conflict(_) | CareError::InvalidTransition { .. } => ErrorKind::Conflict,
            CareError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            CareError::DataDirCreation(_)
            | CareError::FileRead(_)
            | CareError::FileWrite(_)
            | CareError::Serialization(_)
            | CareError::Deserialization(_)
            | CareError::SnapshotSchema { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the same call may succeed if repeated later.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StoreUnavailable
    }

    /// Stable, caller-facing message.
    ///
    /// Validation, not-found and conflict errors describe the problem; store and internal
    /// failures collapse to generic text so that no implementation detail leaks.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Conflict => self.to_string(),
            ErrorKind::NotFound => match self {
                CareError::NotFound(what) => format!("{what} not found"),
                _ => "not found".into(),
            },
            ErrorKind::StoreUnavailable => {
                "service temporarily unavailable, please retry".into()
            }
            ErrorKind::Internal => "internal error".into(),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        CareError::NotFound(what.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        CareError::InvalidInput(message.into())
    }
}

pub type CareResult<T> = std::result::Result<T, CareError>;
