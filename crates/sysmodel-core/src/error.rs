//! Registry error types.

use std::fmt;

use sysmodel_state::StateError;
use thiserror::Error;

/// Errors returned by every manager operation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// An aggregate rewrite lost a race with another writer; retry the call.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(StateError),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Coarse classification of a [`RegistryError`], stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    FailedPrecondition,
    Internal,
    Conflict,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::FailedPrecondition => "failed_precondition",
            ErrorKind::Internal => "internal",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            RegistryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RegistryError::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
            RegistryError::Internal(_) => ErrorKind::Internal,
            RegistryError::Conflict(_) => ErrorKind::Conflict,
            RegistryError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn not_found(what: impl fmt::Display) -> Self {
        RegistryError::NotFound(what.to_string())
    }

    pub(crate) fn invalid(what: impl fmt::Display) -> Self {
        RegistryError::InvalidArgument(what.to_string())
    }
}

impl From<StateError> for RegistryError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(what) => RegistryError::NotFound(what),
            StateError::AlreadyExists(what) => RegistryError::AlreadyExists(what),
            conflict @ StateError::Conflict { .. } => RegistryError::Conflict(conflict.to_string()),
            other => RegistryError::Storage(other),
        }
    }
}
