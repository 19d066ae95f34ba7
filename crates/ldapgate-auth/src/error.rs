//! Directory error types

use thiserror::Error;

/// Failure reported by a directory connection or the pool handing it out
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory rejected the bind DN/password pair
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Transport failure, timeout, pool exhaustion or an unexpected result code
    #[error("Directory unreachable: {0}")]
    Unreachable(String),
}

impl DirectoryError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        DirectoryError::Unreachable(message.into())
    }
}
