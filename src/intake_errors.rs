//! # Intake Error Types Module
//!
//! This module defines the error taxonomy shared by the order pipeline,
//! the persistence layer and the conversation handlers.

use std::path::PathBuf;

use thiserror::Error;

/// Custom error types for intake operations
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Structured payload could not be parsed into its minimal shape
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    /// File read/write failure
    #[error("Persistence error at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Serialization of a record failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// User-supplied value rejected
    #[error("Validation error: {0}")]
    Validation(String),
    /// Polling or listener failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl IntakeError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IntakeError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is caused by the caller's input rather than the system
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            IntakeError::MalformedInput(_) | IntakeError::Validation(_)
        )
    }
}

pub type IntakeResult<T> = Result<T, IntakeError>;
