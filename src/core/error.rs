use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Wire-level tag of a [`DriverError`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    InvalidInput,
    Io,
}

impl DriverError {
    pub fn conflict(message: impl Into<String>) -> Self {
        DriverError::Conflict {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        DriverError::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        DriverError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn io_error(
        message: &str,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        DriverError::Io {
            message: message.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Conflict { .. } => ErrorKind::Conflict,
            DriverError::NotFound { .. } => ErrorKind::NotFound,
            DriverError::InvalidInput { .. } => ErrorKind::InvalidInput,
            DriverError::Io { .. } => ErrorKind::Io,
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::io_error(&e.to_string(), Some(Box::new(e)))
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(e: serde_json::Error) -> Self {
        DriverError::io_error(&format!("invalid network config: {e}"), Some(Box::new(e)))
    }
}
