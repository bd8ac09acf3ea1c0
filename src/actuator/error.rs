//! Typed failures returned by remote actuators

use thiserror::Error;

/// How the reconciler should react to a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network, timeout, throttling or 5xx: retry with backoff
    Transient,
    /// Remote object is mid-transition: re-observe, then retry sooner
    Conflict,
    /// Validation, authorization or not-found: do not retry blindly
    Permanent,
}

#[derive(Error, Debug, Clone)]
pub enum ActuatorError {
    #[error("transient remote failure: {0}")]
    Transient(String),

    #[error("remote object is in an incompatible state: {0}")]
    Conflict(String),

    #[error("remote request rejected: {0}")]
    Permanent(String),

    #[error("remote object not found: {0}")]
    NotFound(String),

    #[error("{backend} backend does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },
}

impl ActuatorError {
    pub fn classify(&self) -> ErrorClass {
        match self {
            ActuatorError::Transient(_) => ErrorClass::Transient,
            ActuatorError::Conflict(_) => ErrorClass::Conflict,
            ActuatorError::Permanent(_)
            | ActuatorError::NotFound(_)
            | ActuatorError::Unsupported { .. } => ErrorClass::Permanent,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ActuatorError::NotFound(_))
    }

    /// Map an HTTP status and response body onto the error taxonomy
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = format!("HTTP {}: {}", status, message.into());
        match status {
            404 => ActuatorError::NotFound(message),
            409 | 412 => ActuatorError::Conflict(message),
            429 => ActuatorError::Transient(message),
            500..=599 => ActuatorError::Transient(message),
            _ => ActuatorError::Permanent(message),
        }
    }
}

impl From<reqwest::Error> for ActuatorError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return ActuatorError::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() || err.is_builder() {
            ActuatorError::Permanent(err.to_string())
        } else {
            // timeouts, connect failures and broken bodies are worth retrying
            ActuatorError::Transient(err.to_string())
        }
    }
}

pub type ActuatorResult<T> = std::result::Result<T, ActuatorError>;
