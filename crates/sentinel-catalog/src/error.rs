//! Error types for sentinel-catalog

use thiserror::Error;

/// Errors returned by a [`CatalogClient`](crate::CatalogClient).
///
/// Transport failures (the request never produced a usable answer) are kept
/// apart from application failures (the service answered with a structured
/// rejection), because callers treat some application failures as expected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Network, authentication or connection failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Structured rejection from the remote service
    #[error("request rejected ({status}) {code}: {message}")]
    Application {
        status: u16,
        code: String,
        message: String,
    },

    /// The addressed resource does not exist
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The response could not be mapped onto the catalog types
    #[error("failed to decode {what}: {detail}")]
    Decode { what: String, detail: String },
}

impl CatalogError {
    /// Build an application error with the given status, code and message.
    pub fn application(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        CatalogError::Application {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }

    /// The service-provided message for application errors.
    pub fn application_message(&self) -> Option<&str> {
        match self {
            CatalogError::Application { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CatalogError::Decode {
                what: "response body".to_string(),
                detail: err.to_string(),
            }
        } else {
            CatalogError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Decode {
            what: "json payload".to_string(),
            detail: err.to_string(),
        }
    }
}
