//! Service-level error taxonomy.
//!
//! Internal plumbing returns `anyhow::Result`; anything that crosses the
//! HTTP boundary is classified into a [`ServiceError`] first so the handler
//! can pick a status code without string matching.

use thiserror::Error;

use crate::loader::LoadError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing field, unreadable upload, unparseable document, bad URL.
    #[error("{0}")]
    InvalidInput(String),

    /// A referenced local file does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Embedding, index or model call failed.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),

    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Machine-readable category reported next to the detail string.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "bad_request",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Upstream(_) => "upstream",
            ServiceError::Internal(_) => "internal",
        }
    }

    /// Re-tags everything except `NotFound` as an input error.
    ///
    /// The embedding endpoints report all of their failures as client
    /// errors; this keeps that mapping in one place.
    pub fn into_input_error(self, prefix: &str) -> ServiceError {
        match self {
            ServiceError::NotFound(msg) => ServiceError::NotFound(msg),
            other => ServiceError::InvalidInput(format!("{}: {}", prefix, other)),
        }
    }
}

impl From<LoadError> for ServiceError {
    fn from(err: LoadError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
