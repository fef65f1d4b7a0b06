use thiserror::Error;

use crate::jobs::model::Platform;

/// Failure to turn a content reference into bytes.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid content reference: {0:?}")]
    InvalidReference(String),

    #[error("content unavailable: {0}")]
    Unavailable(String),
}

/// Opaque failure reported by a platform adapter. The reconciler only records the message.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct PublishError {
    pub message: String,
}

impl PublishError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Pass-level failures. Nothing is mutated when one of these is returned.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("no credential available for platform {0}")]
    MissingCredential(Platform),

    #[error("no adapter registered for platform {0}")]
    NoAdapter(Platform),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseError {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
