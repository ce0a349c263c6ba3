//! Error taxonomy for the engine.

use thiserror::Error;

/// Uniform error surfaced by every engine operation.
///
/// Background revalidation catches and logs these rather than failing the
/// user-visible read; cancellation is represented explicitly so callers can
/// treat it as "stop caring" instead of a failure.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request aborted: {reason}")]
    Cancelled { reason: String },

    #[error("unauthorized: token refresh failed or unavailable")]
    Unauthorized,

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("image load failed: {0}")]
    Image(String),

    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RequestError {
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an arbitrary failure, keeping it as the source cause.
    pub fn wrap(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, RequestError>;
