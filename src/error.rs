/// Errors returned by channel and router operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("Publish carries no payload but a live handler declares one")]
    MissingPayload,

    #[error("Payload type mismatch: handler expects {expected}")]
    PayloadMismatch { expected: &'static str },

    #[error("{failed} handler(s) failed while publishing \"{kind}\", first: {source:#}")]
    HandlerFailed {
        kind: &'static str,
        failed: usize,
        source: anyhow::Error,
    },

    #[error("Handler panicked: {message}")]
    HandlerPanicked { message: String },
}

impl DispatchError {
    /// The first handler failure, for [`DispatchError::HandlerFailed`].
    pub fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::HandlerFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    #[error("Invalid config value \"{value}\" for key \"{key}\"")]
    InvalidConfig { key: String, value: String },

    #[error("Logging error: {msg}")]
    Logging { msg: String },
}
