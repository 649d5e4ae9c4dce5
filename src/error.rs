use thiserror::Error;

/// Failure reported by one of the collaborating services (mapping store,
/// submission endpoint, submission ledger).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service answered but refused the request.
    #[error("request rejected{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Rejected { message: Option<String> },

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn rejected(message: impl Into<String>) -> Self {
        ServiceError::Rejected {
            message: Some(message.into()),
        }
    }

    /// Message supplied by the remote side, if it sent one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ServiceError::Rejected { message } => message.as_deref(),
            _ => None,
        }
    }
}

/// The only failure that aborts a whole submission batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("An unexpected error occurred during the save process: {0}")]
    Orchestration(String),
}
