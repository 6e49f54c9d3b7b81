use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No identity, or the gateway rejected our credentials.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The key has never been written. Absorbed into defaults by the engine.
    #[error("Not found")]
    NotFound,

    #[error("Backend error: {0}")]
    Backend(String),

    /// Transport failure or timeout before the gateway answered.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Whether the session should be sent back to sign-in.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SyncError::Unauthorized)
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Unknown(format!("invalid data: {err}"))
    }
}
