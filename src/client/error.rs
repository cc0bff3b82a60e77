use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Rejected locally, nothing was sent
    #[error("{0}")]
    Validation(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("A bid must be selected")]
    MissingBid,

    #[error("Provider information not loaded")]
    ProviderNotLoaded,

    #[error("Server responded {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Gave up after {0} reconnection attempts")]
    ReconnectExhausted(u32),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Realtime connection is closed")]
    Closed,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of a server-side failure
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
