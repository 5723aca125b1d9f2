use thiserror::Error;

use amora_shared::ProtocolError;

/// Errors raised while establishing the real-time channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid auth token header: {0}")]
    InvalidHeader(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
}

/// Errors returned by the REST collaborator.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server responded with {status}")]
    Status { status: u16, message: Option<String> },

    #[error("Request rejected by server: {0}")]
    Rejected(String),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ApiError {
    /// Text suitable for an inline error next to the affected control.
    ///
    /// Prefers the message the server attached to the response.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Self::Status {
                message: Some(m), ..
            } if !m.is_empty() => m.clone(),
            Self::Rejected(m) if !m.is_empty() => m.clone(),
            _ => fallback.to_string(),
        }
    }
}
