use thiserror::Error;

use amora_net::{ApiError, ChannelError};
use amora_shared::ProtocolError;

use crate::media::MediaError;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Could not connect to chat: {0}")]
    Connect(#[from] ChannelError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid message: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Media(#[from] MediaError),

    #[error("Chat session is closed")]
    SessionClosed,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
