// Transport layer: the real-time chat channel and the REST collaborator.

pub mod api;
pub mod channel;
pub mod error;

pub use api::{ChatApi, HttpChatApi, MediaUpload, UploadProgress};
pub use channel::{spawn_channel, ChannelCommand, ChannelConfig, ChannelNotification};
pub use error::{ApiError, ChannelError};
