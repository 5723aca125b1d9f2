use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// Server-issued user identifier (opaque document id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-issued message identifier. Absent on drafts that are not yet acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-generated handle for an optimistic draft in the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalRef(pub Uuid);

impl LocalRef {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LocalRef {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify a MIME type. Anything other than `image/*` or `video/*` is unsupported.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(Self::Image)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(ProtocolError::UnknownMediaType(other.to_string())),
        }
    }
}

/// A stored media attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

/// Author of a message as shown in the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
}

/// One unit of conversation content.
///
/// Always carries a text body, a media reference, or both; construct it
/// through [`ChatMessage::new`] to keep that true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Option<MessageId>,
    pub sender: Sender,
    pub target: UserId,
    pub body: Option<String>,
    pub media: Option<MediaRef>,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
}

impl ChatMessage {
    /// Build a message, normalising a blank body to `None`.
    ///
    /// Fails with [`ProtocolError::EmptyMessage`] when neither text nor media remains.
    pub fn new(
        id: Option<MessageId>,
        sender: Sender,
        target: UserId,
        body: Option<String>,
        media: Option<MediaRef>,
        timestamp: DateTime<Utc>,
        read: bool,
    ) -> Result<Self, ProtocolError> {
        let body = body.filter(|b| !b.trim().is_empty());
        if body.is_none() && media.is_none() {
            return Err(ProtocolError::EmptyMessage);
        }
        Ok(Self {
            id,
            sender,
            target,
            body,
            media,
            timestamp,
            read,
        })
    }

    pub fn is_from(&self, user: &UserId) -> bool {
        &self.sender.id == user
    }
}

/// Online state of a conversation participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceStatus {
    pub user_id: UserId,
    pub online: bool,
    /// Only meaningful while offline.
    pub last_seen: Option<DateTime<Utc>>,
}

impl PresenceStatus {
    pub fn unknown(user_id: UserId) -> Self {
        Self {
            user_id,
            online: false,
            last_seen: None,
        }
    }
}

/// Profile fields of a conversation participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub photo_url: Option<String>,
}

impl Participant {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// The signed-in user on whose behalf a session runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfProfile {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
}

impl SelfProfile {
    pub fn as_sender(&self) -> Sender {
        Sender {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected,
}
