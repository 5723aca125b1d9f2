//! Real-time chat channel events.
//!
//! Every frame on the wire is a JSON text frame of the form
//! `{"event": "<name>", "data": <payload>}`. Outbound events are produced by
//! the client; inbound events are decoded strictly, one payload struct per
//! event name, so a frame missing a required field is rejected instead of
//! being read with defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::types::{ChatMessage, MediaKind, MediaRef, MessageId, Sender, UserId};

/// Events the client emits on the real-time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "userOnline", rename_all = "camelCase")]
    UserOnline { user_id: UserId },

    #[serde(rename = "JoinChat", rename_all = "camelCase")]
    JoinChat {
        first_name: String,
        user_id: UserId,
        target_user_id: UserId,
    },

    #[serde(rename = "ping", rename_all = "camelCase")]
    Ping { user_id: UserId },

    #[serde(rename = "userTyping", rename_all = "camelCase")]
    UserTyping {
        user_id: UserId,
        target_user_id: UserId,
        is_typing: bool,
    },

    #[serde(rename = "sendMessage", rename_all = "camelCase")]
    SendMessage {
        first_name: String,
        last_name: String,
        user_id: UserId,
        target_user_id: UserId,
        message: String,
    },

    #[serde(rename = "sendMediaMessage", rename_all = "camelCase")]
    SendMediaMessage {
        first_name: String,
        last_name: String,
        user_id: UserId,
        target_user_id: UserId,
        /// Data URL (`data:<mime>;base64,...`) of the selected file.
        media_data: String,
        media_type: MediaKind,
    },

    #[serde(rename = "messageRead", rename_all = "camelCase")]
    MessageRead {
        user_id: UserId,
        target_user_id: UserId,
        message_ids: Vec<MessageId>,
    },
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserOnline { .. } => "userOnline",
            Self::JoinChat { .. } => "JoinChat",
            Self::Ping { .. } => "ping",
            Self::UserTyping { .. } => "userTyping",
            Self::SendMessage { .. } => "sendMessage",
            Self::SendMediaMessage { .. } => "sendMediaMessage",
            Self::MessageRead { .. } => "messageRead",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceState {
    Online,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub user_id: UserId,
    pub status: PresenceState,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingText {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub message: String,
    pub first_name: String,
    pub last_name: String,
    pub sender_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMedia {
    #[serde(rename = "_id")]
    pub id: MessageId,
    /// Optional caption; the server sends an empty string when there is none.
    #[serde(default)]
    pub message: Option<String>,
    pub media_url: String,
    pub media_type: MediaKind,
    pub first_name: String,
    pub last_name: String,
    pub sender_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUploadFailure {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadUpdate {
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    pub user_id: UserId,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientPresence {
    pub user_id: UserId,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Events the server pushes on the real-time channel.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    InitialOnlineUsers(Vec<UserId>),
    UserStatusUpdate(StatusUpdate),
    ReceiveMessage(IncomingText),
    ReceiveMediaMessage(IncomingMedia),
    MediaUploadSuccess,
    MediaUploadError(MediaUploadFailure),
    MessagesReadUpdate(ReadUpdate),
    TypingStatus(TypingUpdate),
    RecipientOnline(RecipientPresence),
    RecipientOffline(RecipientPresence),
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: Value,
}

impl InboundEvent {
    /// Decode one text frame.
    pub fn from_json(frame: &str) -> Result<Self> {
        let raw: RawFrame = serde_json::from_str(frame)?;
        let data = raw.data;
        let event = match raw.event.as_str() {
            "initialOnlineUsers" => Self::InitialOnlineUsers(serde_json::from_value(data)?),
            "userStatusUpdate" => Self::UserStatusUpdate(serde_json::from_value(data)?),
            "receiveMessage" => Self::ReceiveMessage(serde_json::from_value(data)?),
            "receiveMediaMessage" => Self::ReceiveMediaMessage(serde_json::from_value(data)?),
            // Acknowledgement only; whatever payload accompanies it is ignored.
            "mediaUploadSuccess" => Self::MediaUploadSuccess,
            "mediaUploadError" => Self::MediaUploadError(serde_json::from_value(data)?),
            "messagesReadUpdate" => Self::MessagesReadUpdate(serde_json::from_value(data)?),
            "typingStatus" => Self::TypingStatus(serde_json::from_value(data)?),
            "recipientOnline" => Self::RecipientOnline(serde_json::from_value(data)?),
            "recipientOffline" => Self::RecipientOffline(serde_json::from_value(data)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::InitialOnlineUsers(_) => "initialOnlineUsers",
            Self::UserStatusUpdate(_) => "userStatusUpdate",
            Self::ReceiveMessage(_) => "receiveMessage",
            Self::ReceiveMediaMessage(_) => "receiveMediaMessage",
            Self::MediaUploadSuccess => "mediaUploadSuccess",
            Self::MediaUploadError(_) => "mediaUploadError",
            Self::MessagesReadUpdate(_) => "messagesReadUpdate",
            Self::TypingStatus(_) => "typingStatus",
            Self::RecipientOnline(_) => "recipientOnline",
            Self::RecipientOffline(_) => "recipientOffline",
        }
    }
}

impl IncomingText {
    /// Project into a timeline message addressed to `recipient`.
    pub fn into_message(self, recipient: UserId) -> Result<ChatMessage> {
        ChatMessage::new(
            Some(self.id),
            Sender {
                id: self.sender_id,
                first_name: self.first_name,
                last_name: self.last_name,
            },
            recipient,
            Some(self.message),
            None,
            self.timestamp,
            self.is_read,
        )
    }
}

impl IncomingMedia {
    /// Project into a timeline message addressed to `recipient`.
    pub fn into_message(self, recipient: UserId) -> Result<ChatMessage> {
        ChatMessage::new(
            Some(self.id),
            Sender {
                id: self.sender_id,
                first_name: self.first_name,
                last_name: self.last_name,
            },
            recipient,
            self.message,
            Some(MediaRef {
                url: self.media_url,
                kind: self.media_type,
            }),
            self.timestamp,
            self.is_read,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_wire_names() {
        let join = OutboundEvent::JoinChat {
            first_name: "Ada".into(),
            user_id: UserId::new("a"),
            target_user_id: UserId::new("b"),
        };
        let json: Value = serde_json::from_str(&join.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "JoinChat");
        assert_eq!(json["data"]["firstName"], "Ada");
        assert_eq!(json["data"]["targetUserId"], "b");

        let media = OutboundEvent::SendMediaMessage {
            first_name: "Ada".into(),
            last_name: "L".into(),
            user_id: UserId::new("a"),
            target_user_id: UserId::new("b"),
            media_data: "data:image/png;base64,AAAA".into(),
            media_type: MediaKind::Image,
        };
        let json: Value = serde_json::from_str(&media.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "sendMediaMessage");
        assert_eq!(json["data"]["mediaType"], "image");
        assert_eq!(json["data"]["mediaData"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_decode_receive_message() {
        let frame = r#"{"event":"receiveMessage","data":{"_id":"m1","message":"hi","firstName":"Bo","lastName":"K","senderId":"b","timestamp":"2024-05-01T10:00:00Z","isRead":false}}"#;
        match InboundEvent::from_json(frame).unwrap() {
            InboundEvent::ReceiveMessage(text) => {
                assert_eq!(text.id, MessageId::new("m1"));
                let msg = text.into_message(UserId::new("a")).unwrap();
                assert_eq!(msg.body.as_deref(), Some("hi"));
                assert_eq!(msg.target, UserId::new("a"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_initial_online_users_and_ack() {
        let frame = r#"{"event":"initialOnlineUsers","data":["a","b"]}"#;
        assert_eq!(
            InboundEvent::from_json(frame).unwrap(),
            InboundEvent::InitialOnlineUsers(vec![UserId::new("a"), UserId::new("b")])
        );

        assert_eq!(
            InboundEvent::from_json(r#"{"event":"mediaUploadSuccess"}"#).unwrap(),
            InboundEvent::MediaUploadSuccess
        );
    }

    #[test]
    fn test_rejects_missing_required_field() {
        // `senderId` missing
        let frame = r#"{"event":"receiveMessage","data":{"_id":"m1","message":"hi","firstName":"Bo","lastName":"K","timestamp":"2024-05-01T10:00:00Z","isRead":false}}"#;
        assert!(matches!(
            InboundEvent::from_json(frame),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_event_and_status() {
        assert!(matches!(
            InboundEvent::from_json(r#"{"event":"selfDestruct","data":{}}"#),
            Err(ProtocolError::UnknownEvent(_))
        ));
        let frame = r#"{"event":"userStatusUpdate","data":{"userId":"b","status":"away"}}"#;
        assert!(InboundEvent::from_json(frame).is_err());
    }

    #[test]
    fn test_media_echo_with_empty_caption() {
        let frame = r#"{"event":"receiveMediaMessage","data":{"_id":"m2","message":"","mediaUrl":"https://cdn/p.jpg","mediaType":"image","firstName":"Bo","lastName":"K","senderId":"b","timestamp":"2024-05-01T10:00:00Z","isRead":true}}"#;
        let InboundEvent::ReceiveMediaMessage(media) = InboundEvent::from_json(frame).unwrap()
        else {
            panic!("expected media message");
        };
        let msg = media.into_message(UserId::new("a")).unwrap();
        assert!(msg.body.is_none());
        assert_eq!(msg.media.unwrap().kind, MediaKind::Image);
        assert!(msg.read);
    }
}
