//! Conversation inbox: one summary row per chat partner.

use chrono::{DateTime, Utc};
use tracing::debug;

use amora_net::api::{ConversationSummaryDto, LastMessageDto};
use amora_net::ChatApi;
use amora_shared::constants::PREVIEW_MAX_CHARS;
use amora_shared::types::{MediaKind, Participant, UserId};

use crate::error::Result;

const NO_MESSAGES: &str = "No messages yet";

#[derive(Debug, Clone, PartialEq)]
pub struct LastMessage {
    pub body: Option<String>,
    pub media: Option<MediaKind>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl LastMessage {
    fn from_dto(dto: LastMessageDto) -> Option<Self> {
        let body = dto.message.filter(|m| !m.is_empty());
        let media = match (dto.media_url, dto.media_type) {
            (Some(url), Some(kind)) if !url.is_empty() => Some(kind),
            // Untyped media is shown as a video, like any non-image attachment.
            (Some(url), None) if !url.is_empty() => Some(MediaKind::Video),
            _ => None,
        };
        if body.is_none() && media.is_none() {
            return None;
        }
        Some(Self {
            body,
            media,
            timestamp: dto.timestamp,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub id: String,
    pub other: Participant,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
}

impl ConversationSummary {
    /// `None` when the conversation has no participant other than `self_id`.
    pub fn from_dto(dto: ConversationSummaryDto, self_id: &UserId) -> Option<Self> {
        let other = dto.participant.into_iter().find(|p| &p.id != self_id)?;
        Some(Self {
            id: dto.id,
            other: other.into(),
            last_message: dto.last_message.and_then(LastMessage::from_dto),
            unread_count: dto.unread_count,
        })
    }

    pub fn preview_text(&self) -> String {
        match self.last_message {
            Some(LastMessage {
                media: Some(MediaKind::Image),
                ..
            }) => "📷 Photo".to_string(),
            Some(LastMessage {
                media: Some(MediaKind::Video),
                ..
            }) => "📹 Video".to_string(),
            Some(LastMessage {
                body: Some(ref body),
                ..
            }) => truncate_preview(body, PREVIEW_MAX_CHARS),
            _ => NO_MESSAGES.to_string(),
        }
    }

    /// Badge text, or `None` when everything is read.
    pub fn unread_badge(&self) -> Option<String> {
        match self.unread_count {
            0 => None,
            n if n > 9 => Some("9+".to_string()),
            n => Some(n.to_string()),
        }
    }

    pub fn activity_label(&self, now: DateTime<Utc>) -> String {
        self.last_message
            .as_ref()
            .and_then(|m| m.timestamp)
            .map(|ts| format_activity(ts, now))
            .unwrap_or_default()
    }
}

/// Cut `text` to `max` characters, marking the cut with `...`.
pub fn truncate_preview(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Time of the last activity: clock time today, then "Yesterday", weekday
/// within a week, and month/day beyond.
pub fn format_activity(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now - then).num_days();
    match days {
        d if d <= 0 => then.format("%H:%M").to_string(),
        1 => "Yesterday".to_string(),
        d if d < 7 => then.format("%a").to_string(),
        _ => then.format("%b %-d").to_string(),
    }
}

/// Fetch and project the inbox for `self_id`.
pub async fn load_inbox<A: ChatApi>(api: &A, self_id: &UserId) -> Result<Vec<ConversationSummary>> {
    let conversations = api.list_conversations().await?;
    let total = conversations.len();
    let summaries: Vec<ConversationSummary> = conversations
        .into_iter()
        .filter_map(|dto| ConversationSummary::from_dto(dto, self_id))
        .collect();
    debug!(total, shown = summaries.len(), "Inbox loaded");
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn summary(json: &str) -> Option<ConversationSummary> {
        let dto: ConversationSummaryDto = serde_json::from_str(json).unwrap();
        ConversationSummary::from_dto(dto, &UserId::new("a"))
    }

    #[test]
    fn test_preview_kinds() {
        let photo = summary(
            r#"{"_id": "c1", "participant": [{"_id": "a", "firstName": "Ada"}, {"_id": "b", "firstName": "Bo"}],
                "lastMessage": {"message": "", "mediaUrl": "https://cdn/p.png", "mediaType": "image"}, "unreadCount": 12}"#,
        )
        .unwrap();
        assert_eq!(photo.other.id, UserId::new("b"));
        assert_eq!(photo.preview_text(), "📷 Photo");
        assert_eq!(photo.unread_badge().as_deref(), Some("9+"));

        let video = summary(
            r#"{"_id": "c2", "participant": [{"_id": "b", "firstName": "Bo"}],
                "lastMessage": {"mediaUrl": "https://cdn/v.mp4", "mediaType": "video"}, "unreadCount": 3}"#,
        )
        .unwrap();
        assert_eq!(video.preview_text(), "📹 Video");
        assert_eq!(video.unread_badge().as_deref(), Some("3"));

        let empty = summary(r#"{"_id": "c3", "participant": [{"_id": "b", "firstName": "Bo"}]}"#).unwrap();
        assert_eq!(empty.preview_text(), "No messages yet");
        assert!(empty.unread_badge().is_none());
        assert_eq!(empty.activity_label(Utc::now()), "");
    }

    #[test]
    fn test_conversation_with_only_self_is_skipped() {
        assert!(summary(r#"{"_id": "c4", "participant": [{"_id": "a", "firstName": "Ada"}]}"#).is_none());
    }

    #[test]
    fn test_truncate_preview() {
        assert_eq!(truncate_preview("short", 40), "short");
        let long = "a".repeat(45);
        assert_eq!(truncate_preview(&long, 40), format!("{}...", "a".repeat(40)));
        assert_eq!(truncate_preview("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn test_format_activity() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 18, 0, 0).unwrap();
        assert_eq!(format_activity(now - Duration::hours(2), now), "16:00");
        assert_eq!(format_activity(now - Duration::hours(30), now), "Yesterday");
        assert_eq!(format_activity(now - Duration::days(3), now), "Tue");
        assert_eq!(format_activity(now - Duration::days(20), now), "Apr 20");
    }
}
