//! REST collaborator for the chat screen.
//!
//! Covers the conversation bootstrap, the participant lookup, the inbox
//! listing and the media upload used as the fallback delivery path. The
//! [`ChatApi`] trait is the seam the session depends on; [`HttpChatApi`] is
//! the reqwest-backed implementation.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use amora_shared::types::{ChatMessage, MediaKind, MediaRef, MessageId, Participant, Sender, UserId};
use amora_shared::ProtocolError;

use crate::error::ApiError;

/// Size of the body slices streamed during a media upload.
const UPLOAD_CHUNK_SIZE: usize = 16 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl From<ParticipantDto> for Participant {
    fn from(p: ParticipantDto) -> Self {
        Self {
            id: p.id,
            first_name: p.first_name,
            last_name: p.last_name,
            photo_url: p.photo_url,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderDto {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// One stored message as returned by the conversation bootstrap.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessageDto {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub sender_id: SenderDto,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
}

impl HistoryMessageDto {
    /// Project into a timeline message addressed to `recipient`.
    pub fn into_message(self, recipient: UserId) -> Result<ChatMessage, ProtocolError> {
        let media = match (self.media_url, self.media_type) {
            (Some(url), Some(kind)) if !url.is_empty() => Some(MediaRef { url, kind }),
            _ => None,
        };
        ChatMessage::new(
            Some(self.id),
            Sender {
                id: self.sender_id.id,
                first_name: self.sender_id.first_name,
                last_name: self.sender_id.last_name,
            },
            recipient,
            self.message,
            media,
            self.timestamp,
            self.is_read,
        )
    }
}

/// `GET /chat/{target}` response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationDto {
    #[serde(default)]
    pub participant: Vec<ParticipantDto>,
    #[serde(default)]
    pub messages: Vec<HistoryMessageDto>,
}

/// Latest message of a conversation in the inbox listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageDto {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One conversation in the `GET /all` inbox listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummaryDto {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub participant: Vec<ParticipantDto>,
    #[serde(default)]
    pub last_message: Option<LastMessageDto>,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Deserialize)]
struct InboxResponse {
    #[serde(default)]
    data: Vec<ConversationSummaryDto>,
}

/// Body of `POST /chat/media/{target}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUpload {
    /// The same data URL that was offered on the real-time channel.
    pub media_data: String,
    pub media_type: MediaKind,
    pub message: String,
}

/// Canonical message stored by the REST fallback.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedMedia {
    #[serde(rename = "_id")]
    pub id: MessageId,
    #[serde(default)]
    pub message: Option<String>,
    pub media_url: String,
    pub media_type: MediaKind,
    pub timestamp: DateTime<Utc>,
}

impl UploadedMedia {
    /// Project into a timeline message authored by `sender`.
    pub fn into_message(self, sender: Sender, recipient: UserId) -> Result<ChatMessage, ProtocolError> {
        ChatMessage::new(
            Some(self.id),
            sender,
            recipient,
            self.message,
            Some(MediaRef {
                url: self.media_url,
                kind: self.media_type,
            }),
            self.timestamp,
            false,
        )
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<UploadedMedia>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Bytes of a request body handed to the transport so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// REST endpoints consumed by a chat session.
pub trait ChatApi: Clone + Send + Sync + 'static {
    /// `GET /chat/{target}`: participants and the full prior conversation.
    fn fetch_conversation(
        &self,
        target: &UserId,
    ) -> impl Future<Output = Result<ConversationDto, ApiError>> + Send;

    /// `GET /users/{id}`: participant lookup when the bootstrap lacks one.
    fn fetch_user(&self, id: &UserId) -> impl Future<Output = Result<Participant, ApiError>> + Send;

    /// `POST /chat/media/{target}`: media fallback upload.
    ///
    /// Progress is reported on `progress` while the body is streamed.
    fn upload_media(
        &self,
        target: &UserId,
        upload: MediaUpload,
        progress: Option<mpsc::UnboundedSender<UploadProgress>>,
    ) -> impl Future<Output = Result<UploadedMedia, ApiError>> + Send;

    /// `GET /all`: conversation summaries for the inbox.
    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<ConversationSummaryDto>, ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token {
            Some(ref token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Map a non-2xx response to [`ApiError::Status`], keeping the server's message.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message);
    warn!(status = status.as_u16(), message = ?message, "Request failed");
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

impl ChatApi for HttpChatApi {
    fn fetch_conversation(
        &self,
        target: &UserId,
    ) -> impl Future<Output = Result<ConversationDto, ApiError>> + Send {
        let path = format!("/chat/{target}");
        async move { self.get_json::<ConversationDto>(&path).await }
    }

    fn fetch_user(&self, id: &UserId) -> impl Future<Output = Result<Participant, ApiError>> + Send {
        let path = format!("/users/{id}");
        async move {
            let dto = self.get_json::<ParticipantDto>(&path).await?;
            Ok(dto.into())
        }
    }

    fn upload_media(
        &self,
        target: &UserId,
        upload: MediaUpload,
        progress: Option<mpsc::UnboundedSender<UploadProgress>>,
    ) -> impl Future<Output = Result<UploadedMedia, ApiError>> + Send {
        let url = self.url(&format!("/chat/media/{target}"));
        async move {
            let body = Bytes::from(serde_json::to_vec(&upload)?);
            let total = body.len() as u64;

            let chunks: Vec<Bytes> = (0..body.len())
                .step_by(UPLOAD_CHUNK_SIZE)
                .map(|start| body.slice(start..(start + UPLOAD_CHUNK_SIZE).min(body.len())))
                .collect();

            let mut sent = 0u64;
            let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
                sent += chunk.len() as u64;
                if let Some(ref tx) = progress {
                    let _ = tx.send(UploadProgress { sent, total });
                }
                Ok::<Bytes, std::io::Error>(chunk)
            }));

            debug!(url = %url, bytes = total, "POST media upload");
            let response = self
                .authorize(self.client.post(&url))
                .header(CONTENT_TYPE, "application/json")
                .header(CONTENT_LENGTH, total)
                .body(reqwest::Body::wrap_stream(stream))
                .send()
                .await?;
            let response = check_status(response).await?;
            let parsed: UploadResponse = response.json().await?;

            match (parsed.success, parsed.data) {
                (true, Some(data)) => {
                    info!(message_id = %data.id, "Media stored via REST upload");
                    Ok(data)
                }
                _ => Err(ApiError::Rejected(
                    parsed
                        .message
                        .unwrap_or_else(|| "Failed to upload media".to_string()),
                )),
            }
        }
    }

    fn list_conversations(
        &self,
    ) -> impl Future<Output = Result<Vec<ConversationSummaryDto>, ApiError>> + Send {
        async move {
            let inbox = self.get_json::<InboxResponse>("/all").await?;
            Ok(inbox.data)
        }
    }
}
