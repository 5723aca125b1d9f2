//! Media delivery: real-time first, REST fallback, exactly one copy.
//!
//! A confirmed file is offered on the real-time channel. If the server does
//! not acknowledge it within the fallback window (or rejects it), the same
//! data URL is uploaded over REST. Whichever path confirms first wins; the
//! other path's late result is ignored, keyed by the attempt number.
//!
//! ```text
//! Idle -> Ready -> SendingPrimary -> Succeeded
//!                        |
//!                        v
//!                   FallingBack -> Succeeded | Failed
//! ```

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;
use tracing::{debug, info, warn};

use amora_net::api::UploadedMedia;
use amora_net::{MediaUpload, UploadProgress};
use amora_shared::constants::{MEDIA_PROGRESS_FALLBACK_FLOOR, MEDIA_PROGRESS_PRIMARY};
use amora_shared::types::{ChatMessage, MediaKind, MessageId, SelfProfile, UserId};
use amora_shared::OutboundEvent;

use crate::events::{Effect, MediaEvent, SessionEvent};
use crate::timers::TimerSlot;

/// Default text surfaced when the REST fallback fails without a server message.
pub const UPLOAD_FAILED: &str = "Failed to upload media";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("File is too large. Maximum 10MB allowed.")]
    TooLarge { size: usize, max: usize },

    #[error("Unsupported file type. Please select an image or video.")]
    UnsupportedType(String),

    #[error("No media selected")]
    NothingSelected,

    #[error("A media message is already being sent")]
    Busy,
}

/// A file picked by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPhase {
    Idle,
    /// Validated and previewed, waiting for the user to confirm.
    Ready,
    SendingPrimary,
    FallingBack,
    Succeeded,
    Failed,
}

/// What to do with a self-authored media echo from the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoDisposition {
    Keep,
    /// The REST fallback already inserted this message.
    Suppress,
}

#[derive(Debug)]
struct PendingMedia {
    file_name: String,
    kind: MediaKind,
    /// `data:<mime>;base64,<payload>`, reused verbatim by the fallback.
    preview: String,
}

#[derive(Debug)]
pub struct MediaDeliveryCoordinator {
    profile: SelfProfile,
    target: UserId,
    max_size: usize,
    fallback_after: Duration,
    auto_close_after: Duration,
    phase: MediaPhase,
    pending: Option<PendingMedia>,
    attempt: u64,
    dialog_open: bool,
    suppress_echo: bool,
    /// Id of the message the last REST win appended.
    rest_delivered: Option<MessageId>,
}

impl MediaDeliveryCoordinator {
    pub fn new(
        profile: SelfProfile,
        target: UserId,
        max_size: usize,
        fallback_after: Duration,
        auto_close_after: Duration,
    ) -> Self {
        Self {
            profile,
            target,
            max_size,
            fallback_after,
            auto_close_after,
            phase: MediaPhase::Idle,
            pending: None,
            attempt: 0,
            dialog_open: false,
            suppress_echo: false,
            rest_delivered: None,
        }
    }

    pub fn phase(&self) -> MediaPhase {
        self.phase
    }

    /// Current delivery attempt. Bumped on every confirm and cancel.
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn preview(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.preview.as_str())
    }

    fn in_flight(&self) -> bool {
        matches!(self.phase, MediaPhase::SendingPrimary | MediaPhase::FallingBack)
    }

    /// Validate a picked file and build its preview.
    ///
    /// Rejections leave the coordinator idle and never touch the network.
    pub fn select_file(&mut self, file: MediaFile) -> Result<Vec<Effect>, MediaError> {
        if self.in_flight() {
            return Err(MediaError::Busy);
        }
        self.phase = MediaPhase::Idle;
        self.pending = None;

        if file.bytes.len() > self.max_size {
            warn!(file = %file.name, size = file.bytes.len(), "Rejected oversized media");
            return Err(MediaError::TooLarge {
                size: file.bytes.len(),
                max: self.max_size,
            });
        }
        let Some(kind) = MediaKind::from_mime(&file.mime) else {
            warn!(file = %file.name, mime = %file.mime, "Rejected unsupported media type");
            return Err(MediaError::UnsupportedType(file.mime));
        };

        let preview = format!("data:{};base64,{}", file.mime, STANDARD.encode(&file.bytes));
        debug!(file = %file.name, kind = kind.as_str(), "Media ready");

        self.phase = MediaPhase::Ready;
        let effects = vec![Effect::Notify(SessionEvent::Media(MediaEvent::Ready {
            kind,
            file_name: file.name.clone(),
        }))];
        self.pending = Some(PendingMedia {
            file_name: file.name,
            kind,
            preview,
        });
        Ok(effects)
    }

    /// Send the selected file on the real-time channel and start both windows.
    pub fn confirm(&mut self) -> Result<Vec<Effect>, MediaError> {
        if self.in_flight() {
            return Err(MediaError::Busy);
        }
        let Some(ref pending) = self.pending else {
            return Err(MediaError::NothingSelected);
        };
        if self.phase != MediaPhase::Ready {
            return Err(MediaError::NothingSelected);
        }

        self.attempt += 1;
        self.phase = MediaPhase::SendingPrimary;
        self.dialog_open = true;
        self.suppress_echo = false;
        self.rest_delivered = None;
        info!(attempt = self.attempt, file = %pending.file_name, "Sending media");

        Ok(vec![
            Effect::Emit(OutboundEvent::SendMediaMessage {
                first_name: self.profile.first_name.clone(),
                last_name: self.profile.last_name.clone(),
                user_id: self.profile.id.clone(),
                target_user_id: self.target.clone(),
                media_data: pending.preview.clone(),
                media_type: pending.kind,
            }),
            Effect::ArmTimer(TimerSlot::MediaFallback, self.fallback_after),
            Effect::ArmTimer(TimerSlot::MediaAutoClose, self.auto_close_after),
            Effect::Notify(SessionEvent::Media(MediaEvent::Progress(MEDIA_PROGRESS_PRIMARY))),
        ])
    }

    fn succeed(&mut self) -> Vec<Effect> {
        self.phase = MediaPhase::Succeeded;
        self.pending = None;
        let mut effects = vec![
            Effect::CancelTimer(TimerSlot::MediaFallback),
            Effect::CancelTimer(TimerSlot::MediaAutoClose),
            Effect::Notify(SessionEvent::Media(MediaEvent::Progress(100))),
            Effect::Notify(SessionEvent::Media(MediaEvent::Delivered)),
        ];
        if self.dialog_open {
            self.dialog_open = false;
            effects.push(Effect::Notify(SessionEvent::Media(MediaEvent::DialogClosed)));
        }
        effects
    }

    fn fail(&mut self, error: String) -> Vec<Effect> {
        self.phase = MediaPhase::Failed;
        self.pending = None;
        let mut effects = vec![
            Effect::CancelTimer(TimerSlot::MediaFallback),
            Effect::CancelTimer(TimerSlot::MediaAutoClose),
            Effect::Notify(SessionEvent::Media(MediaEvent::Progress(0))),
            Effect::Notify(SessionEvent::Media(MediaEvent::Failed(error))),
        ];
        if self.dialog_open {
            self.dialog_open = false;
            effects.push(Effect::Notify(SessionEvent::Media(MediaEvent::DialogClosed)));
        }
        effects
    }

    fn start_fallback(&mut self) -> Vec<Effect> {
        let Some(ref pending) = self.pending else {
            return Vec::new();
        };
        info!(attempt = self.attempt, "Falling back to REST upload");
        self.phase = MediaPhase::FallingBack;
        vec![
            Effect::CancelTimer(TimerSlot::MediaFallback),
            Effect::Notify(SessionEvent::Media(MediaEvent::FallingBack)),
            Effect::Notify(SessionEvent::Media(MediaEvent::Progress(
                MEDIA_PROGRESS_FALLBACK_FLOOR,
            ))),
            Effect::StartUpload {
                attempt: self.attempt,
                upload: MediaUpload {
                    media_data: pending.preview.clone(),
                    media_type: pending.kind,
                    message: String::new(),
                },
            },
        ]
    }

    /// `mediaUploadSuccess` from the channel.
    pub fn on_primary_success(&mut self) -> Vec<Effect> {
        if !self.in_flight() {
            debug!(phase = ?self.phase, "Ignoring media ack outside an upload");
            return Vec::new();
        }
        info!(attempt = self.attempt, "Media delivered over the real-time channel");
        self.succeed()
    }

    /// A `receiveMediaMessage` authored by the local user.
    ///
    /// While an upload is in flight the echo confirms it. After a REST win
    /// the first echo under another id is the channel's copy of the same
    /// media and is dropped. An echo of the REST message itself is left to
    /// the timeline's id dedupe.
    pub fn on_self_media_echo(&mut self, message: &ChatMessage) -> (EchoDisposition, Vec<Effect>) {
        let rest_copy = message.id.is_some() && message.id == self.rest_delivered;
        if self.suppress_echo && !rest_copy {
            self.suppress_echo = false;
            debug!(message_id = ?message.id, "Suppressing media echo after REST delivery");
            return (EchoDisposition::Suppress, Vec::new());
        }
        if self.in_flight() {
            info!(attempt = self.attempt, "Media confirmed by its echo");
            return (EchoDisposition::Keep, self.succeed());
        }
        (EchoDisposition::Keep, Vec::new())
    }

    /// `mediaUploadError` from the channel.
    pub fn on_primary_error(&mut self, error: &str) -> Vec<Effect> {
        match self.phase {
            MediaPhase::SendingPrimary => {
                warn!(attempt = self.attempt, error = %error, "Real-time media upload failed");
                self.start_fallback()
            }
            MediaPhase::FallingBack => {
                debug!(error = %error, "Media error while REST fallback owns the outcome");
                Vec::new()
            }
            MediaPhase::Idle | MediaPhase::Failed => {
                warn!(error = %error, "Media upload error without an active upload");
                self.phase = MediaPhase::Failed;
                vec![Effect::Notify(SessionEvent::Media(MediaEvent::Failed(
                    error.to_string(),
                )))]
            }
            MediaPhase::Ready | MediaPhase::Succeeded => {
                debug!(phase = ?self.phase, error = %error, "Ignoring stale media error");
                Vec::new()
            }
        }
    }

    /// The fallback slot fired.
    pub fn on_fallback_timer(&mut self) -> Vec<Effect> {
        if self.phase != MediaPhase::SendingPrimary {
            return Vec::new();
        }
        self.start_fallback()
    }

    pub fn on_upload_progress(&mut self, attempt: u64, progress: UploadProgress) -> Vec<Effect> {
        if attempt != self.attempt || self.phase != MediaPhase::FallingBack {
            return Vec::new();
        }
        vec![Effect::Notify(SessionEvent::Media(MediaEvent::Progress(
            scale_progress(progress),
        )))]
    }

    /// Completion of the REST upload started for `attempt`.
    pub fn on_upload_result(
        &mut self,
        attempt: u64,
        result: Result<UploadedMedia, String>,
    ) -> Vec<Effect> {
        if attempt != self.attempt || self.phase != MediaPhase::FallingBack {
            debug!(attempt, current = self.attempt, phase = ?self.phase, "Ignoring stale upload result");
            return Vec::new();
        }

        let uploaded = match result {
            Ok(uploaded) => uploaded,
            Err(error) => {
                warn!(attempt, error = %error, "REST media upload failed");
                return self.fail(error);
            }
        };

        match uploaded.into_message(self.profile.as_sender(), self.target.clone()) {
            Ok(message) => {
                info!(attempt, message_id = ?message.id, "Media delivered over REST");
                self.suppress_echo = true;
                self.rest_delivered = message.id.clone();
                let mut effects = vec![Effect::AppendMessage(message)];
                effects.extend(self.succeed());
                effects
            }
            Err(e) => {
                warn!(attempt, error = %e, "REST upload returned an unusable message");
                self.fail(UPLOAD_FAILED.to_string())
            }
        }
    }

    /// The auto-close slot fired. Closes the dialog only.
    pub fn on_auto_close(&mut self) -> Vec<Effect> {
        if !self.dialog_open {
            return Vec::new();
        }
        debug!(phase = ?self.phase, "Auto-closing media dialog");
        self.dialog_open = false;
        vec![Effect::Notify(SessionEvent::Media(MediaEvent::DialogClosed))]
    }

    /// Drop the selection and every media timer. Safe from any phase.
    pub fn cancel(&mut self) -> Vec<Effect> {
        let was_active = self.phase != MediaPhase::Idle || self.pending.is_some();
        self.phase = MediaPhase::Idle;
        self.pending = None;
        self.dialog_open = false;
        // Invalidates any REST result still in flight.
        self.attempt += 1;

        let mut effects = vec![
            Effect::CancelTimer(TimerSlot::MediaFallback),
            Effect::CancelTimer(TimerSlot::MediaAutoClose),
        ];
        if was_active {
            effects.push(Effect::Notify(SessionEvent::Media(MediaEvent::Cancelled)));
        }
        effects
    }
}

/// Map upload bytes onto the 25..=100 band left after the handoff.
fn scale_progress(progress: UploadProgress) -> u8 {
    let floor = u64::from(MEDIA_PROGRESS_FALLBACK_FLOOR);
    if progress.total == 0 {
        return MEDIA_PROGRESS_FALLBACK_FLOOR;
    }
    let span = 100 - floor;
    let sent = progress.sent.min(progress.total);
    let scaled = floor + (sent * span + progress.total / 2) / progress.total;
    scaled.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use amora_shared::types::Sender;
    use chrono::Utc;

    fn profile() -> SelfProfile {
        SelfProfile {
            id: UserId::new("a"),
            first_name: "Ada".into(),
            last_name: "L".into(),
        }
    }

    fn coordinator() -> MediaDeliveryCoordinator {
        MediaDeliveryCoordinator::new(
            profile(),
            UserId::new("b"),
            10 * 1024 * 1024,
            Duration::from_secs(8),
            Duration::from_secs(10),
        )
    }

    fn png() -> MediaFile {
        MediaFile {
            name: "p.png".into(),
            mime: "image/png".into(),
            bytes: vec![1, 2, 3],
        }
    }

    fn uploaded(id: &str) -> UploadedMedia {
        UploadedMedia {
            id: MessageId::new(id),
            message: None,
            media_url: "https://cdn/p.png".into(),
            media_type: MediaKind::Image,
            timestamp: Utc::now(),
        }
    }

    fn echo() -> ChatMessage {
        echo_with_id("rt-1")
    }

    fn echo_with_id(id: &str) -> ChatMessage {
        ChatMessage::new(
            Some(MessageId::new(id)),
            Sender {
                id: UserId::new("a"),
                first_name: "Ada".into(),
                last_name: "L".into(),
            },
            UserId::new("b"),
            None,
            Some(amora_shared::types::MediaRef {
                url: "https://cdn/p.png".into(),
                kind: MediaKind::Image,
            }),
            Utc::now(),
            false,
        )
        .unwrap()
    }

    fn uploads(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::StartUpload { .. }))
            .count()
    }

    fn appends(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::AppendMessage(_)))
            .count()
    }

    #[test]
    fn test_valid_file_goes_through_ready_to_primary() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        assert_eq!(media.phase(), MediaPhase::Ready);
        assert_eq!(media.preview(), Some("data:image/png;base64,AQID"));

        let effects = media.confirm().unwrap();
        assert_eq!(media.phase(), MediaPhase::SendingPrimary);
        assert!(matches!(
            effects[0],
            Effect::Emit(OutboundEvent::SendMediaMessage { ref media_data, media_type: MediaKind::Image, .. })
                if media_data == "data:image/png;base64,AQID"
        ));
        assert!(effects.contains(&Effect::ArmTimer(TimerSlot::MediaFallback, Duration::from_secs(8))));
        assert!(effects.contains(&Effect::ArmTimer(TimerSlot::MediaAutoClose, Duration::from_secs(10))));
    }

    #[test]
    fn test_confirm_requires_selection() {
        let mut media = coordinator();
        assert_eq!(media.confirm(), Err(MediaError::NothingSelected));
        assert_eq!(media.phase(), MediaPhase::Idle);
    }

    #[test]
    fn test_invalid_files_stay_idle() {
        let mut media = MediaDeliveryCoordinator::new(
            profile(),
            UserId::new("b"),
            4,
            Duration::from_secs(8),
            Duration::from_secs(10),
        );

        let big = MediaFile {
            bytes: vec![0; 5],
            ..png()
        };
        let err = media.select_file(big).unwrap_err();
        assert_eq!(err.to_string(), "File is too large. Maximum 10MB allowed.");
        assert_eq!(media.phase(), MediaPhase::Idle);

        let pdf = MediaFile {
            mime: "application/pdf".into(),
            ..png()
        };
        let err = media.select_file(pdf).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported file type. Please select an image or video."
        );
        assert_eq!(media.phase(), MediaPhase::Idle);
        assert!(media.preview().is_none());
        assert_eq!(media.confirm(), Err(MediaError::NothingSelected));
    }

    #[test]
    fn test_ack_before_timer_prevents_fallback() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();

        let effects = media.on_primary_success();
        assert_eq!(media.phase(), MediaPhase::Succeeded);
        assert!(effects.contains(&Effect::CancelTimer(TimerSlot::MediaFallback)));
        assert!(effects.contains(&Effect::Notify(SessionEvent::Media(MediaEvent::DialogClosed))));

        // A late timer expiry is a no-op.
        assert_eq!(uploads(&media.on_fallback_timer()), 0);
    }

    #[test]
    fn test_timeout_issues_one_upload_with_preview() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();

        let effects = media.on_fallback_timer();
        assert_eq!(media.phase(), MediaPhase::FallingBack);
        assert!(effects.contains(&Effect::StartUpload {
            attempt: 1,
            upload: MediaUpload {
                media_data: "data:image/png;base64,AQID".into(),
                media_type: MediaKind::Image,
                message: String::new(),
            },
        }));

        assert_eq!(uploads(&media.on_fallback_timer()), 0);
        assert_eq!(uploads(&media.on_primary_error("late")), 0);
    }

    #[test]
    fn test_primary_error_falls_back_immediately() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();

        assert_eq!(uploads(&media.on_primary_error("storage down")), 1);
        assert_eq!(media.phase(), MediaPhase::FallingBack);
    }

    #[test]
    fn test_error_without_upload_is_surfaced() {
        let mut media = coordinator();
        let effects = media.on_primary_error("Upload rejected");
        assert_eq!(
            effects,
            vec![Effect::Notify(SessionEvent::Media(MediaEvent::Failed(
                "Upload rejected".into()
            )))]
        );
    }

    #[test]
    fn test_rest_win_ignores_late_primary() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();
        media.on_fallback_timer();

        let effects = media.on_upload_result(1, Ok(uploaded("srv-1")));
        assert_eq!(appends(&effects), 1);
        assert_eq!(media.phase(), MediaPhase::Succeeded);

        assert!(media.on_primary_success().is_empty());
        let (disposition, effects) = media.on_self_media_echo(&echo());
        assert_eq!(disposition, EchoDisposition::Suppress);
        assert!(effects.is_empty());

        // Only the first echo is swallowed.
        assert_eq!(media.on_self_media_echo(&echo()).0, EchoDisposition::Keep);
    }

    #[test]
    fn test_rest_copy_echo_keeps_suppression() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();
        media.on_fallback_timer();
        media.on_upload_result(1, Ok(uploaded("srv-1")));

        assert_eq!(
            media.on_self_media_echo(&echo_with_id("srv-1")).0,
            EchoDisposition::Keep
        );
        assert_eq!(media.on_self_media_echo(&echo()).0, EchoDisposition::Suppress);
    }

    #[test]
    fn test_primary_win_ignores_late_rest() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();
        media.on_fallback_timer();

        let (disposition, _) = media.on_self_media_echo(&echo());
        assert_eq!(disposition, EchoDisposition::Keep);
        assert_eq!(media.phase(), MediaPhase::Succeeded);

        assert!(media.on_upload_result(1, Ok(uploaded("srv-1"))).is_empty());
    }

    #[test]
    fn test_rest_failure_surfaces_message() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();
        media.on_fallback_timer();

        let effects = media.on_upload_result(1, Err("File too large".into()));
        assert_eq!(media.phase(), MediaPhase::Failed);
        assert!(effects.contains(&Effect::Notify(SessionEvent::Media(MediaEvent::Failed(
            "File too large".into()
        )))));
        assert!(media.preview().is_none());
        assert!(effects.contains(&Effect::CancelTimer(TimerSlot::MediaAutoClose)));
        assert!(effects.contains(&Effect::Notify(SessionEvent::Media(MediaEvent::DialogClosed))));
        assert!(media.on_auto_close().is_empty());
    }

    #[test]
    fn test_next_selection_survives_failed_upload_window() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();
        media.on_fallback_timer();
        media.on_upload_result(1, Err("File too large".into()));

        media.select_file(png()).unwrap();
        assert_eq!(media.phase(), MediaPhase::Ready);
        assert!(media.on_auto_close().is_empty());
    }

    #[test]
    fn test_auto_close_keeps_phase() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();
        media.on_fallback_timer();

        assert_eq!(
            media.on_auto_close(),
            vec![Effect::Notify(SessionEvent::Media(MediaEvent::DialogClosed))]
        );
        assert_eq!(media.phase(), MediaPhase::FallingBack);
        assert!(media.on_auto_close().is_empty());
    }

    #[test]
    fn test_cancel_from_every_phase() {
        let mut media = coordinator();
        media.cancel();
        assert_eq!(media.phase(), MediaPhase::Idle);

        media.select_file(png()).unwrap();
        media.cancel();
        assert_eq!(media.phase(), MediaPhase::Idle);

        media.select_file(png()).unwrap();
        media.confirm().unwrap();
        media.on_fallback_timer();
        let attempt = media.attempt();
        let effects = media.cancel();
        assert!(effects.contains(&Effect::CancelTimer(TimerSlot::MediaAutoClose)));
        assert_eq!(media.phase(), MediaPhase::Idle);
        assert!(media.preview().is_none());

        // The upload started before the cancel no longer counts.
        assert!(media.on_upload_result(attempt, Ok(uploaded("srv-1"))).is_empty());
    }

    #[test]
    fn test_busy_while_sending() {
        let mut media = coordinator();
        media.select_file(png()).unwrap();
        media.confirm().unwrap();
        assert_eq!(media.select_file(png()), Err(MediaError::Busy));
        assert_eq!(media.confirm(), Err(MediaError::Busy));
    }

    #[test]
    fn test_scale_progress() {
        let p = |sent, total| scale_progress(UploadProgress { sent, total });
        assert_eq!(p(0, 100), 25);
        assert_eq!(p(50, 100), 63);
        assert_eq!(p(100, 100), 100);
        assert_eq!(p(10, 0), 25);
    }
}
