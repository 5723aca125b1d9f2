use std::time::Duration;

use tokio::sync::mpsc;

use amora_net::MediaUpload;
use amora_shared::types::{ChatMessage, ConnectionState, LocalRef, MediaKind, MessageId, Participant, PresenceStatus};
use amora_shared::OutboundEvent;

use crate::reconciler::TimelineEntry;
use crate::timers::TimerSlot;

/// Events delivered to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connection(ConnectionState),
    /// The other participant's profile was resolved.
    Participant(Participant),
    /// The timeline was rebuilt from a history load.
    TimelineReset(Vec<TimelineEntry>),
    MessageAppended(TimelineEntry),
    /// An optimistic draft was acknowledged by the server.
    MessageConfirmed { local_ref: LocalRef, id: MessageId },
    /// Drafts that will not be delivered.
    MessagesFailed(Vec<LocalRef>),
    MessagesRead(Vec<MessageId>),
    Presence(PresenceStatus),
    RemoteTyping(bool),
    Media(MediaEvent),
    /// Inline, non-fatal error text.
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Selection refused before any network activity.
    Rejected(String),
    /// Preview ready, waiting for confirmation.
    Ready { kind: MediaKind, file_name: String },
    Progress(u8),
    FallingBack,
    Delivered,
    Failed(String),
    /// The sending dialog should close.
    DialogClosed,
    Cancelled,
}

/// Work a component asks the session to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Emit(OutboundEvent),
    ArmTimer(TimerSlot, Duration),
    CancelTimer(TimerSlot),
    Notify(SessionEvent),
    /// Start the REST media upload for `attempt`.
    StartUpload { attempt: u64, upload: MediaUpload },
    /// Insert a server-confirmed message through the reconciler.
    AppendMessage(ChatMessage),
}

pub fn emit_event(tx: &mpsc::UnboundedSender<SessionEvent>, event: SessionEvent) {
    if tx.send(event).is_err() {
        tracing::debug!("Session event receiver dropped");
    }
}
