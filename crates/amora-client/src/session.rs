//! The chat session actor.
//!
//! One tokio task per open chat screen owns every component, the channel
//! handle and the timer slots. UI commands, channel notifications, REST
//! completions and timer expiry are serialised through a single
//! `tokio::select!` loop, so no state is shared and nothing outlives
//! [`ChatSession::close`].

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use amora_net::api::{ConversationDto, UploadedMedia};
use amora_net::{
    spawn_channel, ApiError, ChannelCommand, ChannelNotification, ChatApi, MediaUpload,
    UploadProgress,
};
use amora_shared::constants::CHANNEL_CAPACITY;
use amora_shared::types::{
    ChatMessage, ConnectionState, Participant, PresenceStatus, SelfProfile, UserId,
};
use amora_shared::{InboundEvent, OutboundEvent, ProtocolError};

use crate::config::ClientConfig;
use crate::connection::ConnectionController;
use crate::error::{ClientError, Result};
use crate::events::{emit_event, Effect, MediaEvent, SessionEvent};
use crate::media::{
    EchoDisposition, MediaDeliveryCoordinator, MediaError, MediaFile, MediaPhase, UPLOAD_FAILED,
};
use crate::presence::PresenceTracker;
use crate::reconciler::{Incoming, MessageReconciler, TimelineEntry};
use crate::timers::{TimerSlot, Timers};
use crate::typing::TypingDebouncer;

const HISTORY_FAILED: &str = "Failed to load messages";

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum SessionCommand {
    Keystroke,
    SendText(String),
    SelectMedia(MediaFile, oneshot::Sender<std::result::Result<(), MediaError>>),
    ConfirmMedia(oneshot::Sender<std::result::Result<(), MediaError>>),
    CancelMedia,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Close,
}

/// Point-in-time view of a session, for rendering and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub participant: Option<Participant>,
    pub presence: PresenceStatus,
    pub presence_label: String,
    pub remote_typing: bool,
    pub local_typing: bool,
    pub timeline: Vec<TimelineEntry>,
    pub media_phase: MediaPhase,
    pub armed_timers: Vec<TimerSlot>,
}

/// Handle to a running chat session.
///
/// Dropping the handle tears the session down just like [`close`](Self::close).
pub struct ChatSession {
    cmd_tx: mpsc::Sender<SessionCommand>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: Option<JoinHandle<()>>,
}

impl ChatSession {
    /// Connect the real-time channel and start the session.
    ///
    /// A failed initial connection is returned as [`ClientError::Connect`]
    /// and is not retried.
    pub async fn open<A: ChatApi>(
        config: &ClientConfig,
        profile: SelfProfile,
        target: UserId,
        api: A,
    ) -> Result<Self> {
        let (channel_tx, channel_rx) = spawn_channel(config.channel_config()).await?;
        Ok(Self::with_channel(config, profile, target, api, channel_tx, channel_rx))
    }

    /// Start a session on an already connected channel.
    pub fn with_channel<A: ChatApi>(
        config: &ClientConfig,
        profile: SelfProfile,
        target: UserId,
        api: A,
        channel_tx: mpsc::Sender<ChannelCommand>,
        channel_rx: mpsc::Receiver<ChannelNotification>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (events_tx, events) = mpsc::unbounded_channel();

        let driver = SessionDriver::new(config, profile, target, api, channel_tx, channel_rx, events_tx);
        let task = tokio::spawn(driver.run(cmd_rx));

        Self {
            cmd_tx,
            events,
            task: Some(task),
        }
    }

    async fn send(&self, cmd: SessionCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| ClientError::SessionClosed)
    }

    /// A keystroke in the message input.
    pub async fn keystroke(&self) -> Result<()> {
        self.send(SessionCommand::Keystroke).await
    }

    /// Send a text message. Blank input is rejected locally.
    pub async fn send_text(&self, body: impl Into<String>) -> Result<()> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(ProtocolError::EmptyMessage.into());
        }
        self.send(SessionCommand::SendText(body)).await
    }

    pub async fn select_media(&self, file: MediaFile) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::SelectMedia(file, tx)).await?;
        rx.await.map_err(|_| ClientError::SessionClosed)??;
        Ok(())
    }

    pub async fn confirm_media(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::ConfirmMedia(tx)).await?;
        rx.await.map_err(|_| ClientError::SessionClosed)??;
        Ok(())
    }

    pub async fn cancel_media(&self) -> Result<()> {
        self.send(SessionCommand::CancelMedia).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| ClientError::SessionClosed)
    }

    /// Next UI event. `None` once the session has shut down.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Next UI event if one is already queued.
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        self.events.try_recv().ok()
    }

    /// Tear the session down and wait for the actor to finish. Idempotent.
    pub async fn close(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = self.cmd_tx.send(SessionCommand::Close).await;
        if let Err(e) = task.await {
            warn!(error = %e, "Chat session task failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Results of work the actor spawned.
enum Report {
    History(std::result::Result<ConversationDto, ApiError>),
    ParticipantLookup(std::result::Result<Participant, ApiError>),
    UploadProgress {
        attempt: u64,
        progress: UploadProgress,
    },
    UploadDone {
        attempt: u64,
        result: std::result::Result<UploadedMedia, ApiError>,
    },
}

struct SessionDriver<A: ChatApi> {
    profile: SelfProfile,
    target: UserId,
    api: A,
    channel_tx: mpsc::Sender<ChannelCommand>,
    channel_rx: mpsc::Receiver<ChannelNotification>,
    channel_open: bool,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    reports_tx: mpsc::UnboundedSender<Report>,
    reports_rx: mpsc::UnboundedReceiver<Report>,
    tasks: JoinSet<()>,
    timers: Timers,
    participant: Option<Participant>,
    connection: ConnectionController,
    presence: PresenceTracker,
    reconciler: MessageReconciler,
    typing: TypingDebouncer,
    media: MediaDeliveryCoordinator,
}

impl<A: ChatApi> SessionDriver<A> {
    fn new(
        config: &ClientConfig,
        profile: SelfProfile,
        target: UserId,
        api: A,
        channel_tx: mpsc::Sender<ChannelCommand>,
        channel_rx: mpsc::Receiver<ChannelNotification>,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let timings = config.timings;
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            connection: ConnectionController::new(profile.clone(), target.clone(), timings.heartbeat),
            presence: PresenceTracker::new(target.clone()),
            reconciler: MessageReconciler::new(profile.id.clone(), target.clone()),
            typing: TypingDebouncer::new(profile.id.clone(), target.clone(), timings.typing_quiet),
            media: MediaDeliveryCoordinator::new(
                profile.clone(),
                target.clone(),
                config.max_media_size,
                timings.media_fallback,
                timings.media_auto_close,
            ),
            profile,
            target,
            api,
            channel_tx,
            channel_rx,
            channel_open: true,
            events_tx,
            reports_tx,
            reports_rx,
            tasks: JoinSet::new(),
            timers: Timers::new(),
            participant: None,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        info!(user = %self.profile.id, target = %self.target, "Chat session started");
        let effects = self.connection.on_open();
        self.apply(effects);
        self.load_history();

        loop {
            let deadline = self.timers.next_deadline();

            tokio::select! {
                // --- UI commands ---
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Close) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },

                // --- Real-time channel ---
                notification = self.channel_rx.recv(), if self.channel_open => match notification {
                    Some(notification) => self.handle_notification(notification),
                    None => self.on_channel_closed(),
                },

                // --- Spawned work ---
                Some(report) = self.reports_rx.recv() => self.handle_report(report),

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if !e.is_cancelled() {
                            warn!(error = %e, "Session background task failed");
                        }
                    }
                }

                // --- Timers ---
                _ = sleep_until(deadline), if deadline.is_some() => {
                    for slot in self.timers.take_expired(Instant::now()) {
                        let effects = self.on_timer(slot);
                        self.apply(effects);
                    }
                }
            }
        }

        self.teardown();
    }

    fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Keystroke => {
                let effects = self.typing.on_local_keystroke();
                self.apply(effects);
            }
            SessionCommand::SendText(body) => self.send_text(body),
            SessionCommand::SelectMedia(file, reply) => {
                let result = self.media.select_file(file).map(|effects| self.apply(effects));
                if let Err(ref e) = result {
                    emit_event(
                        &self.events_tx,
                        SessionEvent::Media(MediaEvent::Rejected(e.to_string())),
                    );
                }
                let _ = reply.send(result);
            }
            SessionCommand::ConfirmMedia(reply) => {
                let result = self.media.confirm().map(|effects| self.apply(effects));
                let _ = reply.send(result);
            }
            SessionCommand::CancelMedia => {
                let effects = self.media.cancel();
                self.apply(effects);
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Close => {}
        }
    }

    fn send_text(&mut self, body: String) {
        let entry = match self
            .reconciler
            .append_optimistic(self.profile.as_sender(), body.clone(), Utc::now())
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Refusing to send message");
                return;
            }
        };

        let mut effects = vec![
            Effect::Emit(OutboundEvent::SendMessage {
                first_name: self.profile.first_name.clone(),
                last_name: self.profile.last_name.clone(),
                user_id: self.profile.id.clone(),
                target_user_id: self.target.clone(),
                message: body,
            }),
            Effect::Notify(SessionEvent::MessageAppended(entry)),
        ];
        effects.extend(self.typing.on_local_send());

        // Nothing will echo a draft sent while the channel is down.
        if !self.connection.is_connected() {
            let failed = self.reconciler.fail_pending();
            if !failed.is_empty() {
                effects.push(Effect::Notify(SessionEvent::MessagesFailed(failed)));
            }
        }
        self.apply(effects);
    }

    fn handle_notification(&mut self, notification: ChannelNotification) {
        match notification {
            ChannelNotification::Event(event) => self.handle_inbound(event),
            ChannelNotification::Reconnecting { attempt, delay } => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Channel reconnecting");
                let effects = self.connection.on_reconnecting(attempt);
                self.apply(effects);
            }
            ChannelNotification::Reconnected => {
                let effects = self.connection.on_reconnected();
                self.apply(effects);
                // The server may have moved on while the socket was down.
                self.load_history();
            }
            ChannelNotification::Disconnected { reason } => self.on_lost(&reason),
        }
    }

    fn on_channel_closed(&mut self) {
        self.channel_open = false;
        if self.connection.state() != ConnectionState::Disconnected {
            self.on_lost("channel closed");
        }
    }

    fn on_lost(&mut self, reason: &str) {
        let mut effects = self.connection.on_disconnected(reason);
        let failed = self.reconciler.fail_pending();
        if !failed.is_empty() {
            effects.push(Effect::Notify(SessionEvent::MessagesFailed(failed)));
        }
        self.apply(effects);
    }

    fn handle_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::InitialOnlineUsers(online) => {
                if self.presence.on_initial_online_users(&online, Utc::now()) {
                    self.notify_presence();
                }
            }
            InboundEvent::UserStatusUpdate(update) => {
                if self.presence.on_status_update(&update) {
                    self.notify_presence();
                }
            }
            InboundEvent::RecipientOnline(event) => {
                if self.presence.on_recipient_online(&event, Utc::now()) {
                    self.notify_presence();
                }
            }
            InboundEvent::RecipientOffline(event) => {
                if self.presence.on_recipient_offline(&event) {
                    self.notify_presence();
                }
            }
            InboundEvent::ReceiveMessage(text) => {
                let recipient = self.recipient_of(&text.sender_id);
                match text.into_message(recipient) {
                    Ok(message) => self.reconcile(message),
                    Err(e) => warn!(error = %e, "Dropping unusable message"),
                }
            }
            InboundEvent::ReceiveMediaMessage(media) => {
                let recipient = self.recipient_of(&media.sender_id);
                let message = match media.into_message(recipient) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "Dropping unusable media message");
                        return;
                    }
                };
                if message.is_from(&self.profile.id) {
                    let (disposition, effects) = self.media.on_self_media_echo(&message);
                    self.apply(effects);
                    if disposition == EchoDisposition::Suppress {
                        return;
                    }
                }
                self.reconcile(message);
            }
            InboundEvent::MediaUploadSuccess => {
                let effects = self.media.on_primary_success();
                self.apply(effects);
            }
            InboundEvent::MediaUploadError(failure) => {
                let effects = self.media.on_primary_error(&failure.error);
                self.apply(effects);
            }
            InboundEvent::MessagesReadUpdate(update) => {
                if self.reconciler.mark_read(&update.message_ids) > 0 {
                    emit_event(&self.events_tx, SessionEvent::MessagesRead(update.message_ids));
                }
            }
            InboundEvent::TypingStatus(update) => {
                if let Some(typing) = self.typing.on_remote(&update) {
                    emit_event(&self.events_tx, SessionEvent::RemoteTyping(typing));
                }
            }
        }
    }

    /// The other party of a message authored by `sender`.
    fn recipient_of(&self, sender: &UserId) -> UserId {
        if sender == &self.profile.id {
            self.target.clone()
        } else {
            self.profile.id.clone()
        }
    }

    fn reconcile(&mut self, message: ChatMessage) {
        if !message.is_from(&self.profile.id) && !message.is_from(&self.target) {
            debug!(sender = %message.sender.id, "Ignoring message from another conversation");
            return;
        }
        match self.reconciler.append_incoming(message) {
            Incoming::Appended { entry, receipt } => {
                let mut effects = Vec::with_capacity(2);
                if let Some(receipt) = receipt {
                    effects.push(Effect::Emit(receipt));
                }
                effects.push(Effect::Notify(SessionEvent::MessageAppended(entry)));
                self.apply(effects);
            }
            Incoming::Promoted { local_ref, id } => {
                debug!(message_id = %id, "Draft confirmed");
                emit_event(&self.events_tx, SessionEvent::MessageConfirmed { local_ref, id });
            }
            Incoming::Duplicate => debug!("Duplicate message ignored"),
        }
    }

    fn notify_presence(&self) {
        emit_event(
            &self.events_tx,
            SessionEvent::Presence(self.presence.status().clone()),
        );
    }

    fn on_timer(&mut self, slot: TimerSlot) -> Vec<Effect> {
        match slot {
            TimerSlot::Heartbeat => self.connection.on_heartbeat(),
            TimerSlot::TypingQuiet => self.typing.on_quiet_timeout(),
            TimerSlot::MediaFallback => self.media.on_fallback_timer(),
            TimerSlot::MediaAutoClose => self.media.on_auto_close(),
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Emit(event) => self.emit(event),
                Effect::ArmTimer(slot, after) => self.timers.arm(slot, Instant::now() + after),
                Effect::CancelTimer(slot) => {
                    self.timers.cancel(slot);
                }
                Effect::Notify(event) => emit_event(&self.events_tx, event),
                Effect::StartUpload { attempt, upload } => self.start_upload(attempt, upload),
                Effect::AppendMessage(message) => {
                    if let Some(entry) = self.reconciler.append_confirmed(message) {
                        emit_event(&self.events_tx, SessionEvent::MessageAppended(entry));
                    }
                }
            }
        }
    }

    /// Fire and forget. Nothing is queued while the channel is gone.
    fn emit(&mut self, event: OutboundEvent) {
        if !self.channel_open {
            debug!(event = event.name(), "Channel closed, event dropped");
            return;
        }
        match self.channel_tx.try_send(ChannelCommand::Emit(event)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ChannelCommand::Emit(event))) => {
                warn!(event = event.name(), "Channel backlog full, event dropped");
            }
            Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.channel_open = false;
            }
        }
    }

    // --- Spawned work ---

    fn load_history(&mut self) {
        let api = self.api.clone();
        let target = self.target.clone();
        let reports = self.reports_tx.clone();
        self.tasks.spawn(async move {
            let result = api.fetch_conversation(&target).await;
            let _ = reports.send(Report::History(result));
        });
    }

    fn lookup_participant(&mut self) {
        let api = self.api.clone();
        let target = self.target.clone();
        let reports = self.reports_tx.clone();
        self.tasks.spawn(async move {
            let result = api.fetch_user(&target).await;
            let _ = reports.send(Report::ParticipantLookup(result));
        });
    }

    fn start_upload(&mut self, attempt: u64, upload: MediaUpload) {
        let api = self.api.clone();
        let target = self.target.clone();
        let reports = self.reports_tx.clone();
        self.tasks.spawn(async move {
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let request = api.upload_media(&target, upload, Some(progress_tx));
            tokio::pin!(request);

            let result = loop {
                tokio::select! {
                    result = &mut request => break result,
                    Some(progress) = progress_rx.recv() => {
                        let _ = reports.send(Report::UploadProgress { attempt, progress });
                    }
                }
            };
            while let Ok(progress) = progress_rx.try_recv() {
                let _ = reports.send(Report::UploadProgress { attempt, progress });
            }
            let _ = reports.send(Report::UploadDone { attempt, result });
        });
    }

    fn handle_report(&mut self, report: Report) {
        match report {
            Report::History(Ok(conversation)) => self.on_history(conversation),
            Report::History(Err(e)) => {
                warn!(target = %self.target, error = %e, "History load failed");
                emit_event(
                    &self.events_tx,
                    SessionEvent::Error(e.user_message(HISTORY_FAILED)),
                );
            }
            Report::ParticipantLookup(Ok(participant)) => self.set_participant(participant),
            Report::ParticipantLookup(Err(e)) => {
                warn!(target = %self.target, error = %e, "Participant lookup failed");
            }
            Report::UploadProgress { attempt, progress } => {
                let effects = self.media.on_upload_progress(attempt, progress);
                self.apply(effects);
            }
            Report::UploadDone { attempt, result } => {
                let result = result.map_err(|e| e.user_message(UPLOAD_FAILED));
                let effects = self.media.on_upload_result(attempt, result);
                self.apply(effects);
            }
        }
    }

    fn on_history(&mut self, conversation: ConversationDto) {
        if self.participant.is_none() {
            let self_id = &self.profile.id;
            let other = conversation
                .participant
                .into_iter()
                .find(|p| &p.id != self_id);
            match other {
                Some(participant) => self.set_participant(participant.into()),
                None => self.lookup_participant(),
            }
        }

        let mut messages = Vec::with_capacity(conversation.messages.len());
        for dto in conversation.messages {
            let recipient = self.recipient_of(&dto.sender_id.id);
            match dto.into_message(recipient) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(error = %e, "Skipping unusable history message"),
            }
        }

        let load = self.reconciler.load_history(messages);
        let mut effects = Vec::with_capacity(load.promoted.len() + 2);
        if let Some(receipt) = load.receipt {
            effects.push(Effect::Emit(receipt));
        }
        for (local_ref, id) in load.promoted {
            debug!(message_id = %id, "Draft confirmed by history");
            effects.push(Effect::Notify(SessionEvent::MessageConfirmed { local_ref, id }));
        }
        effects.push(Effect::Notify(SessionEvent::TimelineReset(
            self.reconciler.timeline().to_vec(),
        )));
        self.apply(effects);
    }

    fn set_participant(&mut self, participant: Participant) {
        debug!(participant = %participant.id, name = %participant.display_name(), "Participant resolved");
        self.participant = Some(participant.clone());
        emit_event(&self.events_tx, SessionEvent::Participant(participant));
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection.state(),
            participant: self.participant.clone(),
            presence: self.presence.status().clone(),
            presence_label: self.presence.display_status(Utc::now()),
            remote_typing: self.typing.is_remote_typing(),
            local_typing: self.typing.is_local_typing(),
            timeline: self.reconciler.timeline().to_vec(),
            media_phase: self.media.phase(),
            armed_timers: self.timers.armed(),
        }
    }

    /// Single teardown point: every timer, every task, then the channel.
    fn teardown(&mut self) {
        self.timers.clear();
        self.media.cancel();
        self.typing.reset();
        self.tasks.abort_all();
        if self.channel_open {
            let _ = self.channel_tx.try_send(ChannelCommand::Shutdown);
            self.channel_open = false;
        }
        info!(user = %self.profile.id, target = %self.target, "Chat session closed");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
