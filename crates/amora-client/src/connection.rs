//! Connection lifecycle for one chat screen.
//!
//! Announces presence and joins the conversation room whenever a channel
//! comes up, keeps server-side presence fresh with a heartbeat, and tracks
//! the connection state surfaced to the UI.

use std::time::Duration;

use tracing::{debug, info, warn};

use amora_shared::types::{ConnectionState, SelfProfile, UserId};
use amora_shared::OutboundEvent;

use crate::events::{Effect, SessionEvent};
use crate::timers::TimerSlot;

#[derive(Debug)]
pub struct ConnectionController {
    profile: SelfProfile,
    target: UserId,
    heartbeat: Duration,
    state: ConnectionState,
}

impl ConnectionController {
    pub fn new(profile: SelfProfile, target: UserId, heartbeat: Duration) -> Self {
        Self {
            profile,
            target,
            heartbeat,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Channel is up: announce, join, start the heartbeat.
    pub fn on_open(&mut self) -> Vec<Effect> {
        info!(user = %self.profile.id, target = %self.target, "Joining chat");
        self.state = ConnectionState::Connected;
        vec![
            Effect::Emit(OutboundEvent::UserOnline {
                user_id: self.profile.id.clone(),
            }),
            Effect::Emit(OutboundEvent::JoinChat {
                first_name: self.profile.first_name.clone(),
                user_id: self.profile.id.clone(),
                target_user_id: self.target.clone(),
            }),
            Effect::ArmTimer(TimerSlot::Heartbeat, self.heartbeat),
            Effect::Notify(SessionEvent::Connection(self.state)),
        ]
    }

    /// Heartbeat slot fired. Re-arms itself while connected.
    pub fn on_heartbeat(&self) -> Vec<Effect> {
        if !self.is_connected() {
            return Vec::new();
        }
        debug!(user = %self.profile.id, "Heartbeat ping");
        vec![
            Effect::Emit(OutboundEvent::Ping {
                user_id: self.profile.id.clone(),
            }),
            Effect::ArmTimer(TimerSlot::Heartbeat, self.heartbeat),
        ]
    }

    pub fn on_reconnecting(&mut self, attempt: u32) -> Vec<Effect> {
        self.state = ConnectionState::Reconnecting { attempt };
        vec![
            Effect::CancelTimer(TimerSlot::Heartbeat),
            Effect::Notify(SessionEvent::Connection(self.state)),
        ]
    }

    /// A replacement channel is up; the server has forgotten the old room.
    pub fn on_reconnected(&mut self) -> Vec<Effect> {
        self.on_open()
    }

    pub fn on_disconnected(&mut self, reason: &str) -> Vec<Effect> {
        warn!(reason = %reason, "Chat channel lost");
        self.state = ConnectionState::Disconnected;
        vec![
            Effect::CancelTimer(TimerSlot::Heartbeat),
            Effect::Notify(SessionEvent::Connection(self.state)),
        ]
    }
}
