//! Typing indicators in both directions.
//!
//! Outgoing: every keystroke signals typing and re-arms a quiet deadline; the
//! deadline or a send signals the stop. Incoming: the remote side's own
//! start/stop signals are applied as-is.

use std::time::Duration;

use amora_shared::protocol::TypingUpdate;
use amora_shared::types::UserId;
use amora_shared::OutboundEvent;

use crate::events::Effect;
use crate::timers::TimerSlot;

#[derive(Debug)]
pub struct TypingDebouncer {
    self_id: UserId,
    target: UserId,
    quiet_period: Duration,
    local_typing: bool,
    remote_typing: bool,
}

impl TypingDebouncer {
    pub fn new(self_id: UserId, target: UserId, quiet_period: Duration) -> Self {
        Self {
            self_id,
            target,
            quiet_period,
            local_typing: false,
            remote_typing: false,
        }
    }

    pub fn is_local_typing(&self) -> bool {
        self.local_typing
    }

    pub fn is_remote_typing(&self) -> bool {
        self.remote_typing
    }

    fn signal(&self, is_typing: bool) -> Effect {
        Effect::Emit(OutboundEvent::UserTyping {
            user_id: self.self_id.clone(),
            target_user_id: self.target.clone(),
            is_typing,
        })
    }

    pub fn on_local_keystroke(&mut self) -> Vec<Effect> {
        self.local_typing = true;
        vec![
            self.signal(true),
            Effect::ArmTimer(TimerSlot::TypingQuiet, self.quiet_period),
        ]
    }

    pub fn on_quiet_timeout(&mut self) -> Vec<Effect> {
        if !self.local_typing {
            return Vec::new();
        }
        self.local_typing = false;
        vec![self.signal(false)]
    }

    /// A send always stops the indicator, whatever the timer state.
    pub fn on_local_send(&mut self) -> Vec<Effect> {
        self.local_typing = false;
        vec![
            Effect::CancelTimer(TimerSlot::TypingQuiet),
            self.signal(false),
        ]
    }

    /// Returns the new remote flag when it changed.
    pub fn on_remote(&mut self, update: &TypingUpdate) -> Option<bool> {
        if update.user_id != self.target || update.is_typing == self.remote_typing {
            return None;
        }
        self.remote_typing = update.is_typing;
        Some(self.remote_typing)
    }

    pub fn reset(&mut self) {
        self.local_typing = false;
        self.remote_typing = false;
    }
}
