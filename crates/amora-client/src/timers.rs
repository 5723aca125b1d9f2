//! Named timer slots owned by a chat session.
//!
//! Components never hold timers themselves. They ask the session to arm or
//! cancel a slot, and the session sleeps until the earliest armed deadline.
//! Because every deadline lives here, teardown is a single [`Timers::clear`].

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// Presence keep-alive ping.
    Heartbeat,
    /// Trailing stop of the local typing signal.
    TypingQuiet,
    /// Switch a media message to the REST path.
    MediaFallback,
    /// Close the media sending dialog regardless of outcome.
    MediaAutoClose,
}

impl TimerSlot {
    pub const ALL: [TimerSlot; 4] = [
        TimerSlot::Heartbeat,
        TimerSlot::TypingQuiet,
        TimerSlot::MediaFallback,
        TimerSlot::MediaAutoClose,
    ];

    fn index(self) -> usize {
        match self {
            Self::Heartbeat => 0,
            Self::TypingQuiet => 1,
            Self::MediaFallback => 2,
            Self::MediaAutoClose => 3,
        }
    }
}

#[derive(Debug, Default)]
pub struct Timers {
    deadlines: [Option<Instant>; 4],
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `slot` for `at`, replacing any previous deadline in that slot.
    pub fn arm(&mut self, slot: TimerSlot, at: Instant) {
        self.deadlines[slot.index()] = Some(at);
    }

    /// Returns `true` if the slot was armed.
    pub fn cancel(&mut self, slot: TimerSlot) -> bool {
        self.deadlines[slot.index()].take().is_some()
    }

    pub fn is_armed(&self, slot: TimerSlot) -> bool {
        self.deadlines[slot.index()].is_some()
    }

    pub fn deadline(&self, slot: TimerSlot) -> Option<Instant> {
        self.deadlines[slot.index()]
    }

    /// Earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarm and return every slot due at `now`, earliest first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<TimerSlot> {
        let mut due: Vec<(Instant, TimerSlot)> = TimerSlot::ALL
            .iter()
            .filter_map(|&slot| match self.deadlines[slot.index()] {
                Some(at) if at <= now => Some((at, slot)),
                _ => None,
            })
            .collect();
        due.sort_by_key(|(at, _)| *at);

        for (_, slot) in &due {
            self.deadlines[slot.index()] = None;
        }
        due.into_iter().map(|(_, slot)| slot).collect()
    }

    pub fn armed(&self) -> Vec<TimerSlot> {
        TimerSlot::ALL
            .iter()
            .copied()
            .filter(|slot| self.is_armed(*slot))
            .collect()
    }

    /// Disarm every slot.
    pub fn clear(&mut self) {
        self.deadlines = [None; 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_arm_and_cancel() {
        let mut timers = Timers::new();
        let now = Instant::now();

        timers.arm(TimerSlot::TypingQuiet, now + Duration::from_secs(2));
        assert!(timers.is_armed(TimerSlot::TypingQuiet));
        assert!(timers.cancel(TimerSlot::TypingQuiet));
        assert!(!timers.cancel(TimerSlot::TypingQuiet));
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let mut timers = Timers::new();
        let now = Instant::now();

        timers.arm(TimerSlot::TypingQuiet, now + Duration::from_secs(2));
        timers.arm(TimerSlot::TypingQuiet, now + Duration::from_secs(3));
        assert_eq!(
            timers.deadline(TimerSlot::TypingQuiet),
            Some(now + Duration::from_secs(3))
        );
    }

    #[test]
    fn test_take_expired_in_deadline_order() {
        let mut timers = Timers::new();
        let now = Instant::now();

        timers.arm(TimerSlot::MediaAutoClose, now + Duration::from_secs(10));
        timers.arm(TimerSlot::MediaFallback, now + Duration::from_secs(8));
        timers.arm(TimerSlot::Heartbeat, now + Duration::from_secs(30));

        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(8)));
        assert!(timers.take_expired(now + Duration::from_secs(7)).is_empty());

        let due = timers.take_expired(now + Duration::from_secs(10));
        assert_eq!(due, vec![TimerSlot::MediaFallback, TimerSlot::MediaAutoClose]);
        assert_eq!(timers.armed(), vec![TimerSlot::Heartbeat]);
    }

    #[test]
    fn test_clear_disarms_everything() {
        let mut timers = Timers::new();
        let now = Instant::now();
        for slot in TimerSlot::ALL {
            timers.arm(slot, now);
        }
        timers.clear();
        assert!(timers.armed().is_empty());
    }
}
