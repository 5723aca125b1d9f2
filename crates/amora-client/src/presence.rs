//! Online / last-seen tracking for the other participant.

use chrono::{DateTime, Utc};

use amora_shared::protocol::{PresenceState, RecipientPresence, StatusUpdate};
use amora_shared::types::{PresenceStatus, UserId};

#[derive(Debug)]
pub struct PresenceTracker {
    status: PresenceStatus,
}

impl PresenceTracker {
    pub fn new(target: UserId) -> Self {
        Self {
            status: PresenceStatus::unknown(target),
        }
    }

    pub fn status(&self) -> &PresenceStatus {
        &self.status
    }

    /// Seed from the snapshot received after joining.
    ///
    /// No real last-seen is known yet, so `now` stands in for it.
    pub fn on_initial_online_users(&mut self, online: &[UserId], now: DateTime<Utc>) -> bool {
        if !online.contains(&self.status.user_id) {
            return false;
        }
        self.status.online = true;
        self.status.last_seen = Some(now);
        true
    }

    /// Returns `true` when the update concerned the tracked participant.
    pub fn on_status_update(&mut self, update: &StatusUpdate) -> bool {
        if update.user_id != self.status.user_id {
            return false;
        }
        self.status.online = update.status == PresenceState::Online;
        if update.status == PresenceState::Offline {
            if let Some(last_seen) = update.last_seen {
                self.status.last_seen = Some(last_seen);
            }
        }
        true
    }

    pub fn on_recipient_online(&mut self, event: &RecipientPresence, now: DateTime<Utc>) -> bool {
        if event.user_id != self.status.user_id {
            return false;
        }
        self.status.online = true;
        self.status.last_seen = Some(now);
        true
    }

    pub fn on_recipient_offline(&mut self, event: &RecipientPresence) -> bool {
        if event.user_id != self.status.user_id {
            return false;
        }
        self.status.online = false;
        if let Some(last_seen) = event.last_seen {
            self.status.last_seen = Some(last_seen);
        }
        true
    }

    /// Header label: "Active now", a relative last-seen, or "Offline".
    pub fn display_status(&self, now: DateTime<Utc>) -> String {
        if self.status.online {
            return "Active now".to_string();
        }
        match self.status.last_seen {
            Some(last_seen) => format_last_seen(last_seen, now),
            None => "Offline".to_string(),
        }
    }
}

/// Relative time between `then` and `now`, in whole units.
pub fn format_last_seen(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - then).num_minutes().max(0);

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes} min ago")
    } else if minutes < 24 * 60 {
        let hours = minutes / 60;
        format!("{hours} hour{} ago", plural(hours))
    } else {
        let days = minutes / (24 * 60);
        format!("{days} day{} ago", plural(days))
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn target() -> UserId {
        UserId::new("b")
    }

    #[test]
    fn test_format_last_seen() {
        let now = Utc::now();
        assert_eq!(format_last_seen(now - Duration::seconds(30), now), "Just now");
        assert_eq!(format_last_seen(now - Duration::minutes(5), now), "5 min ago");
        assert_eq!(format_last_seen(now - Duration::hours(1), now), "1 hour ago");
        assert_eq!(format_last_seen(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_last_seen(now - Duration::days(1), now), "1 day ago");
        assert_eq!(format_last_seen(now - Duration::days(2), now), "2 days ago");
        assert_eq!(format_last_seen(now + Duration::minutes(3), now), "Just now");
    }

    #[test]
    fn test_initial_snapshot_then_offline() {
        let now = Utc::now();
        let mut presence = PresenceTracker::new(target());

        assert!(!presence.on_initial_online_users(&[UserId::new("x")], now));
        assert!(!presence.status().online);

        assert!(presence.on_initial_online_users(&[UserId::new("x"), target()], now));
        assert!(presence.status().online);
        assert_eq!(presence.display_status(now), "Active now");

        let last_seen = now - Duration::minutes(5);
        assert!(presence.on_status_update(&StatusUpdate {
            user_id: target(),
            status: PresenceState::Offline,
            last_seen: Some(last_seen),
        }));
        assert_eq!(
            presence.status(),
            &PresenceStatus {
                user_id: target(),
                online: false,
                last_seen: Some(last_seen),
            }
        );
        assert_eq!(presence.display_status(now), "5 min ago");
    }

    #[test]
    fn test_online_update_keeps_prior_last_seen() {
        let now = Utc::now();
        let mut presence = PresenceTracker::new(target());
        let earlier = now - Duration::hours(2);

        presence.on_recipient_offline(&RecipientPresence {
            user_id: target(),
            last_seen: Some(earlier),
        });
        presence.on_status_update(&StatusUpdate {
            user_id: target(),
            status: PresenceState::Online,
            last_seen: Some(now),
        });
        assert!(presence.status().online);
        assert_eq!(presence.status().last_seen, Some(earlier));
    }

    #[test]
    fn test_offline_without_last_seen() {
        let now = Utc::now();
        let mut presence = PresenceTracker::new(target());
        assert_eq!(presence.display_status(now), "Offline");

        presence.on_status_update(&StatusUpdate {
            user_id: target(),
            status: PresenceState::Offline,
            last_seen: None,
        });
        assert_eq!(presence.display_status(now), "Offline");
    }

    #[test]
    fn test_ignores_other_users() {
        let mut presence = PresenceTracker::new(target());
        assert!(!presence.on_status_update(&StatusUpdate {
            user_id: UserId::new("z"),
            status: PresenceState::Online,
            last_seen: None,
        }));
        assert!(!presence.status().online);
    }
}
