//! The conversation timeline.
//!
//! Merges the history fetch, live inbound messages and local optimistic
//! drafts into one insertion-ordered, de-duplicated list. Insertion order is
//! the display order: history arrives chronologically and live events are
//! appended in transport order, so nothing is ever sorted by timestamp.
//!
//! The timeline is only mutated through this type.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use amora_shared::types::{ChatMessage, LocalRef, MessageId, Sender, UserId};
use amora_shared::{OutboundEvent, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Shown locally, no server id yet.
    Pending,
    Confirmed,
    /// The channel went away before the server echoed the draft.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub message: ChatMessage,
    pub local_ref: Option<LocalRef>,
    pub delivery: Delivery,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Appended {
        entry: TimelineEntry,
        /// Read receipt to emit, for messages authored by the other participant.
        receipt: Option<OutboundEvent>,
    },
    /// The server echo of one of our drafts.
    Promoted { local_ref: LocalRef, id: MessageId },
    /// Already in the timeline.
    Duplicate,
}

/// Outcome of installing a history fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryLoad {
    /// One batched read receipt for every unread message from the other participant.
    pub receipt: Option<OutboundEvent>,
    /// Drafts replaced by their stored copy.
    pub promoted: Vec<(LocalRef, MessageId)>,
}

/// An unconfirmed local text draft carrying the same body as `message`.
fn is_open_draft(entry: &TimelineEntry, message: &ChatMessage) -> bool {
    entry.local_ref.is_some()
        && entry.delivery != Delivery::Confirmed
        && entry.message.body == message.body
}

#[derive(Debug)]
pub struct MessageReconciler {
    self_id: UserId,
    target: UserId,
    timeline: Vec<TimelineEntry>,
    known_ids: HashSet<MessageId>,
}

impl MessageReconciler {
    pub fn new(self_id: UserId, target: UserId) -> Self {
        Self {
            self_id,
            target,
            timeline: Vec::new(),
            known_ids: HashSet::new(),
        }
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    fn receipt(&self, ids: Vec<MessageId>) -> OutboundEvent {
        OutboundEvent::MessageRead {
            user_id: self.self_id.clone(),
            target_user_id: self.target.clone(),
            message_ids: ids,
        }
    }

    /// Install the fetched history as the baseline.
    ///
    /// Entries already in the timeline that the history does not contain
    /// (live messages that raced the fetch, unconfirmed drafts) are kept
    /// after it in their current order. A draft the server stored while its
    /// echo was lost is replaced by the stored copy, matched oldest first on
    /// the body like a live echo.
    pub fn load_history(&mut self, history: Vec<ChatMessage>) -> HistoryLoad {
        let mut known = HashSet::new();
        let mut timeline = Vec::with_capacity(history.len() + self.timeline.len());
        let mut replaced = HashSet::new();
        let mut promoted = Vec::new();

        for message in history {
            if let Some(ref id) = message.id {
                if !known.insert(id.clone()) {
                    continue;
                }
                let fresh_own_text = !self.known_ids.contains(id)
                    && message.is_from(&self.self_id)
                    && message.media.is_none();
                if fresh_own_text {
                    let draft = self
                        .timeline
                        .iter()
                        .enumerate()
                        .find(|(i, e)| !replaced.contains(i) && is_open_draft(e, &message));
                    if let Some((index, TimelineEntry { local_ref: Some(local_ref), .. })) = draft {
                        replaced.insert(index);
                        promoted.push((*local_ref, id.clone()));
                    }
                }
            }
            timeline.push(TimelineEntry {
                message,
                local_ref: None,
                delivery: Delivery::Confirmed,
            });
        }

        for (index, entry) in self.timeline.drain(..).enumerate() {
            if replaced.contains(&index) {
                continue;
            }
            let keep = match entry.message.id {
                Some(ref id) => known.insert(id.clone()),
                None => true,
            };
            if keep {
                timeline.push(entry);
            }
        }

        self.timeline = timeline;
        self.known_ids = known;

        let unread: Vec<MessageId> = self
            .timeline
            .iter()
            .filter(|e| e.message.is_from(&self.target) && !e.message.read)
            .filter_map(|e| e.message.id.clone())
            .collect();

        debug!(
            messages = self.timeline.len(),
            unread = unread.len(),
            promoted = promoted.len(),
            "History loaded"
        );

        let receipt = (!unread.is_empty()).then(|| self.receipt(unread));
        HistoryLoad { receipt, promoted }
    }

    /// Apply a live message from the channel.
    pub fn append_incoming(&mut self, message: ChatMessage) -> Incoming {
        let Some(id) = message.id.clone() else {
            debug!("Ignoring inbound message without id");
            return Incoming::Duplicate;
        };
        if self.known_ids.contains(&id) {
            return Incoming::Duplicate;
        }

        if message.is_from(&self.self_id) && message.media.is_none() {
            // Oldest unconfirmed draft with the same text wins.
            if let Some(index) = self.timeline.iter().position(|e| is_open_draft(e, &message)) {
                let entry = &mut self.timeline[index];
                if let Some(local_ref) = entry.local_ref {
                    entry.message = message;
                    entry.delivery = Delivery::Confirmed;
                    self.known_ids.insert(id.clone());
                    return Incoming::Promoted { local_ref, id };
                }
            }
        }

        let receipt = message
            .is_from(&self.target)
            .then(|| self.receipt(vec![id.clone()]));

        self.known_ids.insert(id);
        let entry = TimelineEntry {
            message,
            local_ref: None,
            delivery: Delivery::Confirmed,
        };
        self.timeline.push(entry.clone());
        Incoming::Appended { entry, receipt }
    }

    /// Show a text draft before the server has acknowledged it.
    pub fn append_optimistic(
        &mut self,
        sender: Sender,
        body: String,
        now: DateTime<Utc>,
    ) -> Result<TimelineEntry, ProtocolError> {
        let message = ChatMessage::new(
            None,
            sender,
            self.target.clone(),
            Some(body),
            None,
            now,
            false,
        )?;
        let entry = TimelineEntry {
            message,
            local_ref: Some(LocalRef::new()),
            delivery: Delivery::Pending,
        };
        self.timeline.push(entry.clone());
        Ok(entry)
    }

    /// Insert a message confirmed outside the channel (REST fallback).
    pub fn append_confirmed(&mut self, message: ChatMessage) -> Option<TimelineEntry> {
        if let Some(ref id) = message.id {
            if !self.known_ids.insert(id.clone()) {
                return None;
            }
        }
        let entry = TimelineEntry {
            message,
            local_ref: None,
            delivery: Delivery::Confirmed,
        };
        self.timeline.push(entry.clone());
        Some(entry)
    }

    /// Flip `read` on every listed message present. Returns how many changed.
    pub fn mark_read(&mut self, ids: &[MessageId]) -> usize {
        let ids: HashSet<&MessageId> = ids.iter().collect();
        let mut changed = 0;
        for entry in &mut self.timeline {
            let hit = entry.message.id.as_ref().is_some_and(|id| ids.contains(id));
            if hit && !entry.message.read {
                entry.message.read = true;
                changed += 1;
            }
        }
        changed
    }

    /// Mark every pending draft as failed.
    pub fn fail_pending(&mut self) -> Vec<LocalRef> {
        self.timeline
            .iter_mut()
            .filter(|e| e.delivery == Delivery::Pending)
            .filter_map(|e| {
                e.delivery = Delivery::Failed;
                e.local_ref
            })
            .collect()
    }
}
