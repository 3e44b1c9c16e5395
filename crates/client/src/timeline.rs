//! Per-room message reconciliation.
//!
//! History pages, `since` polls and realtime events all describe the same
//! messages and may arrive in any order or more than once. The timeline keeps
//! exactly one copy of each message, the one with the highest `seq`, and never
//! brings a deleted message back.
//!
//! Only responses that cover every change up to their last `seq` move the
//! polling cursor: `since` pages and the newest history page. Realtime events
//! and older history pages are merged without touching it, so a gap behind a
//! pushed event is still fetched on the next poll.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use modnet_chats::{MessageView, ServerEvent};

#[derive(Debug, Clone)]
pub struct Timeline {
    room_id: String,
    messages: HashMap<String, MessageView>,
    cursor: Option<i64>,
}

impl Timeline {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            messages: HashMap::new(),
            cursor: None,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Merge a page of older history. Returns how many entries changed.
    pub fn apply_page<I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = MessageView>,
    {
        let mut changed = 0;
        for message in messages {
            if self.upsert(message) {
                changed += 1;
            }
        }
        changed
    }

    /// Merge a `since` page or the newest history page and move the cursor
    /// to its highest `seq`. Returns how many entries changed.
    pub fn apply_changes<I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = MessageView>,
    {
        let mut changed = 0;
        for message in messages {
            if message.room_id != self.room_id {
                continue;
            }
            if self.cursor.map_or(true, |cursor| message.seq > cursor) {
                self.cursor = Some(message.seq);
            }
            if self.upsert(message) {
                changed += 1;
            }
        }
        changed
    }

    /// Merge a realtime event. Returns true if the timeline changed.
    pub fn apply_event(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::MessageCreated { message }
            | ServerEvent::MessageUpdated { message }
            | ServerEvent::MessageDeleted { message } => self.upsert(message.clone()),
            _ => false,
        }
    }

    /// Store `message` unless the stored copy is newer or a tombstone.
    pub fn upsert(&mut self, message: MessageView) -> bool {
        if message.room_id != self.room_id {
            return false;
        }

        match self.messages.get(&message.id) {
            Some(current) if current.is_deleted() && !message.is_deleted() => false,
            Some(current) if message.seq < current.seq => false,
            Some(current) if *current == message => false,
            _ => {
                self.messages.insert(message.id.clone(), message);
                true
            }
        }
    }

    /// Messages in `(created_at, id)` order, tombstones included.
    pub fn messages(&self) -> Vec<&MessageView> {
        let mut messages: Vec<&MessageView> = self.messages.values().collect();
        messages.sort_by(|a, b| chronological(a, b));
        messages
    }

    pub fn get(&self, message_id: &str) -> Option<&MessageView> {
        self.messages.get(message_id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Highest change position covered without gaps, the value to poll
    /// `since` with.
    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    /// Reply chain from its root down to `message_id`.
    ///
    /// The chain stops at the first parent that is not loaded.
    pub fn thread(&self, message_id: &str) -> Vec<&MessageView> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = self.messages.get(message_id);

        while let Some(message) = next {
            if !seen.insert(message.id.as_str()) {
                break;
            }
            chain.push(message);
            next = message
                .reply_to
                .as_ref()
                .and_then(|parent| self.messages.get(&parent.id));
        }

        chain.reverse();
        chain
    }

    /// Direct replies to `message_id`, oldest first.
    pub fn replies_to(&self, message_id: &str) -> Vec<&MessageView> {
        let mut replies: Vec<&MessageView> = self
            .messages
            .values()
            .filter(|message| {
                message
                    .reply_to
                    .as_ref()
                    .is_some_and(|parent| parent.id == message_id)
            })
            .collect();
        replies.sort_by(|a, b| chronological(a, b));
        replies
    }

}

fn chronological(a: &MessageView, b: &MessageView) -> Ordering {
    compare_timestamps(&a.created_at, &b.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Compare RFC 3339 timestamps by instant, falling back to text order.
fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (parse(a), parse(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn parse(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
