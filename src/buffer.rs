//! In-memory, offset-ordered set of received messages.
//!
//! Messages arrive from several paths (push events, poll batches, range
//! reads, history loads) in no particular order. The buffer keeps exactly one
//! copy of each message id and always iterates in ascending offset order;
//! messages sharing an offset keep their arrival order.

use crate::types::{Message, MessageId, Offset};
use std::collections::HashSet;

/// Ordered, deduplicated message buffer.
///
/// Not internally synchronized: the consumer guards it together with the
/// offset ledger behind a single lock.
#[derive(Clone, Debug, Default)]
pub struct MergeBuffer {
    /// Messages in ascending offset order.
    messages: Vec<Message>,
    /// Ids present in `messages`.
    ids: HashSet<MessageId>,
}

impl MergeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message at its ordered position.
    ///
    /// Returns false (and leaves the buffer untouched) if the id is already
    /// present.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }

        // After every existing entry with the same offset.
        let pos = self
            .messages
            .partition_point(|existing| existing.offset <= message.offset);
        self.ids.insert(message.id.clone());
        self.messages.insert(pos, message);
        true
    }

    /// Insert many messages with a single sort pass.
    ///
    /// Same result as inserting one at a time. Returns the number of new
    /// messages.
    pub fn insert_batch<I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        let before = self.messages.len();
        for message in messages {
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
            }
        }

        let added = self.messages.len() - before;
        if added > 0 {
            // Stable: existing entries stay ahead of new ones at equal offsets.
            self.messages.sort_by_key(|m| m.offset);
        }
        added
    }

    /// Remove a message by id. Returns whether it was present.
    pub fn remove(&mut self, id: &MessageId) -> bool {
        if !self.ids.remove(id) {
            return false;
        }
        self.messages.retain(|m| &m.id != id);
        true
    }

    /// Clear and reload from a point-in-time snapshot.
    pub fn replace_all<I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = Message>,
    {
        self.clear();
        self.insert_batch(messages);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        if !self.ids.contains(id) {
            return None;
        }
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Messages in ascending offset order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn to_vec(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Messages exchanged with `peer`, in offset order.
    pub fn conversation(&self, peer: &str) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.involves(peer))
            .cloned()
            .collect()
    }

    /// Highest offset in the buffer, if any.
    pub fn max_offset(&self) -> Option<Offset> {
        self.messages.last().map(|m| m.offset)
    }

    /// Offsets in iteration order.
    pub fn offsets(&self) -> Vec<Offset> {
        self.messages.iter().map(|m| m.offset).collect()
    }
}
