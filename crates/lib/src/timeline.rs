//! Per-contact message timelines: bulk history merge plus live appends.
//!
//! A partition exists if and only if the matching contact exists in the
//! registry; the sync controller creates both together, so partitions are
//! never orphaned.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

use crate::contacts::{ContactId, UnknownContact};

/// Who authored a message relative to the local user. The backend writes
/// "ME" for the local user and "CONTACT" for the remote side; any unknown
/// marker is treated as the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentBy {
    Me,
    Peer,
}

impl Serialize for SentBy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            SentBy::Me => "ME",
            SentBy::Peer => "CONTACT",
        })
    }
}

impl<'de> Deserialize<'de> for SentBy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let marker = String::deserialize(deserializer)?;
        Ok(if marker == "ME" { SentBy::Me } else { SentBy::Peer })
    }
}

/// A single message in a conversation partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Conversation partition this message belongs to (the conversation
    /// partner, not necessarily the sender).
    pub contact_id: ContactId,
    pub sent_by: SentBy,
    /// Opaque pre-sanitized text; never reinterpreted.
    pub body: String,
    /// Epoch seconds as reported by the backend, or stamped locally for
    /// echoes and live arrivals.
    pub timestamp: i64,
}

/// Per-contact ordered message log. Owned by the sync controller; every
/// partition is kept in non-decreasing timestamp order.
#[derive(Debug, Default)]
pub struct TimelineStore {
    partitions: HashMap<ContactId, Vec<Message>>,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty partition for a newly created contact. Idempotent.
    pub fn create_partition(&mut self, id: impl Into<ContactId>) {
        self.partitions.entry(id.into()).or_default();
    }

    /// Merge the startup history snapshot. The snapshot arrives with all
    /// contacts' messages interleaved in arbitrary order, so the whole
    /// sequence is stable-sorted by timestamp before partitioning; after
    /// this call every partition is internally time-ordered. Every target
    /// partition must already exist.
    pub fn append_bulk(&mut self, mut entries: Vec<Message>) -> Result<(), UnknownContact> {
        entries.sort_by_key(|m| m.timestamp);
        for message in entries {
            self.append_one(message)?;
        }
        Ok(())
    }

    /// Append a live message at the tail of its partition. Live events are
    /// trusted to arrive in backend-delivery order per contact, so no
    /// re-sort happens here; the owning contact must be upserted first.
    pub fn append_one(&mut self, message: Message) -> Result<(), UnknownContact> {
        match self.partitions.get_mut(&message.contact_id) {
            Some(partition) => {
                partition.push(message);
                Ok(())
            }
            None => Err(UnknownContact(message.contact_id)),
        }
    }

    /// Read-only copy of a partition for rendering. Empty when the contact
    /// is unknown.
    pub fn snapshot(&self, id: &str) -> Vec<Message> {
        self.partitions.get(id).cloned().unwrap_or_default()
    }

    /// Ids of all partitions (one per known contact).
    pub fn partition_ids(&self) -> Vec<ContactId> {
        self.partitions.keys().cloned().collect()
    }
}
