use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use tracing::error;

use parley_types::api::MessageView;
use parley_types::models::ChatMessage;

use crate::clock::Clock;
use crate::identity::IdentityStore;
use crate::{StoreError, read_lock, write_lock};

/// Append-only chat log. Ids come from a counter owned by the log and are
/// never reused, even after a clear.
pub struct MessageLog {
    log: RwLock<Log>,
    identity: Arc<IdentityStore>,
    clock: Arc<dyn Clock>,
}

#[derive(Default)]
struct Log {
    last_id: u64,
    /// Ordered by id, which is also insertion order.
    entries: BTreeMap<u64, ChatMessage>,
}

impl MessageLog {
    pub fn new(identity: Arc<IdentityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            log: RwLock::new(Log::default()),
            identity,
            clock,
        }
    }

    /// Append a message from `sender_username`.
    ///
    /// The sender is resolved before the log lock is taken and confirmed again
    /// under it, so an account removed before the write can never end up named
    /// by a message. Lock order is always log, then identity.
    pub fn append(&self, sender_username: &str, content: &str) -> Result<ChatMessage, StoreError> {
        if content.trim().is_empty() {
            return Err(StoreError::InvalidInput("content is blank"));
        }
        let sender = self
            .identity
            .get_by_username(sender_username)
            .ok_or_else(|| StoreError::UnknownSender(sender_username.to_string()))?;

        let mut log = write_lock(&self.log);
        if self.identity.get_by_id(sender.id).is_none() {
            return Err(StoreError::UnknownSender(sender_username.to_string()));
        }
        let mut timestamp = self.clock.now();
        // Keep timestamps non-decreasing with id even if the wall clock steps back.
        if let Some((_, last)) = log.entries.last_key_value() {
            timestamp = timestamp.max(last.timestamp);
        }

        log.last_id += 1;
        let message = ChatMessage {
            id: log.last_id,
            sender_id: sender.id,
            content: content.to_string(),
            timestamp,
        };
        log.entries.insert(message.id, message.clone());
        Ok(message)
    }

    pub fn get_all(&self) -> Vec<ChatMessage> {
        read_lock(&self.log).entries.values().cloned().collect()
    }

    /// The most recent `n` messages, oldest first.
    pub fn get_last(&self, n: i64) -> Vec<ChatMessage> {
        if n <= 0 {
            return Vec::new();
        }
        let log = read_lock(&self.log);
        let skip = log.entries.len().saturating_sub(n as usize);
        log.entries.values().skip(skip).cloned().collect()
    }

    /// Every message with `id > last_id`, ascending.
    pub fn get_after(&self, last_id: u64) -> Vec<ChatMessage> {
        read_lock(&self.log)
            .entries
            .range((Bound::Excluded(last_id), Bound::Unbounded))
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Id of the newest message ever appended, or 0.
    pub fn tail_id(&self) -> u64 {
        read_lock(&self.log).last_id
    }

    /// Drop every message. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let mut log = write_lock(&self.log);
        let removed = log.entries.len();
        log.entries.clear();
        removed
    }

    pub fn remove_by_id(&self, id: u64) -> Result<ChatMessage, StoreError> {
        write_lock(&self.log).entries.remove(&id).ok_or(StoreError::NotFound)
    }

    /// Drop every message sent by `sender_id`. Returns how many were removed.
    pub fn remove_by_sender(&self, sender_id: u64) -> usize {
        let mut log = write_lock(&self.log);
        let before = log.entries.len();
        log.entries.retain(|_, m| m.sender_id != sender_id);
        before - log.entries.len()
    }
}

/// Resolve sender ids to usernames for output.
///
/// A sender that no longer exists means the stores diverged; that is reported
/// as [`StoreError::DanglingSender`], never skipped.
pub fn resolve_views(
    messages: Vec<ChatMessage>,
    identity: &IdentityStore,
) -> Result<Vec<MessageView>, StoreError> {
    messages
        .into_iter()
        .map(|m| -> Result<MessageView, StoreError> {
            let sender = identity.get_by_id(m.sender_id).ok_or_else(|| {
                error!(
                    "Invariant violation: message {} references missing user {}",
                    m.id, m.sender_id
                );
                StoreError::DanglingSender {
                    message_id: m.id,
                    sender_id: m.sender_id,
                }
            })?;
            Ok(MessageView {
                id: m.id,
                sender: sender.username,
                content: m.content,
                timestamp_utc: m.timestamp,
            })
        })
        .collect()
}
