use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use parley_store::{MessageLog, StoreError};
use parley_types::models::ChatMessage;

use crate::notifier::ChangeNotifier;

/// How a poll finished, with whatever the final check of the log returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Newer messages were already in the log.
    Immediate(Vec<ChatMessage>),
    /// A write woke the poll before the timeout.
    Notified(Vec<ChatMessage>),
    /// The timeout won; the list is usually empty.
    TimedOut(Vec<ChatMessage>),
}

impl PollOutcome {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        match self {
            PollOutcome::Immediate(m) | PollOutcome::Notified(m) | PollOutcome::TimedOut(m) => m,
        }
    }
}

/// Couples the message log with the change notifier: writers go through
/// [`LongPoll::publish`], readers through [`LongPoll::poll`].
#[derive(Clone)]
pub struct LongPoll {
    log: Arc<MessageLog>,
    notifier: ChangeNotifier,
    timeout: Duration,
}

impl LongPoll {
    pub fn new(log: Arc<MessageLog>, notifier: ChangeNotifier, timeout: Duration) -> Self {
        Self { log, notifier, timeout }
    }

    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Append a message, then wake every waiting poll.
    pub fn publish(&self, sender_username: &str, content: &str) -> Result<ChatMessage, StoreError> {
        let message = self.log.append(sender_username, content)?;
        let woken = self.notifier.notify_all();
        debug!("Message {} appended, woke {} pollers", message.id, woken);
        Ok(message)
    }

    /// Return messages newer than `last_id`, waiting at most one timeout
    /// period for one to arrive.
    ///
    /// The waiter is registered before the log is checked. Any append that
    /// lands after the check therefore notifies this waiter, and any append
    /// that landed before it is already visible through `tail_id`.
    pub async fn poll(&self, last_id: u64) -> PollOutcome {
        let waiter = self.notifier.wait_for_next();

        if self.log.tail_id() > last_id {
            let fresh = self.log.get_after(last_id);
            if !fresh.is_empty() {
                return PollOutcome::Immediate(fresh);
            }
        }

        let generation = waiter.generation();
        match tokio::time::timeout(self.timeout, waiter).await {
            Ok(()) => {
                debug!("Poll after {} woken (registered at generation {})", last_id, generation);
                PollOutcome::Notified(self.log.get_after(last_id))
            }
            // The timed-out waiter was dropped inside `timeout` and unregistered itself.
            Err(_) => {
                debug!("Poll after {} timed out", last_id);
                PollOutcome::TimedOut(self.log.get_after(last_id))
            }
        }
    }
}
