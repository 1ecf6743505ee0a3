pub mod clock;
pub mod identity;
pub mod messages;

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::IdentityStore;
pub use messages::{MessageLog, resolve_views};

/// Outcome of a store operation that did not succeed.
///
/// Every variant except [`StoreError::DanglingSender`] is an expected failure
/// that the protocol layer maps to a client-facing status. `DanglingSender`
/// means the identity store and the message log diverged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("username already taken")]
    UsernameTaken,
    #[error("not found")]
    NotFound,
    #[error("sender '{0}' is not a known user")]
    UnknownSender(String),
    #[error("message {message_id} references missing user {sender_id}")]
    DanglingSender { message_id: u64, sender_id: u64 },
}


// Mutations are single-step, so data behind a poisoned lock is still whole.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
