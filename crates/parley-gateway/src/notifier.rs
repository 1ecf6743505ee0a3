use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Broadcast wake primitive: any number of tasks suspend on [`Waiter`]s and
/// a single [`ChangeNotifier::notify_all`] resumes all of them.
///
/// The notifier's lock guards only its waiter set and is never taken while a
/// store lock is held.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

#[derive(Default)]
struct NotifierInner {
    waiters: Mutex<WaiterSet>,
}

#[derive(Default)]
struct WaiterSet {
    next_key: u64,
    /// Number of `notify_all` calls so far.
    generation: u64,
    pending: HashMap<u64, oneshot::Sender<()>>,
}

impl NotifierInner {
    fn lock(&self) -> MutexGuard<'_, WaiterSet> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter that completes on the next `notify_all`.
    pub fn wait_for_next(&self) -> Waiter {
        let (tx, rx) = oneshot::channel();
        let mut set = self.inner.lock();
        set.next_key += 1;
        let key = set.next_key;
        set.pending.insert(key, tx);

        Waiter {
            key,
            generation: set.generation,
            rx,
            notifier: self.inner.clone(),
            fired: false,
        }
    }

    /// Wake every registered waiter. Returns how many were woken.
    ///
    /// The whole set is taken under the lock and completed outside it, so a
    /// waiter registered afterwards waits for the following call.
    pub fn notify_all(&self) -> usize {
        let captured = {
            let mut set = self.inner.lock();
            set.generation += 1;
            std::mem::take(&mut set.pending)
        };

        let woken = captured.len();
        for (_, tx) in captured {
            let _ = tx.send(());
        }
        woken
    }

    /// Number of waiters currently registered.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }

    #[cfg(test)]
    fn generation(&self) -> u64 {
        self.inner.lock().generation
    }
}

/// Handle returned by [`ChangeNotifier::wait_for_next`].
///
/// Dropping a waiter that has not fired removes it from the notifier.
pub struct Waiter {
    key: u64,
    generation: u64,
    rx: oneshot::Receiver<()>,
    notifier: Arc<NotifierInner>,
    fired: bool,
}

impl Waiter {
    /// Notifier generation at the time this waiter was registered.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Future for Waiter {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(_) => {
                this.fired = true;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if !self.fired {
            self.notifier.lock().pending.remove(&self.key);
        }
    }
}
