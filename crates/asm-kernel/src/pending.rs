//! Pending request registry.
//!
//! Each outstanding RPC is registered under its [`RequestId`] before the
//! request is published, either as a one-shot waiter (blocking call) or as a
//! callback (async call). The bus response handler fulfils the entry from its
//! own thread, so the table is mutex-guarded.

use std::collections::HashMap;

use asm_ipc::RequestId;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

/// Callback invoked once with the reply.
pub(crate) type Callback<T> = Box<dyn FnOnce(T) + Send>;

enum Slot<T> {
    Waiter(Sender<T>),
    Callback(Callback<T>),
}

pub(crate) struct PendingTable<T> {
    entries: Mutex<HashMap<RequestId, Slot<T>>>,
}

impl<T: Send + 'static> PendingTable<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a blocking waiter; the returned receiver yields the reply once.
    pub fn register_waiter(&self, id: RequestId) -> Receiver<T> {
        let (tx, rx) = bounded(1);
        self.entries.lock().insert(id, Slot::Waiter(tx));
        rx
    }

    pub fn register_callback(&self, id: RequestId, callback: Callback<T>) {
        self.entries.lock().insert(id, Slot::Callback(callback));
    }

    /// Deliver `reply` to the entry for `id`, removing it.
    ///
    /// Returns `false` if nothing was pending under `id`.
    pub fn fulfil(&self, id: RequestId, reply: T) -> bool {
        // Release the lock before running user callbacks.
        let slot = self.entries.lock().remove(&id);
        match slot {
            Some(Slot::Waiter(tx)) => {
                // The waiter may have timed out between removal and send.
                let _ = tx.send(reply);
                true
            }
            Some(Slot::Callback(callback)) => {
                callback(reply);
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id` (timeout or publish failure).
    pub fn cancel(&self, id: RequestId) -> bool {
        self.entries.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[cfg(test)]
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.lock().contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_waiter_receives_reply_once() {
        let table = PendingTable::<u32>::new();
        let rx = table.register_waiter(RequestId(1));
        assert!(table.contains(RequestId(1)));

        assert!(table.fulfil(RequestId(1), 7));
        assert_eq!(rx.try_recv(), Ok(7));
        assert!(!table.fulfil(RequestId(1), 8));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_callback_invoked_and_discarded() {
        let table = PendingTable::<u32>::new();
        let hits = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&hits);
        table.register_callback(
            RequestId(2),
            Box::new(move |v| {
                seen.fetch_add(v, Ordering::SeqCst);
            }),
        );

        assert!(table.fulfil(RequestId(2), 5));
        assert!(!table.fulfil(RequestId(2), 5));
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_unknown_and_cancelled_ids_are_ignored() {
        let table = PendingTable::<u32>::new();
        assert!(!table.fulfil(RequestId(99), 1));

        let _rx = table.register_waiter(RequestId(3));
        assert!(table.cancel(RequestId(3)));
        assert!(!table.fulfil(RequestId(3), 1));
        assert!(!table.cancel(RequestId(3)));
    }

    #[test]
    fn test_fulfil_after_waiter_dropped_does_not_panic() {
        let table = PendingTable::<u32>::new();
        drop(table.register_waiter(RequestId(4)));
        assert!(table.fulfil(RequestId(4), 1));
    }
}
