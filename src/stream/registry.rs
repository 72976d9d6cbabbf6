//! Connection slots for stream sessions

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::stream::session::SessionState;

/// Reported once per session when it ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCompletion {
    pub id: u64,
    pub state: SessionState,
    pub frames_sent: u64,
}

/// Bounds concurrent stream sessions and collects their completions.
pub struct SessionRegistry {
    slots: Arc<Semaphore>,
    capacity: usize,
    next_id: AtomicU64,
    completions: flume::Sender<SessionCompletion>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> (Self, flume::Receiver<SessionCompletion>) {
        let (tx, rx) = flume::unbounded();
        let registry = Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            next_id: AtomicU64::new(1),
            completions: tx,
        };
        (registry, rx)
    }

    /// Claim a slot, or `None` when every slot is taken
    pub fn try_admit(&self) -> Option<SessionSlot> {
        let permit = Arc::clone(&self.slots).try_acquire_owned().ok()?;
        Some(SessionSlot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            permit,
            completions: self.completions.clone(),
        })
    }

    pub fn active(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// A claimed connection slot. Dropping it frees the slot; [`complete`]
/// additionally reports how the session ended.
///
/// [`complete`]: SessionSlot::complete
pub struct SessionSlot {
    id: u64,
    permit: OwnedSemaphorePermit,
    completions: flume::Sender<SessionCompletion>,
}

impl SessionSlot {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Free the slot and signal the registry. Consumes the slot, so a
    /// session can only complete once.
    pub fn complete(self, state: SessionState, frames_sent: u64) {
        let SessionSlot {
            id,
            permit,
            completions,
        } = self;
        drop(permit);
        // Nobody listening is fine, the slot is already free
        let _ = completions.send(SessionCompletion {
            id,
            state,
            frames_sent,
        });
    }
}
