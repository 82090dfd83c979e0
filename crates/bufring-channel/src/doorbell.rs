//! Doorbells: the cross-domain notification the rings decide about but
//! never deliver themselves.
//!
//! In a real partitioned deployment the doorbell is an interrupt or
//! hypercall; inside one process a futex-backed epoch counter is enough.
//! Ringing is always safe to do redundantly, and a waiter that raced a ring
//! observes the moved epoch and does not park.

use std::sync::atomic::{AtomicU32, Ordering};

/// Cross-domain notification primitive supplied by the channel boundary.
pub trait Doorbell: Send + Sync {
    /// Delivers one wakeup to the peer. Redundant rings are harmless.
    fn ring(&self);
}

/// In-process doorbell built on futex wait/wake.
#[derive(Debug, Default)]
pub struct FutexDoorbell {
    epoch: AtomicU32,
}

impl FutexDoorbell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current epoch. Capture it before checking ring state, then pass it
    /// to [`wait`](Self::wait) so a ring between check and park is not
    /// missed.
    pub fn epoch(&self) -> u32 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Parks the caller until the epoch moves past `seen`; returns
    /// immediately if it already has.
    pub fn wait(&self, seen: u32) {
        while self.epoch.load(Ordering::Acquire) == seen {
            atomic_wait::wait(&self.epoch, seen);
        }
    }
}

impl Doorbell for FutexDoorbell {
    fn ring(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        atomic_wait::wake_all(&self.epoch as *const AtomicU32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn ring_moves_the_epoch() {
        let bell = FutexDoorbell::new();
        let seen = bell.epoch();
        bell.ring();
        assert_eq!(bell.epoch(), seen + 1);
        // A pre-rung bell never parks.
        bell.wait(seen);
    }

    #[test]
    fn waiter_wakes_on_ring() {
        let bell = Arc::new(FutexDoorbell::new());
        let seen = bell.epoch();
        let waiter = {
            let bell = Arc::clone(&bell);
            thread::spawn(move || bell.wait(seen))
        };
        bell.ring();
        waiter.join().unwrap();
    }
}
