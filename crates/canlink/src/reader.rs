use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::bus::BusShared;

/// Which consumer currently owns the receive side of the socket.
///
/// The listener and every pull sequence are alternative consumers of
/// one read capability; this single marker arbitrates them instead of
/// booleans scattered across the types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ReaderOwner {
    Idle = 0,
    Listener = 1,
    Stream = 2,
}

pub(crate) struct ReaderSlot(AtomicU8);

impl ReaderSlot {
    pub fn new() -> Self {
        Self(AtomicU8::new(ReaderOwner::Idle as u8))
    }

    pub fn try_acquire(&self, owner: ReaderOwner) -> bool {
        self.0
            .compare_exchange(
                ReaderOwner::Idle as u8,
                owner as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn release(&self) {
        self.0.store(ReaderOwner::Idle as u8, Ordering::Release);
    }

    pub fn owner(&self) -> ReaderOwner {
        match self.0.load(Ordering::Acquire) {
            1 => ReaderOwner::Listener,
            2 => ReaderOwner::Stream,
            _ => ReaderOwner::Idle,
        }
    }
}

/// Scoped ownership of the receive side. Releasing is tied to drop so
/// every exit path — exhaustion, failure, consumer abandonment — frees
/// the slot.
pub(crate) struct ReadGuard {
    shared: Arc<BusShared>,
}

impl ReadGuard {
    pub fn try_acquire(shared: &Arc<BusShared>, owner: ReaderOwner) -> Option<Self> {
        if shared.reader().try_acquire(owner) {
            Some(Self {
                shared: Arc::clone(shared),
            })
        } else {
            None
        }
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.shared.reader().release();
    }
}
