use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use canlink_frame::CanFrame;
use tracing::{error, warn};

use crate::error::CanError;

/// Events emitted on the push path.
#[derive(Debug)]
pub enum BusEvent {
    /// A frame arrived during a listener tick.
    Frame(CanFrame),
    /// A fatal listener failure; the session has stopped.
    Error(CanError),
    /// The polling loop is armed.
    Listening,
    /// The polling loop was stopped by request.
    Stopped,
    /// The bus handle was closed.
    Closed,
}

/// Registration key mirroring [`BusEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Frame,
    Error,
    Listening,
    Stopped,
    Closed,
}

impl BusEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BusEvent::Frame(_) => EventKind::Frame,
            BusEvent::Error(_) => EventKind::Error,
            BusEvent::Listening => EventKind::Listening,
            BusEvent::Stopped => EventKind::Stopped,
            BusEvent::Closed => EventKind::Closed,
        }
    }
}

type Observer = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Handle for removing a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId {
    kind: EventKind,
    seq: u64,
}

/// Thin observer registry keyed by event kind.
///
/// Observers for a kind run in registration order, synchronously
/// within the tick that produced the event. A panicking observer is
/// caught and logged so the rest of the chain still runs. An `Error`
/// event with no observer is logged at error level rather than
/// crashing the process; callers that care should register an
/// observer before `start_listening`.
pub(crate) struct EventDispatcher {
    observers: Mutex<HashMap<EventKind, Vec<(u64, Observer)>>>,
    next_seq: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn on<F>(&self, kind: EventKind, observer: F) -> ObserverId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((seq, Arc::new(observer)));
        ObserverId { kind, seq }
    }

    /// Remove an observer. Returns whether it was still registered.
    pub fn off(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = observers.get_mut(&id.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(seq, _)| *seq != id.seq);
        list.len() != before
    }

    pub fn emit(&self, event: &BusEvent) {
        let kind = event.kind();
        let snapshot: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|list| list.iter().map(|(_, obs)| Arc::clone(obs)).collect())
            .unwrap_or_default();

        if snapshot.is_empty() {
            if let BusEvent::Error(err) = event {
                error!(code = err.code(), %err, "bus error with no error observer");
            }
            return;
        }

        for observer in snapshot {
            if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                warn!(event = ?kind, "observer panicked; continuing dispatch");
            }
        }
    }
}
