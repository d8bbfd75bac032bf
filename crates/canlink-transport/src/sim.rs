//! In-memory simulated bus.
//!
//! `SimBus::new` returns a handle pair: the bus side, which tests use
//! to inject traffic (or failures), and a [`SimTransport`] that
//! behaves like a socket bound to that bus. Frames come back out of
//! `recv` in injection order; installed filters are evaluated in
//! software so the transport drops non-matching frames the way the
//! kernel would.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use canlink_frame::{CanFilter, CanFrame};
use tokio::sync::mpsc;

use crate::error::{Result, TransportError};
use crate::traits::CanTransport;

enum SimEvent {
    Frame(CanFrame),
    Fail(TransportError),
}

/// Test-side handle: injects frames and failures, records sends.
pub struct SimBus {
    tx: mpsc::UnboundedSender<SimEvent>,
    sent: Arc<Mutex<Vec<CanFrame>>>,
}

impl SimBus {
    /// Create a bus and a transport bound to it, named `sim0`.
    pub fn new() -> (Self, SimTransport) {
        Self::named("sim0")
    }

    /// Create a bus with an explicit interface name.
    pub fn named(interface: &str) -> (Self, SimTransport) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let bus = Self {
            tx,
            sent: Arc::clone(&sent),
        };
        let transport = SimTransport {
            interface: interface.to_string(),
            rx: tokio::sync::Mutex::new(rx),
            filters: Mutex::new(Vec::new()),
            sent,
        };
        (bus, transport)
    }

    /// Put a frame on the bus; the transport will receive it in order.
    pub fn push(&self, frame: CanFrame) {
        let _ = self.tx.send(SimEvent::Frame(frame));
    }

    /// Make the next `recv` fail with `err` once queued frames ahead
    /// of it have drained.
    pub fn fail(&self, err: TransportError) {
        let _ = self.tx.send(SimEvent::Fail(err));
    }

    /// Frames the transport has sent so far, in send order.
    pub fn sent(&self) -> Vec<CanFrame> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// The socket side of a [`SimBus`].
pub struct SimTransport {
    interface: String,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<SimEvent>>,
    filters: Mutex<Vec<CanFilter>>,
    sent: Arc<Mutex<Vec<CanFrame>>>,
}

impl SimTransport {
    fn accepts(&self, id: u32) -> bool {
        let filters = self.filters.lock().unwrap_or_else(PoisonError::into_inner);
        filters.is_empty() || filters.iter().any(|f| f.matches(id))
    }
}

#[async_trait]
impl CanTransport for SimTransport {
    async fn send(&self, frame: &CanFrame) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<CanFrame> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut rx = self.rx.lock().await;
        loop {
            let event = match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => return Err(TransportError::Timeout(timeout)),
                Ok(None) => {
                    return Err(TransportError::Io(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "simulated bus shut down",
                    )))
                }
                Ok(Some(event)) => event,
            };
            match event {
                SimEvent::Frame(frame) if self.accepts(frame.id) => return Ok(frame),
                SimEvent::Frame(_) => continue,
                SimEvent::Fail(err) => return Err(err),
            }
        }
    }

    fn set_filters(&self, filters: &[CanFilter]) -> Result<()> {
        *self.filters.lock().unwrap_or_else(PoisonError::into_inner) = filters.to_vec();
        Ok(())
    }

    fn clear_filters(&self) -> Result<()> {
        self.filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    fn interface(&self) -> &str {
        &self.interface
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32) -> CanFrame {
        CanFrame::data(id, vec![id as u8]).unwrap()
    }

    #[tokio::test]
    async fn frames_come_back_in_injection_order() {
        let (bus, transport) = SimBus::new();
        bus.push(frame(0x1));
        bus.push(frame(0x2));
        bus.push(frame(0x3));

        for expected in [0x1, 0x2, 0x3] {
            let got = transport.recv(Duration::from_millis(50)).await.unwrap();
            assert_eq!(got.id, expected);
        }
    }

    #[tokio::test]
    async fn empty_bus_times_out() {
        let (_bus, transport) = SimBus::new();
        let err = transport.recv(Duration::from_millis(5)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn injected_failure_surfaces_after_queued_frames() {
        let (bus, transport) = SimBus::new();
        bus.push(frame(0x10));
        bus.fail(TransportError::Io(io::Error::new(
            io::ErrorKind::Other,
            "bus fell over",
        )));

        assert!(transport.recv(Duration::from_millis(50)).await.is_ok());
        let err = transport.recv(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn dropping_the_bus_is_a_fatal_read_error() {
        let (bus, transport) = SimBus::new();
        drop(bus);
        let err = transport.recv(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[tokio::test]
    async fn filters_drop_non_matching_frames() {
        let (bus, transport) = SimBus::new();
        transport
            .set_filters(&[CanFilter::new(0x100, 0x700)])
            .unwrap();

        bus.push(frame(0x2)); // filtered out
        bus.push(frame(0x123)); // matches 0x100/0x700

        let got = transport.recv(Duration::from_millis(50)).await.unwrap();
        assert_eq!(got.id, 0x123);

        transport.clear_filters().unwrap();
        bus.push(frame(0x2));
        let got = transport.recv(Duration::from_millis(50)).await.unwrap();
        assert_eq!(got.id, 0x2);
    }

    #[tokio::test]
    async fn sends_are_recorded() {
        let (bus, transport) = SimBus::new();
        transport.send(&frame(0x42)).await.unwrap();
        transport.send(&frame(0x43)).await.unwrap();

        let sent = bus.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].id, 0x42);
        assert_eq!(sent[1].id, 0x43);
    }
}
