use std::time::Duration;

use async_trait::async_trait;
use canlink_frame::{CanFilter, CanFrame};

use crate::error::Result;

/// Contract every CAN backend implements.
///
/// One handle maps to one kernel socket (or one simulated bus slot).
/// Each successful `recv` hands a frame to exactly one caller; the
/// receive side is a single shared resource and the layers above are
/// responsible for deciding who drives it.
#[async_trait]
pub trait CanTransport: Send + Sync {
    /// Write one already-validated frame to the bus.
    async fn send(&self, frame: &CanFrame) -> Result<()>;

    /// Read the next frame, waiting at most `timeout`.
    ///
    /// Fails with [`TransportError::Timeout`] when the deadline
    /// elapses. Cancel safety: dropping the returned future before it
    /// resolves must not consume a frame.
    ///
    /// [`TransportError::Timeout`]: crate::TransportError::Timeout
    async fn recv(&self, timeout: Duration) -> Result<CanFrame>;

    /// Install acceptance filters. An empty slice installs an
    /// accept-all rule.
    fn set_filters(&self, filters: &[CanFilter]) -> Result<()>;

    /// Remove all filters (accept every frame again).
    fn clear_filters(&self) -> Result<()>;

    /// Name of the underlying interface.
    fn interface(&self) -> &str;
}
