use std::sync::Arc;
use std::time::Duration;

use canlink_transport::{CanTransport, TransportError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::bus::BusShared;
use crate::dispatch::BusEvent;
use crate::error::CanError;
use crate::reader::ReadGuard;

/// Default pause between read attempts.
pub const DEFAULT_LISTEN_INTERVAL: Duration = Duration::from_millis(50);

/// Default per-tick read deadline. Kept short so a tick never
/// overlaps the next one at the default interval.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Options for `CanBus::start_listening`.
#[derive(Debug, Clone)]
pub struct ListenOptions {
    /// Time between read attempts.
    pub interval: Duration,
    /// Deadline for the single read each tick performs. An elapsed
    /// deadline is a normal empty tick, never an error.
    pub read_timeout: Duration,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_LISTEN_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ListenOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }
}

/// Why the polling loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    /// `stop_listening` cancelled the loop.
    Cancelled,
    /// A non-timeout read failure tore the session down.
    Failed,
}

pub(crate) struct ListenerHandle {
    pub token: CancellationToken,
    pub task: JoinHandle<LoopExit>,
}

/// Spawn the polling loop. The returned receiver resolves once the
/// loop is armed and the `Listening` event has been emitted.
pub(crate) fn spawn(
    shared: Arc<BusShared>,
    transport: Arc<dyn CanTransport>,
    options: ListenOptions,
    guard: ReadGuard,
) -> (ListenerHandle, oneshot::Receiver<()>) {
    let token = CancellationToken::new();
    let (armed_tx, armed_rx) = oneshot::channel();
    let task = tokio::spawn(run(
        shared,
        transport,
        options,
        token.clone(),
        guard,
        armed_tx,
    ));
    (ListenerHandle { token, task }, armed_rx)
}

/// One repeating task: a single timeout-bounded read per tick, routed
/// to the dispatcher. The read guard travels with the task so the
/// receive slot frees itself on any exit path.
async fn run(
    shared: Arc<BusShared>,
    transport: Arc<dyn CanTransport>,
    options: ListenOptions,
    token: CancellationToken,
    guard: ReadGuard,
    armed: oneshot::Sender<()>,
) -> LoopExit {
    shared.dispatcher().emit(&BusEvent::Listening);
    let _ = armed.send(());

    let mut ticker = tokio::time::interval(options.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            _ = token.cancelled() => break LoopExit::Cancelled,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => break LoopExit::Cancelled,
            result = transport.recv(options.read_timeout) => result,
        };

        match result {
            Ok(frame) => shared.dispatcher().emit(&BusEvent::Frame(frame)),
            Err(TransportError::Timeout(_)) => {
                // Nothing arrived this tick.
            }
            Err(err) => {
                error!(%err, "listener read failed, stopping session");
                shared
                    .dispatcher()
                    .emit(&BusEvent::Error(CanError::Listening { source: err }));
                break LoopExit::Failed;
            }
        }
    };

    debug!(?exit, "listener loop exited");
    drop(guard);
    exit
}
