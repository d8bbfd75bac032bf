use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use canlink_frame::{CanFilter, CanFrame, FrameKind};
use canlink_transport::{CanTransport, SocketCanTransport};
use tracing::{debug, warn};

use crate::dispatch::{BusEvent, EventDispatcher, EventKind, ObserverId};
use crate::error::{CanError, Result};
use crate::listener::{self, ListenOptions, ListenerHandle, LoopExit};
use crate::reader::{ReadGuard, ReaderOwner, ReaderSlot};
use crate::stream::{FrameFilter, FrameStream, StreamOptions};

/// Default deadline for one-shot receives and stream pulls.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);

/// Options for [`CanBus::open_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BusConfig {
    /// Open the socket in CAN FD mode. An FD socket carries both
    /// classic and FD frames; a classic socket rejects FD frames.
    pub fd_mode: bool,
}

impl BusConfig {
    pub fn with_fd_mode(mut self, fd_mode: bool) -> Self {
        self.fd_mode = fd_mode;
        self
    }
}

/// State shared between the bus handle, the listener task, and any
/// live pull sequence.
pub(crate) struct BusShared {
    interface: String,
    transport: RwLock<Option<Arc<dyn CanTransport>>>,
    reader: ReaderSlot,
    dispatcher: EventDispatcher,
}

impl BusShared {
    fn new(transport: Arc<dyn CanTransport>) -> Self {
        Self {
            interface: transport.interface().to_string(),
            transport: RwLock::new(Some(transport)),
            reader: ReaderSlot::new(),
            dispatcher: EventDispatcher::new(),
        }
    }

    /// The live transport, or `NOT_OPEN` after close.
    pub fn transport(&self) -> Result<Arc<dyn CanTransport>> {
        self.transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CanError::NotOpen)
    }

    fn take_transport(&self) -> Option<Arc<dyn CanTransport>> {
        self.transport
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn reader(&self) -> &ReaderSlot {
        &self.reader
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}

/// A handle to one CAN interface.
///
/// The bus exposes three ways to consume the receive side: registered
/// observers fed by a polling listener ([`start_listening`]), lazy
/// pull sequences ([`frames`] and friends), and one-shot reads
/// ([`receive`]). The listener and the pull sequences are alternative
/// drivers of the single receive channel; whichever starts first owns
/// it until it finishes, and the other fails fast instead of queuing.
/// `receive` performs an unguarded read: calling it while a listener
/// or sequence is active means the two race for the next frame, each
/// frame going to exactly one of them.
///
/// [`start_listening`]: CanBus::start_listening
/// [`frames`]: CanBus::frames
/// [`receive`]: CanBus::receive
pub struct CanBus {
    shared: Arc<BusShared>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl CanBus {
    /// Open `interface` (e.g. `can0`, `vcan0`) as a classic CAN socket.
    pub fn open(interface: &str) -> Result<Self> {
        Self::open_with(interface, BusConfig::default())
    }

    /// Open with explicit configuration.
    pub fn open_with(interface: &str, config: BusConfig) -> Result<Self> {
        let transport = SocketCanTransport::open(interface, config.fd_mode)?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Build a bus over an already-open transport.
    ///
    /// The seam for alternative backends and for tests driving a
    /// simulated bus.
    pub fn with_transport(transport: Arc<dyn CanTransport>) -> Self {
        Self {
            shared: Arc::new(BusShared::new(transport)),
            listener: Mutex::new(None),
        }
    }

    /// Whether the underlying transport is still held.
    pub fn is_open(&self) -> bool {
        self.shared
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Name of the interface this bus was opened on.
    pub fn interface(&self) -> &str {
        &self.shared.interface
    }

    /// Close the bus.
    ///
    /// Stops a running listener first, then drops the transport and
    /// emits `Closed`. Live pull sequences fail `NOT_OPEN` on their
    /// next read. Closing an already-closed bus fails `NOT_OPEN`.
    pub async fn close(&self) -> Result<()> {
        self.stop_listening().await;
        self.shared.take_transport().ok_or(CanError::NotOpen)?;
        debug!(interface = %self.shared.interface, "bus closed");
        self.shared.dispatcher().emit(&BusEvent::Closed);
        Ok(())
    }

    /// Write one frame to the bus.
    ///
    /// The frame was validated at construction; this call only maps
    /// transport failures. Never retried.
    pub async fn send(&self, frame: &CanFrame) -> Result<()> {
        let transport = self.shared.transport()?;
        transport.send(frame).await.map_err(CanError::from)
    }

    /// Read the next frame, waiting at most `timeout` (default
    /// [`DEFAULT_RECEIVE_TIMEOUT`]).
    ///
    /// An elapsed deadline fails with `RECEIVE_TIMEOUT`. This read is
    /// not arbitrated by the reader slot; see the type-level note on
    /// mixing it with a listener or a sequence.
    pub async fn receive(&self, timeout: Option<Duration>) -> Result<CanFrame> {
        let timeout = timeout.unwrap_or(DEFAULT_RECEIVE_TIMEOUT);
        let transport = self.shared.transport()?;
        transport.recv(timeout).await.map_err(CanError::from)
    }

    /// Install acceptance filters, validating ranges first.
    ///
    /// An empty slice resolves to an accept-all rule.
    pub fn set_filters(&self, filters: &[CanFilter]) -> Result<()> {
        for filter in filters {
            filter.validate()?;
        }
        let transport = self.shared.transport()?;
        transport.set_filters(filters).map_err(CanError::from)
    }

    /// Remove all filters, accepting every frame again.
    pub fn clear_filters(&self) -> Result<()> {
        let transport = self.shared.transport()?;
        transport.clear_filters().map_err(CanError::from)
    }

    /// Register an observer for one event kind. Observers run in
    /// registration order, synchronously with the tick that produced
    /// the event. Register an `Error` observer before
    /// [`start_listening`] to see listener failures; without one they
    /// are logged and dropped.
    ///
    /// [`start_listening`]: CanBus::start_listening
    pub fn on<F>(&self, kind: EventKind, observer: F) -> ObserverId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.shared.dispatcher().on(kind, observer)
    }

    /// Remove a registered observer. Returns whether it was still
    /// registered.
    pub fn off(&self, id: ObserverId) -> bool {
        self.shared.dispatcher().off(id)
    }

    /// Start the polling listener.
    ///
    /// Fails `NOT_OPEN` on a closed bus and `ALREADY_LISTENING` when
    /// the receive side is already owned (by a listener or a pull
    /// sequence), leaving the current owner untouched. Otherwise the
    /// loop is spawned and this returns once it is armed and the
    /// `Listening` event has been emitted.
    pub async fn start_listening(&self, options: ListenOptions) -> Result<()> {
        let transport = self.shared.transport()?;
        let guard = ReadGuard::try_acquire(&self.shared, ReaderOwner::Listener)
            .ok_or(CanError::AlreadyListening)?;
        let (handle, armed) = listener::spawn(Arc::clone(&self.shared), transport, options, guard);
        *self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        // Resolves once the loop has emitted `Listening`.
        let _ = armed.await;
        Ok(())
    }

    /// Stop the polling listener.
    ///
    /// Idempotent. When a session is running, cancels it, waits for
    /// the loop to exit (no tick fires after this returns), and emits
    /// `Stopped`. When idle — including after a fatal read error
    /// already tore the session down — this is a no-op and emits
    /// nothing.
    pub async fn stop_listening(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(ListenerHandle { token, task }) = handle else {
            return;
        };
        token.cancel();
        match task.await {
            // The failure path already announced itself with an
            // `Error` event and released the receive slot.
            Ok(LoopExit::Failed) => {}
            Ok(LoopExit::Cancelled) => self.shared.dispatcher().emit(&BusEvent::Stopped),
            Err(err) => warn!(%err, "listener task did not exit cleanly"),
        }
    }

    /// Whether a listener session currently owns the receive side.
    pub fn is_listening(&self) -> bool {
        self.shared.reader().owner() == ReaderOwner::Listener
    }

    /// A lazy pull sequence of frames.
    ///
    /// Fails `NOT_OPEN` on a closed bus and `READER_BUSY` when the
    /// receive side is already owned. The sequence holds the receive
    /// side for its whole life; drop it to release.
    pub fn frames(&self, options: StreamOptions) -> Result<FrameStream> {
        self.stream_with(Vec::new(), options)
    }

    /// [`frames`] restricted to one arbitration id. A caller-supplied
    /// filter in `options` applies on top; a frame must satisfy both.
    ///
    /// [`frames`]: CanBus::frames
    pub fn frames_with_id(&self, id: u32, options: StreamOptions) -> Result<FrameStream> {
        let implicit: FrameFilter = Arc::new(move |frame: &CanFrame| frame.id == id);
        self.stream_with(vec![implicit], options)
    }

    /// [`frames`] restricted to one frame kind, composed with any
    /// caller-supplied filter the same way as [`frames_with_id`].
    ///
    /// [`frames`]: CanBus::frames
    /// [`frames_with_id`]: CanBus::frames_with_id
    pub fn frames_of_type(&self, kind: FrameKind, options: StreamOptions) -> Result<FrameStream> {
        let implicit: FrameFilter = Arc::new(move |frame: &CanFrame| frame.kind() == kind);
        self.stream_with(vec![implicit], options)
    }

    fn stream_with(&self, implicit: Vec<FrameFilter>, options: StreamOptions) -> Result<FrameStream> {
        self.shared.transport()?;
        let guard = ReadGuard::try_acquire(&self.shared, ReaderOwner::Stream)
            .ok_or(CanError::ReaderBusy)?;
        Ok(FrameStream::new(
            Arc::clone(&self.shared),
            guard,
            implicit,
            options,
        ))
    }

    /// Drive a [`frames`] sequence to exhaustion and return the
    /// collected list.
    ///
    /// `max_frames` is required and overrides any limit in `options`.
    /// All-or-nothing: a failure before `max_frames` frames have
    /// arrived fails the whole call and no partial list is returned.
    ///
    /// [`frames`]: CanBus::frames
    pub async fn collect_frames(
        &self,
        max_frames: usize,
        options: StreamOptions,
    ) -> Result<Vec<CanFrame>> {
        let mut stream = self.frames(StreamOptions {
            max_frames: Some(max_frames),
            ..options
        })?;
        let mut collected = Vec::with_capacity(max_frames);
        while let Some(item) = stream.next().await {
            collected.push(item?);
        }
        Ok(collected)
    }
}

impl std::fmt::Debug for CanBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanBus")
            .field("interface", &self.shared.interface)
            .field("open", &self.is_open())
            .field("reader", &self.shared.reader().owner())
            .finish()
    }
}
