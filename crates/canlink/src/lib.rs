//! Event-driven and async-stream access to CAN buses.
//!
//! This is the "just works" layer. Open an interface, then consume
//! frames whichever way fits the application: registered observers
//! fed by a polling listener, lazy async sequences pulled on demand,
//! or a one-shot batch collection.
//!
//! ```no_run
//! use canlink::{CanBus, StreamOptions};
//!
//! # async fn demo() -> canlink::Result<()> {
//! let bus = CanBus::open("can0")?;
//! let mut stream = bus.frames(StreamOptions::default().with_max_frames(10))?;
//! while let Some(frame) = stream.next().await {
//!     println!("{:?}", frame?);
//! }
//! bus.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The listener and the pull sequences are alternative consumers of
//! one receive channel; the bus arbitrates them with a single owner
//! marker, so starting one while the other runs fails fast instead of
//! splitting the frame stream between them.

pub mod bus;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod stream;

mod reader;

pub use bus::{BusConfig, CanBus, DEFAULT_RECEIVE_TIMEOUT};
pub use dispatch::{BusEvent, EventKind, ObserverId};
pub use error::{CanError, Result};
pub use listener::{ListenOptions, DEFAULT_LISTEN_INTERVAL, DEFAULT_READ_TIMEOUT};
pub use stream::{FrameFilter, FrameStream, StreamOptions};

// Data and transport layers, re-exported so applications depend on
// one crate.
pub use canlink_frame::{
    is_can_fd_frame, is_error_frame, is_remote_frame, CanFilter, CanFrame, FrameKind, FrameOptions,
};
pub use canlink_transport::{CanTransport, SocketCanTransport, TransportError};
