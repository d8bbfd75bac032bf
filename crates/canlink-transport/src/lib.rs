//! CAN transport abstraction.
//!
//! Defines the capability surface the consumption layers build on —
//! one handle, validated send, one bounded read at a time — and ships
//! two backends: the Linux SocketCAN socket and, behind the `sim`
//! feature, an in-memory bus for tests.

pub mod error;
pub mod sockcan;
pub mod traits;

#[cfg(feature = "sim")]
pub mod sim;

pub use error::{Result, TransportError};
pub use sockcan::SocketCanTransport;
pub use traits::CanTransport;

#[cfg(feature = "sim")]
pub use sim::{SimBus, SimTransport};
