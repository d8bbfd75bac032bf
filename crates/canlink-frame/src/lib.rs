//! CAN frame model, classification, and outbound validation.
//!
//! This is the pure data layer: no I/O, no allocation beyond the
//! payload bytes. Frames enter the system either from a transport
//! (already vetted by the kernel) or through the validating
//! constructors, and are immutable afterwards.

pub mod error;
pub mod filter;
pub mod frame;

pub use error::{FrameError, Result};
pub use filter::CanFilter;
pub use frame::{
    is_can_fd_frame, is_error_frame, is_remote_frame, CanFrame, FrameKind, FrameOptions,
    CLASSIC_MAX_DATA, EXTENDED_ID_MAX, FD_MAX_DATA, FD_VALID_LENGTHS, REMOTE_MAX_DLC,
    STANDARD_ID_MAX,
};
