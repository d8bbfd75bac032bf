use std::time::Duration;

use canlink_frame::FrameError;
use canlink_transport::TransportError;

/// Errors surfaced by bus operations.
///
/// Every variant maps to a stable machine-readable code through
/// [`CanError::code`], the branching key applications use to tell an
/// expected timeout from a fatal session failure.
#[derive(Debug, thiserror::Error)]
pub enum CanError {
    /// Operation on a bus that was never opened or already closed.
    #[error("bus is not open")]
    NotOpen,

    /// `start_listening` while the receive side is already owned.
    #[error("already listening on this bus")]
    AlreadyListening,

    /// A pull sequence was requested while another reader owns the
    /// receive side.
    #[error("another reader is active on this bus")]
    ReaderBusy,

    /// A bounded read elapsed. The listener swallows these; one-shot
    /// receives and stream pulls surface them.
    #[error("receive timed out after {0:?}")]
    ReceiveTimeout(Duration),

    /// Non-timeout failure inside a listener tick. Fatal to the
    /// listening session; the listener has already stopped itself.
    #[error("listening failed: {source}")]
    Listening { source: TransportError },

    /// Frame construction or filter validation failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Wrapped native failure from the transport layer.
    #[error("transport error: {0}")]
    Transport(TransportError),
}

impl CanError {
    /// Stable code for programmatic branching.
    pub fn code(&self) -> &'static str {
        match self {
            CanError::NotOpen => "NOT_OPEN",
            CanError::AlreadyListening => "ALREADY_LISTENING",
            CanError::ReaderBusy => "READER_BUSY",
            CanError::ReceiveTimeout(_) => "RECEIVE_TIMEOUT",
            CanError::Listening { .. } => "LISTENING_ERROR",
            CanError::Frame(err) => match err {
                FrameError::InvalidId { .. } => "INVALID_ID",
                FrameError::DataTooLong { .. }
                | FrameError::InvalidFdLength { .. }
                | FrameError::InvalidDlc { .. } => "INVALID_DATA_LENGTH",
                FrameError::RemoteFd | FrameError::RemotePayload { .. } => {
                    "INVALID_FRAME_COMBINATION"
                }
                FrameError::InvalidFilter { .. } => "INVALID_FILTER",
            },
            CanError::Transport(_) => "TRANSPORT_ERROR",
        }
    }
}

impl From<TransportError> for CanError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(timeout) => CanError::ReceiveTimeout(timeout),
            other => CanError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CanError>;
