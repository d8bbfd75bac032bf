use std::time::Duration;

/// Errors that can occur in CAN transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A bounded read elapsed without a frame arriving. Expected
    /// during normal operation; callers decide whether it matters.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// Failed to open the interface.
    #[error("failed to open CAN interface {interface}: {source}")]
    Open {
        interface: String,
        source: std::io::Error,
    },

    /// The socket mode cannot carry this frame (FD frame on a classic
    /// socket, remote frame on an FD socket).
    #[error("{0}")]
    Unsupported(&'static str),

    /// The native layer refused to assemble the frame.
    #[error("could not construct kernel frame: {0}")]
    Construction(String),

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SocketCAN is unavailable on this platform.
    #[error("SocketCAN is only supported on Linux")]
    PlatformUnsupported,
}

pub type Result<T> = std::result::Result<T, TransportError>;
