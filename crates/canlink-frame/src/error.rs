/// Errors produced by frame construction and filter validation.
///
/// All checks run before anything touches the kernel; none of them
/// have side effects or retry.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The id does not fit the addressing mode.
    #[error("invalid CAN id {id:#x} (max {max:#x} for this addressing mode)")]
    InvalidId { id: u32, max: u32 },

    /// The payload exceeds the frame format's byte limit.
    #[error("data too long ({len} bytes, max {max})")]
    DataTooLong { len: usize, max: usize },

    /// The payload length cannot be encoded by the FD wire format.
    #[error("invalid CAN FD data length {len} (not an encodable size)")]
    InvalidFdLength { len: usize },

    /// A remote frame requested more bytes than a classic frame holds.
    #[error("invalid remote dlc {dlc} (max 8)")]
    InvalidDlc { dlc: u8 },

    /// Remote and FD framing cannot be combined.
    #[error("a frame cannot be both remote and FD")]
    RemoteFd,

    /// A remote frame is a dlc-only request and carries no payload.
    #[error("remote frame carries a payload ({len} bytes)")]
    RemotePayload { len: usize },

    /// A filter id or mask is out of range.
    #[error("invalid filter: {field} {value:#x} exceeds {max:#x}")]
    InvalidFilter {
        field: &'static str,
        value: u32,
        max: u32,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
