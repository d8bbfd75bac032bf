use bytes::Bytes;

use crate::error::{FrameError, Result};

/// Highest id expressible with 11-bit (standard) addressing.
pub const STANDARD_ID_MAX: u32 = 0x7FF;

/// Highest id expressible with 29-bit (extended) addressing.
pub const EXTENDED_ID_MAX: u32 = 0x1FFF_FFFF;

/// Maximum payload of a classic CAN 2.0 frame.
pub const CLASSIC_MAX_DATA: usize = 8;

/// Maximum payload of a CAN FD frame.
pub const FD_MAX_DATA: usize = 64;

/// Largest data length a remote frame may request.
pub const REMOTE_MAX_DLC: u8 = 8;

/// Payload lengths the FD wire format can encode.
pub const FD_VALID_LENGTHS: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// The four mutually exclusive frame categories used by filtering
/// and event routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FrameKind {
    /// Application data frame.
    Data,
    /// Dlc-only request with no payload.
    Remote,
    /// Controller-reported bus error.
    Error,
    /// CAN FD framing (up to 64 payload bytes).
    Fd,
}

impl FrameKind {
    /// Lowercase name, matching the wire-level vocabulary.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Data => "data",
            FrameKind::Remote => "remote",
            FrameKind::Error => "error",
            FrameKind::Fd => "fd",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flags for [`CanFrame::outbound`].
///
/// `extended` is auto-derived from the id when left unset; the other
/// flags default to a plain data frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameOptions {
    /// Force standard or extended addressing. `None` derives it:
    /// ids above [`STANDARD_ID_MAX`] become extended.
    pub extended: Option<bool>,
    /// Mark the frame as CAN FD.
    pub fd: bool,
    /// Mark the frame as a remote (dlc-only) request.
    pub remote: bool,
    /// Requested data length for remote frames. Defaults to 0.
    pub dlc: Option<u8>,
}

impl FrameOptions {
    pub fn extended(mut self, extended: bool) -> Self {
        self.extended = Some(extended);
        self
    }

    pub fn fd(mut self) -> Self {
        self.fd = true;
        self
    }

    pub fn remote(mut self, dlc: u8) -> Self {
        self.remote = true;
        self.dlc = Some(dlc);
        self
    }
}

/// One bus message unit.
///
/// A frame is only constructed two ways: by a transport on receive
/// ([`CanFrame::from_parts`], trusting the kernel) or by the validating
/// constructors on send. Either way it is immutable afterwards and
/// lives for the duration of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanFrame {
    /// Arbitration id; 11-bit standard or 29-bit extended.
    pub id: u32,
    /// Extended (29-bit) addressing.
    pub extended: bool,
    /// Payload bytes. Empty for remote frames.
    pub data: Bytes,
    /// Data length code: the payload length, or the requested length
    /// for remote frames.
    pub dlc: u8,
    /// Dlc-only request with no payload.
    pub remote: bool,
    /// Controller-reported error condition. May combine with either
    /// of the other flags.
    pub error: bool,
    /// CAN FD framing.
    pub fd: bool,
}

impl CanFrame {
    /// Validate and build an outbound frame.
    ///
    /// This is the single validation gate: every check here runs
    /// before any native call, and the checks never retry.
    pub fn outbound(id: u32, data: impl Into<Bytes>, opts: FrameOptions) -> Result<Self> {
        let data = data.into();

        if opts.fd && opts.remote {
            return Err(FrameError::RemoteFd);
        }
        if opts.remote && !data.is_empty() {
            return Err(FrameError::RemotePayload { len: data.len() });
        }

        let extended = opts.extended.unwrap_or(id > STANDARD_ID_MAX);
        let max = if extended {
            EXTENDED_ID_MAX
        } else {
            STANDARD_ID_MAX
        };
        if id > max {
            return Err(FrameError::InvalidId { id, max });
        }

        let dlc = if opts.remote {
            let dlc = opts.dlc.unwrap_or(0);
            if dlc > REMOTE_MAX_DLC {
                return Err(FrameError::InvalidDlc { dlc });
            }
            dlc
        } else if opts.fd {
            if data.len() > FD_MAX_DATA {
                return Err(FrameError::DataTooLong {
                    len: data.len(),
                    max: FD_MAX_DATA,
                });
            }
            if !FD_VALID_LENGTHS.contains(&data.len()) {
                return Err(FrameError::InvalidFdLength { len: data.len() });
            }
            data.len() as u8
        } else {
            if data.len() > CLASSIC_MAX_DATA {
                return Err(FrameError::DataTooLong {
                    len: data.len(),
                    max: CLASSIC_MAX_DATA,
                });
            }
            data.len() as u8
        };

        Ok(Self {
            id,
            extended,
            data,
            dlc,
            remote: opts.remote,
            error: false,
            fd: opts.fd,
        })
    }

    /// Classic data frame with auto-derived addressing.
    pub fn data(id: u32, data: impl Into<Bytes>) -> Result<Self> {
        Self::outbound(id, data, FrameOptions::default())
    }

    /// Remote frame requesting `dlc` bytes.
    pub fn remote(id: u32, dlc: u8) -> Result<Self> {
        Self::outbound(id, Bytes::new(), FrameOptions::default().remote(dlc))
    }

    /// CAN FD data frame with auto-derived addressing.
    pub fn fd(id: u32, data: impl Into<Bytes>) -> Result<Self> {
        Self::outbound(id, data, FrameOptions::default().fd())
    }

    /// Assemble a received frame from decoded parts.
    ///
    /// Transports call this with values the kernel already vetted, so
    /// no validation runs. `dlc` falls back to the payload length for
    /// non-remote frames.
    pub fn from_parts(
        id: u32,
        extended: bool,
        data: impl Into<Bytes>,
        dlc: u8,
        remote: bool,
        error: bool,
        fd: bool,
    ) -> Self {
        Self {
            id,
            extended,
            data: data.into(),
            dlc,
            remote,
            error,
            fd,
        }
    }

    /// Classify this frame. Total and pure; precedence is
    /// error > remote > fd > data.
    pub fn kind(&self) -> FrameKind {
        if self.error {
            FrameKind::Error
        } else if self.remote {
            FrameKind::Remote
        } else if self.fd {
            FrameKind::Fd
        } else {
            FrameKind::Data
        }
    }

    pub fn is_remote_frame(&self) -> bool {
        self.kind() == FrameKind::Remote
    }

    pub fn is_error_frame(&self) -> bool {
        self.kind() == FrameKind::Error
    }

    pub fn is_can_fd_frame(&self) -> bool {
        self.kind() == FrameKind::Fd
    }
}

/// Free-function form of [`CanFrame::is_remote_frame`].
pub fn is_remote_frame(frame: &CanFrame) -> bool {
    frame.is_remote_frame()
}

/// Free-function form of [`CanFrame::is_error_frame`].
pub fn is_error_frame(frame: &CanFrame) -> bool {
    frame.is_error_frame()
}

/// Free-function form of [`CanFrame::is_can_fd_frame`].
pub fn is_can_fd_frame(frame: &CanFrame) -> bool {
    frame.is_can_fd_frame()
}
