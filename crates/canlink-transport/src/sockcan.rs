//! SocketCAN-backed transport (Linux).
//!
//! Wraps the `socketcan` crate's tokio sockets. A classic socket and
//! an FD socket differ in which frames they can carry; the choice is
//! made once at `open` time, matching the kernel's own model.

use std::time::Duration;

use async_trait::async_trait;
use canlink_frame::{CanFilter, CanFrame};
#[cfg(target_os = "linux")]
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::CanTransport;

#[cfg(target_os = "linux")]
use socketcan::{
    tokio::{CanFdSocket as AsyncCanFdSocket, CanSocket as AsyncCanSocket},
    CanAnyFrame, EmbeddedFrame, ExtendedId, Id, SocketOptions, StandardId,
};

/// A CAN socket bound to one interface, classic or FD mode.
pub struct SocketCanTransport {
    #[cfg(target_os = "linux")]
    socket: SocketKind,
    interface: String,
}

#[cfg(target_os = "linux")]
enum SocketKind {
    Classic(AsyncCanSocket),
    Fd(AsyncCanFdSocket),
}

#[cfg(target_os = "linux")]
impl SocketCanTransport {
    /// Open `interface` (e.g. `can0`, `vcan0`). With `fd_mode` the
    /// socket accepts both classic and FD frames.
    pub fn open(interface: &str, fd_mode: bool) -> Result<Self> {
        let socket = if fd_mode {
            SocketKind::Fd(AsyncCanFdSocket::open(interface).map_err(|source| {
                TransportError::Open {
                    interface: interface.to_string(),
                    source,
                }
            })?)
        } else {
            SocketKind::Classic(AsyncCanSocket::open(interface).map_err(|source| {
                TransportError::Open {
                    interface: interface.to_string(),
                    source,
                }
            })?)
        };
        debug!(interface, fd_mode, "opened SocketCAN socket");
        Ok(Self {
            socket,
            interface: interface.to_string(),
        })
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl CanTransport for SocketCanTransport {
    async fn send(&self, frame: &CanFrame) -> Result<()> {
        match &self.socket {
            SocketKind::Classic(sock) => {
                if frame.fd {
                    return Err(TransportError::Unsupported(
                        "cannot send an FD frame on a classic CAN socket",
                    ));
                }
                let native = to_classic(frame)?;
                sock.write_frame(native).await.map_err(TransportError::Io)
            }
            SocketKind::Fd(sock) => {
                if frame.remote {
                    return Err(TransportError::Unsupported(
                        "remote frames are not supported on CAN FD sockets",
                    ));
                }
                let native = to_any(frame)?;
                sock.write_frame(&native).await.map_err(TransportError::Io)
            }
        }
    }

    async fn recv(&self, timeout: Duration) -> Result<CanFrame> {
        match &self.socket {
            SocketKind::Classic(sock) => {
                let frame = tokio::time::timeout(timeout, sock.read_frame())
                    .await
                    .map_err(|_| TransportError::Timeout(timeout))?
                    .map_err(TransportError::Io)?;
                Ok(from_classic(frame))
            }
            SocketKind::Fd(sock) => {
                let frame = tokio::time::timeout(timeout, sock.read_frame())
                    .await
                    .map_err(|_| TransportError::Timeout(timeout))?
                    .map_err(TransportError::Io)?;
                Ok(from_any(frame))
            }
        }
    }

    fn set_filters(&self, filters: &[CanFilter]) -> Result<()> {
        // The kernel treats an empty filter table as "drop everything";
        // an explicit accept-all rule keeps the semantics of clearing.
        let native: Vec<socketcan::CanFilter> = if filters.is_empty() {
            vec![socketcan::CanFilter::new(0, 0)]
        } else {
            filters
                .iter()
                .map(|f| socketcan::CanFilter::new(f.id, f.mask))
                .collect()
        };
        match &self.socket {
            SocketKind::Classic(sock) => sock.set_filters(&native).map_err(TransportError::Io),
            SocketKind::Fd(sock) => sock.set_filters(&native).map_err(TransportError::Io),
        }
    }

    fn clear_filters(&self) -> Result<()> {
        self.set_filters(&[])
    }

    fn interface(&self) -> &str {
        &self.interface
    }
}

#[cfg(target_os = "linux")]
fn make_id(frame: &CanFrame) -> Result<Id> {
    if frame.extended {
        ExtendedId::new(frame.id)
            .map(Id::Extended)
            .ok_or_else(|| TransportError::Construction(format!("invalid extended id {:#x}", frame.id)))
    } else {
        StandardId::new(frame.id as u16)
            .map(Id::Standard)
            .ok_or_else(|| TransportError::Construction(format!("invalid standard id {:#x}", frame.id)))
    }
}

#[cfg(target_os = "linux")]
fn split_id(id: Id) -> (u32, bool) {
    match id {
        Id::Standard(std_id) => (std_id.as_raw() as u32, false),
        Id::Extended(ext_id) => (ext_id.as_raw(), true),
    }
}

#[cfg(target_os = "linux")]
fn to_classic(frame: &CanFrame) -> Result<socketcan::CanFrame> {
    let id = make_id(frame)?;
    if frame.remote {
        socketcan::CanFrame::new_remote(id, frame.dlc as usize)
            .ok_or_else(|| TransportError::Construction("invalid remote frame".to_string()))
    } else {
        socketcan::CanFrame::new(id, &frame.data)
            .ok_or_else(|| TransportError::Construction("invalid frame data".to_string()))
    }
}

#[cfg(target_os = "linux")]
fn to_any(frame: &CanFrame) -> Result<CanAnyFrame> {
    if frame.fd {
        let id = make_id(frame)?;
        socketcan::CanFdFrame::new(id, &frame.data)
            .map(CanAnyFrame::from)
            .ok_or_else(|| TransportError::Construction("invalid FD frame data".to_string()))
    } else {
        to_classic(frame).map(CanAnyFrame::from)
    }
}

#[cfg(target_os = "linux")]
fn from_classic(frame: socketcan::CanFrame) -> CanFrame {
    match frame {
        socketcan::CanFrame::Data(f) => {
            let (id, extended) = split_id(f.id());
            CanFrame::from_parts(
                id,
                extended,
                f.data().to_vec(),
                f.data().len() as u8,
                false,
                false,
                false,
            )
        }
        socketcan::CanFrame::Remote(f) => {
            let (id, extended) = split_id(f.id());
            CanFrame::from_parts(id, extended, Vec::new(), f.dlc() as u8, true, false, false)
        }
        socketcan::CanFrame::Error(f) => {
            let (id, extended) = split_id(f.id());
            CanFrame::from_parts(
                id,
                extended,
                f.data().to_vec(),
                f.data().len() as u8,
                false,
                true,
                false,
            )
        }
    }
}

#[cfg(target_os = "linux")]
fn from_any(frame: CanAnyFrame) -> CanFrame {
    match frame {
        CanAnyFrame::Normal(f) => from_classic(socketcan::CanFrame::Data(f)),
        CanAnyFrame::Remote(f) => from_classic(socketcan::CanFrame::Remote(f)),
        CanAnyFrame::Error(f) => from_classic(socketcan::CanFrame::Error(f)),
        CanAnyFrame::Fd(f) => {
            let (id, extended) = split_id(f.id());
            CanFrame::from_parts(
                id,
                extended,
                f.data().to_vec(),
                f.data().len() as u8,
                false,
                false,
                true,
            )
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl SocketCanTransport {
    /// SocketCAN requires Linux; this always fails elsewhere.
    pub fn open(_interface: &str, _fd_mode: bool) -> Result<Self> {
        Err(TransportError::PlatformUnsupported)
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl CanTransport for SocketCanTransport {
    async fn send(&self, _frame: &CanFrame) -> Result<()> {
        Err(TransportError::PlatformUnsupported)
    }

    async fn recv(&self, _timeout: Duration) -> Result<CanFrame> {
        Err(TransportError::PlatformUnsupported)
    }

    fn set_filters(&self, _filters: &[CanFilter]) -> Result<()> {
        Err(TransportError::PlatformUnsupported)
    }

    fn clear_filters(&self) -> Result<()> {
        Err(TransportError::PlatformUnsupported)
    }

    fn interface(&self) -> &str {
        &self.interface
    }
}
