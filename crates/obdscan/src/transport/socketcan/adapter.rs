//! Raw SocketCAN transport
//!
//! Frames go through a raw `CanSocket`. Blocking socket calls run on the
//! blocking thread pool with the caller's timeout applied as the socket
//! read/write timeout. Bus speed changes take the interface down, set the
//! bitrate over netlink and bring it back up, then reopen the socket.

use std::io::{self, ErrorKind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use socketcan::{
    CanFrame, CanInterface, CanSocket, EmbeddedFrame, ExtendedId, Frame as _, Socket,
    SocketOptions as _, StandardId,
};
use tracing::{debug, info, trace};

use crate::config::SocketCanConfig;
use crate::transport::{BusSpeed, CanTransport, Frame, TransportError};

/// Raw CAN transport on a Linux SocketCAN interface
pub struct SocketCanTransport {
    config: SocketCanConfig,
    socket: Arc<Mutex<CanSocket>>,
}

impl SocketCanTransport {
    /// Open a raw socket on an interface that is already up
    pub async fn open(config: &SocketCanConfig) -> Result<Self, TransportError> {
        let socket = open_socket(config.interface.clone()).await?;
        info!(interface = %config.interface, "Opened raw CAN socket");
        Ok(Self {
            config: config.clone(),
            socket: Arc::new(Mutex::new(socket)),
        })
    }
}

async fn open_socket(interface: String) -> Result<CanSocket, TransportError> {
    tokio::task::spawn_blocking(move || {
        CanSocket::open(&interface).map_err(|e| {
            TransportError::ConnectionFailed(format!(
                "Failed to open raw CAN socket on {}: {}",
                interface, e
            ))
        })
    })
    .await
    .map_err(|e| TransportError::ConnectionFailed(format!("Socket task join error: {}", e)))?
}

fn set_bitrate(interface: &str, speed: BusSpeed) -> Result<(), TransportError> {
    let iface = CanInterface::open(interface).map_err(|e| {
        TransportError::ReconfigureFailed(format!("Failed to open {}: {}", interface, e))
    })?;
    iface.bring_down().map_err(|e| {
        TransportError::ReconfigureFailed(format!("Failed to bring {} down: {}", interface, e))
    })?;
    iface.set_bitrate(speed.bits_per_second(), None::<u32>).map_err(|e| {
        TransportError::ReconfigureFailed(format!(
            "Failed to set {} on {}: {}",
            speed, interface, e
        ))
    })?;
    iface.bring_up().map_err(|e| {
        TransportError::ReconfigureFailed(format!("Failed to bring {} up: {}", interface, e))
    })
}

fn to_socket_frame(frame: &Frame) -> Result<CanFrame, TransportError> {
    let built = if frame.is_extended() {
        ExtendedId::new(frame.id()).and_then(|id| CanFrame::new(id, frame.payload()))
    } else {
        u16::try_from(frame.id())
            .ok()
            .and_then(StandardId::new)
            .and_then(|id| CanFrame::new(id, frame.payload()))
    };
    built.ok_or_else(|| TransportError::InvalidFrame(frame.to_string()))
}

fn from_socket_frame(frame: &CanFrame) -> Result<Option<Frame>, TransportError> {
    match frame {
        CanFrame::Data(_) => {
            let converted = if EmbeddedFrame::is_extended(frame) {
                Frame::extended(frame.raw_id(), frame.data())?
            } else {
                Frame::standard(frame.raw_id(), frame.data())?
            };
            Ok(Some(converted))
        }
        // Remote and error frames carry no diagnostic payload
        CanFrame::Remote(_) | CanFrame::Error(_) => Ok(None),
    }
}

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Read until a data frame arrives or `timeout` runs out
///
/// Remote and error frames are skipped; `Ok(None)` means only that the
/// time ran out.
fn read_data_frame<R>(timeout: Duration, mut read: R) -> Result<Option<Frame>, TransportError>
where
    R: FnMut(Duration) -> io::Result<CanFrame>,
{
    let until = Instant::now() + timeout;
    loop {
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        match read(remaining) {
            Ok(frame) => match from_socket_frame(&frame)? {
                Some(frame) => return Ok(Some(frame)),
                None => trace!(id = frame.raw_id(), "Skipping non-data frame"),
            },
            Err(e) if is_timeout(e.kind()) => return Ok(None),
            Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
        }
    }
}

#[async_trait]
impl CanTransport for SocketCanTransport {
    async fn transmit(&mut self, frame: &Frame, timeout: Duration) -> Result<(), TransportError> {
        let socket_frame = to_socket_frame(frame)?;
        let socket = self.socket.clone();

        tokio::task::spawn_blocking(move || {
            let socket = socket.lock();
            socket
                .set_write_timeout(timeout)
                .map_err(|e| TransportError::SendFailed(format!("Failed to set timeout: {}", e)))?;
            socket
                .write_frame(&socket_frame)
                .map_err(|e| TransportError::SendFailed(e.to_string()))
        })
        .await
        .map_err(|e| TransportError::SendFailed(format!("Send task join error: {}", e)))??;

        debug!(%frame, "Frame transmitted");
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        if timeout.is_zero() {
            return Ok(None);
        }
        let socket = self.socket.clone();

        tokio::task::spawn_blocking(move || {
            let socket = socket.lock();
            read_data_frame(timeout, |remaining| {
                socket.set_read_timeout(remaining)?;
                socket.read_frame()
            })
        })
        .await
        .map_err(|e| TransportError::ReceiveFailed(format!("Receive task join error: {}", e)))?
    }

    async fn reconfigure(&mut self, speed: BusSpeed) -> Result<(), TransportError> {
        if !self.config.set_bitrate {
            debug!(
                interface = %self.config.interface,
                %speed,
                "Bitrate management disabled, keeping interface settings"
            );
            return Ok(());
        }

        let interface = self.config.interface.clone();
        tokio::task::spawn_blocking(move || set_bitrate(&interface, speed))
            .await
            .map_err(|e| {
                TransportError::ReconfigureFailed(format!("Netlink task join error: {}", e))
            })??;

        let socket = open_socket(self.config.interface.clone()).await?;
        *self.socket.lock() = socket;

        info!(interface = %self.config.interface, %speed, "CAN interface reconfigured");
        Ok(())
    }
}
