//! Transport adapter trait and frame types

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::TransportError;

/// Maximum payload of a classic CAN frame
pub const MAX_FRAME_LEN: usize = 8;

/// Largest 11-bit identifier
const MAX_STANDARD_ID: u32 = 0x7FF;
/// Largest 29-bit identifier
const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Bus bit rate in bits per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusSpeed(pub u32);

impl BusSpeed {
    pub const KBPS_125: BusSpeed = BusSpeed(125_000);
    pub const KBPS_250: BusSpeed = BusSpeed(250_000);
    pub const KBPS_500: BusSpeed = BusSpeed(500_000);
    pub const MBPS_1: BusSpeed = BusSpeed(1_000_000);

    pub fn bits_per_second(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BusSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 >= 1_000_000 && self.0 % 1_000_000 == 0 {
            write!(f, "{} Mbit/s", self.0 / 1_000_000)
        } else if self.0 % 1_000 == 0 {
            write!(f, "{} kbit/s", self.0 / 1_000)
        } else {
            write!(f, "{} bit/s", self.0)
        }
    }
}

/// A single classic CAN frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    id: u32,
    extended: bool,
    len: u8,
    data: [u8; MAX_FRAME_LEN],
}

impl Frame {
    /// Create a frame with an 11-bit identifier
    pub fn standard(id: u32, payload: &[u8]) -> Result<Self, TransportError> {
        if id > MAX_STANDARD_ID {
            return Err(TransportError::InvalidFrame(format!(
                "0x{:X} does not fit an 11-bit identifier",
                id
            )));
        }
        Self::build(id, false, payload)
    }

    /// Create a frame with a 29-bit identifier
    pub fn extended(id: u32, payload: &[u8]) -> Result<Self, TransportError> {
        if id > MAX_EXTENDED_ID {
            return Err(TransportError::InvalidFrame(format!(
                "0x{:X} does not fit a 29-bit identifier",
                id
            )));
        }
        Self::build(id, true, payload)
    }

    /// Create a frame, choosing extended addressing only when the id needs it
    pub fn new(id: u32, payload: &[u8]) -> Result<Self, TransportError> {
        if id > MAX_STANDARD_ID {
            Self::extended(id, payload)
        } else {
            Self::standard(id, payload)
        }
    }

    fn build(id: u32, extended: bool, payload: &[u8]) -> Result<Self, TransportError> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(TransportError::InvalidFrame(format!(
                "payload of {} bytes exceeds {} bytes",
                payload.len(),
                MAX_FRAME_LEN
            )));
        }
        let mut data = [0u8; MAX_FRAME_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            id,
            extended,
            len: payload.len() as u8,
            data,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0x{:08X} [{}]", self.id, hex::encode_upper(self.payload()))
        } else {
            write!(f, "0x{:03X} [{}]", self.id, hex::encode_upper(self.payload()))
        }
    }
}

/// Frame-level access to a CAN bus
///
/// Every wait is bounded by the caller's timeout. The scanner borrows the
/// transport mutably for the whole scan, so a transport instance never serves
/// two scans at once.
#[async_trait]
pub trait CanTransport: Send {
    /// Transmit a single frame
    ///
    /// Fails if the driver cannot queue the frame within `timeout`.
    async fn transmit(&mut self, frame: &Frame, timeout: Duration) -> Result<(), TransportError>;

    /// Receive the next frame from the bus
    ///
    /// Only data frames are returned. `Ok(None)` means nothing arrived within
    /// `timeout`, never that a remote or error frame was seen.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError>;

    /// Switch the controller to a new bus speed
    async fn reconfigure(&mut self, speed: BusSpeed) -> Result<(), TransportError>;
}
