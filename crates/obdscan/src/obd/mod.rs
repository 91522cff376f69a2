//! OBD-II (ISO 15765-4) addressing and query services
//!
//! Only the three query services the scanner needs are modelled: the
//! capability probe (service 0x01, PID 0x00), stored faults (0x03) and
//! pending faults (0x07).

pub mod dtc;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::{Frame, TransportError};

pub use dtc::{
    decode_dtc_pairs, decode_frame_payload, DtcCategory, DtcCode, DtcParseError, FaultCode,
};

/// OBD-II service (mode) identifiers
pub mod service {
    /// Show current data; PID 0x00 lists supported PIDs
    pub const CURRENT_DATA: u8 = 0x01;
    /// Show stored diagnostic trouble codes
    pub const STORED_DTCS: u8 = 0x03;
    /// Show pending diagnostic trouble codes
    pub const PENDING_DTCS: u8 = 0x07;
    /// Offset added to the service id in a positive response
    pub const POSITIVE_RESPONSE_OFFSET: u8 = 0x40;
}

/// PID 0x00 - supported PIDs 01-20
pub const PID_SUPPORTED_01_20: u8 = 0x00;

/// Functional (broadcast) request identifier, 11-bit
pub const BROADCAST_REQUEST_ID: u32 = 0x7DF;
/// First physical request identifier
pub const FIRST_REQUEST_ID: u32 = 0x7E0;
/// First physical response identifier
pub const FIRST_RESPONSE_ID: u32 = 0x7E8;
/// Distance between a request identifier and its response identifier
pub const RESPONSE_OFFSET: u32 = 8;

/// Bus identifier of a diagnostic module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleAddress(pub u32);

impl ModuleAddress {
    pub fn id(&self) -> u32 {
        self.0
    }

    /// Conventional OBD-II role of a response slot
    pub fn role(&self) -> Option<&'static str> {
        match self.0 {
            0x7E8 => Some("Engine"),
            0x7E9 => Some("Transmission"),
            0x7EA => Some("ABS / Chassis"),
            0x7EB => Some("Body"),
            0x7EC => Some("Hybrid / Battery"),
            0x7ED..=0x7EF => Some("Auxiliary"),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0x7FF {
            write!(f, "0x{:08X}", self.0)
        } else {
            write!(f, "0x{:03X}", self.0)
        }
    }
}

impl From<u32> for ModuleAddress {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Inclusive identifier range that responses are expected in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdBand {
    pub start: u32,
    pub end: u32,
}

impl IdBand {
    pub fn contains(&self, id: u32) -> bool {
        (self.start..=self.end).contains(&id)
    }
}

/// Diagnostic address plan used for discovery and fault retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressTable {
    /// Functional request identifier addressing every module at once
    #[serde(default = "default_broadcast_id")]
    pub broadcast_id: u32,
    /// Physical request identifiers probed during the sweep
    #[serde(default = "default_probe_addresses")]
    pub probe_addresses: Vec<u32>,
    /// Identifiers reserved for module responses
    #[serde(default = "default_response_band")]
    pub response_band: IdBand,
    /// Response identifier = request identifier + offset
    #[serde(default = "default_response_offset")]
    pub response_offset: u32,
}

fn default_broadcast_id() -> u32 {
    BROADCAST_REQUEST_ID
}

fn default_probe_addresses() -> Vec<u32> {
    (FIRST_REQUEST_ID..FIRST_REQUEST_ID + 16).collect()
}

fn default_response_band() -> IdBand {
    IdBand {
        start: FIRST_RESPONSE_ID,
        end: FIRST_RESPONSE_ID + 7,
    }
}

fn default_response_offset() -> u32 {
    RESPONSE_OFFSET
}

impl Default for AddressTable {
    fn default() -> Self {
        Self {
            broadcast_id: default_broadcast_id(),
            probe_addresses: default_probe_addresses(),
            response_band: default_response_band(),
            response_offset: default_response_offset(),
        }
    }
}

impl AddressTable {
    /// Probe addresses in ascending order, duplicates removed
    pub fn sweep_order(&self) -> Vec<u32> {
        let mut addresses = self.probe_addresses.clone();
        addresses.sort_unstable();
        addresses.dedup();
        addresses
    }

    /// Whether a frame from `response_id` answers a probe sent to `request_id`
    pub fn accepts_response(&self, request_id: u32, response_id: u32) -> bool {
        response_id == request_id.wrapping_add(self.response_offset)
            || self.response_band.contains(response_id)
    }

    pub fn is_response_id(&self, id: u32) -> bool {
        self.response_band.contains(id)
    }

    /// Request identifier used to query a discovered module
    ///
    /// Modules recorded from the response band are addressed at
    /// `response - offset`; anything else is addressed directly.
    pub fn request_for(&self, module: ModuleAddress) -> u32 {
        if self.response_band.contains(module.0) {
            module.0.checked_sub(self.response_offset).unwrap_or(module.0)
        } else {
            module.0
        }
    }
}

/// Build a single-frame OBD request padded to eight bytes
///
/// Byte 0 carries the number of meaningful bytes that follow.
pub fn request_frame(id: u32, service: u8, params: &[u8]) -> Result<Frame, TransportError> {
    let mut payload = [0u8; 8];
    let len = 1 + params.len();
    if len > 7 {
        return Err(TransportError::InvalidFrame(format!(
            "service 0x{:02X} request with {} parameter bytes",
            service,
            params.len()
        )));
    }
    payload[0] = len as u8;
    payload[1] = service;
    payload[2..2 + params.len()].copy_from_slice(params);
    Frame::new(id, &payload)
}

/// Capability probe: service 0x01, PID 0x00
pub fn capability_probe(id: u32) -> Result<Frame, TransportError> {
    request_frame(id, service::CURRENT_DATA, &[PID_SUPPORTED_01_20])
}
