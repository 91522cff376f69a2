//! Diagnostic trouble codes reported by OBD-II services 0x03 and 0x07
//!
//! Each code travels as two bytes. The top two bits of the first byte select
//! the category; the remaining 14 bits are the code number, written as four
//! hex digits after the category letter (e.g. `0x01 0x33` is `P0133`).

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use super::ModuleAddress;

/// Largest code number representable in 14 bits
const MAX_DTC_NUMBER: u16 = 0x3FFF;

/// Offset of the first code pair in a service 0x03/0x07 response frame
const FRAME_HEADER_LEN: usize = 2;

/// DTC category, selected by the top two bits of the first code byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DtcCategory {
    /// P codes - Powertrain (engine, transmission)
    Powertrain,
    /// C codes - Chassis (ABS, suspension)
    Chassis,
    /// B codes - Body (airbags, climate control)
    Body,
    /// U codes - Network (communication)
    Network,
}

impl DtcCategory {
    /// Get category from the first code byte
    pub fn from_high_byte(high_byte: u8) -> Self {
        match (high_byte >> 6) & 0x03 {
            0 => DtcCategory::Powertrain,
            1 => DtcCategory::Chassis,
            2 => DtcCategory::Body,
            _ => DtcCategory::Network,
        }
    }

    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'P' => Some(DtcCategory::Powertrain),
            'C' => Some(DtcCategory::Chassis),
            'B' => Some(DtcCategory::Body),
            'U' => Some(DtcCategory::Network),
            _ => None,
        }
    }

    /// Get category prefix character
    pub fn prefix(&self) -> char {
        match self {
            DtcCategory::Powertrain => 'P',
            DtcCategory::Chassis => 'C',
            DtcCategory::Body => 'B',
            DtcCategory::Network => 'U',
        }
    }

    fn bits(&self) -> u8 {
        match self {
            DtcCategory::Powertrain => 0b00,
            DtcCategory::Chassis => 0b01,
            DtcCategory::Body => 0b10,
            DtcCategory::Network => 0b11,
        }
    }
}

impl fmt::Display for DtcCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DtcCategory::Powertrain => "powertrain",
            DtcCategory::Chassis => "chassis",
            DtcCategory::Body => "body",
            DtcCategory::Network => "network",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DtcParseError {
    #[error("Fault code '{0}' must be a category letter followed by four hex digits")]
    InvalidFormat(String),

    #[error("Unknown fault category '{0}'")]
    UnknownCategory(char),

    #[error("Fault number 0x{0:04X} does not fit in 14 bits")]
    NumberOutOfRange(u16),
}

/// Category plus 14-bit number, e.g. `P0133`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DtcCode {
    category: DtcCategory,
    number: u16,
}

impl DtcCode {
    pub fn new(category: DtcCategory, number: u16) -> Result<Self, DtcParseError> {
        if number > MAX_DTC_NUMBER {
            return Err(DtcParseError::NumberOutOfRange(number));
        }
        Ok(Self { category, number })
    }

    /// Decode a wire pair; `(0x00, 0x00)` is padding and yields `None`
    pub fn from_bytes(high: u8, low: u8) -> Option<Self> {
        if high == 0 && low == 0 {
            return None;
        }
        Some(Self {
            category: DtcCategory::from_high_byte(high),
            number: (((high & 0x3F) as u16) << 8) | low as u16,
        })
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        let high = (self.category.bits() << 6) | ((self.number >> 8) as u8 & 0x3F);
        [high, (self.number & 0xFF) as u8]
    }

    pub fn category(&self) -> DtcCategory {
        self.category
    }

    pub fn number(&self) -> u16 {
        self.number
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04X}", self.category.prefix(), self.number)
    }
}

impl FromStr for DtcCode {
    type Err = DtcParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let prefix = chars
            .next()
            .ok_or_else(|| DtcParseError::InvalidFormat(s.to_string()))?;
        let digits = chars.as_str();
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DtcParseError::InvalidFormat(s.to_string()));
        }

        let category = DtcCategory::from_prefix(prefix.to_ascii_uppercase())
            .ok_or(DtcParseError::UnknownCategory(prefix))?;
        let number = u16::from_str_radix(digits, 16)
            .map_err(|_| DtcParseError::InvalidFormat(s.to_string()))?;
        Self::new(category, number)
    }
}

/// A fault code reported by a specific module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "FaultRecord")]
pub struct FaultCode {
    pub code: DtcCode,
    /// Response identifier of the reporting module
    pub module: ModuleAddress,
    /// Reported through the pending-faults service (0x07)
    pub pending: bool,
}

impl FaultCode {
    pub fn category(&self) -> DtcCategory {
        self.code.category()
    }

    /// Label for the reporting system, e.g. `ECU 0x7E8`
    pub fn system(&self) -> String {
        format!("ECU {}", self.module)
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.code.fmt(f)
    }
}

#[derive(Serialize)]
struct FaultRecord {
    code: String,
    category: DtcCategory,
    module: ModuleAddress,
    system: String,
    pending: bool,
}

impl From<FaultCode> for FaultRecord {
    fn from(fault: FaultCode) -> Self {
        Self {
            code: fault.code.to_string(),
            category: fault.category(),
            module: fault.module,
            system: fault.system(),
            pending: fault.pending,
        }
    }
}

/// Decode code pairs from a header-stripped byte slice
///
/// Pairs are read in order; a trailing odd byte is ignored and
/// `(0x00, 0x00)` padding pairs are skipped.
pub fn decode_dtc_pairs(bytes: &[u8], module: ModuleAddress, pending: bool) -> Vec<FaultCode> {
    bytes
        .chunks_exact(2)
        .filter_map(|pair| DtcCode::from_bytes(pair[0], pair[1]))
        .map(|code| FaultCode {
            code,
            module,
            pending,
        })
        .collect()
}

/// Decode a service 0x03/0x07 response frame payload
///
/// Bytes 0-1 carry the length and response service; code pairs start at
/// offset 2. Payloads of two bytes or fewer contain no codes.
pub fn decode_frame_payload(payload: &[u8], module: ModuleAddress, pending: bool) -> Vec<FaultCode> {
    match payload.get(FRAME_HEADER_LEN..) {
        Some(pairs) => decode_dtc_pairs(pairs, module, pending),
        None => Vec::new(),
    }
}
