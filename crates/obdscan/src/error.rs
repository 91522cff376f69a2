//! Scan errors
//!
//! These are the conditions a scan stage can run into. None of them escapes
//! `Scanner::scan`, which always produces a result; they drive the stage
//! logic and end up in the logs.

use thiserror::Error;

use crate::obd::ModuleAddress;
use crate::transport::TransportError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Driver-level failure while reconfiguring or transmitting
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(#[from] TransportError),

    /// No candidate bus speed showed enough traffic
    #[error("No bus activity detected at any candidate speed")]
    NoActivityDetected,

    /// Module did not answer within its window
    #[error("No response from module {0}")]
    NoResponseFromModule(ModuleAddress),

    /// Response too short to carry any fault codes
    #[error("Malformed response from module {module}: {len} byte payload")]
    MalformedResponse { module: ModuleAddress, len: usize },

    /// The overall scan budget ran out
    #[error("Scan deadline exceeded")]
    ScanDeadlineExceeded,
}
