//! Transport layer for raw CAN frames
//!
//! This module provides the frame-level transports the scanner drives:
//! - SocketCAN adapter for raw CAN (Linux only)
//! - Mock bus simulating a vehicle, for testing and demos
//!
//! # Example
//!
//! ```ignore
//! use obdscan::transport::{create_transport, BusSpeed};
//! use obdscan::config::TransportConfig;
//!
//! let mut transport = create_transport(&TransportConfig::default()).await?;
//! transport.reconfigure(BusSpeed::KBPS_500).await?;
//! let frame = transport.receive(Duration::from_millis(100)).await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

pub use adapter::{BusSpeed, CanTransport, Frame, MAX_FRAME_LEN};
pub use error::TransportError;
pub use mock::{MockBus, MockModule};

use crate::config::TransportConfig;

/// Create a transport based on configuration
///
/// The returned transport is initialized and ready for a scan.
pub async fn create_transport(
    config: &TransportConfig,
) -> Result<Box<dyn CanTransport>, TransportError> {
    match config {
        #[cfg(all(target_os = "linux", feature = "socketcan"))]
        TransportConfig::SocketCan(cfg) => {
            let transport = socketcan::SocketCanTransport::open(cfg).await?;
            Ok(Box::new(transport))
        }
        #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
        TransportConfig::SocketCan(_) => Err(TransportError::Unsupported(
            "SocketCAN requires Linux and the 'socketcan' feature".to_string(),
        )),
        TransportConfig::Mock(cfg) => {
            let transport = MockBus::from_config(cfg)?;
            Ok(Box::new(transport))
        }
    }
}
