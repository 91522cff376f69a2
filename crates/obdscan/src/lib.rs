//! obdscan - blind OBD-II vehicle scanning over CAN
//!
//! This crate finds a vehicle's bus speed without prior knowledge, lists the
//! diagnostic modules that answer and reads their stored and pending fault
//! codes, all within one overall time budget.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Scanner                             │
//! │  Sequences the stages under one Deadline, reports progress  │
//! │                                                             │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐  │
//! │  │BaudRate      │  │Traffic       │  │ModuleDiscovery   │  │
//! │  │Detector      │  │Listener      │  │(sweep/broadcast) │  │
//! │  └──────────────┘  └──────────────┘  └──────────────────┘  │
//! │                          │                                  │
//! │                  ┌───────┴────────┐                         │
//! │                  │FaultRetriever  │──► decode_frame_payload │
//! │                  └───────┬────────┘                         │
//! │                          │                                  │
//! │                 ┌────────┴────────┐                         │
//! │                 │  CanTransport   │                         │
//! │                 │(SocketCAN/Mock) │                         │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use obdscan::{NoProgress, ScanConfig, Scanner, TimingProfile};
//! use obdscan::transport::MockBus;
//!
//! # async fn run() {
//! let config = ScanConfig::default();
//! let mut bus = MockBus::from_config(&Default::default()).unwrap();
//! let scanner = Scanner::new(&config, TimingProfile::conservative());
//! let result = scanner.scan(&mut bus, &NoProgress).await;
//! for fault in &result.fault_codes {
//!     println!("{} from {}", fault, fault.system());
//! }
//! # }
//! ```

pub mod config;
pub mod deadline;
pub mod error;
pub mod obd;
pub mod progress;
pub mod scan;
pub mod transport;

pub use config::{ConfigError, ScanConfig, TimingProfile, TransportConfig};
pub use deadline::Deadline;
pub use error::ScanError;
pub use obd::{
    decode_dtc_pairs, decode_frame_payload, AddressTable, DtcCategory, DtcCode, DtcParseError,
    FaultCode, ModuleAddress,
};
pub use progress::{NoProgress, ProgressSink};
pub use scan::{
    BaudRateDetector, FaultRetriever, ModuleDiscovery, ScanResult, ScanState, Scanner,
    TrafficListener, TrafficSummary,
};
pub use transport::{create_transport, BusSpeed, CanTransport, Frame, TransportError};
