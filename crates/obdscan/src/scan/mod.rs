//! Scan stages
//!
//! ```text
//! Scanner ─► BaudRateDetector ─► TrafficListener ─► ModuleDiscovery ─► FaultRetriever
//!                 │                                                        │
//!           reconfigure()                                        decode_frame_payload()
//! ```
//!
//! Each stage takes the transport by `&mut` and a [`Deadline`](crate::deadline::Deadline)
//! it must not overrun by more than one bounded wait.

mod baud;
mod discovery;
mod faults;
mod orchestrator;
mod result;
mod traffic;

pub use baud::BaudRateDetector;
pub use discovery::{Discovery, ModuleDiscovery};
pub use faults::{FaultReport, FaultRetriever};
pub use orchestrator::Scanner;
pub use result::{ScanResult, ScanState};
pub use traffic::{TrafficListener, TrafficSummary};
