//! Scan states and the aggregated scan result

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::traffic::{serialize_millis, TrafficSummary};
use crate::obd::{FaultCode, ModuleAddress};
use crate::transport::BusSpeed;

/// Scanner state machine
///
/// `Complete` and `TimedOut` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    DetectingBaud,
    ListeningTraffic,
    ProbingModules,
    RetrievingFaults,
    Complete,
    TimedOut,
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Complete | ScanState::TimedOut)
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Idle => "idle",
            ScanState::DetectingBaud => "detecting_baud",
            ScanState::ListeningTraffic => "listening_traffic",
            ScanState::ProbingModules => "probing_modules",
            ScanState::RetrievingFaults => "retrieving_faults",
            ScanState::Complete => "complete",
            ScanState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// Everything one scan found
///
/// Built fresh by every call to `Scanner::scan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub bus_speed: Option<BusSpeed>,
    pub vehicle_detected: bool,
    pub active_modules: BTreeSet<ModuleAddress>,
    pub fault_codes: Vec<FaultCode>,
    pub final_state: ScanState,
    pub traffic: Option<TrafficSummary>,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl ScanResult {
    pub(crate) fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            bus_speed: None,
            vehicle_detected: false,
            active_modules: BTreeSet::new(),
            fault_codes: Vec::new(),
            final_state: ScanState::Idle,
            traffic: None,
            started_at,
            elapsed: Duration::ZERO,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.final_state == ScanState::TimedOut
    }

    /// Fault codes reported through the stored-faults service
    pub fn stored_faults(&self) -> impl Iterator<Item = &FaultCode> {
        self.fault_codes.iter().filter(|f| !f.pending)
    }

    /// Fault codes reported through the pending-faults service
    pub fn pending_faults(&self) -> impl Iterator<Item = &FaultCode> {
        self.fault_codes.iter().filter(|f| f.pending)
    }
}
