//! Scanner: runs every stage in order under one overall deadline

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use super::baud::BaudRateDetector;
use super::discovery::ModuleDiscovery;
use super::faults::FaultRetriever;
use super::result::{ScanResult, ScanState};
use super::traffic::TrafficListener;
use crate::config::{ScanConfig, TimingProfile};
use crate::deadline::Deadline;
use crate::error::ScanError;
use crate::progress::ProgressSink;
use crate::transport::CanTransport;

const MSG_DETECTING: &str = "Detecting vehicle...";
const MSG_FOUND: &str = "Vehicle found! Analyzing...";
const MSG_READING: &str = "Reading vehicle data...";
const MSG_CHECKING: &str = "Checking systems...";
const MSG_COMPLETE: &str = "Scan complete!";
const MSG_NO_VEHICLE: &str = "No vehicle detected";
const MSG_TIMEOUT: &str = "Scan timeout";

/// Runs blind vehicle scans
///
/// Holds no state between scans; every call to [`Scanner::scan`] builds a
/// new result. The transport is borrowed mutably for the whole scan.
#[derive(Debug, Clone)]
pub struct Scanner {
    scan_timeout: Duration,
    detector: BaudRateDetector,
    listener: TrafficListener,
    discovery: ModuleDiscovery,
    retriever: FaultRetriever,
    timing: TimingProfile,
}

impl Scanner {
    /// Build a scanner from configuration and a caller-chosen timing profile
    pub fn new(config: &ScanConfig, timing: TimingProfile) -> Self {
        Self {
            scan_timeout: config.scan_timeout(),
            detector: BaudRateDetector::new(
                config.bus_speeds.clone(),
                timing.baud_detect_window(),
                config.min_frames,
            ),
            listener: TrafficListener::new(config.traffic_listen()),
            discovery: ModuleDiscovery::new(
                config.addressing.clone(),
                timing.clone(),
                config.discovery_budget(),
            )
            .with_broadcast_first(config.broadcast_discovery),
            retriever: FaultRetriever::new(config.addressing.clone(), timing.clone())
                .with_pending(config.pending_faults),
            timing,
        }
    }

    /// Scanner with the stock configuration and conservative timing
    pub fn with_defaults() -> Self {
        Self::new(&ScanConfig::default(), TimingProfile::conservative())
    }

    pub fn timing(&self) -> &TimingProfile {
        &self.timing
    }

    /// Detect, listen, probe and collect faults
    ///
    /// Never fails: a silent bus yields `vehicle_detected = false`, an
    /// exhausted budget yields the partial result in state `TimedOut`.
    pub async fn scan(
        &self,
        transport: &mut dyn CanTransport,
        progress: &dyn ProgressSink,
    ) -> ScanResult {
        let deadline = Deadline::after(self.scan_timeout);
        let mut result = ScanResult::empty(Utc::now());
        info!(
            profile = %self.timing.name,
            timeout_ms = self.scan_timeout.as_millis() as u64,
            "Starting vehicle scan"
        );

        let state = self.run(transport, progress, &deadline, &mut result).await;
        result.final_state = state;
        result.elapsed = deadline.elapsed();

        match state {
            ScanState::TimedOut => progress.on_progress(MSG_TIMEOUT, 100),
            _ if !result.vehicle_detected => progress.on_progress(MSG_NO_VEHICLE, 100),
            _ => progress.on_progress(MSG_COMPLETE, 100),
        }
        info!(
            state = %state,
            speed = ?result.bus_speed.map(|s| s.to_string()),
            vehicle_detected = result.vehicle_detected,
            modules = result.active_modules.len(),
            faults = result.fault_codes.len(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Scan finished"
        );
        result
    }

    async fn run(
        &self,
        transport: &mut dyn CanTransport,
        progress: &dyn ProgressSink,
        deadline: &Deadline,
        result: &mut ScanResult,
    ) -> ScanState {
        enter(ScanState::DetectingBaud);
        progress.on_progress(MSG_DETECTING, 0);
        let speed = match self.detector.detect(transport, deadline).await {
            Ok(speed) => speed,
            Err(ScanError::ScanDeadlineExceeded) => return timed_out(),
            Err(e) => {
                info!(reason = %e, "No vehicle on the bus");
                return ScanState::Complete;
            }
        };
        result.bus_speed = Some(speed);
        result.vehicle_detected = true;
        progress.on_progress(MSG_FOUND, 25);

        if deadline.is_expired() {
            return timed_out();
        }
        enter(ScanState::ListeningTraffic);
        result.traffic = Some(self.listener.listen(transport, deadline).await);

        if deadline.is_expired() {
            return timed_out();
        }
        enter(ScanState::ProbingModules);
        progress.on_progress(MSG_READING, 50);
        let discovery = self.discovery.discover(transport, deadline, progress).await;
        result.active_modules = discovery.modules;
        if deadline.is_expired() {
            return timed_out();
        }

        enter(ScanState::RetrievingFaults);
        progress.on_progress(MSG_CHECKING, 75);
        let report = self.retriever.retrieve(transport, &result.active_modules, deadline).await;
        result.fault_codes = report.faults;
        if report.interrupted {
            return timed_out();
        }

        ScanState::Complete
    }
}

fn enter(state: ScanState) {
    info!(state = %state, "Scan state");
}

fn timed_out() -> ScanState {
    warn!("Scan deadline exceeded, returning partial result");
    ScanState::TimedOut
}
