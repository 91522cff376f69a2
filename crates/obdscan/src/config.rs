//! Scanner configuration
//!
//! This module contains the configuration types for a scan: overall budgets,
//! candidate bus speeds, the diagnostic address table, timing profiles and
//! the transport to open. Every field has a default, so an empty TOML
//! document yields the stock configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::obd::AddressTable;
use crate::transport::BusSpeed;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown timing profile: {0}")]
    UnknownProfile(String),
}

/// Configuration for a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Overall scan budget in milliseconds
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_ms: u64,
    /// Passive traffic capture after the bus speed is found (ms)
    #[serde(default = "default_traffic_listen")]
    pub traffic_listen_ms: u64,
    /// Budget for the module probing phase (ms)
    #[serde(default = "default_discovery_budget")]
    pub discovery_budget_ms: u64,
    /// Candidate bus speeds, most common first
    #[serde(default = "default_bus_speeds")]
    pub bus_speeds: Vec<BusSpeed>,
    /// Frames that must be seen before a bus speed is accepted
    #[serde(default = "default_min_frames")]
    pub min_frames: usize,
    /// Try one functional broadcast before the per-address sweep
    #[serde(default)]
    pub broadcast_discovery: bool,
    /// Also query pending faults (service 0x07)
    #[serde(default = "default_true")]
    pub pending_faults: bool,
    /// Name of the timing profile to use
    #[serde(default = "default_profile_name")]
    pub profile: String,
    /// Diagnostic address plan
    #[serde(default)]
    pub addressing: AddressTable,
    /// Additional named timing profiles
    #[serde(default)]
    pub profiles: BTreeMap<String, TimingProfile>,
    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_scan_timeout() -> u64 {
    45_000
}

fn default_traffic_listen() -> u64 {
    5_000
}

fn default_discovery_budget() -> u64 {
    15_000
}

fn default_bus_speeds() -> Vec<BusSpeed> {
    vec![
        BusSpeed::KBPS_500,
        BusSpeed::KBPS_250,
        BusSpeed::KBPS_125,
        BusSpeed::MBPS_1,
    ]
}

fn default_min_frames() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_profile_name() -> String {
    TimingProfile::CONSERVATIVE.to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: default_scan_timeout(),
            traffic_listen_ms: default_traffic_listen(),
            discovery_budget_ms: default_discovery_budget(),
            bus_speeds: default_bus_speeds(),
            min_frames: default_min_frames(),
            broadcast_discovery: false,
            pending_faults: true,
            profile: default_profile_name(),
            addressing: AddressTable::default(),
            profiles: BTreeMap::new(),
            transport: TransportConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn traffic_listen(&self) -> Duration {
        Duration::from_millis(self.traffic_listen_ms)
    }

    pub fn discovery_budget(&self) -> Duration {
        Duration::from_millis(self.discovery_budget_ms)
    }

    /// Resolve a timing profile by name
    ///
    /// Profiles declared in the config file shadow the builtin ones.
    pub fn timing_profile(&self, name: &str) -> Result<TimingProfile, ConfigError> {
        if let Some(profile) = self.profiles.get(name) {
            let mut profile = profile.clone();
            profile.name = name.to_string();
            return Ok(profile);
        }
        TimingProfile::builtin(name).ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }

    /// The profile selected by the `profile` field
    pub fn selected_profile(&self) -> Result<TimingProfile, ConfigError> {
        self.timing_profile(&self.profile)
    }

    /// Names of every builtin and configured profile
    pub fn profile_names(&self) -> Vec<String> {
        let mut names: Vec<String> = TimingProfile::BUILTIN
            .iter()
            .map(|name| name.to_string())
            .collect();
        for name in self.profiles.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus_speeds.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one candidate bus speed is required".to_string(),
            ));
        }
        if let Some(speed) = self.bus_speeds.iter().find(|s| s.0 == 0) {
            return Err(ConfigError::Invalid(format!("bus speed {} is not usable", speed.0)));
        }
        if self.addressing.probe_addresses.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one probe address is required".to_string(),
            ));
        }
        if self.addressing.response_band.start > self.addressing.response_band.end {
            return Err(ConfigError::Invalid(format!(
                "response band 0x{:X}..=0x{:X} is empty",
                self.addressing.response_band.start, self.addressing.response_band.end
            )));
        }
        if self.addressing.response_band.start < self.addressing.response_offset {
            return Err(ConfigError::Invalid(format!(
                "response band starts at 0x{:X}, below the response offset 0x{:X}",
                self.addressing.response_band.start, self.addressing.response_offset
            )));
        }
        if self.min_frames == 0 {
            return Err(ConfigError::Invalid("min_frames must be at least 1".to_string()));
        }
        if self.scan_timeout_ms == 0 || self.discovery_budget_ms == 0 {
            return Err(ConfigError::Invalid(
                "scan and discovery budgets must be non-zero".to_string(),
            ));
        }
        for (name, profile) in &self.profiles {
            profile
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("profile '{}': {}", name, e)))?;
        }
        self.selected_profile()?;
        Ok(())
    }
}

/// Bus timing used while probing modules and collecting faults
///
/// Some vehicles need longer gaps and windows than others. The engine never
/// picks a profile itself; the caller selects one and hands it to the
/// scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingProfile {
    /// Profile name (filled from the table key for configured profiles)
    #[serde(default)]
    pub name: String,
    /// Pause after every probe or fault query (ms)
    pub inter_probe_delay_ms: u64,
    /// How long to wait for a module to answer a capability probe (ms)
    pub module_response_timeout_ms: u64,
    /// How long to wait for a fault report (ms)
    pub dtc_collection_window_ms: u64,
    /// How long to listen at each candidate bus speed (ms)
    pub baud_detect_window_ms: u64,
    /// How long the driver may take to queue a frame (ms)
    #[serde(default = "default_transmit_timeout")]
    pub transmit_timeout_ms: u64,
}

fn default_transmit_timeout() -> u64 {
    100
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self::conservative()
    }
}

impl TimingProfile {
    pub const CONSERVATIVE: &'static str = "conservative";
    pub const FAST: &'static str = "fast";
    pub const EXTENDED: &'static str = "extended";
    pub const BUILTIN: [&'static str; 3] = [Self::CONSERVATIVE, Self::FAST, Self::EXTENDED];

    /// Safe default for unknown vehicles
    pub fn conservative() -> Self {
        Self {
            name: Self::CONSERVATIVE.to_string(),
            inter_probe_delay_ms: 50,
            module_response_timeout_ms: 800,
            dtc_collection_window_ms: 1000,
            baud_detect_window_ms: 2000,
            transmit_timeout_ms: 100,
        }
    }

    /// Short windows for buses known to answer promptly
    pub fn fast() -> Self {
        Self {
            name: Self::FAST.to_string(),
            inter_probe_delay_ms: 20,
            module_response_timeout_ms: 300,
            dtc_collection_window_ms: 500,
            baud_detect_window_ms: 1000,
            transmit_timeout_ms: 50,
        }
    }

    /// Long gaps and windows for buses that compile faults slowly
    pub fn extended() -> Self {
        Self {
            name: Self::EXTENDED.to_string(),
            inter_probe_delay_ms: 150,
            module_response_timeout_ms: 1500,
            dtc_collection_window_ms: 2500,
            baud_detect_window_ms: 3000,
            transmit_timeout_ms: 100,
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            Self::CONSERVATIVE => Some(Self::conservative()),
            Self::FAST => Some(Self::fast()),
            Self::EXTENDED => Some(Self::extended()),
            _ => None,
        }
    }

    pub fn inter_probe_delay(&self) -> Duration {
        Duration::from_millis(self.inter_probe_delay_ms)
    }

    pub fn module_response_timeout(&self) -> Duration {
        Duration::from_millis(self.module_response_timeout_ms)
    }

    pub fn dtc_collection_window(&self) -> Duration {
        Duration::from_millis(self.dtc_collection_window_ms)
    }

    pub fn baud_detect_window(&self) -> Duration {
        Duration::from_millis(self.baud_detect_window_ms)
    }

    pub fn transmit_timeout(&self) -> Duration {
        Duration::from_millis(self.transmit_timeout_ms)
    }

    fn validate(&self) -> Result<(), String> {
        if self.module_response_timeout_ms == 0
            || self.dtc_collection_window_ms == 0
            || self.baud_detect_window_ms == 0
        {
            return Err("response, collection and detection windows must be non-zero".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Raw SocketCAN (Linux only)
    SocketCan(SocketCanConfig),
    /// Simulated vehicle for demos and tests
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// SocketCAN configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "can0")
    pub interface: String,
    /// Change the interface bitrate over netlink when probing bus speeds
    ///
    /// Requires CAP_NET_ADMIN. When disabled the interface keeps whatever
    /// bitrate it was brought up with.
    #[serde(default = "default_true")]
    pub set_bitrate: bool,
}

impl Default for SocketCanConfig {
    fn default() -> Self {
        Self {
            interface: "can0".to_string(),
            set_bitrate: true,
        }
    }
}

/// Simulated vehicle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockConfig {
    /// Speed the simulated vehicle talks at
    #[serde(default = "default_mock_speed")]
    pub vehicle_speed: BusSpeed,
    /// Simulate a bus with nothing connected
    #[serde(default)]
    pub silent: bool,
    /// Simulated response latency in milliseconds
    #[serde(default = "default_mock_latency")]
    pub latency_ms: u64,
    /// Identifiers of periodic ambient frames
    #[serde(default = "default_mock_ambient_ids")]
    pub ambient_ids: Vec<u32>,
    /// Gap between ambient frames (ms)
    #[serde(default = "default_mock_ambient_period")]
    pub ambient_period_ms: u64,
    /// Simulated diagnostic modules
    #[serde(default = "default_mock_modules")]
    pub modules: Vec<MockModuleConfig>,
}

/// One simulated diagnostic module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockModuleConfig {
    /// Physical request identifier
    pub request_id: u32,
    /// Response identifier (defaults to request + 8)
    #[serde(default)]
    pub response_id: Option<u32>,
    /// Stored fault codes, e.g. "P0133"
    #[serde(default)]
    pub stored: Vec<String>,
    /// Pending fault codes
    #[serde(default)]
    pub pending: Vec<String>,
}

fn default_mock_speed() -> BusSpeed {
    BusSpeed::KBPS_500
}

fn default_mock_latency() -> u64 {
    15
}

fn default_mock_ambient_ids() -> Vec<u32> {
    vec![0x0C9, 0x1E5, 0x3E9, 0x4C1]
}

fn default_mock_ambient_period() -> u64 {
    10
}

fn default_mock_modules() -> Vec<MockModuleConfig> {
    vec![
        MockModuleConfig {
            request_id: 0x7E0,
            response_id: None,
            stored: vec!["P0133".to_string(), "P0171".to_string()],
            pending: vec!["P0300".to_string()],
        },
        MockModuleConfig {
            request_id: 0x7E1,
            response_id: None,
            stored: vec!["U0100".to_string()],
            pending: Vec::new(),
        },
        MockModuleConfig {
            request_id: 0x7E2,
            response_id: None,
            stored: Vec::new(),
            pending: Vec::new(),
        },
    ]
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            vehicle_speed: default_mock_speed(),
            silent: false,
            latency_ms: default_mock_latency(),
            ambient_ids: default_mock_ambient_ids(),
            ambient_period_ms: default_mock_ambient_period(),
            modules: default_mock_modules(),
        }
    }
}
