//! Configuration file handling for obdscan
//!
//! One TOML file holds the scan configuration plus an optional `[cli]`
//! table with display defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use obdscan::config::{MockConfig, SocketCanConfig};
use obdscan::{ScanConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Display defaults from the `[cli]` table
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CliSection {
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

#[derive(Deserialize, Default)]
struct CliDocument {
    #[serde(default)]
    cli: CliSection,
}

/// Configuration for the CLI tool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub cli: CliSection,
    pub scan: ScanConfig,
}

/// Scan flags that override file values
#[derive(Debug, Clone, Default)]
pub struct ScanArgs {
    pub mock: bool,
    pub interface: Option<String>,
    pub profile: Option<String>,
    pub timeout_secs: Option<u64>,
    pub broadcast: bool,
    pub no_pending: bool,
}

impl Config {
    /// Load configuration from the default config file, if present
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Ok(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        let document: CliDocument = toml::from_str(content)?;
        let scan = ScanConfig::from_toml_str(content)?;
        Ok(Self {
            cli: document.cli,
            scan,
        })
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("obdscan");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        &self,
        output: Option<OutputFormat>,
        no_color: bool,
        args: &ScanArgs,
    ) -> Result<MergedConfig> {
        let output = match (output, &self.cli.output) {
            (Some(format), _) => format,
            (None, Some(name)) => OutputFormat::from_str(name, true)
                .map_err(|e| anyhow::anyhow!("Invalid output format '{}': {}", name, e))?,
            (None, None) => OutputFormat::default(),
        };

        let mut scan = self.scan.clone();
        if let Some(interface) = &args.interface {
            let set_bitrate = match &scan.transport {
                TransportConfig::SocketCan(existing) => existing.set_bitrate,
                TransportConfig::Mock(_) => true,
            };
            scan.transport = TransportConfig::SocketCan(SocketCanConfig {
                interface: interface.clone(),
                set_bitrate,
            });
        } else if args.mock && !matches!(scan.transport, TransportConfig::Mock(_)) {
            scan.transport = TransportConfig::Mock(MockConfig::default());
        }
        if let Some(profile) = &args.profile {
            scan.profile = profile.clone();
        }
        if let Some(secs) = args.timeout_secs {
            scan.scan_timeout_ms = secs.saturating_mul(1000);
        }
        if args.broadcast {
            scan.broadcast_discovery = true;
        }
        if args.no_pending {
            scan.pending_faults = false;
        }
        scan.validate().context("Invalid scan settings")?;

        Ok(MergedConfig {
            scan,
            output,
            no_color: no_color || self.cli.no_color.unwrap_or(false),
        })
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub scan: ScanConfig,
    pub output: OutputFormat,
    pub no_color: bool,
}
