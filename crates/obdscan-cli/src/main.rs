//! obdscan - blind OBD-II vehicle scanner
//!
//! Finds the bus speed, lists responding diagnostic modules and reads their
//! fault codes, over SocketCAN or against a simulated vehicle.

mod commands;
mod config;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, ScanArgs};
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "obdscan")]
#[command(author, version, about = "Blind OBD-II vehicle scanner")]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "OBDSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the vehicle bus for modules and fault codes
    Scan {
        /// Scan the simulated vehicle instead of a CAN interface
        #[arg(long, conflicts_with = "interface")]
        mock: bool,

        /// SocketCAN interface to scan (e.g., can0)
        #[arg(short, long)]
        interface: Option<String>,

        /// Timing profile: conservative, fast, extended or a configured one
        #[arg(short, long)]
        profile: Option<String>,

        /// Overall scan budget in seconds
        #[arg(short, long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Try a functional broadcast before the address sweep
        #[arg(long)]
        broadcast: bool,

        /// Skip the pending fault pass
        #[arg(long)]
        no_pending: bool,
    },

    /// Decode captured fault report payloads
    Decode {
        /// Payloads as hex strings (e.g., 0643013301710000)
        #[arg(required = true)]
        payloads: Vec<String>,

        /// Module the payloads came from
        #[arg(short, long, default_value = "0x7E8")]
        module: String,

        /// Tag the codes as pending
        #[arg(long)]
        pending: bool,

        /// Payloads carry code pairs only, without the length/service header
        #[arg(long)]
        stripped: bool,
    },

    /// List available timing profiles
    Profiles,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG takes precedence over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load()?
    };

    match &cli.command {
        Commands::Scan {
            mock,
            interface,
            profile,
            timeout,
            broadcast,
            no_pending,
        } => {
            let args = ScanArgs {
                mock: *mock,
                interface: interface.clone(),
                profile: profile.clone(),
                timeout_secs: *timeout,
                broadcast: *broadcast,
                no_pending: *no_pending,
            };
            let merged = config.merge_with_args(cli.output, cli.no_color, &args)?;
            let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);
            commands::scan(&merged.scan, &ctx).await?;
        }

        Commands::Decode {
            payloads,
            module,
            pending,
            stripped,
        } => {
            let merged = config.merge_with_args(cli.output, cli.no_color, &ScanArgs::default())?;
            let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);
            commands::decode(payloads, module, *pending, *stripped, &ctx)?;
        }

        Commands::Profiles => {
            let merged = config.merge_with_args(cli.output, cli.no_color, &ScanArgs::default())?;
            let ctx = OutputContext::new(merged.output, merged.no_color, cli.quiet);
            commands::profiles(&merged.scan, &ctx);
        }
    }

    Ok(())
}
