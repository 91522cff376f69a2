//! Scan command - full vehicle scan

use anyhow::{Context, Result};
use obdscan::{create_transport, ScanConfig, ScanResult, Scanner, TransportConfig};
use tracing::debug;

use crate::output::{FaultRow, ModuleRow, OutputContext, OutputFormat};
use crate::progress::BarProgress;

/// Run a scan and print what it found
pub async fn scan(config: &ScanConfig, ctx: &OutputContext) -> Result<()> {
    let timing = config
        .selected_profile()
        .context("Failed to resolve timing profile")?;
    debug!(?timing, "Resolved timing profile");

    let mut transport = create_transport(&config.transport)
        .await
        .context("Failed to open CAN transport")?;

    if ctx.interactive() {
        let target = match &config.transport {
            TransportConfig::SocketCan(cfg) => cfg.interface.clone(),
            TransportConfig::Mock(_) => "simulated vehicle".to_string(),
        };
        ctx.info(&format!(
            "Scanning {} with '{}' timing ({}s budget)",
            target,
            timing.name,
            config.scan_timeout().as_secs()
        ));
    }

    let progress = BarProgress::new(ctx.interactive());
    let scanner = Scanner::new(config, timing);
    let result = scanner.scan(transport.as_mut(), &progress).await;
    progress.finish();

    render(&result, config, ctx);
    Ok(())
}

fn render(result: &ScanResult, config: &ScanConfig, ctx: &OutputContext) {
    match ctx.format {
        OutputFormat::Json => ctx.print_json(result),
        OutputFormat::Csv => {
            let rows: Vec<FaultRow> = result.fault_codes.iter().map(FaultRow::from).collect();
            ctx.print(&rows);
        }
        OutputFormat::Table => {
            if result.timed_out() {
                ctx.warn("Scan timed out, results are partial");
            }
            if !result.vehicle_detected {
                ctx.warn("No vehicle detected");
                return;
            }

            ctx.print_kv(&summary(result));

            ctx.heading("Modules");
            ctx.print(&module_rows(result, config));

            ctx.heading("Fault codes");
            let rows: Vec<FaultRow> = result.fault_codes.iter().map(FaultRow::from).collect();
            if rows.is_empty() {
                ctx.success("No fault codes stored");
            } else {
                ctx.print(&rows);
            }
        }
    }
}

fn summary(result: &ScanResult) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        (
            "Bus speed",
            result
                .bus_speed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("Modules", result.active_modules.len().to_string()),
        ("Stored faults", result.stored_faults().count().to_string()),
        ("Pending faults", result.pending_faults().count().to_string()),
        ("State", result.final_state.to_string()),
        (
            "Elapsed",
            format!("{:.1}s", result.elapsed.as_secs_f64()),
        ),
    ];
    if let Some(traffic) = &result.traffic {
        pairs.push((
            "Bus traffic",
            format!(
                "{} frames, {} ids",
                traffic.frame_count,
                traffic.unique_ids.len()
            ),
        ));
    }
    pairs
}

fn module_rows(result: &ScanResult, config: &ScanConfig) -> Vec<ModuleRow> {
    result
        .active_modules
        .iter()
        .map(|&module| ModuleRow {
            module: module.to_string(),
            request: format!("0x{:03X}", config.addressing.request_for(module)),
            role: module.role().unwrap_or("-").to_string(),
            faults: result
                .fault_codes
                .iter()
                .filter(|f| f.module == module)
                .count(),
        })
        .collect()
}
