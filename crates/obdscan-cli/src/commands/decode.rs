//! Decode command - offline fault payload decoding

use anyhow::{Context, Result};
use obdscan::{decode_dtc_pairs, decode_frame_payload, FaultCode, ModuleAddress};

use crate::output::{FaultRow, OutputContext, OutputFormat};

/// Decode captured fault report payloads
pub fn decode(
    payloads: &[String],
    module: &str,
    pending: bool,
    stripped: bool,
    ctx: &OutputContext,
) -> Result<()> {
    let module = parse_module(module)?;

    let mut faults = Vec::new();
    for payload in payloads {
        faults.extend(decode_payload(payload, module, pending, stripped)?);
    }

    if faults.is_empty() && ctx.format == OutputFormat::Table {
        ctx.info("No fault codes in payload");
        return Ok(());
    }

    let rows: Vec<FaultRow> = faults.iter().map(FaultRow::from).collect();
    ctx.print(&rows);
    Ok(())
}

fn decode_payload(
    payload: &str,
    module: ModuleAddress,
    pending: bool,
    stripped: bool,
) -> Result<Vec<FaultCode>> {
    let digits: String = strip_hex_prefix(payload.trim())
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    let bytes = hex::decode(&digits).with_context(|| format!("Invalid hex payload: {}", payload))?;

    Ok(if stripped {
        decode_dtc_pairs(&bytes, module, pending)
    } else {
        decode_frame_payload(&bytes, module, pending)
    })
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Parse a module identifier such as `0x7E8` or `7E8`
fn parse_module(s: &str) -> Result<ModuleAddress> {
    u32::from_str_radix(strip_hex_prefix(s.trim()), 16)
        .map(ModuleAddress)
        .with_context(|| format!("Invalid module identifier: {}", s))
}
