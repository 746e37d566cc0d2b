//! Discovering gloves

use anyhow::Result;
use glove_lib::{peripheral::discover, PipelineConfig};
use serde::Serialize;
use tabled::Tabled;

use super::device::DeviceArgs;
use crate::output::{print_info, print_table, OutputFormat};

#[derive(Tabled, Serialize)]
struct GloveRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Address")]
    address: String,
}

/// Scan for gloves and list their addresses
pub fn scan(config: &PipelineConfig, device: &DeviceArgs, format: OutputFormat) -> Result<()> {
    let adapter = device.adapter(config)?;

    if format == OutputFormat::Table {
        print_info(&format!(
            "Scanning for {}s...",
            config.peripheral.scan_timeout_secs
        ));
    }
    let addresses = discover(adapter.as_ref(), &config.peripheral)?;

    let rows: Vec<GloveRow> = addresses
        .into_iter()
        .enumerate()
        .map(|(index, address)| GloveRow { index, address })
        .collect();
    print_table(&rows, format, "No gloves found");

    Ok(())
}
