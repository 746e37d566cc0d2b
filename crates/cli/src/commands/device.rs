//! Choosing and opening a glove

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use glove_lib::peripheral::{
    BleAdapter, FirstMatch, FixedAddress, PeripheralSelector, ReplayAdapter,
};
use glove_lib::{Dataset, PipelineConfig};
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Options selecting the glove to talk to
#[derive(Args, Debug, Clone, Default)]
pub struct DeviceArgs {
    /// Connect to this address without prompting
    #[arg(long, conflicts_with = "first")]
    pub address: Option<String>,

    /// Connect to the first glove found without prompting
    #[arg(long)]
    pub first: bool,

    /// Replay frames from a dataset CSV instead of using Bluetooth
    #[arg(long, value_name = "CSV")]
    pub replay: Option<PathBuf>,
}

impl DeviceArgs {
    /// Adapter for the replay file or the host's Bluetooth radio
    pub fn adapter(&self, config: &PipelineConfig) -> Result<Box<dyn BleAdapter>> {
        match &self.replay {
            Some(path) => {
                let dataset = Dataset::load_csv(
                    path,
                    config.vocabulary()?,
                    config.general.sensor_count,
                )
                .with_context(|| format!("Failed to load replay file {}", path.display()))?;
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "dataset".to_string());
                Ok(Box::new(ReplayAdapter::new(
                    name,
                    dataset.frames().cloned().collect(),
                    config.peripheral.sampling_rate_hz,
                )))
            }
            None => live_adapter(config),
        }
    }

    /// How to pick among discovered gloves
    pub fn selector(&self, config: &PipelineConfig) -> Box<dyn PeripheralSelector> {
        if let Some(address) = self.address.as_ref().or(config.peripheral.address.as_ref()) {
            return Box::new(FixedAddress(address.clone()));
        }
        if self.first || self.replay.is_some() {
            return Box::new(FirstMatch);
        }
        Box::new(PromptSelector)
    }
}

#[cfg(feature = "bluez")]
fn live_adapter(config: &PipelineConfig) -> Result<Box<dyn BleAdapter>> {
    let adapter = glove_lib::peripheral::bluez::BluezAdapter::new(&config.peripheral)
        .context("Failed to open the Bluetooth adapter")?;
    Ok(Box::new(adapter))
}

#[cfg(not(feature = "bluez"))]
fn live_adapter(_config: &PipelineConfig) -> Result<Box<dyn BleAdapter>> {
    anyhow::bail!("Built without BlueZ support; pass --replay <CSV> to use recorded data")
}

/// Lists the discovered gloves and asks which one to use
pub struct PromptSelector;

impl PeripheralSelector for PromptSelector {
    fn select(&self, addresses: &[String]) -> Option<String> {
        let stdin = std::io::stdin();
        choose(addresses, &mut stdin.lock(), &mut std::io::stdout())
    }
}

/// A single candidate is taken as-is; otherwise read an index from `input`
fn choose(
    addresses: &[String],
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Option<String> {
    if addresses.len() == 1 {
        return addresses.first().cloned();
    }

    let _ = writeln!(output, "{}", "Available gloves:".bold());
    for (index, address) in addresses.iter().enumerate() {
        let _ = writeln!(output, "  [{}] {}", index, address.cyan());
    }
    let _ = write!(output, "Select a glove: ");
    let _ = output.flush();

    let mut line = String::new();
    input.read_line(&mut line).ok()?;
    let index: usize = line.trim().parse().ok()?;
    addresses.get(index).cloned()
}
