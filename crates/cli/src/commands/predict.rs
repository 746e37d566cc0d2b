//! Reading gestures from a connected glove

use anyhow::{Context, Result};
use colored::Colorize;
use glove_lib::{
    GestureReading, InferenceEngine, NoopObserver, PipelineConfig, PipelineObserver, ReadPolicy,
};
use tabled::Tabled;

use super::device::DeviceArgs;
use super::progress::ConsoleObserver;
use crate::output::{format_values, print_info, OutputFormat};

#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Gesture")]
    gesture: String,
    #[tabled(rename = "Scores")]
    scores: String,
}

fn engine(
    config: &PipelineConfig,
    device: &DeviceArgs,
    format: OutputFormat,
) -> Result<InferenceEngine> {
    let adapter = device.adapter(config)?;
    let selector = device.selector(config);
    let console = ConsoleObserver::new(config.collection.num_reps);
    let observer: &dyn PipelineObserver = match format {
        OutputFormat::Table => &console,
        OutputFormat::Json => &NoopObserver,
    };

    InferenceEngine::setup(adapter.as_ref(), selector.as_ref(), config, observer)
        .context("Failed to set up gesture inference")
}

/// Classify `count` gestures, one read each
pub fn predict(
    config: &PipelineConfig,
    device: &DeviceArgs,
    count: usize,
    policy: ReadPolicy,
    format: OutputFormat,
) -> Result<()> {
    let mut engine = engine(config, device, format)?;

    let mut rows = Vec::with_capacity(count);
    for index in 0..count {
        let prediction = engine.predict(policy)?;
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&prediction)?),
            OutputFormat::Table => rows.push(PredictionRow {
                index,
                gesture: prediction.gesture,
                scores: format_values(&prediction.scores),
            }),
        }
    }
    engine.close()?;

    if !rows.is_empty() {
        let table = tabled::Table::new(rows)
            .with(tabled::settings::Style::rounded())
            .to_string();
        println!("{}", table);
    }

    Ok(())
}

/// Print every gesture change until Ctrl-C
pub async fn watch(
    config: &PipelineConfig,
    device: &DeviceArgs,
    policy: ReadPolicy,
    format: OutputFormat,
) -> Result<()> {
    let engine = engine(config, device, format)?;
    let mut feed = engine.spawn_gesture_feed(policy)?;
    if matches!(format, OutputFormat::Table) {
        print_info("Reading gestures, press Ctrl-C to stop");
    }

    let mut last: Option<String> = None;
    loop {
        tokio::select! {
            changed = feed.receiver.changed() => {
                if changed.is_err() {
                    break;
                }
                let reading = feed.receiver.borrow_and_update().clone();
                if let Some(reading) = reading {
                    if last.as_deref() != Some(reading.gesture.as_str()) {
                        print_reading(&reading, format)?;
                        last = Some(reading.gesture);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    feed.stop()?;
    Ok(())
}

fn print_reading(reading: &GestureReading, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(reading)?),
        OutputFormat::Table => println!(
            "{}  {}",
            reading.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
            reading.gesture.bold().green()
        ),
    }
    Ok(())
}
