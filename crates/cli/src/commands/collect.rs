//! Recording a labeled dataset

use anyhow::{Context, Result};
use glove_lib::{
    DataCollector, Dataset, NoopObserver, PeripheralSession, PipelineConfig, PipelineObserver,
    SensorStreamReader, StructuredLogger,
};
use std::path::Path;

use super::device::DeviceArgs;
use super::progress::ConsoleObserver;
use crate::output::{print_info, print_json, print_success, OutputFormat};

/// Connect to a glove, prompt through every gesture and save the CSV
pub fn collect(
    config: &PipelineConfig,
    device: &DeviceArgs,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let vocabulary = config.vocabulary()?;
    let output = output.unwrap_or(config.paths.dataset.as_path());
    let console = ConsoleObserver::new(config.collection.num_reps);
    let observer: &dyn PipelineObserver = match format {
        OutputFormat::Table => &console,
        OutputFormat::Json => &NoopObserver,
    };

    let adapter = device.adapter(config)?;
    let selector = device.selector(config);
    let session = PeripheralSession::establish(
        adapter.as_ref(),
        selector.as_ref(),
        &config.peripheral,
        config.general.sensor_count,
    )
    .context("Could not connect to a glove")?;
    observer.on_peripheral_connected(session.address());

    if format == OutputFormat::Table {
        print_info(&format!(
            "Recording {} set(s) of {} reps for {} gestures",
            config.collection.num_sets,
            config.collection.num_reps,
            vocabulary.len()
        ));
    }

    let mut reader = SensorStreamReader::new(session, config.reader.clone());
    let records = DataCollector::new(&mut reader, &vocabulary, config.collection.clone())
        .collect(observer)?;
    reader.into_session().close()?;

    let dataset = Dataset::new(vocabulary, config.general.sensor_count, records)?;
    dataset
        .save_csv(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    StructuredLogger::new("cli")
        .log_collection_complete(dataset.len(), &output.display().to_string());
    match format {
        OutputFormat::Table => print_success(&format!(
            "Saved {} records to {}",
            dataset.len(),
            output.display()
        )),
        OutputFormat::Json => print_json(&serde_json::json!({
            "records": dataset.len(),
            "path": output,
        })),
    }

    Ok(())
}
