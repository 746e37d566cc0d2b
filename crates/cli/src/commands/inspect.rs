//! Summarizing a collected dataset

use anyhow::{Context, Result};
use colored::Colorize;
use glove_lib::{Dataset, PipelineConfig};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{format_values, print_json, OutputFormat};

#[derive(Tabled)]
struct GestureRow {
    #[tabled(rename = "Index")]
    index: usize,
    #[tabled(rename = "Gesture")]
    gesture: String,
    #[tabled(rename = "Records")]
    records: usize,
    #[tabled(rename = "Mean capacitance (pF)")]
    means: String,
}

#[derive(Serialize)]
struct DatasetReport<'a> {
    path: &'a Path,
    records: usize,
    sensor_count: usize,
    gestures: Vec<glove_lib::dataset::GestureSummary>,
}

/// Print per-gesture record counts and mean sensor values
pub fn inspect(
    config: &PipelineConfig,
    dataset: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let path = dataset.unwrap_or(config.paths.dataset.as_path());
    let data = Dataset::load_csv(path, config.vocabulary()?, config.general.sensor_count)
        .with_context(|| format!("Failed to load dataset {}", path.display()))?;
    let summary = data.summarize();

    match format {
        OutputFormat::Json => print_json(&DatasetReport {
            path,
            records: data.len(),
            sensor_count: data.sensor_count(),
            gestures: summary,
        }),
        OutputFormat::Table => {
            println!("{}", "Dataset".bold());
            println!("{}", "=".repeat(50));
            println!("Path:     {}", path.display().to_string().cyan());
            println!("Records:  {}", data.len());
            println!("Sensors:  {}", data.sensor_count());
            println!();

            let rows: Vec<GestureRow> = summary
                .iter()
                .map(|s| GestureRow {
                    index: s.gesture_index,
                    gesture: s.gesture_name.clone(),
                    records: s.records,
                    means: format_values(&s.means),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
