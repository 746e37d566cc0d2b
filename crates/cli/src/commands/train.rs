//! Training a classifier on a collected dataset

use anyhow::{Context, Result};
use colored::Colorize;
use glove_lib::{
    Dataset, ModelArtifact, NoopObserver, PipelineConfig, PipelineObserver, StructuredLogger,
    TrainingHistory, TrainingSession,
};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::progress::ConsoleObserver;
use crate::output::{color_accuracy, print_json, print_success, print_warning, OutputFormat};

#[derive(Tabled)]
struct CheckpointRow {
    #[tabled(rename = "Epoch")]
    epoch: usize,
    #[tabled(rename = "Val Loss")]
    loss: String,
    #[tabled(rename = "Val Accuracy")]
    accuracy: String,
}

#[derive(Serialize)]
struct TrainingReport<'a> {
    model: &'a Path,
    checksum: &'a str,
    history: &'a TrainingHistory,
}

/// Train the configured classifier and save the artifact
pub fn train(
    config: &PipelineConfig,
    dataset: Option<&Path>,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let dataset_path = dataset.unwrap_or(config.paths.dataset.as_path());
    let output = output.unwrap_or(config.paths.model.as_path());
    let vocabulary = config.vocabulary()?;

    let data = Dataset::load_csv(dataset_path, vocabulary.clone(), config.general.sensor_count)
        .with_context(|| format!("Failed to load dataset {}", dataset_path.display()))?;

    let console = ConsoleObserver::new(config.collection.num_reps);
    let observer: &dyn PipelineObserver = match format {
        OutputFormat::Table => {
            println!(
                "{} {} records, {} model, {} epochs",
                "Training on".bold(),
                data.len(),
                config.training.model,
                config.training.num_epochs
            );
            &console
        }
        OutputFormat::Json => &NoopObserver,
    };

    let mut session = TrainingSession::from_config(&data, config.training.clone())?;
    let history = session.train(observer)?;

    let artifact = ModelArtifact::from_classifier(session.classifier(), &vocabulary)?;
    artifact
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    StructuredLogger::new("cli").log_training_complete(
        config.training.num_epochs,
        history.len(),
        &output.display().to_string(),
    );

    match format {
        OutputFormat::Json => print_json(&TrainingReport {
            model: output,
            checksum: &artifact.checksum,
            history: &history,
        }),
        OutputFormat::Table => {
            println!();
            let rows: Vec<CheckpointRow> = history
                .iter()
                .map(|c| CheckpointRow {
                    epoch: c.epoch,
                    loss: format!("{:.4}", c.validation_loss),
                    accuracy: color_accuracy(c.validation_accuracy),
                })
                .collect();
            if rows.is_empty() {
                print_warning("No validation checkpoints were recorded");
            } else {
                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}", table);
            }
            print_success(&format!("Model saved to {}", output.display()));
        }
    }

    Ok(())
}
