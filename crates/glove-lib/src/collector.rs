//! Structured gesture acquisition
//!
//! Drives a [`SensorStreamReader`] through `sets x gestures x reps` and
//! returns the labeled records once the whole run has completed.

use crate::error::Result;
use crate::models::{GestureVocabulary, LabeledRecord};
use crate::observability::{PipelineMetrics, PipelineObserver};
use crate::reader::SensorStreamReader;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Configuration for one acquisition run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Number of passes over the whole vocabulary
    pub num_sets: usize,
    /// Valid frames recorded per gesture per set
    pub num_reps: usize,
    /// Pause after each prompt and after each gesture, so the wearer can
    /// change hand position
    pub prompt_delay_ms: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            num_sets: 1,
            num_reps: 500,
            prompt_delay_ms: 1000,
        }
    }
}

impl CollectionConfig {
    pub fn prompt_delay(&self) -> Duration {
        Duration::from_millis(self.prompt_delay_ms)
    }

    /// Records a completed run emits for `gestures` gestures
    pub fn expected_records(&self, gestures: usize) -> usize {
        self.num_sets * gestures * self.num_reps
    }
}

/// Runs the acquisition procedure against one reader
pub struct DataCollector<'a> {
    reader: &'a mut SensorStreamReader,
    vocabulary: &'a GestureVocabulary,
    config: CollectionConfig,
    metrics: PipelineMetrics,
}

impl<'a> DataCollector<'a> {
    pub fn new(
        reader: &'a mut SensorStreamReader,
        vocabulary: &'a GestureVocabulary,
        config: CollectionConfig,
    ) -> Self {
        Self {
            reader,
            vocabulary,
            config,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Run every set and return the records in (set, gesture, rep) order.
    ///
    /// Nothing is returned until the run completes; an error part way
    /// through discards what was read so far.
    pub fn collect(&mut self, observer: &dyn PipelineObserver) -> Result<Vec<LabeledRecord>> {
        let total = self.config.expected_records(self.vocabulary.len());
        let mut records = Vec::with_capacity(total);
        let delay = self.config.prompt_delay();

        info!(
            num_sets = self.config.num_sets,
            gestures = self.vocabulary.len(),
            num_reps = self.config.num_reps,
            total,
            "Starting data collection"
        );

        for set in 0..self.config.num_sets {
            for (index, gesture) in self.vocabulary.iter() {
                observer.on_gesture_prompt(set, index, gesture);
                pause(delay);

                self.reader.clear_buffer_default()?;

                for rep in 0..self.config.num_reps {
                    let frame = self.reader.read_valid(false)?;
                    records.push(LabeledRecord::new(index, gesture, frame));
                    self.metrics.inc_records_collected();
                    observer.on_gesture_recorded(gesture, rep + 1);
                }

                info!(set, gesture = %gesture, reps = self.config.num_reps, "Gesture completed");
                pause(delay);
            }
        }

        Ok(records)
    }
}

fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
