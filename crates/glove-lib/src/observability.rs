//! Observability infrastructure for the gesture pipeline
//!
//! Provides:
//! - Prometheus metrics (read protocol counters, read and inference latency,
//!   training checkpoints, loaded model)
//! - The [`PipelineObserver`] hooks that collection and training report to
//! - Structured JSON logging with tracing

use crate::training::Checkpoint;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_counter_vec, Gauge, GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for read and inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    raw_reads: IntCounter,
    malformed_frames: IntCounter,
    read_timeouts: IntCounter,
    frames_flushed: IntCounter,
    valid_read_latency_seconds: Histogram,
    records_collected: IntCounter,
    gestures_classified: IntCounterVec,
    inference_latency_seconds: Histogram,
    validation_loss: Gauge,
    validation_accuracy: Gauge,
    model_info: GaugeVec,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            raw_reads: register_int_counter!(
                "glove_raw_reads_total",
                "Raw notification reads attempted against the peripheral"
            )
            .expect("Failed to register raw_reads"),

            malformed_frames: register_int_counter!(
                "glove_malformed_frames_total",
                "Frames discarded because their length disagreed with the sensor count"
            )
            .expect("Failed to register malformed_frames"),

            read_timeouts: register_int_counter!(
                "glove_read_timeouts_total",
                "Raw reads that timed out without a notification"
            )
            .expect("Failed to register read_timeouts"),

            frames_flushed: register_int_counter!(
                "glove_frames_flushed_total",
                "Raw reads spent flushing stale notifications"
            )
            .expect("Failed to register frames_flushed"),

            valid_read_latency_seconds: register_histogram!(
                "glove_valid_read_latency_seconds",
                "Time to obtain one valid sensor frame",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register valid_read_latency_seconds"),

            records_collected: register_int_counter!(
                "glove_records_collected_total",
                "Labeled records emitted by data collection"
            )
            .expect("Failed to register records_collected"),

            gestures_classified: register_int_counter_vec!(
                "glove_gestures_classified_total",
                "Gestures classified by the inference engine",
                &["gesture"]
            )
            .expect("Failed to register gestures_classified"),

            inference_latency_seconds: register_histogram!(
                "glove_inference_latency_seconds",
                "Time for one read_gesture call, read included",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            validation_loss: register_gauge!(
                "glove_validation_loss",
                "Validation loss at the most recent training checkpoint"
            )
            .expect("Failed to register validation_loss"),

            validation_accuracy: register_gauge!(
                "glove_validation_accuracy",
                "Validation accuracy at the most recent training checkpoint"
            )
            .expect("Failed to register validation_accuracy"),

            model_info: register_gauge_vec!(
                "glove_model_info",
                "Information about the currently loaded classifier",
                &["kind", "checksum"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PipelineMetrics")
    }
}

impl PipelineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn inc_raw_reads(&self) {
        self.inner().raw_reads.inc();
    }

    pub fn inc_malformed_frames(&self) {
        self.inner().malformed_frames.inc();
    }

    pub fn inc_read_timeouts(&self) {
        self.inner().read_timeouts.inc();
    }

    pub fn add_frames_flushed(&self, count: u64) {
        self.inner().frames_flushed.inc_by(count);
    }

    pub fn observe_valid_read_latency(&self, duration_secs: f64) {
        self.inner().valid_read_latency_seconds.observe(duration_secs);
    }

    pub fn inc_records_collected(&self) {
        self.inner().records_collected.inc();
    }

    /// Record one classification outcome and its latency
    pub fn observe_inference(&self, gesture: &str, duration_secs: f64) {
        self.inner()
            .gestures_classified
            .with_label_values(&[gesture])
            .inc();
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn set_checkpoint(&self, checkpoint: &Checkpoint) {
        self.inner().validation_loss.set(f64::from(checkpoint.validation_loss));
        self.inner()
            .validation_accuracy
            .set(f64::from(checkpoint.validation_accuracy));
    }

    /// Update loaded model info
    pub fn set_model_info(&self, kind: &str, checksum: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[kind, checksum])
            .set(1.0);
    }
}

/// Hooks the pipeline reports progress through.
///
/// Every hook has a no-op default so implementors pick what they display.
pub trait PipelineObserver {
    fn on_peripheral_connected(&self, _address: &str) {}

    /// The wearer should now hold `gesture`; reading starts after the prompt delay
    fn on_gesture_prompt(&self, _set: usize, _gesture_index: usize, _gesture: &str) {}

    /// `collected` reps of `gesture` recorded so far in the current set
    fn on_gesture_recorded(&self, _gesture: &str, _collected: usize) {}

    fn on_checkpoint(&self, _checkpoint: &Checkpoint) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Structured logger for pipeline events
///
/// Provides consistent JSON-formatted logging for collection progress,
/// training checkpoints and classifications.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Per-read classification; debug level since the feed classifies at
    /// the sampling rate
    pub fn log_prediction(&self, gesture: &str, gesture_index: usize, fast: bool, latency_ms: f64) {
        debug!(
            event = "gesture_classified",
            component = %self.component,
            gesture = %gesture,
            gesture_index = gesture_index,
            fast = fast,
            latency_ms = latency_ms,
            "Classified gesture"
        );
    }

    pub fn log_collection_complete(&self, records: usize, path: &str) {
        info!(
            event = "collection_complete",
            component = %self.component,
            records = records,
            path = %path,
            "Data collection complete"
        );
    }

    pub fn log_training_complete(&self, epochs: usize, checkpoints: usize, path: &str) {
        info!(
            event = "training_complete",
            component = %self.component,
            epochs = epochs,
            checkpoints = checkpoints,
            path = %path,
            "Training complete, classifier saved"
        );
    }

    pub fn log_model_loaded(&self, kind: &str, checksum: &str, path: &str) {
        info!(
            event = "model_loaded",
            component = %self.component,
            kind = %kind,
            checksum = %checksum,
            path = %path,
            "Classifier loaded"
        );
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "pipeline_started",
            component = %self.component,
            version = %version,
            "Gesture pipeline started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "pipeline_shutdown",
            component = %self.component,
            reason = %reason,
            "Gesture pipeline shutting down"
        );
    }

    /// Log loss of the peripheral link
    pub fn log_link_lost(&self, address: &str, error: &str) {
        warn!(
            event = "peripheral_lost",
            component = %self.component,
            address = %address,
            error = %error,
            "Peripheral link lost, a new discovery pass is required"
        );
    }
}

impl PipelineObserver for StructuredLogger {
    fn on_peripheral_connected(&self, address: &str) {
        info!(
            event = "peripheral_connected",
            component = %self.component,
            address = %address,
            "Peripheral connected"
        );
    }

    fn on_gesture_prompt(&self, set: usize, gesture_index: usize, gesture: &str) {
        info!(
            event = "gesture_prompt",
            component = %self.component,
            set = set,
            gesture_index = gesture_index,
            gesture = %gesture,
            "Current gesture: {}",
            gesture
        );
    }

    fn on_gesture_recorded(&self, gesture: &str, collected: usize) {
        debug!(
            event = "gesture_recorded",
            component = %self.component,
            gesture = %gesture,
            collected = collected,
            "Recorded rep"
        );
    }

    fn on_checkpoint(&self, checkpoint: &Checkpoint) {
        info!(
            event = "training_checkpoint",
            component = %self.component,
            epoch = checkpoint.epoch,
            validation_loss = checkpoint.validation_loss,
            validation_accuracy = checkpoint.validation_accuracy,
            "Epoch [{}], val_loss: {:.4}, val_acc: {:.4}",
            checkpoint.epoch,
            checkpoint.validation_loss,
            checkpoint.validation_accuracy
        );
    }
}
