//! Gesture pipeline library for capacitive sensing gloves
//!
//! This crate provides the core functionality for:
//! - Peripheral discovery, connection and the raw notification read
//! - Clean sensor reads with stale-buffer flushing and validity retries
//! - Structured labeled data collection
//! - Classifier training and model artifacts
//! - Single-call gesture inference and a latest-value gesture feed
//! - Health checks and observability

pub mod classifier;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod error;
pub mod health;
pub mod inference;
pub mod models;
pub mod observability;
pub mod peripheral;
pub mod reader;
pub mod training;

pub use classifier::{Classifier, ModelArtifact, ModelKind};
pub use collector::{CollectionConfig, DataCollector};
pub use config::PipelineConfig;
pub use dataset::{Dataset, Partition};
pub use error::{GloveError, Result};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use inference::{GestureFeed, GestureReading, InferenceEngine, Prediction};
pub use models::*;
pub use observability::{NoopObserver, PipelineMetrics, PipelineObserver, StructuredLogger};
pub use peripheral::{PeripheralSession, SessionState};
pub use reader::{ReadPolicy, SensorStreamReader};
pub use training::{Checkpoint, OptimizerKind, TrainingHistory, TrainingSession};
