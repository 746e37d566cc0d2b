//! Glove Agent - live gesture service
//!
//! Connects to one glove (or replays a recorded dataset), classifies
//! continuously on a dedicated thread and serves the newest gesture next to
//! health and Prometheus endpoints.

use anyhow::Result;
use glove_lib::{
    health::{Component, HealthRegistry},
    peripheral::{FirstMatch, ReplayAdapter},
    Dataset, GestureFeed, GestureReading, GloveError, InferenceEngine, PipelineConfig,
    PipelineMetrics, ReadPolicy, StructuredLogger,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting glove-agent");

    let config = config::AgentConfig::load()?;
    let pipeline = PipelineConfig::load(config.pipeline_config.as_deref())?;
    info!(
        instance = %config.instance_name,
        replay = ?config.replay,
        fast = config.fast,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_pipeline().await;

    let metrics = PipelineMetrics::new();

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(AGENT_VERSION);

    let (gesture_tx, gesture_rx) = watch::channel(None);
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        gesture_rx,
    ));

    // Serve health while the glove is still being discovered
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let policy = if config.fast {
        ReadPolicy::Fast
    } else {
        ReadPolicy::Accurate
    };
    let started = {
        let replay = config.replay.clone();
        let logger = logger.clone();
        tokio::task::spawn_blocking(move || {
            start_feed(replay.as_deref(), &pipeline, &logger, policy)
        })
        .await?
    };

    let closer = match started {
        Ok(feed) => {
            let closer = feed.closer.clone();
            health_registry.set_ready(true).await;
            tokio::spawn(forward_gestures(feed, gesture_tx, health_registry.clone()));
            Some(closer)
        }
        Err(e) => {
            error!(error = %e, "Gesture pipeline failed to start");
            let component = if matches!(e, GloveError::NoPeripheralFound) || e.is_link_lost() {
                Component::Peripheral
            } else {
                Component::Classifier
            };
            health_registry.set_unhealthy(component, e.to_string()).await;
            health_registry
                .set_unhealthy(Component::GestureFeed, "not running")
                .await;
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    if let Some(closer) = closer {
        closer.close();
    }
    api_handle.abort();

    Ok(())
}

/// Connect, load the classifier and start classifying on a feed thread
fn start_feed(
    replay: Option<&Path>,
    pipeline: &PipelineConfig,
    logger: &StructuredLogger,
    policy: ReadPolicy,
) -> glove_lib::Result<GestureFeed> {
    let engine = match replay {
        Some(path) => {
            let dataset = Dataset::load_csv(
                path,
                pipeline.vocabulary()?,
                pipeline.general.sensor_count,
            )?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "dataset".to_string());
            let adapter = ReplayAdapter::new(
                name,
                dataset.frames().cloned().collect(),
                pipeline.peripheral.sampling_rate_hz,
            );
            InferenceEngine::setup(&adapter, &FirstMatch, pipeline, logger)?
        }
        None => live_engine(pipeline, logger)?,
    };

    engine.spawn_gesture_feed(policy)
}

#[cfg(feature = "bluez")]
fn selector(pipeline: &PipelineConfig) -> Box<dyn glove_lib::peripheral::PeripheralSelector> {
    use glove_lib::peripheral::FixedAddress;

    match &pipeline.peripheral.address {
        Some(address) => Box::new(FixedAddress(address.clone())),
        None => Box::new(FirstMatch),
    }
}

#[cfg(feature = "bluez")]
fn live_engine(
    pipeline: &PipelineConfig,
    logger: &StructuredLogger,
) -> glove_lib::Result<InferenceEngine> {
    let adapter = glove_lib::peripheral::bluez::BluezAdapter::new(&pipeline.peripheral)?;
    InferenceEngine::setup(&adapter, selector(pipeline).as_ref(), pipeline, logger)
}

#[cfg(not(feature = "bluez"))]
fn live_engine(
    _pipeline: &PipelineConfig,
    _logger: &StructuredLogger,
) -> glove_lib::Result<InferenceEngine> {
    Err(GloveError::Config(
        "built without BlueZ support; set GLOVE_AGENT_REPLAY to replay a dataset".into(),
    ))
}

/// Republish feed readings to the API until the feed thread exits
async fn forward_gestures(
    feed: GestureFeed,
    api: watch::Sender<Option<GestureReading>>,
    health_registry: HealthRegistry,
) {
    let GestureFeed {
        mut receiver,
        handle,
        ..
    } = feed;

    while receiver.changed().await.is_ok() {
        let reading = receiver.borrow_and_update().clone();
        api.send_replace(reading);
    }

    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Ok(Ok(()))) => info!("Gesture feed stopped"),
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "Gesture feed ended");
            health_registry
                .set_unhealthy(Component::Peripheral, e.to_string())
                .await;
        }
        _ => error!("Gesture feed thread panicked"),
    }

    health_registry
        .set_unhealthy(Component::GestureFeed, "stopped")
        .await;
    health_registry.set_ready(false).await;
}
