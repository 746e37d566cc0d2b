//! "Read one gesture now"
//!
//! [`InferenceEngine`] binds a connected reader, a trained classifier and the
//! gesture vocabulary. For continuous control loops,
//! [`InferenceEngine::spawn_gesture_feed`] moves the engine onto its own
//! thread and publishes each classification into a single-slot watch
//! channel: the producer never blocks and consumers only ever see the newest
//! gesture.

use crate::classifier::{argmax, Classifier, ModelArtifact};
use crate::config::PipelineConfig;
use crate::error::{GloveError, Result};
use crate::models::{GestureVocabulary, SensorFrame};
use crate::observability::{PipelineMetrics, PipelineObserver, StructuredLogger};
use crate::peripheral::{BleAdapter, PeripheralSelector, PeripheralSession, SessionCloser};
use crate::reader::{ReadPolicy, SensorStreamReader};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::watch;
use tracing::info;

/// Outcome of classifying one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub gesture: String,
    pub gesture_index: usize,
    pub scores: Vec<f32>,
}

/// A classification published by the gesture feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureReading {
    pub gesture: String,
    pub gesture_index: usize,
    /// Increments with every published reading
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

/// Live classifier over one connected glove
pub struct InferenceEngine {
    reader: SensorStreamReader,
    classifier: Box<dyn Classifier>,
    vocabulary: GestureVocabulary,
    metrics: PipelineMetrics,
    logger: StructuredLogger,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("reader", &self.reader)
            .field("model", &self.classifier.kind())
            .field("vocabulary", &self.vocabulary)
            .finish()
    }
}

impl InferenceEngine {
    /// Bind the parts, checking that their dimensions agree
    pub fn new(
        reader: SensorStreamReader,
        classifier: Box<dyn Classifier>,
        vocabulary: GestureVocabulary,
    ) -> Result<Self> {
        let sensor_count = reader.session().sensor_count();
        if classifier.input_dim() != sensor_count {
            return Err(GloveError::shape(
                "classifier inputs",
                sensor_count,
                classifier.input_dim(),
            ));
        }
        if classifier.output_dim() != vocabulary.len() {
            return Err(GloveError::shape(
                "classifier outputs",
                vocabulary.len(),
                classifier.output_dim(),
            ));
        }

        Ok(Self {
            reader,
            classifier,
            vocabulary,
            metrics: PipelineMetrics::new(),
            logger: StructuredLogger::new("inference"),
        })
    }

    /// Connect a glove, load the trained classifier from `paths.model` and
    /// bind the configured vocabulary.
    ///
    /// [`GloveError::NoPeripheralFound`] is returned as-is and is not
    /// retried.
    pub fn setup(
        adapter: &dyn BleAdapter,
        selector: &dyn PeripheralSelector,
        config: &PipelineConfig,
        observer: &dyn PipelineObserver,
    ) -> Result<Self> {
        let vocabulary = config.vocabulary()?;
        let session = PeripheralSession::establish(
            adapter,
            selector,
            &config.peripheral,
            config.general.sensor_count,
        )?;
        observer.on_peripheral_connected(session.address());

        let model_path = config.paths.model.display().to_string();
        let artifact = ModelArtifact::load(&config.paths.model)?;
        if artifact.vocabulary != vocabulary {
            return Err(GloveError::InvalidVocabulary(format!(
                "model {} was trained on {:?}, configured gestures are {:?}",
                model_path,
                artifact.vocabulary.names(),
                vocabulary.names()
            )));
        }
        let classifier = artifact.build_classifier()?;

        let engine = Self::new(
            SensorStreamReader::new(session, config.reader.clone()),
            classifier,
            vocabulary,
        )?;
        engine
            .metrics
            .set_model_info(&artifact.kind.to_string(), &artifact.checksum);
        engine
            .logger
            .log_model_loaded(&artifact.kind.to_string(), &artifact.checksum, &model_path);

        Ok(engine)
    }

    /// Score one frame and map the best class to its gesture name
    pub fn classify(&self, frame: &SensorFrame) -> Result<Prediction> {
        let scores = self.classifier.forward(frame)?;
        let gesture_index = argmax(&scores);
        let gesture = self
            .vocabulary
            .name(gesture_index)
            .ok_or_else(|| {
                GloveError::shape("gesture index", self.vocabulary.len(), gesture_index)
            })?
            .to_string();

        Ok(Prediction {
            gesture,
            gesture_index,
            scores,
        })
    }

    /// Read a frame under `policy` and classify it
    pub fn predict(&mut self, policy: ReadPolicy) -> Result<Prediction> {
        let started = Instant::now();
        let frame = self.reader.read(policy)?;
        let prediction = self.classify(&frame)?;

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.observe_inference(&prediction.gesture, elapsed);
        self.logger.log_prediction(
            &prediction.gesture,
            prediction.gesture_index,
            policy == ReadPolicy::Fast,
            elapsed * 1000.0,
        );
        Ok(prediction)
    }

    /// Flush stale notifications, then classify a fresh frame
    pub fn read_gesture(&mut self) -> Result<String> {
        self.predict(ReadPolicy::Accurate).map(|p| p.gesture)
    }

    /// Classify the next frame without flushing; may be stale
    pub fn read_gesture_fast(&mut self) -> Result<String> {
        self.predict(ReadPolicy::Fast).map(|p| p.gesture)
    }

    pub fn vocabulary(&self) -> &GestureVocabulary {
        &self.vocabulary
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn reader(&self) -> &SensorStreamReader {
        &self.reader
    }

    /// Handle that aborts a blocked read from another thread
    pub fn closer(&self) -> SessionCloser {
        self.reader.session().closer()
    }

    pub fn close(self) -> Result<()> {
        self.reader.into_session().close()
    }

    /// Move the engine onto a dedicated thread that classifies continuously.
    ///
    /// The thread stops when every receiver is dropped, when the returned
    /// feed's closer is used, or on the first read error, which the join
    /// handle yields.
    pub fn spawn_gesture_feed(self, policy: ReadPolicy) -> Result<GestureFeed> {
        let (tx, rx) = watch::channel(None);
        let closer = self.closer();

        let handle = std::thread::Builder::new()
            .name("gesture-feed".to_string())
            .spawn(move || run_feed(self, policy, tx))?;

        Ok(GestureFeed {
            receiver: rx,
            closer,
            handle,
        })
    }
}

fn run_feed(
    mut engine: InferenceEngine,
    policy: ReadPolicy,
    tx: watch::Sender<Option<GestureReading>>,
) -> Result<()> {
    info!(policy = ?policy, "Gesture feed started");
    let mut sequence = 0u64;

    loop {
        if tx.is_closed() {
            info!("Gesture feed has no subscribers, stopping");
            return engine.close();
        }

        let prediction = match engine.predict(policy) {
            Ok(prediction) => prediction,
            Err(e) => {
                engine
                    .logger
                    .log_link_lost(engine.reader.session().address(), &e.to_string());
                return Err(e);
            }
        };

        sequence += 1;
        tx.send_replace(Some(GestureReading {
            gesture: prediction.gesture,
            gesture_index: prediction.gesture_index,
            sequence,
            timestamp: Utc::now(),
        }));
    }
}

/// Consumer side of a running gesture feed
pub struct GestureFeed {
    pub receiver: watch::Receiver<Option<GestureReading>>,
    pub closer: SessionCloser,
    pub handle: JoinHandle<Result<()>>,
}

impl GestureFeed {
    /// The newest reading, if any has been published yet
    pub fn latest(&self) -> Option<GestureReading> {
        self.receiver.borrow().clone()
    }

    /// Close the session and wait for the feed thread
    pub fn stop(self) -> Result<()> {
        self.closer.close();
        drop(self.receiver);
        match self.handle.join() {
            Ok(Err(GloveError::Disconnected)) | Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GloveError::Transport("gesture feed thread panicked".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{build_classifier, LinearClassifier, ModelKind};
    use crate::peripheral::{FirstMatch, ScriptedAdapter, ScriptedLink};
    use crate::reader::ReaderConfig;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn vocabulary() -> GestureVocabulary {
        GestureVocabulary::new(["rock", "paper"]).unwrap()
    }

    /// Scores class 0 by the first sensor and class 1 by the second
    fn diagonal() -> Box<dyn Classifier> {
        let mut rng = StdRng::seed_from_u64(0);
        let mut model = LinearClassifier::new(2, 2, &mut rng);
        model
            .load_parameters(&[
                ("weight".to_string(), array![[1.0, 0.0], [0.0, 1.0]]),
                ("bias".to_string(), array![[0.0, 0.0]]),
            ])
            .unwrap();
        Box::new(model)
    }

    fn reader(link: ScriptedLink, clear_count: usize) -> SensorStreamReader {
        let session = PeripheralSession::from_link(Box::new(link), 2, Duration::from_millis(1));
        SensorStreamReader::new(
            session,
            ReaderConfig {
                clear_count,
                max_attempts: None,
            },
        )
    }

    #[test]
    fn test_accurate_read_skips_stale_frames() {
        let script = vec![
            Some(vec![9.0, 0.0]),
            Some(vec![9.0, 0.0]),
            Some(vec![0.0, 9.0]),
            Some(vec![9.0, 0.0]),
        ];
        let mut engine =
            InferenceEngine::new(reader(ScriptedLink::new(script), 2), diagonal(), vocabulary())
                .unwrap();

        assert_eq!(engine.read_gesture().unwrap(), "paper");
        assert_eq!(engine.read_gesture_fast().unwrap(), "rock");
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_predict_logs_structured_classification() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();

        let mut engine = InferenceEngine::new(
            reader(ScriptedLink::repeating(vec![0.0, 9.0]), 0),
            diagonal(),
            vocabulary(),
        )
        .unwrap();
        tracing::subscriber::with_default(subscriber, || {
            engine.predict(ReadPolicy::Fast).unwrap();
        });

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let event: serde_json::Value = output
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
            .find(|line| line["fields"]["event"] == "gesture_classified")
            .expect("classification event");
        assert_eq!(event["fields"]["gesture"], "paper");
        assert_eq!(event["fields"]["gesture_index"], 1);
        assert_eq!(event["fields"]["fast"], true);
        assert_eq!(event["fields"]["component"], "inference");
    }

    #[test]
    fn test_new_rejects_dimension_mismatch() {
        let mut rng = StdRng::seed_from_u64(0);
        let three_outputs = build_classifier(ModelKind::Linear, 2, 3, 0, &mut rng);
        let result = InferenceEngine::new(
            reader(ScriptedLink::repeating(vec![1.0, 1.0]), 0),
            three_outputs,
            vocabulary(),
        );
        assert!(matches!(result, Err(GloveError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_setup_without_peripheral_fails() {
        let config = PipelineConfig::default();
        let result = InferenceEngine::setup(
            &ScriptedAdapter::new(),
            &FirstMatch,
            &config,
            &crate::observability::NoopObserver,
        );
        assert!(matches!(result, Err(GloveError::NoPeripheralFound)));
    }

    #[test]
    fn test_setup_loads_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.general.sensor_count = 2;
        config.general.gestures = vec!["rock".into(), "paper".into()];
        config.reader.clear_count = 1;
        config.peripheral.scan_timeout_secs = 0;
        config.paths.model = dir.path().join("model.json");

        ModelArtifact::from_classifier(diagonal().as_ref(), &vocabulary())
            .unwrap()
            .save(&config.paths.model)
            .unwrap();

        let adapter =
            ScriptedAdapter::new().with_link("AA", ScriptedLink::repeating(vec![0.5, 3.0]));
        let mut engine = InferenceEngine::setup(
            &adapter,
            &FirstMatch,
            &config,
            &crate::observability::NoopObserver,
        )
        .unwrap();
        assert_eq!(engine.read_gesture().unwrap(), "paper");

        config.general.gestures = vec!["paper".into(), "rock".into()];
        let adapter =
            ScriptedAdapter::new().with_link("AA", ScriptedLink::repeating(vec![0.5, 3.0]));
        let result = InferenceEngine::setup(
            &adapter,
            &FirstMatch,
            &config,
            &crate::observability::NoopObserver,
        );
        assert!(matches!(result, Err(GloveError::InvalidVocabulary(_))));
    }

    #[test]
    fn test_gesture_feed_publishes_latest() {
        let engine = InferenceEngine::new(
            reader(ScriptedLink::repeating(vec![0.0, 4.0]), 0),
            diagonal(),
            vocabulary(),
        )
        .unwrap();
        let feed = engine.spawn_gesture_feed(ReadPolicy::Fast).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while feed.latest().map_or(true, |r| r.sequence < 3) {
            assert!(Instant::now() < deadline, "feed produced nothing");
            std::thread::sleep(Duration::from_millis(1));
        }

        let reading = feed.latest().unwrap();
        assert_eq!(reading.gesture, "paper");
        assert!(feed.receiver.has_changed().is_ok());
        feed.stop().unwrap();
    }

    #[test]
    fn test_gesture_feed_ends_on_disconnect() {
        let engine = InferenceEngine::new(
            reader(ScriptedLink::new(vec![Some(vec![3.0, 0.0])]), 0),
            diagonal(),
            vocabulary(),
        )
        .unwrap();
        let feed = engine.spawn_gesture_feed(ReadPolicy::Fast).unwrap();

        let result = feed.handle.join().unwrap();
        assert!(matches!(result, Err(GloveError::Disconnected)));
        assert_eq!(feed.receiver.borrow().as_ref().map(|r| r.gesture.as_str()), Some("rock"));
    }
}
