//! End-to-end tests for the gesture pipeline
//!
//! These run collection, training and inference against in-process
//! peripherals, so no Bluetooth hardware is required.

use glove_lib::classifier::{argmax, build_classifier};
use glove_lib::peripheral::{
    BleAdapter, FirstMatch, PeripheralLink, PeripheralSession, ScriptedAdapter, ScriptedLink,
};
use glove_lib::reader::ReaderConfig;
use glove_lib::{
    CollectionConfig, DataCollector, Dataset, GestureVocabulary, GloveError, InferenceEngine,
    LabeledRecord, ModelArtifact, ModelKind, NoopObserver, OptimizerKind, PipelineConfig,
    PipelineObserver, SensorFrame, SensorStreamReader, TrainingSession,
};
use glove_lib::training::TrainingConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCENARIO_FRAME: [f32; 7] = [125.9, 279.0, 131.4, 304.0, 297.3, 282.8, 286.9];

fn rock_paper_scissors() -> GestureVocabulary {
    GestureVocabulary::new(["rock", "paper", "scissors"]).unwrap()
}

/// A glove whose readings follow the gesture the wearer was last asked for.
///
/// Sensor `k` reads high while gesture `k` is held. Every third read is a
/// timeout and every fifth a truncated frame.
struct PosedGlove {
    pose: Arc<Mutex<usize>>,
    reads: usize,
    sensors: usize,
}

impl PeripheralLink for PosedGlove {
    fn address(&self) -> &str {
        "posed"
    }

    fn raw_read(&mut self, _timeout: Duration) -> glove_lib::Result<Option<SensorFrame>> {
        self.reads += 1;
        if self.reads % 3 == 0 {
            return Ok(None);
        }
        let pose = *self.pose.lock().unwrap();
        let mut values: Vec<f32> = (0..self.sensors)
            .map(|k| if k == pose { 1.0 } else { 0.05 * ((self.reads + k) % 3) as f32 })
            .collect();
        if self.reads % 5 == 0 {
            values.pop();
        }
        Ok(Some(SensorFrame::new(values)))
    }

    fn close(&mut self) -> glove_lib::Result<()> {
        Ok(())
    }
}

/// Moves the wearer's hand whenever collection prompts a new gesture
struct Wearer {
    pose: Arc<Mutex<usize>>,
}

impl PipelineObserver for Wearer {
    fn on_gesture_prompt(&self, _set: usize, gesture_index: usize, _gesture: &str) {
        *self.pose.lock().unwrap() = gesture_index;
    }
}

fn quick_reader(link: Box<dyn PeripheralLink>, sensors: usize) -> SensorStreamReader {
    let session = PeripheralSession::from_link(link, sensors, Duration::from_millis(1));
    SensorStreamReader::new(
        session,
        ReaderConfig {
            clear_count: 4,
            max_attempts: None,
        },
    )
}

fn separable_dataset(per_class: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let vocabulary = rock_paper_scissors();
    let mut records = Vec::new();

    for i in 0..per_class * 3 {
        let class = i % 3;
        let values: Vec<f32> = (0..7)
            .map(|k| if k == class { 1.0 } else { rng.gen_range(0.0..0.1) })
            .collect();
        records.push(LabeledRecord::new(
            class,
            vocabulary.name(class).unwrap(),
            SensorFrame::new(values),
        ));
    }

    Dataset::new(vocabulary, 7, records).unwrap()
}

#[test]
fn scenario_a_collection_emits_six_ordered_records() {
    let vocabulary = rock_paper_scissors();
    let link = ScriptedLink::repeating(SCENARIO_FRAME.to_vec());
    let mut reader = quick_reader(Box::new(link), 7);
    let config = CollectionConfig {
        num_sets: 1,
        num_reps: 2,
        prompt_delay_ms: 0,
    };

    let records = DataCollector::new(&mut reader, &vocabulary, config)
        .collect(&NoopObserver)
        .unwrap();

    assert_eq!(records.len(), 6);
    let labels: Vec<(usize, &str)> = records
        .iter()
        .map(|r| (r.gesture_index, r.gesture_name.as_str()))
        .collect();
    assert_eq!(
        labels,
        vec![
            (0, "rock"),
            (0, "rock"),
            (1, "paper"),
            (1, "paper"),
            (2, "scissors"),
            (2, "scissors"),
        ]
    );
    assert!(records.iter().all(|r| r.frame.len() == 7));
}

#[test]
fn scenario_b_fixed_parameters_classify_deterministically() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.peripheral.scan_timeout_secs = 0;
    config.reader.clear_count = 3;
    config.paths.model = dir.path().join("trained_models").join("model.json");

    let mut rng = StdRng::seed_from_u64(2024);
    let classifier = build_classifier(ModelKind::FeedForward, 7, 3, 32, &mut rng);
    let scores = classifier
        .forward(&SensorFrame::new(SCENARIO_FRAME.to_vec()))
        .unwrap();
    assert_eq!(scores.len(), 3);
    let expected = rock_paper_scissors().name(argmax(&scores)).unwrap().to_string();

    ModelArtifact::from_classifier(classifier.as_ref(), &rock_paper_scissors())
        .unwrap()
        .save(&config.paths.model)
        .unwrap();

    let adapter = ScriptedAdapter::new().with_link(
        "AA:BB:CC:DD:EE:FF",
        ScriptedLink::repeating(SCENARIO_FRAME.to_vec()),
    );
    let mut engine = InferenceEngine::setup(&adapter, &FirstMatch, &config, &NoopObserver).unwrap();

    let first = engine.read_gesture().unwrap();
    let second = engine.read_gesture_fast().unwrap();
    assert!(["rock", "paper", "scissors"].contains(&first.as_str()));
    assert_eq!(first, expected);
    assert_eq!(second, first);
}

#[test]
fn scenario_c_separable_data_reaches_full_accuracy() {
    let dataset = separable_dataset(100, 5);
    let config = TrainingConfig {
        model: ModelKind::Linear,
        batch_size: 16,
        num_epochs: 50,
        learning_rate: 0.5,
        optimizer: OptimizerKind::Sgd,
        validation_interval: 10,
        seed: Some(42),
        ..Default::default()
    };

    let mut session = TrainingSession::from_config(&dataset, config).unwrap();
    let history = session.train(&NoopObserver).unwrap();

    let epochs: Vec<usize> = history.iter().map(|c| c.epoch).collect();
    assert_eq!(epochs, vec![0, 10, 20, 30, 40]);
    assert_eq!(history.last().unwrap().validation_accuracy, 1.0);
}

#[test]
fn feed_forward_with_adam_learns_separable_data() {
    let dataset = separable_dataset(60, 9);
    let config = TrainingConfig {
        model: ModelKind::FeedForward,
        hidden_units: 16,
        batch_size: 16,
        num_epochs: 41,
        learning_rate: 0.01,
        optimizer: OptimizerKind::Adam,
        seed: Some(3),
        ..Default::default()
    };

    let history = TrainingSession::from_config(&dataset, config)
        .unwrap()
        .train(&NoopObserver)
        .unwrap();
    assert_eq!(history.last().unwrap().validation_accuracy, 1.0);
}

#[test]
fn no_peripheral_stops_setup() {
    let config = PipelineConfig::default();
    let result = InferenceEngine::setup(
        &ScriptedAdapter::new(),
        &FirstMatch,
        &config,
        &NoopObserver,
    );
    assert!(matches!(result, Err(GloveError::NoPeripheralFound)));
}

/// Adapter handing out one posed glove
struct PosedAdapter {
    pose: Arc<Mutex<usize>>,
}

impl BleAdapter for PosedAdapter {
    fn discover(&self, _timeout: Duration) -> glove_lib::Result<Vec<String>> {
        Ok(vec!["posed".to_string()])
    }

    fn connect(&self, _address: &str) -> glove_lib::Result<Box<dyn PeripheralLink>> {
        Ok(Box::new(PosedGlove {
            pose: Arc::clone(&self.pose),
            reads: 0,
            sensors: 7,
        }))
    }
}

#[test]
fn collect_train_and_infer_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.peripheral.scan_timeout_secs = 0;
    config.reader.clear_count = 4;
    config.collection = CollectionConfig {
        num_sets: 2,
        num_reps: 40,
        prompt_delay_ms: 0,
    };
    config.training = TrainingConfig {
        model: ModelKind::Linear,
        batch_size: 16,
        num_epochs: 31,
        learning_rate: 0.5,
        seed: Some(1),
        ..Default::default()
    };
    config.paths.dataset = dir.path().join("data").join("dataset.csv");
    config.paths.model = dir.path().join("trained_models").join("model.json");
    let vocabulary = config.vocabulary().unwrap();

    // Collect
    let pose = Arc::new(Mutex::new(0));
    let adapter = PosedAdapter {
        pose: Arc::clone(&pose),
    };
    let session =
        PeripheralSession::establish(&adapter, &FirstMatch, &config.peripheral, 7).unwrap();
    let mut reader = SensorStreamReader::new(session, config.reader.clone());
    let wearer = Wearer {
        pose: Arc::clone(&pose),
    };
    let records = DataCollector::new(&mut reader, &vocabulary, config.collection.clone())
        .collect(&wearer)
        .unwrap();
    assert_eq!(records.len(), 2 * 3 * 40);
    assert!(records
        .iter()
        .all(|r| argmax(r.frame.values()) == r.gesture_index));

    Dataset::new(vocabulary.clone(), 7, records)
        .unwrap()
        .save_csv(&config.paths.dataset)
        .unwrap();

    // Train
    let dataset = Dataset::load_csv(&config.paths.dataset, vocabulary.clone(), 7).unwrap();
    assert_eq!(dataset.len(), 240);
    let mut session = TrainingSession::from_config(&dataset, config.training.clone()).unwrap();
    let history = session.train(&NoopObserver).unwrap();
    assert_eq!(history.last().unwrap().validation_accuracy, 1.0);
    ModelArtifact::from_classifier(session.classifier(), &vocabulary)
        .unwrap()
        .save(&config.paths.model)
        .unwrap();

    // Infer
    let mut engine = InferenceEngine::setup(&adapter, &FirstMatch, &config, &NoopObserver).unwrap();
    for (index, gesture) in vocabulary.iter() {
        *pose.lock().unwrap() = index;
        assert_eq!(engine.read_gesture().unwrap(), gesture);
    }
}
