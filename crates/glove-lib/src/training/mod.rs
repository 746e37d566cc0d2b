//! Fitting a classifier to a labeled dataset
//!
//! A [`TrainingSession`] splits the dataset 80/20, then for every epoch runs
//! shuffled mini-batches through `training_step` with one optimizer update
//! per batch. Every `validation_interval` epochs (starting with epoch 0) it
//! scores the validation subset and appends a [`Checkpoint`] to the history.

mod optimizer;

pub use optimizer::{build_optimizer, Adam, Optimizer, OptimizerKind, Sgd};

use crate::classifier::{build_classifier, Batch, Classifier, ModelKind, StepMetrics};
use crate::dataset::{Dataset, Partition};
use crate::error::{GloveError, Result};
use crate::observability::{PipelineMetrics, PipelineObserver};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Hyperparameters for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub model: ModelKind,
    /// Hidden width of the feed-forward variant
    pub hidden_units: usize,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub learning_rate: f32,
    pub optimizer: OptimizerKind,
    /// Validate every this many epochs
    pub validation_interval: usize,
    /// Fixes partition, shuffling and initialisation when set
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::FeedForward,
            hidden_units: 32,
            batch_size: 128,
            num_epochs: 500,
            learning_rate: 1e-5,
            optimizer: OptimizerKind::Sgd,
            validation_interval: 10,
            seed: None,
        }
    }
}

/// Validation result at one epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub validation_loss: f32,
    pub validation_accuracy: f32,
}

/// Checkpoints in epoch order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    checkpoints: Vec<Checkpoint>,
}

impl TrainingHistory {
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn last(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }
}

/// One training run over a dataset
pub struct TrainingSession<'a> {
    dataset: &'a Dataset,
    classifier: Box<dyn Classifier>,
    optimizer: Box<dyn Optimizer>,
    partition: Partition,
    config: TrainingConfig,
    rng: StdRng,
    metrics: PipelineMetrics,
}

impl<'a> TrainingSession<'a> {
    /// Build the configured classifier and partition the dataset
    pub fn from_config(dataset: &'a Dataset, config: TrainingConfig) -> Result<Self> {
        let mut rng = session_rng(config.seed);
        let classifier = build_classifier(
            config.model,
            dataset.sensor_count(),
            dataset.vocabulary().len(),
            config.hidden_units,
            &mut rng,
        );
        let partition = Partition::random(dataset.len(), &mut rng)?;
        Self::assemble(dataset, classifier, config, partition, rng)
    }

    /// Train `classifier` over a fresh random partition
    pub fn new(
        dataset: &'a Dataset,
        classifier: Box<dyn Classifier>,
        config: TrainingConfig,
    ) -> Result<Self> {
        let mut rng = session_rng(config.seed);
        let partition = Partition::random(dataset.len(), &mut rng)?;
        Self::assemble(dataset, classifier, config, partition, rng)
    }

    /// Train `classifier` over a caller-controlled partition
    pub fn with_partition(
        dataset: &'a Dataset,
        classifier: Box<dyn Classifier>,
        config: TrainingConfig,
        partition: Partition,
    ) -> Result<Self> {
        let rng = session_rng(config.seed);
        let within = partition
            .train()
            .iter()
            .chain(partition.validation())
            .all(|&i| i < dataset.len());
        if !within {
            return Err(GloveError::InvalidDatasetShape(format!(
                "partition refers past the {} records of the dataset",
                dataset.len()
            )));
        }
        Self::assemble(dataset, classifier, config, partition, rng)
    }

    fn assemble(
        dataset: &'a Dataset,
        classifier: Box<dyn Classifier>,
        config: TrainingConfig,
        partition: Partition,
        rng: StdRng,
    ) -> Result<Self> {
        if classifier.input_dim() != dataset.sensor_count() {
            return Err(GloveError::shape(
                "classifier inputs",
                dataset.sensor_count(),
                classifier.input_dim(),
            ));
        }
        if classifier.output_dim() != dataset.vocabulary().len() {
            return Err(GloveError::shape(
                "classifier outputs",
                dataset.vocabulary().len(),
                classifier.output_dim(),
            ));
        }
        if config.batch_size == 0 || config.validation_interval == 0 {
            return Err(GloveError::Config(
                "batch_size and validation_interval must be at least 1".into(),
            ));
        }

        let optimizer = build_optimizer(config.optimizer, config.learning_rate);
        Ok(Self {
            dataset,
            classifier,
            optimizer,
            partition,
            config,
            rng,
            metrics: PipelineMetrics::new(),
        })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    /// Run every epoch and return the validation history.
    ///
    /// There is no early stopping.
    pub fn train(&mut self, observer: &dyn PipelineObserver) -> Result<TrainingHistory> {
        let mut history = TrainingHistory::default();
        let validation = self
            .dataset
            .batches(self.partition.validation(), self.config.batch_size);
        let mut order = self.partition.train().to_vec();

        info!(
            model = %self.config.model,
            optimizer = %self.config.optimizer,
            train_records = order.len(),
            validation_records = self.partition.validation().len(),
            epochs = self.config.num_epochs,
            batch_size = self.config.batch_size,
            learning_rate = self.config.learning_rate,
            "Starting training"
        );

        for epoch in 0..self.config.num_epochs {
            order.shuffle(&mut self.rng);

            let mut epoch_loss = 0.0f32;
            let mut batches = 0usize;
            for batch in self.dataset.batches(&order, self.config.batch_size) {
                epoch_loss += self.classifier.training_step(&batch);
                self.optimizer.step(self.classifier.parameters_mut());
                self.classifier.zero_grad();
                batches += 1;
            }

            let mean_loss = epoch_loss / batches.max(1) as f32;
            if !mean_loss.is_finite() {
                warn!(epoch, "Training loss is not finite");
            }
            debug!(epoch, train_loss = mean_loss, "Epoch complete");

            if epoch % self.config.validation_interval == 0 {
                let result = self.evaluate(&validation);
                let checkpoint = Checkpoint {
                    epoch,
                    validation_loss: result.loss,
                    validation_accuracy: result.accuracy,
                };
                observer.on_checkpoint(&checkpoint);
                self.metrics.set_checkpoint(&checkpoint);
                history.checkpoints.push(checkpoint);
            }
        }

        Ok(history)
    }

    fn evaluate(&self, batches: &[Batch]) -> StepMetrics {
        let steps: Vec<StepMetrics> = batches
            .iter()
            .map(|batch| self.classifier.validation_step(batch))
            .collect();
        self.classifier.validation_epoch_end(&steps)
    }

    pub fn into_classifier(self) -> Box<dyn Classifier> {
        self.classifier
    }
}

fn session_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
