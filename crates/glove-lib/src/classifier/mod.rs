//! Gesture classifiers
//!
//! Two interchangeable variants implement [`Classifier`]: a single affine
//! layer ([`LinearClassifier`]) and affine-ReLU-affine
//! ([`FeedForwardClassifier`]). Both score a sensor frame against every
//! gesture in the vocabulary and accumulate softmax cross-entropy gradients
//! for an external optimizer to apply.

pub mod artifact;
mod feed_forward;
mod linear;

pub use artifact::ModelArtifact;
pub use feed_forward::FeedForwardClassifier;
pub use linear::LinearClassifier;

use crate::error::{GloveError, Result};
use crate::models::SensorFrame;
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Model variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// One affine transform
    Linear,
    /// Affine, ReLU, affine with a hidden layer
    #[default]
    FeedForward,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Linear => write!(f, "linear"),
            ModelKind::FeedForward => write!(f, "feed_forward"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = GloveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(ModelKind::Linear),
            "feed_forward" | "feedforward" => Ok(ModelKind::FeedForward),
            other => Err(GloveError::Config(format!("unknown model kind '{}'", other))),
        }
    }
}

/// A named weight tensor and its accumulated gradient
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: &'static str,
    pub value: Array2<f32>,
    pub grad: Array2<f32>,
}

impl Parameter {
    pub fn new(name: &'static str, value: Array2<f32>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Self { name, value, grad }
    }

    /// Uniform in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]`
    pub(crate) fn uniform<R: Rng + ?Sized>(
        name: &'static str,
        shape: (usize, usize),
        fan_in: usize,
        rng: &mut R,
    ) -> Self {
        let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
        let value = Array2::from_shape_fn(shape, |_| rng.gen_range(-bound..=bound));
        Self::new(name, value)
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }
}

/// A batch of inputs (one row per frame) with their class labels
#[derive(Debug, Clone)]
pub struct Batch {
    inputs: Array2<f32>,
    labels: Vec<usize>,
}

impl Batch {
    pub fn new(inputs: Array2<f32>, labels: Vec<usize>) -> Self {
        debug_assert_eq!(inputs.nrows(), labels.len());
        Self { inputs, labels }
    }

    pub fn inputs(&self) -> &Array2<f32> {
        &self.inputs
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Loss and accuracy over one batch or one validation pass
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StepMetrics {
    pub loss: f32,
    pub accuracy: f32,
}

/// Capabilities a training session and inference engine need from a model
pub trait Classifier: Send {
    fn kind(&self) -> ModelKind;

    fn input_dim(&self) -> usize;

    /// Number of classes; equals the vocabulary size
    fn output_dim(&self) -> usize;

    /// Hidden width for variants that have one
    fn hidden_units(&self) -> Option<usize> {
        None
    }

    /// Class scores for each row of `inputs`
    fn forward_batch(&self, inputs: &Array2<f32>) -> Array2<f32>;

    /// Add the gradients of the loss w.r.t. every parameter, given the
    /// gradient w.r.t. the scores, to the accumulated gradients
    fn accumulate_gradients(&mut self, inputs: &Array2<f32>, grad_scores: &Array2<f32>);

    fn parameters(&self) -> Vec<&Parameter>;

    fn parameters_mut(&mut self) -> Vec<&mut Parameter>;

    /// Class scores for one frame
    fn forward(&self, frame: &SensorFrame) -> Result<Vec<f32>> {
        if !frame.is_valid_for(self.input_dim()) {
            return Err(GloveError::shape("input frame", self.input_dim(), frame.len()));
        }
        let inputs = Array2::from_shape_vec((1, frame.len()), frame.values().to_vec())
            .map_err(|e| GloveError::shape("input frame", self.input_dim(), e))?;
        Ok(self.forward_batch(&inputs).row(0).to_vec())
    }

    /// Mean cross-entropy over `batch`; gradients accumulate, parameters
    /// are left untouched
    fn training_step(&mut self, batch: &Batch) -> f32 {
        let scores = self.forward_batch(batch.inputs());
        let (loss, grad) = softmax_cross_entropy(&scores, batch.labels());
        self.accumulate_gradients(batch.inputs(), &grad);
        loss
    }

    fn validation_step(&self, batch: &Batch) -> StepMetrics {
        let scores = self.forward_batch(batch.inputs());
        let (loss, _) = softmax_cross_entropy(&scores, batch.labels());
        StepMetrics {
            loss,
            accuracy: accuracy(&scores, batch.labels()),
        }
    }

    /// Arithmetic mean of per-batch results. Zero for an empty slice.
    fn validation_epoch_end(&self, steps: &[StepMetrics]) -> StepMetrics {
        if steps.is_empty() {
            return StepMetrics::default();
        }
        let n = steps.len() as f32;
        StepMetrics {
            loss: steps.iter().map(|s| s.loss).sum::<f32>() / n,
            accuracy: steps.iter().map(|s| s.accuracy).sum::<f32>() / n,
        }
    }

    fn zero_grad(&mut self) {
        for parameter in self.parameters_mut() {
            parameter.zero_grad();
        }
    }

    /// Replace every parameter's value by name; shapes must match exactly
    fn load_parameters(&mut self, tensors: &[(String, Array2<f32>)]) -> Result<()> {
        let mut parameters = self.parameters_mut();
        if tensors.len() != parameters.len() {
            return Err(GloveError::shape("parameter count", parameters.len(), tensors.len()));
        }

        for parameter in parameters.iter_mut() {
            let (_, value) = tensors
                .iter()
                .find(|(name, _)| name == parameter.name)
                .ok_or_else(|| GloveError::shape("parameter", parameter.name, "missing"))?;
            if value.shape() != parameter.value.shape() {
                return Err(GloveError::shape(
                    parameter.name,
                    format!("{:?}", parameter.value.shape()),
                    format!("{:?}", value.shape()),
                ));
            }
            parameter.value.assign(value);
        }

        Ok(())
    }
}

/// Construct a freshly initialised classifier
pub fn build_classifier<R: Rng + ?Sized>(
    kind: ModelKind,
    input_dim: usize,
    output_dim: usize,
    hidden_units: usize,
    rng: &mut R,
) -> Box<dyn Classifier> {
    match kind {
        ModelKind::Linear => Box::new(LinearClassifier::new(input_dim, output_dim, rng)),
        ModelKind::FeedForward => Box::new(FeedForwardClassifier::new(
            input_dim,
            output_dim,
            hidden_units,
            rng,
        )),
    }
}

/// Index of the highest score; the first one wins ties
pub fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_score), (i, &score)| {
            if score > best_score {
                (i, score)
            } else {
                (best, best_score)
            }
        })
        .0
}

/// Mean softmax cross-entropy and its gradient w.r.t. the scores
pub(crate) fn softmax_cross_entropy(scores: &Array2<f32>, labels: &[usize]) -> (f32, Array2<f32>) {
    let n = scores.nrows().max(1) as f32;
    let mut probabilities = scores.clone();
    let mut loss = 0.0f32;

    for (mut row, &label) in probabilities.axis_iter_mut(Axis(0)).zip(labels) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
        loss -= row[label].max(f32::MIN_POSITIVE).ln();
        row[label] -= 1.0;
    }

    probabilities.mapv_inplace(|v| v / n);
    (loss / n, probabilities)
}

fn accuracy(scores: &Array2<f32>, labels: &[usize]) -> f32 {
    if labels.is_empty() {
        return 0.0;
    }
    let mut correct = 0usize;
    for (row, &label) in scores.axis_iter(Axis(0)).zip(labels) {
        if argmax(&row.to_vec()) == label {
            correct += 1;
        }
    }
    correct as f32 / labels.len() as f32
}

/// Column sums of a gradient, as a `(1, cols)` bias gradient
pub(crate) fn bias_grad(grad: &Array2<f32>) -> Array2<f32> {
    let sums: Array1<f32> = grad.sum_axis(Axis(0));
    sums.insert_axis(Axis(0))
}
