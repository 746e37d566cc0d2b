use super::{bias_grad, Classifier, ModelKind, Parameter};
use ndarray::Array2;
use rand::Rng;

/// Scores are `x W + b`
#[derive(Debug, Clone)]
pub struct LinearClassifier {
    weight: Parameter,
    bias: Parameter,
}

impl LinearClassifier {
    pub fn new<R: Rng + ?Sized>(input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        Self {
            weight: Parameter::uniform("weight", (input_dim, output_dim), input_dim, rng),
            bias: Parameter::uniform("bias", (1, output_dim), input_dim, rng),
        }
    }
}

impl Classifier for LinearClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::Linear
    }

    fn input_dim(&self) -> usize {
        self.weight.value.nrows()
    }

    fn output_dim(&self) -> usize {
        self.weight.value.ncols()
    }

    fn forward_batch(&self, inputs: &Array2<f32>) -> Array2<f32> {
        inputs.dot(&self.weight.value) + &self.bias.value
    }

    fn accumulate_gradients(&mut self, inputs: &Array2<f32>, grad_scores: &Array2<f32>) {
        self.weight.grad += &inputs.t().dot(grad_scores);
        self.bias.grad += &bias_grad(grad_scores);
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.weight, &mut self.bias]
    }
}
