use super::{bias_grad, Classifier, ModelKind, Parameter};
use ndarray::{Array2, Zip};
use rand::Rng;

/// Scores are `relu(x W1 + b1) W2 + b2`
#[derive(Debug, Clone)]
pub struct FeedForwardClassifier {
    hidden_weight: Parameter,
    hidden_bias: Parameter,
    output_weight: Parameter,
    output_bias: Parameter,
}

impl FeedForwardClassifier {
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        output_dim: usize,
        hidden_units: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            hidden_weight: Parameter::uniform(
                "hidden.weight",
                (input_dim, hidden_units),
                input_dim,
                rng,
            ),
            hidden_bias: Parameter::uniform("hidden.bias", (1, hidden_units), input_dim, rng),
            output_weight: Parameter::uniform(
                "output.weight",
                (hidden_units, output_dim),
                hidden_units,
                rng,
            ),
            output_bias: Parameter::uniform("output.bias", (1, output_dim), hidden_units, rng),
        }
    }

    fn pre_activation(&self, inputs: &Array2<f32>) -> Array2<f32> {
        inputs.dot(&self.hidden_weight.value) + &self.hidden_bias.value
    }
}

impl Classifier for FeedForwardClassifier {
    fn kind(&self) -> ModelKind {
        ModelKind::FeedForward
    }

    fn input_dim(&self) -> usize {
        self.hidden_weight.value.nrows()
    }

    fn output_dim(&self) -> usize {
        self.output_weight.value.ncols()
    }

    fn hidden_units(&self) -> Option<usize> {
        Some(self.hidden_weight.value.ncols())
    }

    fn forward_batch(&self, inputs: &Array2<f32>) -> Array2<f32> {
        let hidden = self.pre_activation(inputs).mapv_into(|v| v.max(0.0));
        hidden.dot(&self.output_weight.value) + &self.output_bias.value
    }

    fn accumulate_gradients(&mut self, inputs: &Array2<f32>, grad_scores: &Array2<f32>) {
        let pre = self.pre_activation(inputs);
        let hidden = pre.mapv(|v| v.max(0.0));

        self.output_weight.grad += &hidden.t().dot(grad_scores);
        self.output_bias.grad += &bias_grad(grad_scores);

        let mut grad_hidden = grad_scores.dot(&self.output_weight.value.t());
        Zip::from(&mut grad_hidden).and(&pre).for_each(|g, &p| {
            if p <= 0.0 {
                *g = 0.0;
            }
        });

        self.hidden_weight.grad += &inputs.t().dot(&grad_hidden);
        self.hidden_bias.grad += &bias_grad(&grad_hidden);
    }

    fn parameters(&self) -> Vec<&Parameter> {
        vec![
            &self.hidden_weight,
            &self.hidden_bias,
            &self.output_weight,
            &self.output_bias,
        ]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![
            &mut self.hidden_weight,
            &mut self.hidden_bias,
            &mut self.output_weight,
            &mut self.output_bias,
        ]
    }
}
