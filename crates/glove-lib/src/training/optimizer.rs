//! Parameter update rules

use crate::classifier::Parameter;
use crate::error::{GloveError, Result};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Optimizer algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Plain stochastic gradient descent
    #[default]
    Sgd,
    Adam,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Sgd => write!(f, "sgd"),
            OptimizerKind::Adam => write!(f, "adam"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = GloveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sgd" => Ok(OptimizerKind::Sgd),
            "adam" => Ok(OptimizerKind::Adam),
            other => Err(GloveError::Config(format!("unknown optimizer '{}'", other))),
        }
    }
}

/// Applies accumulated gradients to parameters
pub trait Optimizer: Send {
    /// One update from the current gradients; gradients are left as-is
    fn step(&mut self, parameters: Vec<&mut Parameter>);

    fn learning_rate(&self) -> f32;
}

pub fn build_optimizer(kind: OptimizerKind, learning_rate: f32) -> Box<dyn Optimizer> {
    match kind {
        OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
        OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
    }
}

/// `w -= lr * g`
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, parameters: Vec<&mut Parameter>) {
        for parameter in parameters {
            parameter.value.scaled_add(-self.learning_rate, &parameter.grad);
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

/// Adam with bias-corrected moment estimates
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: i32,
    moments: Vec<(Array2<f32>, Array2<f32>)>,
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            moments: Vec::new(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, parameters: Vec<&mut Parameter>) {
        if self.moments.len() != parameters.len() {
            self.moments = parameters
                .iter()
                .map(|p| (Array2::zeros(p.value.raw_dim()), Array2::zeros(p.value.raw_dim())))
                .collect();
            self.step = 0;
        }
        self.step += 1;

        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);
        let correction1 = 1.0 - beta1.powi(self.step);
        let correction2 = 1.0 - beta2.powi(self.step);
        let lr = self.learning_rate;

        for (parameter, (m, v)) in parameters.into_iter().zip(self.moments.iter_mut()) {
            Zip::from(&mut parameter.value)
                .and(&parameter.grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    let m_hat = *m / correction1;
                    let v_hat = *v / correction2;
                    *w -= lr * m_hat / (v_hat.sqrt() + eps);
                });
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn parameter(value: Array2<f32>, grad: Array2<f32>) -> Parameter {
        let mut p = Parameter::new("w", value);
        p.grad = grad;
        p
    }

    #[test]
    fn test_sgd_step() {
        let mut p = parameter(array![[1.0, 2.0]], array![[0.5, -1.0]]);
        Sgd::new(0.1).step(vec![&mut p]);
        assert!((p.value[[0, 0]] - 0.95).abs() < 1e-6);
        assert!((p.value[[0, 1]] - 2.1).abs() < 1e-6);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut p = parameter(array![[1.0, 1.0]], array![[3.0, -0.2]]);
        let mut adam = Adam::new(0.01);
        adam.step(vec![&mut p]);
        // The bias-corrected first step is lr * sign(g)
        assert!((p.value[[0, 0]] - 0.99).abs() < 1e-4);
        assert!((p.value[[0, 1]] - 1.01).abs() < 1e-4);
    }

    #[test]
    fn test_optimizer_kind_parsing() {
        assert_eq!("SGD".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert_eq!("adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert!("rmsprop".parse::<OptimizerKind>().is_err());
        assert_eq!(build_optimizer(OptimizerKind::Adam, 0.5).learning_rate(), 0.5);
    }
}
