//! Core data models for the gesture pipeline

use crate::error::{GloveError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One sample from the glove: a capacitance reading per sensor, in pF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorFrame(Vec<f32>);

impl SensorFrame {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn into_values(self) -> Vec<f32> {
        self.0
    }

    /// A frame is valid only if it carries exactly one reading per sensor.
    pub fn is_valid_for(&self, sensor_count: usize) -> bool {
        self.0.len() == sensor_count
    }
}

impl From<Vec<f32>> for SensorFrame {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Ordered, duplicate-free gesture names. A name's position is its class index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct GestureVocabulary {
    names: Vec<String>,
}

impl GestureVocabulary {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(GloveError::InvalidVocabulary(
                "at least one gesture is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.trim().is_empty() {
                return Err(GloveError::InvalidVocabulary(
                    "gesture names must not be blank".to_string(),
                ));
            }
            if name.trim() != name.as_str() {
                return Err(GloveError::InvalidVocabulary(format!(
                    "gesture '{}' has surrounding whitespace",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(GloveError::InvalidVocabulary(format!(
                    "duplicate gesture '{}'",
                    name
                )));
            }
        }

        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().map(String::as_str).enumerate()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl TryFrom<Vec<String>> for GestureVocabulary {
    type Error = GloveError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<GestureVocabulary> for Vec<String> {
    fn from(vocabulary: GestureVocabulary) -> Self {
        vocabulary.names
    }
}

/// A sensor frame tagged with the gesture the wearer was holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub gesture_index: usize,
    pub gesture_name: String,
    pub frame: SensorFrame,
}

impl LabeledRecord {
    pub fn new(gesture_index: usize, gesture_name: impl Into<String>, frame: SensorFrame) -> Self {
        Self {
            gesture_index,
            gesture_name: gesture_name.into(),
            frame,
        }
    }
}
