//! Trained classifier artifacts
//!
//! A JSON manifest carrying the model kind, dimensions, vocabulary and every
//! parameter tensor as hex-encoded little-endian f32. A SHA-256 digest over
//! the vocabulary and tensor bytes is verified on load, and the byte
//! encoding makes a save/load round trip bit-identical.

use super::{build_classifier, Classifier, ModelKind};
use crate::error::{GloveError, Result};
use crate::models::GestureVocabulary;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TensorRecord {
    name: String,
    shape: [usize; 2],
    data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    kind: ModelKind,
    input_dim: usize,
    output_dim: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hidden_units: Option<usize>,
    vocabulary: GestureVocabulary,
    tensors: Vec<TensorRecord>,
    checksum: String,
}

/// A verified, decoded classifier artifact
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub kind: ModelKind,
    pub input_dim: usize,
    pub output_dim: usize,
    pub hidden_units: Option<usize>,
    pub vocabulary: GestureVocabulary,
    pub checksum: String,
    tensors: Vec<(String, Array2<f32>)>,
}

impl ModelArtifact {
    /// Snapshot `classifier` together with the vocabulary it was trained on
    pub fn from_classifier(
        classifier: &dyn Classifier,
        vocabulary: &GestureVocabulary,
    ) -> Result<Self> {
        if classifier.output_dim() != vocabulary.len() {
            return Err(GloveError::shape(
                "classifier outputs",
                vocabulary.len(),
                classifier.output_dim(),
            ));
        }

        let tensors: Vec<(String, Array2<f32>)> = classifier
            .parameters()
            .into_iter()
            .map(|p| (p.name.to_string(), p.value.clone()))
            .collect();
        let checksum = checksum(vocabulary, &tensors);

        Ok(Self {
            kind: classifier.kind(),
            input_dim: classifier.input_dim(),
            output_dim: classifier.output_dim(),
            hidden_units: classifier.hidden_units(),
            vocabulary: vocabulary.clone(),
            checksum,
            tensors,
        })
    }

    /// Write the manifest, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            kind: self.kind,
            input_dim: self.input_dim,
            output_dim: self.output_dim,
            hidden_units: self.hidden_units,
            vocabulary: self.vocabulary.clone(),
            tensors: self
                .tensors
                .iter()
                .map(|(name, value)| TensorRecord {
                    name: name.clone(),
                    shape: [value.nrows(), value.ncols()],
                    data: hex::encode(tensor_bytes(value)),
                })
                .collect(),
            checksum: self.checksum.clone(),
        };

        std::fs::write(path, serde_json::to_vec_pretty(&manifest)?)?;
        info!(
            path = %path.display(),
            kind = %self.kind,
            checksum = %self.checksum,
            "Classifier artifact saved"
        );
        Ok(())
    }

    /// Read and verify an artifact
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manifest: Manifest = serde_json::from_slice(&std::fs::read(path)?)?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(GloveError::shape(
                "artifact format version",
                FORMAT_VERSION,
                manifest.format_version,
            ));
        }

        let mut tensors = Vec::with_capacity(manifest.tensors.len());
        for record in &manifest.tensors {
            tensors.push((record.name.clone(), decode_tensor(record)?));
        }

        let actual = checksum(&manifest.vocabulary, &tensors);
        if actual != manifest.checksum {
            return Err(GloveError::ChecksumMismatch {
                expected: manifest.checksum,
                actual,
            });
        }

        debug!(path = %path.display(), tensors = tensors.len(), "Classifier artifact verified");
        Ok(Self {
            kind: manifest.kind,
            input_dim: manifest.input_dim,
            output_dim: manifest.output_dim,
            hidden_units: manifest.hidden_units,
            vocabulary: manifest.vocabulary,
            checksum: manifest.checksum,
            tensors,
        })
    }

    /// Load the parameters into an existing classifier of identical shape
    pub fn apply_to(&self, classifier: &mut dyn Classifier) -> Result<()> {
        if classifier.kind() != self.kind {
            return Err(GloveError::shape("model kind", self.kind, classifier.kind()));
        }
        if classifier.input_dim() != self.input_dim {
            return Err(GloveError::shape(
                "input dimension",
                self.input_dim,
                classifier.input_dim(),
            ));
        }
        if classifier.output_dim() != self.output_dim {
            return Err(GloveError::shape(
                "output dimension",
                self.output_dim,
                classifier.output_dim(),
            ));
        }
        classifier.load_parameters(&self.tensors)
    }

    /// Construct the classifier this artifact describes
    pub fn build_classifier(&self) -> Result<Box<dyn Classifier>> {
        // Initial values are overwritten by the stored tensors
        let mut rng = StdRng::seed_from_u64(0);
        let mut classifier = build_classifier(
            self.kind,
            self.input_dim,
            self.output_dim,
            self.hidden_units.unwrap_or(1),
            &mut rng,
        );
        self.apply_to(classifier.as_mut())?;
        Ok(classifier)
    }
}

fn tensor_bytes(value: &Array2<f32>) -> Vec<u8> {
    value.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_tensor(record: &TensorRecord) -> Result<Array2<f32>> {
    let bytes = hex::decode(&record.data).map_err(|e| {
        GloveError::shape(format!("tensor {}", record.name), "hex data", e)
    })?;
    let [rows, cols] = record.shape;
    if bytes.len() != rows * cols * 4 {
        return Err(GloveError::shape(
            format!("tensor {}", record.name),
            rows * cols * 4,
            bytes.len(),
        ));
    }

    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| GloveError::shape(format!("tensor {}", record.name), rows * cols, e))
}

fn checksum(vocabulary: &GestureVocabulary, tensors: &[(String, Array2<f32>)]) -> String {
    let mut hasher = Sha256::new();
    for name in vocabulary.names() {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
    }
    for (name, value) in tensors {
        hasher.update(name.as_bytes());
        hasher.update((value.nrows() as u64).to_le_bytes());
        hasher.update((value.ncols() as u64).to_le_bytes());
        hasher.update(tensor_bytes(value));
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SensorFrame;

    fn vocabulary() -> GestureVocabulary {
        GestureVocabulary::new(["rock", "paper", "scissors"]).unwrap()
    }

    #[test]
    fn test_round_trip_is_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("model.json");
        let frame = SensorFrame::new(vec![125.9, 279.0, 131.4, 304.0, 297.3, 282.8, 286.9]);

        for kind in [ModelKind::Linear, ModelKind::FeedForward] {
            let mut rng = StdRng::seed_from_u64(42);
            let trained = build_classifier(kind, 7, 3, 32, &mut rng);
            ModelArtifact::from_classifier(trained.as_ref(), &vocabulary())
                .unwrap()
                .save(&path)
                .unwrap();

            let mut other_rng = StdRng::seed_from_u64(7);
            let mut fresh = build_classifier(kind, 7, 3, 32, &mut other_rng);
            let artifact = ModelArtifact::load(&path).unwrap();
            artifact.apply_to(fresh.as_mut()).unwrap();

            let expected: Vec<u32> = trained
                .forward(&frame)
                .unwrap()
                .iter()
                .map(|v| v.to_bits())
                .collect();
            let actual: Vec<u32> = fresh
                .forward(&frame)
                .unwrap()
                .iter()
                .map(|v| v.to_bits())
                .collect();
            assert_eq!(expected, actual);

            let rebuilt = artifact.build_classifier().unwrap();
            assert_eq!(rebuilt.hidden_units(), trained.hidden_units());
            assert_eq!(
                rebuilt.forward(&frame).unwrap(),
                trained.forward(&frame).unwrap()
            );
        }
    }

    #[test]
    fn test_corrupted_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let mut rng = StdRng::seed_from_u64(42);
        let model = build_classifier(ModelKind::Linear, 2, 3, 0, &mut rng);
        ModelArtifact::from_classifier(model.as_ref(), &vocabulary())
            .unwrap()
            .save(&path)
            .unwrap();

        let mut manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let data = manifest["tensors"][0]["data"].as_str().unwrap().to_string();
        let flipped = if data.starts_with('0') { "1" } else { "0" };
        manifest["tensors"][0]["data"] =
            serde_json::Value::String(format!("{}{}", flipped, &data[1..]));
        std::fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();

        assert!(matches!(
            ModelArtifact::load(&path),
            Err(GloveError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_apply_to_rejects_mismatched_shape() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = build_classifier(ModelKind::FeedForward, 7, 3, 32, &mut rng);
        let artifact = ModelArtifact::from_classifier(model.as_ref(), &vocabulary()).unwrap();

        let mut wrong_hidden = build_classifier(ModelKind::FeedForward, 7, 3, 16, &mut rng);
        assert!(matches!(
            artifact.apply_to(wrong_hidden.as_mut()),
            Err(GloveError::ShapeMismatch { .. })
        ));

        let mut wrong_inputs = build_classifier(ModelKind::FeedForward, 5, 3, 32, &mut rng);
        assert!(artifact.apply_to(wrong_inputs.as_mut()).is_err());

        let mut wrong_kind = build_classifier(ModelKind::Linear, 7, 3, 32, &mut rng);
        assert!(artifact.apply_to(wrong_kind.as_mut()).is_err());
    }

    #[test]
    fn test_vocabulary_size_must_match_outputs() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = build_classifier(ModelKind::Linear, 7, 2, 0, &mut rng);
        assert!(ModelArtifact::from_classifier(model.as_ref(), &vocabulary()).is_err());
    }
}
