//! Error types for the gesture pipeline

use thiserror::Error;

/// Errors surfaced by the acquisition, training and inference pipeline.
///
/// Malformed frames and notification timeouts are deliberately absent: the
/// reader absorbs them and only counts them.
#[derive(Error, Debug)]
pub enum GloveError {
    #[error("no peripheral found: no glove matched or the selected address failed to connect")]
    NoPeripheralFound,

    #[error("peripheral disconnected")]
    Disconnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no valid sensor frame after {attempts} read attempts")]
    ReadExhausted { attempts: u64 },

    #[error("invalid dataset shape: {0}")]
    InvalidDatasetShape(String),

    #[error("insufficient data: {records} records, at least {required} required")]
    InsufficientData { records: usize, required: usize },

    #[error("invalid gesture vocabulary: {0}")]
    InvalidVocabulary(String),

    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("artifact checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GloveError {
    pub(crate) fn shape(
        what: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        GloveError::ShapeMismatch {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// True when the underlying link is gone and a fresh discovery pass is
    /// needed before reading again.
    pub fn is_link_lost(&self) -> bool {
        matches!(self, GloveError::Disconnected | GloveError::Transport(_))
    }
}

impl From<config::ConfigError> for GloveError {
    fn from(err: config::ConfigError) -> Self {
        GloveError::Config(err.to_string())
    }
}

#[cfg(feature = "bluez")]
impl From<dbus::Error> for GloveError {
    fn from(err: dbus::Error) -> Self {
        GloveError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GloveError>;
