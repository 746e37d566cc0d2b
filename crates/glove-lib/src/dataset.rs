//! Labeled dataset persistence and partitioning
//!
//! The on-disk format is a CSV table: `gesture_index, gesture_name,
//! sensor_1..sensor_N`, one header row, one row per record in emission
//! order. Shape is validated at load time so training never sees a record
//! that disagrees with the vocabulary or the sensor count.

use crate::classifier::Batch;
use crate::error::{GloveError, Result};
use crate::models::{GestureVocabulary, LabeledRecord, SensorFrame};
use csv::{ReaderBuilder, WriterBuilder};
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Smallest dataset that still yields a non-empty validation subset
pub const MIN_RECORDS: usize = 5;

const LEADING_COLUMNS: usize = 2;

/// An ordered, shape-checked collection of labeled records
#[derive(Debug, Clone)]
pub struct Dataset {
    vocabulary: GestureVocabulary,
    sensor_count: usize,
    records: Vec<LabeledRecord>,
}

impl Dataset {
    /// Validate `records` against the vocabulary and sensor count
    pub fn new(
        vocabulary: GestureVocabulary,
        sensor_count: usize,
        records: Vec<LabeledRecord>,
    ) -> Result<Self> {
        for (row, record) in records.iter().enumerate() {
            if !record.frame.is_valid_for(sensor_count) {
                return Err(GloveError::InvalidDatasetShape(format!(
                    "record {} has {} sensor values, expected {}",
                    row,
                    record.frame.len(),
                    sensor_count
                )));
            }
            match vocabulary.name(record.gesture_index) {
                None => {
                    return Err(GloveError::InvalidDatasetShape(format!(
                        "record {} has gesture index {} but the vocabulary has {} gestures",
                        row,
                        record.gesture_index,
                        vocabulary.len()
                    )))
                }
                Some(name) if name != record.gesture_name => {
                    return Err(GloveError::InvalidDatasetShape(format!(
                        "record {} labels index {} as '{}' but the vocabulary names it '{}'",
                        row, record.gesture_index, record.gesture_name, name
                    )))
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            vocabulary,
            sensor_count,
            records,
        })
    }

    /// Load and validate a dataset CSV
    pub fn load_csv(
        path: impl AsRef<Path>,
        vocabulary: GestureVocabulary,
        sensor_count: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let columns = reader.headers()?.len();
        if columns != LEADING_COLUMNS + sensor_count {
            return Err(GloveError::InvalidDatasetShape(format!(
                "{} has {} columns, expected {} for {} sensors",
                path.display(),
                columns,
                LEADING_COLUMNS + sensor_count,
                sensor_count
            )));
        }

        let mut records = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let row = row + 1;
            let record = result?;
            if record.len() != columns {
                return Err(GloveError::InvalidDatasetShape(format!(
                    "row {} has {} fields, expected {}",
                    row,
                    record.len(),
                    columns
                )));
            }

            let gesture_index: usize = record[0].trim().parse().map_err(|_| {
                GloveError::InvalidDatasetShape(format!(
                    "row {}: invalid gesture index '{}'",
                    row, &record[0]
                ))
            })?;
            let values = record
                .iter()
                .skip(LEADING_COLUMNS)
                .map(|field| {
                    field.trim().parse::<f32>().map_err(|_| {
                        GloveError::InvalidDatasetShape(format!(
                            "row {}: invalid sensor value '{}'",
                            row, field
                        ))
                    })
                })
                .collect::<Result<Vec<f32>>>()?;

            records.push(LabeledRecord::new(
                gesture_index,
                record[1].trim(),
                SensorFrame::new(values),
            ));
        }

        let dataset = Self::new(vocabulary, sensor_count, records)?;
        info!(path = %path.display(), records = dataset.len(), "Dataset loaded");
        Ok(dataset)
    }

    /// Write the dataset, creating parent directories as needed
    pub fn save_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = WriterBuilder::new().from_path(path)?;

        let mut header = vec!["gesture_index".to_string(), "gesture_name".to_string()];
        header.extend((1..=self.sensor_count).map(|i| format!("sensor_{}", i)));
        writer.write_record(&header)?;

        for record in &self.records {
            let mut row = Vec::with_capacity(LEADING_COLUMNS + self.sensor_count);
            row.push(record.gesture_index.to_string());
            row.push(record.gesture_name.clone());
            row.extend(record.frame.values().iter().map(|v| v.to_string()));
            writer.write_record(&row)?;
        }
        writer.flush()?;

        debug!(path = %path.display(), records = self.records.len(), "Dataset written");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn vocabulary(&self) -> &GestureVocabulary {
        &self.vocabulary
    }

    pub fn sensor_count(&self) -> usize {
        self.sensor_count
    }

    pub fn records(&self) -> &[LabeledRecord] {
        &self.records
    }

    /// Frames only, in record order
    pub fn frames(&self) -> impl Iterator<Item = &SensorFrame> {
        self.records.iter().map(|r| &r.frame)
    }

    /// Gather the records at `indices` into one batch
    pub fn batch(&self, indices: &[usize]) -> Batch {
        let mut inputs = Array2::<f32>::zeros((indices.len(), self.sensor_count));
        let mut labels = Vec::with_capacity(indices.len());

        for (row, &index) in indices.iter().enumerate() {
            let record = &self.records[index];
            for (col, value) in record.frame.values().iter().enumerate() {
                inputs[[row, col]] = *value;
            }
            labels.push(record.gesture_index);
        }

        Batch::new(inputs, labels)
    }

    /// Split `indices` into consecutive batches of at most `batch_size`
    pub fn batches(&self, indices: &[usize], batch_size: usize) -> Vec<Batch> {
        indices
            .chunks(batch_size.max(1))
            .map(|chunk| self.batch(chunk))
            .collect()
    }

    /// Record count and mean sensor values per gesture
    pub fn summarize(&self) -> Vec<GestureSummary> {
        let mut sums = vec![vec![0f64; self.sensor_count]; self.vocabulary.len()];
        let mut counts = vec![0usize; self.vocabulary.len()];

        for record in &self.records {
            counts[record.gesture_index] += 1;
            for (sum, value) in sums[record.gesture_index]
                .iter_mut()
                .zip(record.frame.values())
            {
                *sum += f64::from(*value);
            }
        }

        self.vocabulary
            .iter()
            .map(|(index, name)| {
                let count = counts[index];
                let means = sums[index]
                    .iter()
                    .map(|sum| if count == 0 { 0.0 } else { (sum / count as f64) as f32 })
                    .collect();
                GestureSummary {
                    gesture_index: index,
                    gesture_name: name.to_string(),
                    records: count,
                    means,
                }
            })
            .collect()
    }
}

/// Per-gesture statistics of a dataset
#[derive(Debug, Clone, Serialize)]
pub struct GestureSummary {
    pub gesture_index: usize,
    pub gesture_name: String,
    pub records: usize,
    pub means: Vec<f32>,
}

/// Disjoint training and validation record indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    train: Vec<usize>,
    validation: Vec<usize>,
}

impl Partition {
    /// Random 80/20 split with `len / 5 * 4` training records
    pub fn random<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Result<Self> {
        if len < MIN_RECORDS {
            return Err(GloveError::InsufficientData {
                records: len,
                required: MIN_RECORDS,
            });
        }

        let mut indices: Vec<usize> = (0..len).collect();
        indices.shuffle(rng);
        let validation = indices.split_off(len / 5 * 4);

        Ok(Self {
            train: indices,
            validation,
        })
    }

    /// A caller-controlled split over a dataset of `len` records.
    ///
    /// Both subsets must be non-empty, in range, and disjoint.
    pub fn from_indices(train: Vec<usize>, validation: Vec<usize>, len: usize) -> Result<Self> {
        if train.is_empty() || validation.is_empty() {
            return Err(GloveError::InsufficientData {
                records: train.len() + validation.len(),
                required: 2,
            });
        }

        let mut seen = vec![false; len];
        for &index in train.iter().chain(validation.iter()) {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(GloveError::InvalidDatasetShape(format!(
                        "record {} assigned twice in partition",
                        index
                    )))
                }
                None => {
                    return Err(GloveError::InvalidDatasetShape(format!(
                        "partition index {} out of range for {} records",
                        index, len
                    )))
                }
            }
        }

        Ok(Self { train, validation })
    }

    pub fn train(&self) -> &[usize] {
        &self.train
    }

    pub fn validation(&self) -> &[usize] {
        &self.validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::io::Write;

    fn vocabulary() -> GestureVocabulary {
        GestureVocabulary::new(["rock", "paper", "scissors"]).unwrap()
    }

    fn record(index: usize, values: Vec<f32>) -> LabeledRecord {
        let name = vocabulary().name(index).unwrap().to_string();
        LabeledRecord::new(index, name, SensorFrame::new(values))
    }

    #[test]
    fn test_csv_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("set.csv");
        let records = vec![
            record(0, vec![125.9, 279.0]),
            record(2, vec![1.5, 2.25]),
            record(1, vec![0.1, 300.0]),
        ];
        let dataset = Dataset::new(vocabulary(), 2, records.clone()).unwrap();
        dataset.save_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("gesture_index,gesture_name,sensor_1,sensor_2\n"));
        assert!(content.contains("2,scissors,1.5,2.25"));

        let loaded = Dataset::load_csv(&path, vocabulary(), 2).unwrap();
        assert_eq!(loaded.records(), records.as_slice());
    }

    #[test]
    fn test_load_trims_padded_name_column() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gesture_index,gesture_name,sensor_1,sensor_2").unwrap();
        writeln!(file, "0, rock ,1.0,2.0").unwrap();
        writeln!(file, "2,scissors , 3.0,4.0").unwrap();
        file.flush().unwrap();

        let loaded = Dataset::load_csv(file.path(), vocabulary(), 2).unwrap();
        assert_eq!(loaded.records()[0].gesture_name, "rock");
        assert_eq!(loaded.records()[1].gesture_name, "scissors");

        let resaved = tempfile::NamedTempFile::new().unwrap();
        loaded.save_csv(resaved.path()).unwrap();
        let reloaded = Dataset::load_csv(resaved.path(), vocabulary(), 2).unwrap();
        assert_eq!(reloaded.records(), loaded.records());
    }

    #[test]
    fn test_load_rejects_wrong_column_count() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "gesture_index,gesture_name,sensor_1,sensor_2").unwrap();
        writeln!(file, "0,rock,1.0,2.0").unwrap();
        file.flush().unwrap();

        let result = Dataset::load_csv(file.path(), vocabulary(), 7);
        assert!(matches!(result, Err(GloveError::InvalidDatasetShape(_))));
    }

    #[test]
    fn test_load_rejects_ragged_row_and_bad_index() {
        let mut ragged = tempfile::NamedTempFile::new().unwrap();
        writeln!(ragged, "gesture_index,gesture_name,sensor_1,sensor_2").unwrap();
        writeln!(ragged, "0,rock,1.0").unwrap();
        ragged.flush().unwrap();
        assert!(matches!(
            Dataset::load_csv(ragged.path(), vocabulary(), 2),
            Err(GloveError::InvalidDatasetShape(_))
        ));

        let mut out_of_range = tempfile::NamedTempFile::new().unwrap();
        writeln!(out_of_range, "gesture_index,gesture_name,sensor_1,sensor_2").unwrap();
        writeln!(out_of_range, "3,lizard,1.0,2.0").unwrap();
        out_of_range.flush().unwrap();
        assert!(matches!(
            Dataset::load_csv(out_of_range.path(), vocabulary(), 2),
            Err(GloveError::InvalidDatasetShape(_))
        ));
    }

    #[test]
    fn test_new_rejects_mismatched_frame_length() {
        let records = vec![record(0, vec![1.0, 2.0]), record(1, vec![1.0])];
        assert!(matches!(
            Dataset::new(vocabulary(), 2, records),
            Err(GloveError::InvalidDatasetShape(_))
        ));
    }

    #[test]
    fn test_random_partition_is_disjoint_80_20() {
        let mut rng = StdRng::seed_from_u64(7);
        let partition = Partition::random(23, &mut rng).unwrap();

        assert_eq!(partition.train().len(), 23 / 5 * 4);
        assert_eq!(partition.validation().len(), 23 - 23 / 5 * 4);

        let all: HashSet<usize> = partition
            .train()
            .iter()
            .chain(partition.validation())
            .copied()
            .collect();
        assert_eq!(all.len(), 23);
    }

    #[test]
    fn test_partition_requires_minimum_records() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(matches!(
            Partition::random(4, &mut rng),
            Err(GloveError::InsufficientData { records: 4, required: 5 })
        ));
    }

    #[test]
    fn test_injected_partition_validation() {
        assert!(Partition::from_indices(vec![0, 1], vec![2], 3).is_ok());
        assert!(Partition::from_indices(vec![0, 1], vec![1], 3).is_err());
        assert!(Partition::from_indices(vec![0, 1], vec![5], 3).is_err());
        assert!(Partition::from_indices(vec![0, 1], vec![], 3).is_err());
    }

    #[test]
    fn test_batches_and_summary() {
        let records = vec![
            record(0, vec![1.0, 3.0]),
            record(0, vec![3.0, 5.0]),
            record(2, vec![10.0, 20.0]),
        ];
        let dataset = Dataset::new(vocabulary(), 2, records).unwrap();

        let batches = dataset.batches(&[2, 0, 1], 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].labels(), &[2, 0]);
        assert_eq!(batches[0].inputs()[[0, 1]], 20.0);
        assert_eq!(batches[1].len(), 1);

        let summary = dataset.summarize();
        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].records, 2);
        assert_eq!(summary[0].means, vec![2.0, 4.0]);
        assert_eq!(summary[1].records, 0);
        assert_eq!(summary[2].means, vec![10.0, 20.0]);
    }
}
