//! Per-sample prediction tables.

use crate::data::{ClassIndex, SampleId, argmax_rows};
use crate::error::MlError;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Name of the predicted-class column.
pub const PREDICTED_COLUMN: &str = "over all";

/// One row: file name, a score per class, and the arg-max class name.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub fname: String,
    pub scores: Vec<f32>,
    pub predicted: String,
}

/// Predictions for one partition, columns named from the class list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionTable {
    pub class_names: Vec<String>,
    pub records: Vec<PredictionRecord>,
}

impl PredictionTable {
    /// Build rows from `probs`, where row `i` belongs to `samples[positions[i]]`.
    pub fn from_probabilities(
        samples: &[SampleId],
        positions: &[usize],
        probs: &Array2<f32>,
        classes: &ClassIndex,
    ) -> Result<Self, MlError> {
        if probs.nrows() != positions.len() {
            return Err(MlError::evaluation(format!(
                "{} prediction rows for {} samples",
                probs.nrows(),
                positions.len()
            )));
        }
        if probs.ncols() != classes.len() {
            return Err(MlError::evaluation(format!(
                "{} scores per row but {} classes",
                probs.ncols(),
                classes.len()
            )));
        }

        let predicted = argmax_rows(probs);
        let mut records = Vec::with_capacity(positions.len());
        for ((row, &pos), label) in probs.rows().into_iter().zip(positions).zip(predicted) {
            let sample = samples
                .get(pos)
                .ok_or_else(|| MlError::evaluation(format!("sample position {pos} out of range")))?;
            records.push(PredictionRecord {
                fname: sample.file_name(),
                scores: row.to_vec(),
                predicted: classes.name_of(label).unwrap_or_default().to_string(),
            });
        }
        Ok(Self {
            class_names: classes.names().to_vec(),
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.class_names.len() + 2);
        header.push("fname".to_string());
        header.extend(self.class_names.iter().cloned());
        header.push(PREDICTED_COLUMN.to_string());
        header
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), MlError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.header())?;
        for record in &self.records {
            let mut row = Vec::with_capacity(record.scores.len() + 2);
            row.push(record.fname.clone());
            row.extend(record.scores.iter().map(f32::to_string));
            row.push(record.predicted.clone());
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// `<results>/predictions_<partition>_<experiment_id>_.csv`
pub fn predictions_path(results_dir: &Path, partition: &str, experiment_id: &str) -> PathBuf {
    results_dir.join(format!("predictions_{partition}_{experiment_id}_.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_table_rows_follow_positions() {
        let samples: Vec<_> = ["a.png", "dir/b.png", "c.png"]
            .iter()
            .map(|p| SampleId::new(*p).unwrap())
            .collect();
        let classes = ClassIndex::from_names(["benign", "malignant", "other"]);
        let probs = array![[0.1f32, 0.7, 0.2], [0.5, 0.25, 0.25]];

        let table = PredictionTable::from_probabilities(&samples, &[1, 2], &probs, &classes).unwrap();
        assert_eq!(table.records[0].fname, "b.png");
        assert_eq!(table.records[0].predicted, "malignant");
        assert_eq!(table.records[1].fname, "c.png");
        assert_eq!(table.records[1].predicted, "benign");
    }

    #[test]
    fn test_csv_layout() {
        let dir = TempDir::new().unwrap();
        let samples = vec![SampleId::new("x.jpg").unwrap()];
        let classes = ClassIndex::from_names(["cat", "dog"]);
        let table = PredictionTable::from_probabilities(&samples, &[0], &array![[0.25f32, 0.75]], &classes).unwrap();

        let path = predictions_path(dir.path(), "val", "run1");
        table.write_csv(&path).unwrap();
        assert_eq!(path.file_name().unwrap(), "predictions_val_run1_.csv");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "fname,cat,dog,over all\nx.jpg,0.25,0.75,dog\n");
    }

    #[test]
    fn test_column_count_checked() {
        let samples = vec![SampleId::new("x.jpg").unwrap()];
        let classes = ClassIndex::from_names(["only"]);
        let err = PredictionTable::from_probabilities(&samples, &[0], &array![[0.5f32, 0.5]], &classes);
        assert!(matches!(err, Err(MlError::Evaluation(_))));
    }
}
