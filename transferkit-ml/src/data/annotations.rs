//! CSV annotation files: one row per sample, naming its file and its class.

use crate::data::sample::{ClassIndex, SampleId};
use crate::error::MlError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PATH_COLUMNS: [&str; 6] = ["image_dir", "image", "image_path", "path", "filename", "fname"];
const CLASS_COLUMNS: [&str; 4] = ["classification", "class", "class_name", "label"];

/// Samples and labels read from an annotation file.
#[derive(Debug, Clone, Default)]
pub struct Annotations {
    pub samples: Vec<SampleId>,
    pub labels: Vec<usize>,
    /// Class names in first-occurrence order.
    pub classes: ClassIndex,
}

impl Annotations {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
}

/// Parse `csv_path`. Relative sample paths resolve against `base_dir`.
pub fn parse_annotations(csv_path: &Path, base_dir: &Path) -> Result<Annotations, MlError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(csv_path)?;

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(MlError::dataset(format!(
            "{}: annotation files need a path column and a class column",
            csv_path.display()
        )));
    }
    let class_col = find_column(&headers, &CLASS_COLUMNS);
    let path_col = find_column(&headers, &PATH_COLUMNS)
        .or_else(|| (0..headers.len()).find(|i| Some(*i) != class_col))
        .unwrap_or(0);
    let class_col = class_col
        .or_else(|| (0..headers.len()).find(|i| *i != path_col))
        .unwrap_or(1);
    debug!(
        file = %csv_path.display(),
        path_column = headers.get(path_col).unwrap_or_default(),
        class_column = headers.get(class_col).unwrap_or_default(),
        "Parsing annotations"
    );

    let mut annotations = Annotations::default();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let (Some(file), Some(class)) = (record.get(path_col), record.get(class_col)) else {
            return Err(MlError::dataset(format!(
                "{}: row {} has {} fields",
                csv_path.display(),
                row + 2,
                record.len()
            )));
        };
        if file.is_empty() || class.is_empty() {
            return Err(MlError::dataset(format!(
                "{}: row {} is missing its {}",
                csv_path.display(),
                row + 2,
                if file.is_empty() { "file" } else { "class" }
            )));
        }

        let path = PathBuf::from(file);
        let path = if path.is_absolute() { path } else { base_dir.join(path) };
        annotations.samples.push(SampleId::new(path)?);
        annotations.labels.push(annotations.classes.intern(class));
    }
    Ok(annotations)
}

/// First `.csv` file directly inside `dir`, by sorted name.
pub fn find_annotation_file(dir: &Path) -> Result<Option<PathBuf>, MlError> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    candidates.sort();
    if candidates.len() > 1 {
        warn!(
            dir = %dir.display(),
            count = candidates.len(),
            chosen = %candidates[0].display(),
            "Several CSV files found, using the first"
        );
    }
    Ok(candidates.into_iter().next())
}
