//! Sample identifiers and the class list that turns names into labels.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// How a sample file is turned into numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Precomputed numeric array (`.npy`, or headerless numeric `.csv`).
    FeatureArray,
    /// Encoded image (`.png`, `.jpg`, `.jpeg`).
    Image,
}

impl SampleKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "npy" => Some(Self::FeatureArray),
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A sample file on disk, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleId {
    path: PathBuf,
    kind: SampleKind,
}

impl SampleId {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, MlError> {
        let path = path.into();
        let kind = SampleKind::from_path(&path).ok_or_else(|| MlError::UnsupportedSample(path.clone()))?;
        Ok(Self { path, kind })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    /// Base file name, as written in prediction tables.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Ordered, deduplicated class names. A label is the index of its name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ClassIndex {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl From<Vec<String>> for ClassIndex {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<ClassIndex> for Vec<String> {
    fn from(index: ClassIndex) -> Self {
        index.names
    }
}

impl ClassIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from names already in label order. Duplicates keep their first slot.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = Self::new();
        for name in names {
            index.intern(name);
        }
        index
    }

    /// Label for `name`, appending it if this is its first occurrence.
    pub fn intern(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        if let Some(&label) = self.lookup.get(&name) {
            return label;
        }
        let label = self.names.len();
        self.lookup.insert(name.clone(), label);
        self.names.push(name);
        label
    }

    pub fn label_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn name_of(&self, label: usize) -> Option<&str> {
        self.names.get(label).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_by_extension() {
        assert_eq!(SampleKind::from_path(Path::new("a/b.PNG")), Some(SampleKind::Image));
        assert_eq!(SampleKind::from_path(Path::new("x.jpeg")), Some(SampleKind::Image));
        assert_eq!(SampleKind::from_path(Path::new("f.npy")), Some(SampleKind::FeatureArray));
        assert_eq!(SampleKind::from_path(Path::new("f.csv")), Some(SampleKind::FeatureArray));
        assert_eq!(SampleKind::from_path(Path::new("notes.txt")), None);
        assert_eq!(SampleKind::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn test_unsupported_sample_rejected() {
        let err = SampleId::new("scan.tiff").unwrap_err();
        assert!(matches!(err, MlError::UnsupportedSample(_)));
    }

    #[test]
    fn test_class_index_first_occurrence_order() {
        let mut classes = ClassIndex::new();
        assert_eq!(classes.intern("tumor"), 0);
        assert_eq!(classes.intern("healthy"), 1);
        assert_eq!(classes.intern("tumor"), 0);
        assert_eq!(classes.intern("artifact"), 2);
        assert_eq!(classes.names(), ["tumor", "healthy", "artifact"]);
        assert_eq!(classes.label_of("healthy"), Some(1));
        assert_eq!(classes.name_of(2), Some("artifact"));
        assert_eq!(classes.name_of(3), None);
    }

    #[test]
    fn test_class_index_serializes_as_name_list() {
        let classes = ClassIndex::from_names(["b", "a", "b"]);
        let json = serde_json::to_string(&classes).unwrap();
        assert_eq!(json, r#"["b","a"]"#);
        let parsed: ClassIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.label_of("a"), Some(1));
    }
}
