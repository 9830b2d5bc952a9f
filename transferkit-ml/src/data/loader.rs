//! Turns a dataset directory into a configured [`BatchGenerator`].
//!
//! Three layouts are recognized, tried in order:
//!
//! 1. an explicit annotation file,
//! 2. explicitly listed class directories,
//! 3. two or more class sub-directories (sorted names are the classes),
//! 4. a CSV annotation file directly inside the directory.

use crate::data::annotations::{find_annotation_file, parse_annotations};
use crate::data::decode::{PixelTransform, SampleShape};
use crate::data::generator::{BatchGenerator, GeneratorConfig, RemainderPolicy};
use crate::data::sample::{ClassIndex, SampleId, SampleKind};
use crate::error::MlError;
use crate::zoo::BackboneKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Target shape when no backbone dictates one.
pub const DEFAULT_TARGET_SHAPE: SampleShape = SampleShape::new(255, 255, 3);

/// Where the labels came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum DataSource {
    ClassDirectories,
    Annotations(PathBuf),
}

/// Inputs to [`load_data`].
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub dir: PathBuf,
    /// Annotation CSV; relative paths resolve against `dir`.
    pub annotation_file: Option<PathBuf>,
    /// Explicit class directories, used instead of the sub-directories of `dir`.
    pub class_dirs: Vec<PathBuf>,
    pub backbone: Option<BackboneKind>,
    pub batch_size: usize,
    /// One unshuffled batch covering every sample.
    pub prediction_mode: bool,
    pub remainder: RemainderPolicy,
    pub shuffle: bool,
    pub seed: Option<u64>,
}

impl LoadRequest {
    pub fn new(dir: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            dir: dir.into(),
            annotation_file: None,
            class_dirs: Vec::new(),
            backbone: None,
            batch_size,
            prediction_mode: false,
            remainder: RemainderPolicy::default(),
            shuffle: true,
            seed: None,
        }
    }

    pub fn with_backbone(mut self, backbone: Option<BackboneKind>) -> Self {
        self.backbone = backbone;
        self
    }

    pub fn with_annotation_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.annotation_file = Some(file.into());
        self
    }

    pub fn with_class_dirs(mut self, class_dirs: Vec<PathBuf>) -> Self {
        self.class_dirs = class_dirs;
        self
    }

    pub fn for_prediction(mut self) -> Self {
        self.prediction_mode = true;
        self
    }

    pub fn with_remainder(mut self, remainder: RemainderPolicy) -> Self {
        self.remainder = remainder;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn target(&self) -> (SampleShape, PixelTransform) {
        match self.backbone {
            Some(kind) => (kind.input_shape(), kind.pixel_transform()),
            None => (DEFAULT_TARGET_SHAPE, PixelTransform::UnitScale),
        }
    }
}

/// Result of [`load_data`].
#[derive(Debug)]
pub struct LoadedData {
    pub generator: BatchGenerator,
    pub num_classes: usize,
    pub class_names: ClassIndex,
    pub source: DataSource,
}

impl LoadedData {
    /// Relabel so that label `i` means `classes.name_of(i)`. Every class found
    /// in this data must be in `classes`.
    pub fn align_to(self, classes: &ClassIndex) -> Result<Self, MlError> {
        if self.class_names == *classes {
            return Ok(self);
        }
        let map = self
            .class_names
            .names()
            .iter()
            .map(|name| {
                classes.label_of(name).ok_or_else(|| {
                    MlError::dataset(format!("class '{name}' is not one of {:?}", classes.names()))
                })
            })
            .collect::<Result<Vec<usize>, MlError>>()?;

        let labels = self.generator.labels().iter().map(|&l| map[l]).collect();
        let mut config = self.generator.config().clone();
        config.num_classes = classes.len();
        let generator = BatchGenerator::new(self.generator.samples().to_vec(), labels, config)?;
        Ok(Self {
            generator,
            num_classes: classes.len(),
            class_names: classes.clone(),
            source: self.source,
        })
    }
}

/// Inspect `request.dir` and build a generator over its samples.
pub fn load_data(request: &LoadRequest) -> Result<LoadedData, MlError> {
    if !request.dir.is_dir() {
        return Err(MlError::not_found(format!("data directory {}", request.dir.display())));
    }

    let (samples, labels, class_names, source) = if let Some(file) = &request.annotation_file {
        let csv_path = if file.is_absolute() {
            file.clone()
        } else {
            request.dir.join(file)
        };
        let ann = parse_annotations(&csv_path, &request.dir)?;
        (ann.samples, ann.labels, ann.classes, DataSource::Annotations(csv_path))
    } else if !request.class_dirs.is_empty() {
        let (samples, labels, classes) = scan_class_directories(&request.class_dirs)?;
        (samples, labels, classes, DataSource::ClassDirectories)
    } else {
        let class_dirs = sub_directories(&request.dir)?;
        if class_dirs.len() >= 2 {
            let (samples, labels, classes) = scan_class_directories(&class_dirs)?;
            (samples, labels, classes, DataSource::ClassDirectories)
        } else {
            match find_annotation_file(&request.dir)? {
                Some(csv_path) => {
                    let ann = parse_annotations(&csv_path, &request.dir)?;
                    (ann.samples, ann.labels, ann.classes, DataSource::Annotations(csv_path))
                }
                None if request.prediction_mode => {
                    return Err(MlError::UnresolvedDirectoryStructure(request.dir.clone()));
                }
                None => return Err(MlError::NoAnnotationFound(request.dir.clone())),
            }
        }
    };

    if samples.is_empty() {
        return Err(MlError::dataset(format!("no samples found in {}", request.dir.display())));
    }

    let (shape, transform) = request.target();
    let (batch_size, shuffle) = if request.prediction_mode {
        (samples.len(), false)
    } else {
        (request.batch_size, request.shuffle)
    };

    info!(
        dir = %request.dir.display(),
        samples = samples.len(),
        classes = class_names.len(),
        batch_size,
        "Found {} samples belonging to {} classes",
        samples.len(),
        class_names.len()
    );

    let generator = BatchGenerator::new(
        samples,
        labels,
        GeneratorConfig {
            batch_size,
            shape,
            num_classes: class_names.len(),
            shuffle,
            remainder: request.remainder,
            transform,
            seed: request.seed,
        },
    )?;

    Ok(LoadedData {
        generator,
        num_classes: class_names.len(),
        class_names,
        source,
    })
}

/// Immediate sub-directories of `dir`, sorted by name.
pub fn sub_directories(dir: &Path) -> Result<Vec<PathBuf>, MlError> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| MlError::dataset(format!("{}: {e}", dir.display())))?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    Ok(dirs)
}

fn scan_class_directories(class_dirs: &[PathBuf]) -> Result<(Vec<SampleId>, Vec<usize>, ClassIndex), MlError> {
    let mut classes = ClassIndex::new();
    let mut samples = Vec::new();
    let mut labels = Vec::new();

    for class_dir in class_dirs {
        let name = class_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let label = classes.intern(name);
        for entry in WalkDir::new(class_dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| MlError::dataset(format!("{}: {e}", class_dir.display())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if SampleKind::from_path(entry.path()).is_none() {
                debug!(file = %entry.path().display(), "Skipping non-sample file");
                continue;
            }
            samples.push(SampleId::new(entry.into_path())?);
            labels.push(label);
        }
    }
    Ok((samples, labels, classes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "0").unwrap();
    }

    #[test]
    fn test_class_directories_sorted() {
        let dir = TempDir::new().unwrap();
        for (class, n) in [("zeta", 2), ("alpha", 3)] {
            for i in 0..n {
                touch(&dir.path().join(class).join(format!("{i}.png")));
            }
        }
        touch(&dir.path().join("alpha").join("README.txt"));

        let loaded = load_data(&LoadRequest::new(dir.path(), 2)).unwrap();
        assert_eq!(loaded.source, DataSource::ClassDirectories);
        assert_eq!(loaded.class_names.names(), ["alpha", "zeta"]);
        assert_eq!(loaded.generator.num_samples(), 5);
        assert_eq!(loaded.generator.labels(), &[0, 0, 0, 1, 1]);
        assert_eq!(loaded.generator.batch_count(), 2);
        assert_eq!(loaded.generator.shape(), DEFAULT_TARGET_SHAPE);
    }

    #[test]
    fn test_prediction_mode_single_batch() {
        let dir = TempDir::new().unwrap();
        for class in ["a", "b"] {
            for i in 0..3 {
                touch(&dir.path().join(class).join(format!("{i}.jpg")));
            }
        }
        let request = LoadRequest::new(dir.path(), 4)
            .with_backbone(Some(BackboneKind::InceptionV3))
            .for_prediction();
        let loaded = load_data(&request).unwrap();
        assert_eq!(loaded.generator.batch_size(), 6);
        assert_eq!(loaded.generator.batch_count(), 1);
        assert_eq!(loaded.generator.permutation(), &[0, 1, 2, 3, 4, 5]);
        assert_eq!(loaded.generator.shape(), SampleShape::new(299, 299, 3));
    }

    #[test]
    fn test_explicit_class_dirs_limit_classes() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("loose").join("0.png"));
        touch(&dir.path().join("site_a").join("benign").join("1.png"));

        let request = LoadRequest::new(dir.path(), 1)
            .with_class_dirs(vec![dir.path().join("loose")])
            .for_prediction();
        let loaded = load_data(&request).unwrap();
        assert_eq!(loaded.source, DataSource::ClassDirectories);
        assert_eq!(loaded.class_names.names(), ["loose"]);
        assert_eq!(loaded.generator.num_samples(), 1);
    }

    #[test]
    fn test_annotation_file_in_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("labels.csv"), "fname,label\nx.png,b\ny.png,a\n").unwrap();
        let loaded = load_data(&LoadRequest::new(dir.path(), 1)).unwrap();
        assert_eq!(loaded.source, DataSource::Annotations(dir.path().join("labels.csv")));
        assert_eq!(loaded.class_names.names(), ["b", "a"]);
    }

    #[test]
    fn test_explicit_annotation_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("unused_a")).unwrap();
        std::fs::create_dir(dir.path().join("unused_b")).unwrap();
        std::fs::write(dir.path().join("meta.txt"), "path,class\n1.npy,k\n").unwrap();
        let request = LoadRequest::new(dir.path(), 1).with_annotation_file("meta.txt");
        let loaded = load_data(&request).unwrap();
        assert_eq!(loaded.num_classes, 1);
        assert_eq!(loaded.generator.samples()[0].path(), dir.path().join("1.npy"));
    }

    #[test]
    fn test_align_to_training_classes() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("labels.csv"), "fname,label\nx.png,b\ny.png,a\n").unwrap();
        let loaded = load_data(&LoadRequest::new(dir.path(), 1).with_shuffle(false)).unwrap();

        let aligned = loaded.align_to(&ClassIndex::from_names(["a", "b", "c"])).unwrap();
        assert_eq!(aligned.generator.labels(), &[1, 0]);
        assert_eq!(aligned.num_classes, 3);

        let loaded = load_data(&LoadRequest::new(dir.path(), 1)).unwrap();
        assert!(loaded.align_to(&ClassIndex::from_names(["a"])).is_err());
    }

    #[test]
    fn test_missing_annotations() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("only_one")).unwrap();
        let err = load_data(&LoadRequest::new(dir.path(), 1)).unwrap_err();
        assert!(matches!(err, MlError::NoAnnotationFound(_)));

        let err = load_data(&LoadRequest::new(dir.path(), 1).for_prediction()).unwrap_err();
        assert!(matches!(err, MlError::UnresolvedDirectoryStructure(_)));
    }
}
