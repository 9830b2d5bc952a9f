//! Dataset directory conventions: `train/` and `val/` splits, test partitions.

use crate::data::loader::sub_directories;
use crate::error::MlError;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Resolved training and validation directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    pub train_dir: PathBuf,
    pub val_dir: PathBuf,
}

/// Resolve the train and validation directories.
///
/// Without `val_dataset`, `<dataset>/train/` and `<dataset>/val/` must both
/// exist. With it, training data is `<dataset>/train/` when present and the
/// dataset directory itself otherwise.
pub fn resolve_layout(dataset_dir: &Path, val_dataset: Option<&Path>) -> Result<DatasetLayout, MlError> {
    if !dataset_dir.is_dir() {
        return Err(MlError::not_found(format!("dataset directory {}", dataset_dir.display())));
    }
    let train = dataset_dir.join("train");

    if let Some(val_dir) = val_dataset {
        if !val_dir.is_dir() {
            return Err(MlError::not_found(format!("validation directory {}", val_dir.display())));
        }
        let train_dir = if train.is_dir() { train } else { dataset_dir.to_path_buf() };
        return Ok(DatasetLayout {
            train_dir,
            val_dir: val_dir.to_path_buf(),
        });
    }

    let val = dataset_dir.join("val");
    let missing: Vec<&str> = [(&train, "train/"), (&val, "val/")]
        .into_iter()
        .filter(|(dir, _)| !dir.is_dir())
        .map(|(_, name)| name)
        .collect();
    if !missing.is_empty() {
        return Err(MlError::AmbiguousDatasetLayout {
            dir: dataset_dir.to_path_buf(),
            missing: missing.join(" and "),
        });
    }
    Ok(DatasetLayout {
        train_dir: train,
        val_dir: val,
    })
}

/// A named directory evaluated on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub name: String,
    pub dir: PathBuf,
    /// Class directories to load instead of inspecting `dir`. Empty means
    /// the whole directory.
    pub class_dirs: Vec<PathBuf>,
}

impl Partition {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            class_dirs: Vec::new(),
        }
    }
}

/// Split a test directory into partitions.
///
/// Every sub-directory that itself has sub-directories is a partition named
/// after it. The remaining sub-directories are classes of a partition named
/// `test` over the whole directory; in a mixed directory that partition only
/// loads those classes, and empty ones are skipped.
pub fn test_partitions(test_dir: &Path) -> Result<Vec<Partition>, MlError> {
    if !test_dir.is_dir() {
        return Err(MlError::not_found(format!("test directory {}", test_dir.display())));
    }
    let mut partitions = Vec::new();
    let mut flat = Vec::new();
    for dir in sub_directories(test_dir)? {
        if sub_directories(&dir)?.is_empty() {
            flat.push(dir);
            continue;
        }
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        partitions.push(Partition::new(name, dir));
    }
    if partitions.is_empty() {
        return Ok(vec![Partition::new("test", test_dir)]);
    }

    let mut class_dirs = Vec::with_capacity(flat.len());
    for dir in flat {
        if has_files(&dir)? {
            class_dirs.push(dir);
        } else {
            warn!(dir = %dir.display(), "Skipping empty test sub-directory");
        }
    }
    if !class_dirs.is_empty() {
        warn!(
            dir = %test_dir.display(),
            classes = class_dirs.len(),
            "Test directory mixes partitions and class directories; evaluating the classes as 'test'"
        );
        partitions.push(Partition {
            class_dirs,
            ..Partition::new("test", test_dir)
        });
    }
    Ok(partitions)
}

fn has_files(dir: &Path) -> Result<bool, MlError> {
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| MlError::dataset(format!("{}: {e}", dir.display())))?;
        if entry.file_type().is_file() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_standard_layout() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("train")).unwrap();
        std::fs::create_dir(dir.path().join("val")).unwrap();
        let layout = resolve_layout(dir.path(), None).unwrap();
        assert_eq!(layout.train_dir, dir.path().join("train"));
        assert_eq!(layout.val_dir, dir.path().join("val"));
    }

    #[test]
    fn test_missing_val_is_ambiguous() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("train")).unwrap();
        match resolve_layout(dir.path(), None) {
            Err(MlError::AmbiguousDatasetLayout { missing, .. }) => assert_eq!(missing, "val/"),
            other => panic!("unexpected {other:?}"),
        }

        let empty = TempDir::new().unwrap();
        match resolve_layout(empty.path(), None) {
            Err(MlError::AmbiguousDatasetLayout { missing, .. }) => assert_eq!(missing, "train/ and val/"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_explicit_val_dir() {
        let data = TempDir::new().unwrap();
        let val = TempDir::new().unwrap();
        let layout = resolve_layout(data.path(), Some(val.path())).unwrap();
        assert_eq!(layout.train_dir, data.path());

        std::fs::create_dir(data.path().join("train")).unwrap();
        let layout = resolve_layout(data.path(), Some(val.path())).unwrap();
        assert_eq!(layout.train_dir, data.path().join("train"));
        assert_eq!(layout.val_dir, val.path());
    }

    #[test]
    fn test_partitions_by_nested_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("site_b/benign")).unwrap();
        std::fs::create_dir_all(dir.path().join("site_a/benign")).unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let parts = test_partitions(dir.path()).unwrap();
        let names: Vec<_> = parts.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["site_a", "site_b"]);
        assert_eq!(parts[0].dir, dir.path().join("site_a"));
    }

    #[test]
    fn test_mixed_test_dir_keeps_flat_class_dirs() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("site_a/benign")).unwrap();
        std::fs::create_dir_all(dir.path().join("loose")).unwrap();
        std::fs::write(dir.path().join("loose/img.png"), b"").unwrap();

        let parts = test_partitions(dir.path()).unwrap();
        assert_eq!(
            parts,
            vec![
                Partition::new("site_a", dir.path().join("site_a")),
                Partition {
                    class_dirs: vec![dir.path().join("loose")],
                    ..Partition::new("test", dir.path())
                },
            ]
        );
    }

    #[test]
    fn test_flat_test_dir_is_one_partition() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("benign")).unwrap();
        std::fs::create_dir_all(dir.path().join("malignant")).unwrap();

        let parts = test_partitions(dir.path()).unwrap();
        assert_eq!(
            parts,
            vec![Partition::new("test", dir.path())]
        );
    }
}
