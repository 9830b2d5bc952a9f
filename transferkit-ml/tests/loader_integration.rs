//! Data loader tests over real files in scratch directories.

use image::{Rgb, RgbImage};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

use transferkit_ml::MlError;
use transferkit_ml::data::{DataSource, LoadRequest, load_data};

fn write_png(path: &Path, shade: u8) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(6, 6, Rgb([shade, 255 - shade, 128])).save(path).unwrap();
}

#[test]
fn class_directories_give_one_class_each() {
    let dir = TempDir::new().unwrap();
    for i in 0..5 {
        write_png(&dir.path().join("cats").join(format!("c{i}.png")), 10 * i as u8);
    }
    for i in 0..7 {
        write_png(&dir.path().join("dogs").join(format!("d{i}.png")), 200 - 10 * i as u8);
    }

    let loaded = load_data(&LoadRequest::new(dir.path(), 4).with_seed(Some(3))).unwrap();
    assert_eq!(loaded.num_classes, 2);
    assert_eq!(loaded.class_names.names(), &["cats".to_string(), "dogs".to_string()]);
    assert_eq!(loaded.source, DataSource::ClassDirectories);
    assert_eq!(loaded.generator.num_samples(), 12);
    assert_eq!(loaded.generator.batch_count(), 3);

    let batch = loaded.generator.get_batch(0).unwrap();
    assert_eq!(batch.inputs.shape(), &[4, 255, 255, 3]);
    assert_eq!(batch.targets.shape(), &[4, 2]);
    assert!(batch.inputs.iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn malformed_image_is_a_decode_error() {
    let dir = TempDir::new().unwrap();
    write_png(&dir.path().join("a").join("ok.png"), 40);
    std::fs::create_dir_all(dir.path().join("b")).unwrap();
    std::fs::write(dir.path().join("b").join("broken.png"), b"definitely not a png").unwrap();

    let loaded = load_data(&LoadRequest::new(dir.path(), 2).for_prediction()).unwrap();
    assert_eq!(loaded.generator.batch_count(), 1);
    let err = loaded.generator.get_batch(0).unwrap_err();
    assert!(matches!(err, MlError::DecodeError { ref path, .. } if path.ends_with("broken.png")));
}

#[test]
fn annotation_classes_follow_first_occurrence() {
    let dir = TempDir::new().unwrap();
    for name in ["a.png", "b.png", "c.png"] {
        write_png(&dir.path().join(name), 90);
    }
    std::fs::write(
        dir.path().join("labels.csv"),
        "fname,label\nc.png,dog\na.png,cat\nb.png,dog\n",
    )
    .unwrap();

    let loaded = load_data(&LoadRequest::new(dir.path(), 1).for_prediction()).unwrap();
    assert_eq!(loaded.class_names.names(), &["dog".to_string(), "cat".to_string()]);
    assert_eq!(loaded.generator.labels(), &[0, 1, 0]);
    assert_eq!(loaded.generator.batch_size(), 3);
    assert!(matches!(loaded.source, DataSource::Annotations(_)));
}

#[test]
fn unresolvable_directory_errors_by_mode() {
    let dir = TempDir::new().unwrap();
    write_png(&dir.path().join("only").join("x.png"), 1);

    assert!(matches!(
        load_data(&LoadRequest::new(dir.path(), 1)),
        Err(MlError::NoAnnotationFound(_))
    ));
    assert!(matches!(
        load_data(&LoadRequest::new(dir.path(), 1).for_prediction()),
        Err(MlError::UnresolvedDirectoryStructure(_))
    ));
}
