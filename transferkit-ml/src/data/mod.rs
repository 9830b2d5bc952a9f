//! Samples, decoding, batch generation and dataset loading.

pub mod annotations;
pub mod decode;
pub mod generator;
pub mod layout;
pub mod loader;
pub mod sample;

pub use annotations::{Annotations, find_annotation_file, parse_annotations};
pub use decode::{PixelTransform, SampleShape, load_sample};
pub use generator::{Batch, BatchGenerator, GeneratorConfig, RemainderPolicy, argmax_rows, one_hot};
pub use layout::{DatasetLayout, Partition, resolve_layout, test_partitions};
pub use loader::{DEFAULT_TARGET_SHAPE, DataSource, LoadRequest, LoadedData, load_data};
pub use sample::{ClassIndex, SampleId, SampleKind};
