//! Model zoo: backbone and head lookup tables.

pub mod backbone;
pub mod head;

pub use backbone::{BACKBONES, BackboneKind, BackboneSpec, Normalization};
pub use head::HeadKind;
