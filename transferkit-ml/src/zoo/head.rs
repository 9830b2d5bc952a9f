//! Classification heads (cap models) placed after the backbone.

use crate::error::MlError;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadKind {
    /// One dense layer with softmax over the classes.
    SimpleFc,
}

impl HeadKind {
    pub const ALL: [HeadKind; 1] = [HeadKind::SimpleFc];

    pub fn name(self) -> &'static str {
        match self {
            Self::SimpleFc => "simple_fc",
        }
    }

    /// Fresh trainable head for `input_dim` backbone features, producing
    /// logits. Glorot-uniform initialization.
    pub fn init<B: Backend>(self, input_dim: usize, num_classes: usize, device: &B::Device) -> Linear<B> {
        match self {
            Self::SimpleFc => LinearConfig::new(input_dim, num_classes)
                .with_initializer(Initializer::XavierUniform { gain: 1.0 })
                .init(device),
        }
    }
}

impl FromStr for HeadKind {
    type Err = MlError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|h| h.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|h| h.name()).collect();
                MlError::Config(format!("unknown model '{name}' (supported: {})", known.join(", ")))
            })
    }
}

impl fmt::Display for HeadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_parse_head() {
        assert_eq!("simple_fc".parse::<HeadKind>().unwrap(), HeadKind::SimpleFc);
        assert!("fc_9layers".parse::<HeadKind>().is_err());
    }

    #[test]
    fn test_init_shapes() {
        let head = HeadKind::SimpleFc.init::<NdArray<f32>>(12, 3, &Default::default());
        assert_eq!(head.weight.val().dims(), [12, 3]);
        assert_eq!(head.bias.map(|b| b.val().dims()), Some([3]));
    }
}
