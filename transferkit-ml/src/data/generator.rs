//! Shuffled, fixed-size batches of `(sample, one-hot label)` pairs.

use crate::data::decode::{PixelTransform, SampleShape, load_sample};
use crate::data::sample::SampleId;
use crate::error::MlError;
use ndarray::{Array2, Array4, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What happens to the trailing `N mod B` samples of an epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Skip them; `floor(N / B)` batches per epoch.
    #[default]
    Drop,
    /// Complete the last batch by wrapping to the start of the permutation;
    /// `ceil(N / B)` batches per epoch.
    Pad,
}

/// Construction parameters shared by every batch.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub batch_size: usize,
    pub shape: SampleShape,
    pub num_classes: usize,
    pub shuffle: bool,
    pub remainder: RemainderPolicy,
    pub transform: PixelTransform,
    /// Seed for the permutation RNG. Random when unset.
    pub seed: Option<u64>,
}

/// One batch. Rows of `inputs` and `targets` line up with `positions`.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `(B, height, width, channels)`.
    pub inputs: Array4<f32>,
    /// `(B, num_classes)` one-hot.
    pub targets: Array2<f32>,
    /// Index of each row's sample in the generator's sample list.
    pub positions: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Indexed batch source over a fixed sample list.
///
/// The generator owns the epoch permutation; advancing it needs `&mut self`,
/// so one training loop drives one generator.
#[derive(Debug)]
pub struct BatchGenerator {
    samples: Vec<SampleId>,
    labels: Vec<usize>,
    config: GeneratorConfig,
    permutation: Vec<usize>,
    rng: StdRng,
}

impl BatchGenerator {
    pub fn new(samples: Vec<SampleId>, labels: Vec<usize>, config: GeneratorConfig) -> Result<Self, MlError> {
        if samples.len() != labels.len() {
            return Err(MlError::invalid_input(format!(
                "{} samples but {} labels",
                samples.len(),
                labels.len()
            )));
        }
        if config.batch_size == 0 {
            return Err(MlError::invalid_input("batch size must be at least 1"));
        }
        if config.num_classes == 0 {
            return Err(MlError::invalid_input("number of classes must be at least 1"));
        }
        if let Some((pos, label)) = labels.iter().enumerate().find(|(_, l)| **l >= config.num_classes) {
            return Err(MlError::invalid_input(format!(
                "label {label} of {} is outside [0, {})",
                samples[pos], config.num_classes
            )));
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut generator = Self {
            samples,
            labels,
            config,
            permutation: Vec::new(),
            rng,
        };
        generator.on_epoch_end();
        Ok(generator)
    }

    pub fn batch_count(&self) -> usize {
        let n = self.samples.len();
        let b = self.config.batch_size;
        match self.config.remainder {
            RemainderPolicy::Drop => n / b,
            RemainderPolicy::Pad => n.div_ceil(b),
        }
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[SampleId] {
        &self.samples
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    pub fn shape(&self) -> SampleShape {
        self.config.shape
    }

    pub fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Current epoch ordering of sample positions.
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Sample positions that make up batch `index`, without loading anything.
    pub fn batch_positions(&self, index: usize) -> Result<Vec<usize>, MlError> {
        let count = self.batch_count();
        if index >= count {
            return Err(MlError::invalid_input(format!(
                "batch index {index} out of range ({count} batches)"
            )));
        }
        let n = self.permutation.len();
        let b = self.config.batch_size;
        Ok((index * b..(index + 1) * b).map(|k| self.permutation[k % n]).collect())
    }

    /// Load batch `index`. Decode and shape errors propagate immediately.
    pub fn get_batch(&self, index: usize) -> Result<Batch, MlError> {
        let positions = self.batch_positions(index)?;
        let shape = self.config.shape;
        let mut inputs = Array4::<f32>::zeros((positions.len(), shape.height, shape.width, shape.channels));
        for (row, &pos) in positions.iter().enumerate() {
            let sample = load_sample(&self.samples[pos], shape, self.config.transform)?;
            inputs.index_axis_mut(Axis(0), row).assign(&sample);
        }
        let labels: Vec<usize> = positions.iter().map(|&p| self.labels[p]).collect();
        let targets = one_hot(&labels, self.config.num_classes);
        debug!(index, rows = positions.len(), "Loaded batch");
        Ok(Batch {
            inputs,
            targets,
            positions,
        })
    }

    /// Reset the permutation: a fresh uniform shuffle, or identity when
    /// shuffling is off.
    pub fn on_epoch_end(&mut self) {
        self.permutation = (0..self.samples.len()).collect();
        if self.config.shuffle {
            self.permutation.shuffle(&mut self.rng);
        }
    }
}

/// `(labels.len(), num_classes)` matrix with a single 1 per row.
pub fn one_hot(labels: &[usize], num_classes: usize) -> Array2<f32> {
    let mut targets = Array2::<f32>::zeros((labels.len(), num_classes));
    for (row, &label) in labels.iter().enumerate() {
        if label < num_classes {
            targets[[row, label]] = 1.0;
        }
    }
    targets
}

/// Index of the largest value in each row.
pub fn argmax_rows(values: &Array2<f32>) -> Vec<usize> {
    values
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        })
        .collect()
}
