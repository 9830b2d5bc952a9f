//! Optimizer selection and construction for the head's parameters.

use crate::engine::{TrainBackend, TransferNet};
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ADAM_EPSILON: f32 = 1e-7;
const SGD_MOMENTUM: f64 = 0.9;
const RMS_RHO: f32 = 0.9;

/// Optimizer selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    /// SGD with momentum 0.9.
    Sgd,
    #[serde(rename = "rmsprop")]
    RmsProp,
}

impl OptimizerKind {
    pub const ALL: [OptimizerKind; 3] = [Self::Adam, Self::Sgd, Self::RmsProp];

    pub fn name(self) -> &'static str {
        match self {
            Self::Adam => "adam",
            Self::Sgd => "sgd",
            Self::RmsProp => "rmsprop",
        }
    }

    /// Fresh optimizer state for a [`TransferNet`] on the training backend.
    pub fn build(self) -> Box<dyn HeadOptimizer> {
        match self {
            Self::Adam => Box::new(
                AdamConfig::new()
                    .with_epsilon(ADAM_EPSILON)
                    .init::<TrainBackend, TransferNet<TrainBackend>>(),
            ),
            Self::Sgd => Box::new(
                SgdConfig::new()
                    .with_momentum(Some(
                        MomentumConfig::new().with_momentum(SGD_MOMENTUM).with_dampening(0.0),
                    ))
                    .init::<TrainBackend, TransferNet<TrainBackend>>(),
            ),
            Self::RmsProp => Box::new(
                RmsPropConfig::new()
                    .with_alpha(RMS_RHO)
                    .init::<TrainBackend, TransferNet<TrainBackend>>(),
            ),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adam" => Ok(Self::Adam),
            "sgd" => Ok(Self::Sgd),
            "rmsprop" => Ok(Self::RmsProp),
            other => Err(format!("unknown optimizer '{other}' (adam, sgd, rmsprop)")),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Object-safe view of a burn optimizer bound to [`TransferNet`].
pub trait HeadOptimizer: Send {
    fn apply(
        &mut self,
        lr: f64,
        net: TransferNet<TrainBackend>,
        grads: GradientsParams,
    ) -> TransferNet<TrainBackend>;
}

impl<O> HeadOptimizer for O
where
    O: Optimizer<TransferNet<TrainBackend>, TrainBackend>,
{
    fn apply(
        &mut self,
        lr: f64,
        net: TransferNet<TrainBackend>,
        grads: GradientsParams,
    ) -> TransferNet<TrainBackend> {
        self.step(lr, net, grads)
    }
}
