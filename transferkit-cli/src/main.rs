//! transferkit CLI: train a transfer-learning image classifier or run a
//! saved one over new data.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use transferkit_core::ConfigSources;
use transferkit_ml::engine::OptimizerKind;
use transferkit_ml::{MlConfig, Orchestrator, RunMode};

/// Transfer-learning image classification experiments
#[derive(Parser, Debug)]
#[command(name = "transferkit", version, about, long_about = None)]
struct Cli {
    /// Head (cap model) to train on top of the backbone
    #[arg(long)]
    name_model: Option<String>,

    /// What to do: train or predict. Anything else, or nothing, is a no-op
    #[arg(long)]
    mode: Option<String>,

    /// Frozen feature extractor, e.g. VGG16 or ResNet50
    #[arg(long)]
    backbone: Option<String>,

    /// Dataset root holding train/ and val/
    #[arg(long)]
    dataset_dir: Option<PathBuf>,

    /// Validation data, if not under the dataset root
    #[arg(long)]
    val_dataset: Option<PathBuf>,

    /// Test data to predict on after training (or in predict mode)
    #[arg(long)]
    test_dataset: Option<PathBuf>,

    /// Where run directories are created
    #[arg(long)]
    results_dir: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    /// Optimizer: adam, sgd, rmsprop
    #[arg(long)]
    optimizer: Option<OptimizerKind>,

    /// Saved model to reload in predict mode
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Compute ROC curves and AUC for evaluated partitions
    #[arg(long)]
    analyze_data: bool,

    /// Evaluate the validation set after training
    #[arg(long)]
    eval_val: bool,

    /// Evaluate the training set after training
    #[arg(long)]
    eval_train: bool,

    /// Seed for shuffling and head initialization
    #[arg(long)]
    seed: Option<u64>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace directory (for .transferkit/config.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    /// Flags given on the command line win over every config layer.
    fn apply_overrides(&self, config: &mut MlConfig) {
        if let Some(name) = &self.name_model {
            config.model.name_model = name.clone();
        }
        if let Some(backbone) = &self.backbone {
            config.model.backbone = Some(backbone.clone());
        }
        if let Some(weights) = &self.weights {
            config.model.weights = Some(weights.clone());
        }

        let paths = &mut config.paths;
        if let Some(dir) = &self.dataset_dir {
            paths.dataset_dir = dir.clone();
        }
        if let Some(dir) = &self.val_dataset {
            paths.val_dataset = Some(dir.clone());
        }
        if let Some(dir) = &self.test_dataset {
            paths.test_dataset = Some(dir.clone());
        }
        if let Some(dir) = &self.results_dir {
            paths.results_dir = dir.clone();
        }

        let training = &mut config.training;
        if let Some(epochs) = self.epochs {
            training.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            training.batch_size = batch_size;
        }
        if let Some(lr) = self.learning_rate {
            training.learning_rate = lr;
        }
        if let Some(optimizer) = self.optimizer {
            training.optimizer = optimizer;
        }
        if self.seed.is_some() {
            training.seed = self.seed;
        }

        let evaluation = &mut config.evaluation;
        evaluation.analyze_data |= self.analyze_data;
        evaluation.eval_val_set |= self.eval_val;
        evaluation.eval_train_set |= self.eval_train;
    }
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_dir = transferkit_core::logging::default_log_dir();
    let _guard = transferkit_core::logging::init_tracing(cli.verbose, cli.quiet, &log_dir);

    let workspace = cli
        .workspace
        .canonicalize()
        .with_context(|| format!("workspace {} is not accessible", cli.workspace.display()))?;

    let sources = ConfigSources {
        workspace: Some(&workspace),
        explicit_file: cli.config.as_deref(),
        skip_user_config: false,
    };
    let mut config: MlConfig = transferkit_core::load_config(&sources, None).context("Configuration error")?;
    cli.apply_overrides(&mut config);

    run(&cli, config)
}

/// Run the selected mode. An error here makes the process exit non-zero.
fn run(cli: &Cli, config: MlConfig) -> anyhow::Result<()> {
    let mode_name = cli.mode.as_deref().unwrap_or_default();
    let mode = RunMode::from(mode_name);
    let mut orchestrator = Orchestrator::new(config);
    let report = orchestrator
        .run(&mode)
        .with_context(|| format!("{mode_name} run failed"))?;

    if let Some(report) = report {
        info!(
            id = %report.experiment_id,
            dir = %report.run_dir.display(),
            partitions = report.partitions.len(),
            "Run complete"
        );
        if let Some(metrics) = &report.metrics {
            info!(
                epochs = metrics.epochs_completed,
                best_epoch = ?metrics.best_epoch,
                best_loss = ?metrics.best_loss,
                "Training time: {:.1}s",
                metrics.total_training_time_secs
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("transferkit").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_leave_config_alone() {
        let cli = parse(&[]);
        assert_eq!(cli.mode, None);
        assert_eq!(
            RunMode::from(cli.mode.as_deref().unwrap_or_default()),
            RunMode::Unrecognized(String::new())
        );
        let mut config = MlConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.training.epochs, MlConfig::default().training.epochs);
        assert_eq!(config.model.backbone, None);
        assert!(!config.evaluation.analyze_data);
    }

    #[test]
    fn test_failed_run_is_an_error() {
        let scratch = tempfile::TempDir::new().unwrap();
        let mut config = MlConfig::default();
        config.paths.dataset_dir = scratch.path().join("missing");
        config.paths.results_dir = scratch.path().join("results");

        let err = run(&parse(&["--mode", "train"]), config.clone()).unwrap_err();
        assert!(err.to_string().contains("train run failed"));
        assert!(run(&parse(&[]), config).is_ok());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "--name-model",
            "simple_fc",
            "--backbone",
            "VGG16",
            "--dataset-dir",
            "/data/xray",
            "--epochs",
            "30",
            "--batch-size",
            "16",
            "--learning-rate",
            "0.0001",
            "--optimizer",
            "sgd",
            "--analyze-data",
            "--eval-val",
            "--seed",
            "9",
        ]);
        let mut config = MlConfig::default();
        config.evaluation.eval_train_set = true;
        cli.apply_overrides(&mut config);

        assert_eq!(config.model.backbone.as_deref(), Some("VGG16"));
        assert_eq!(config.paths.dataset_dir, PathBuf::from("/data/xray"));
        assert_eq!(config.training.epochs, 30);
        assert_eq!(config.training.batch_size, 16);
        assert_eq!(config.training.learning_rate, 1e-4);
        assert_eq!(config.training.optimizer, OptimizerKind::Sgd);
        assert_eq!(config.training.seed, Some(9));
        assert!(config.evaluation.analyze_data);
        assert!(config.evaluation.eval_val_set);
        assert!(config.evaluation.eval_train_set);
    }

    #[test]
    fn test_unknown_optimizer_rejected() {
        let result = Cli::try_parse_from(["transferkit", "--optimizer", "lbfgs"]);
        assert!(result.is_err());
    }
}
