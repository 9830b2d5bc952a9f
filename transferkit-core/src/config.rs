//! Layered configuration loading.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> environment -> explicit file -> CLI overrides.
//! The loader is generic so each crate can own its config type.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name used for the user config directory and the workspace dot-directory.
pub const APP_NAME: &str = "transferkit";

/// Prefix for environment overrides (`TRANSFERKIT_TRAINING__EPOCHS=10`).
pub const ENV_PREFIX: &str = "TRANSFERKIT_";

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    MissingFile(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

/// Where configuration layers are read from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources<'a> {
    /// Workspace root; `<workspace>/.transferkit/config.toml` is merged if present.
    pub workspace: Option<&'a Path>,
    /// Explicit config file (`--config`); must exist when given.
    pub explicit_file: Option<&'a Path>,
    /// Skip the per-user config file. Tests set this to stay hermetic.
    pub skip_user_config: bool,
}

/// User-level config path (`~/.config/transferkit/config.toml` on Linux).
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", APP_NAME, APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Workspace-level config path.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(format!(".{APP_NAME}")).join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Explicit config file
/// 3. Environment variables (prefixed with `TRANSFERKIT_`, `__` for nesting)
/// 4. Workspace-local config (`.transferkit/config.toml`)
/// 5. User config
/// 6. Built-in defaults
pub fn load_config<T>(sources: &ConfigSources<'_>, overrides: Option<&T>) -> Result<T, ConfigError>
where
    T: Default + Serialize + DeserializeOwned,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if !sources.skip_user_config {
        if let Some(user_config) = user_config_path() {
            if user_config.exists() {
                debug!(path = %user_config.display(), "Merging user config");
                figment = figment.merge(Toml::file(&user_config));
            }
        }
    }

    if let Some(ws) = sources.workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            debug!(path = %ws_config.display(), "Merging workspace config");
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

    if let Some(file) = sources.explicit_file {
        if !file.exists() {
            return Err(ConfigError::MissingFile(file.to_path_buf()));
        }
        debug!(path = %file.display(), "Merging config file");
        figment = figment.merge(Toml::file(file));
    }

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(|e| ConfigError::Invalid(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(default = "default_epochs")]
        epochs: usize,
        #[serde(default)]
        name: String,
    }

    fn default_epochs() -> usize {
        3
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                epochs: default_epochs(),
                name: String::new(),
            }
        }
    }

    fn hermetic(workspace: Option<&Path>) -> ConfigSources<'_> {
        ConfigSources {
            workspace,
            explicit_file: None,
            skip_user_config: true,
        }
    }

    #[test]
    fn test_load_config_defaults() {
        let config: Sample = load_config(&hermetic(None), None).unwrap();
        assert_eq!(config, Sample::default());
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let path = workspace_config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "epochs = 12\nname = \"ws\"\n").unwrap();

        let config: Sample = load_config(&hermetic(Some(dir.path())), None).unwrap();
        assert_eq!(config.epochs, 12);
        assert_eq!(config.name, "ws");
    }

    #[test]
    fn test_overrides_beat_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let path = workspace_config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "epochs = 12\n").unwrap();

        let overrides = Sample {
            epochs: 40,
            name: "cli".into(),
        };
        let config: Sample = load_config(&hermetic(Some(dir.path())), Some(&overrides)).unwrap();
        assert_eq!(config, overrides);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let sources = ConfigSources {
            workspace: None,
            explicit_file: Some(Path::new("/nonexistent/transferkit.toml")),
            skip_user_config: true,
        };
        let err = load_config::<Sample>(&sources, None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile(_)));
    }
}
