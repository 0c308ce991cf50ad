use std::env;
use std::path::Path;

use config::{Config, Environment, File};

use super::StepflowConfig;
use crate::error::{Result, StepflowError};

/// Loads [`StepflowConfig`] from a YAML file plus environment overrides.
///
/// Resolution order, later wins:
/// 1. `config/stepflow.yaml` (or `STEPFLOW_CONFIG` if set), optional
/// 2. `STEPFLOW__*` environment variables (`STEPFLOW__DISPATCHER__GROUPS`)
pub struct ConfigManager;

impl ConfigManager {
    pub fn load() -> Result<StepflowConfig> {
        let path =
            env::var("STEPFLOW_CONFIG").unwrap_or_else(|_| "config/stepflow.yaml".to_string());
        Self::load_from_path(Path::new(&path))
    }

    pub fn load_from_path(path: &Path) -> Result<StepflowConfig> {
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("STEPFLOW")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("dispatcher.groups"),
            );

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| StepflowError::ConfigurationError(e.to_string()))
    }
}
