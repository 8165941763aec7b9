//! Run configuration.
//!
//! Serialised as JSON. Every field has a default, so `{}` is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::ConfigError;
use crate::seed::{Device, SeedContext, DEFAULT_SEED};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Seed for every device RNG.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Element type parameters are converted to before training.
    #[serde(default = "default_dtype")]
    pub dtype: DType,
    #[serde(default = "default_devices")]
    pub devices: Vec<Device>,
    /// Step size for the SGD update.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}
fn default_dtype() -> DType {
    DType::F32
}
fn default_devices() -> Vec<Device> {
    vec![Device::Cpu]
}
fn default_learning_rate() -> f64 {
    1e-2
}
fn default_epochs() -> usize {
    10
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            dtype: default_dtype(),
            devices: default_devices(),
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.devices.is_empty() {
            return Err(ConfigError::Invalid("at least one device is required".into()));
        }
        if !self.dtype.is_float() {
            return Err(ConfigError::Invalid(format!(
                "parameters must train in a float dtype, got {}",
                self.dtype
            )));
        }
        Ok(())
    }

    pub fn seed_context(&self) -> SeedContext {
        SeedContext {
            seed: self.seed,
            devices: self.devices.clone(),
        }
    }
}
