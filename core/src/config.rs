use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuleError};

/// Default cycle guard.
pub const DEFAULT_MAX_CYCLES: u64 = 5000;

/// What the engine does when the cycle guard trips.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CycleLimitPolicy {
    /// Return `ExecutionError::CycleLimit`.
    #[default]
    Fail,
    /// Log a warning and return the report with `limit_reached` set.
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,
    #[serde(default)]
    pub cycle_limit: CycleLimitPolicy,
}

fn default_max_cycles() -> u64 {
    DEFAULT_MAX_CYCLES
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_cycles: DEFAULT_MAX_CYCLES,
            cycle_limit: CycleLimitPolicy::Fail,
        }
    }
}

impl EngineConfig {
    /// Load from a file. `.json` files are read as JSON, anything else as
    /// YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| RuleError::Resource {
            origin: path.display().to_string(),
            source,
        })?;
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let config: EngineConfig = serde_json::from_str(&content)
                .map_err(|e| RuleError::Config(format!("{}: {}", path.display(), e)))?;
            config.validated()
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_yaml::from_str(content).map_err(|e| RuleError::Config(e.to_string()))?;
        config.validated()
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| RuleError::Config(e.to_string()))
    }

    fn validated(self) -> Result<Self> {
        if self.max_cycles == 0 {
            return Err(RuleError::Config("max_cycles must be at least 1".into()));
        }
        Ok(self)
    }
}
