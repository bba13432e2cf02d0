use crate::adaptive::DEFAULT_ADAPTIVE_THRESHOLD;
use crate::command::{CommandOracleConfig, InputDelivery};
use crate::component::ComponentSet;
use crate::enumerator::CacheScope;
use crate::oracle::Verdict;
use crate::search::Algorithm;
use serde::Deserialize;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Semantic problems in a configuration that parsed successfully.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("adaptive-threshold must be at least 1")]
    InvalidThreshold,

    #[error("oracle-type \"command\" requires command-settings with a non-empty command")]
    MissingCommand,

    #[error("planted conflict #{0} is empty")]
    EmptyConflict(usize),

    #[error("random-sizes entry #{0} is zero")]
    InvalidRandomSize(usize),

    #[error("no components configured: set universe.components, components-file or directory")]
    NoUniverse,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SearchSettings {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default = "default_adaptive_threshold")]
    pub adaptive_threshold: usize,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_true")]
    pub precheck: bool,
}

pub fn default_adaptive_threshold() -> usize {
    DEFAULT_ADAPTIVE_THRESHOLD
}

fn default_true() -> bool {
    true
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            adaptive_threshold: default_adaptive_threshold(),
            use_cache: true,
            precheck: true,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct EnumerateSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cache_scope: CacheScope,
    #[serde(default)]
    pub check_remaining: bool,
}

/// Where the component names come from. All sources are merged.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct UniverseSettings {
    #[serde(default)]
    pub components: Vec<String>,
    /// One name per line; blank lines and lines starting with `#` are skipped.
    pub components_file: Option<PathBuf>,
    /// Every non-hidden file directly inside becomes a component, named by its file name.
    pub directory: Option<PathBuf>,
}

impl UniverseSettings {
    fn is_empty(&self) -> bool {
        self.components.is_empty() && self.components_file.is_none() && self.directory.is_none()
    }

    pub fn load(&self) -> Result<ComponentSet<String>, anyhow::Error> {
        let mut universe: ComponentSet<String> = self.components.iter().cloned().collect();

        if let Some(path) = &self.components_file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("Failed to read components file at {:?}: {}", path, e)
            })?;
            universe.extend(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string),
            );
        }

        if let Some(dir) = &self.directory {
            let entries = std::fs::read_dir(dir)
                .map_err(|e| anyhow::anyhow!("Failed to read directory {:?}: {}", dir, e))?;
            for entry_result in entries {
                let entry = entry_result.map_err(|e| {
                    anyhow::anyhow!("Failed to read entry in directory {:?}: {}", dir, e)
                })?;
                if !entry.path().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().into_owned();
                if !name.starts_with('.') {
                    universe.insert(name);
                }
            }
        }

        Ok(universe)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OracleType {
    #[default]
    Command,
    Planted,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CommandSettings {
    pub command: Vec<String>,
    #[serde(default)]
    pub input_delivery: InputDelivery,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_timeout_verdict")]
    pub timeout_verdict: Verdict,
    pub working_dir: Option<PathBuf>,
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_timeout_verdict() -> Verdict {
    Verdict::Fail
}

impl CommandSettings {
    pub fn to_oracle_config(&self) -> CommandOracleConfig {
        CommandOracleConfig {
            command: self.command.clone(),
            input_delivery: self.input_delivery.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            timeout_verdict: self.timeout_verdict,
            working_dir: self.working_dir.clone(),
        }
    }
}

/// A simulated oracle for dry runs and benchmarking.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct PlantedSettings {
    /// Explicit conflicts, by component name.
    #[serde(default)]
    pub conflicts: Vec<Vec<String>>,
    /// Sizes of additional disjoint conflicts drawn at random from the universe.
    #[serde(default)]
    pub random_sizes: Vec<usize>,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct OracleConfig {
    #[serde(default)]
    pub oracle_type: OracleType,
    #[serde(default)]
    pub command_settings: Option<CommandSettings>,
    #[serde(default)]
    pub planted_settings: Option<PlantedSettings>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CulpritConfig {
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub enumerate: EnumerateSettings,
    #[serde(default)]
    pub universe: UniverseSettings,
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl CulpritConfig {
    /// Reads and parses a TOML configuration. Call [`validate`](Self::validate)
    /// once command-line overrides have been applied.
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: CulpritConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.adaptive_threshold()?;

        if self.universe.is_empty() {
            return Err(ConfigError::NoUniverse);
        }

        match self.oracle.oracle_type {
            OracleType::Command => {
                let has_command = self
                    .oracle
                    .command_settings
                    .as_ref()
                    .is_some_and(|settings| !settings.command.is_empty());
                if !has_command {
                    return Err(ConfigError::MissingCommand);
                }
            }
            OracleType::Planted => {
                if let Some(planted) = &self.oracle.planted_settings {
                    if let Some(index) = planted.conflicts.iter().position(Vec::is_empty) {
                        return Err(ConfigError::EmptyConflict(index));
                    }
                    if let Some(index) = planted.random_sizes.iter().position(|&size| size == 0) {
                        return Err(ConfigError::InvalidRandomSize(index));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn adaptive_threshold(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.search.adaptive_threshold).ok_or(ConfigError::InvalidThreshold)
    }
}
