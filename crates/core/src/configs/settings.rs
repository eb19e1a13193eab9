//! Toolkit settings file
//!
//! Settings come from a single YAML file. Every key is optional; anything left
//! out keeps its built-in default. The file is found by checking, in order, an
//! explicit path, the `CT_CONFIG` environment variable and `configs/default.yaml`
//! in the working directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::configs::tasks::TaskConfig;
use crate::types::{CtError, CtResult};

pub const CONFIG_ENV: &str = "CT_CONFIG";
pub const LOCAL_CONFIG: &str = "configs/default.yaml";

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Worker count for batch runs
    pub concurrency: usize,
    pub timeouts: TimeoutsConfig,
    pub output: OutputConfig,
    pub paths: PathsConfig,
    /// Extra tasks, or replacements for built-in tasks with the same name
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutsConfig {
    /// Per-script deadline in seconds. 0 disables it.
    pub command_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Emit result records as JSON instead of streaming script output
    pub json: bool,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Interpreter for task scripts. Falls back to `CT_PYTHON`, then `python3`.
    pub python: Option<String>,
    /// Directory holding task scripts
    pub plugins: PathBuf,
    pub nmap: String,
    pub nslookup: String,
    pub whois: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeouts: TimeoutsConfig::default(),
            output: OutputConfig::default(),
            paths: PathsConfig::default(),
            tasks: Vec::new(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            command_seconds: 120,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            python: None,
            plugins: PathBuf::from("plugins").join("python"),
            nmap: "nmap".to_string(),
            nslookup: "nslookup".to_string(),
            whois: "whois".to_string(),
        }
    }
}

impl TimeoutsConfig {
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.command_seconds > 0).then(|| Duration::from_secs(self.command_seconds))
    }
}

impl Config {
    /// Load settings, looking for the file in the usual places
    pub fn load(explicit: Option<&Path>) -> CtResult<Self> {
        let env_path = env::var_os(CONFIG_ENV).map(PathBuf::from);
        match resolve_path(explicit, env_path, Path::new(LOCAL_CONFIG)) {
            Some(path) => Self::load_file(&path),
            None => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_file(path: &Path) -> CtResult<Self> {
        debug!(path = %path.display(), "loading config");
        let content = fs::read_to_string(path).map_err(|e| {
            CtError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        parse_config(&content)
    }

    /// JSON schema of the settings file
    pub fn json_schema() -> CtResult<String> {
        let schema = schemars::schema_for!(Config);
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    pub fn to_yaml(&self) -> CtResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Pick the settings file: explicit path, then the environment, then the local
/// default if it exists.
pub fn resolve_path(
    explicit: Option<&Path>,
    env_path: Option<PathBuf>,
    local: &Path,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        return Some(path);
    }
    local.is_file().then(|| local.to_path_buf())
}

pub fn parse_config(yaml_str: &str) -> CtResult<Config> {
    if yaml_str.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(yaml_str)?;
    Ok(config)
}
