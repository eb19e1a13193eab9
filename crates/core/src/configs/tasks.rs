use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A named task: one analysis script plus the tools it needs on the host
#[derive(Debug, Deserialize, Serialize, JsonSchema, Clone, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct TaskConfig {
    pub name: String,
    pub description: Option<String>,
    /// Script file name, resolved against `paths.plugins`
    pub script: String,
    /// Names of catalog dependencies checked before the script runs
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// One-line usage hint shown when no target is given
    pub usage: Option<String>,
}

impl TaskConfig {
    pub fn new(name: &str, description: &str, script: &str, dependencies: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            script: script.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            usage: Some(format!("ct {} <target> [--json]", name)),
        }
    }
}
