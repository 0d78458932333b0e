//! Configuration management for Mediaflow.
//!
//! Handles loading configuration from TOML files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{FlowError, FlowResult};
use crate::emit::EmitterOptions;
use crate::plan::{ResolverPolicy, ScheduleOrder};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input and output locations
    pub paths: PathsConfig,

    /// Requirement resolution settings
    pub resolver: ResolverConfig,

    /// Workflow emission settings
    pub emitter: EmitterConfig,
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the task templates
    pub templates_dir: PathBuf,

    /// Where the extracted node database is cached
    pub database: PathBuf,

    /// Directory generated workflows are written to
    pub output_dir: PathBuf,

    /// Replacement keyword table (the embedded table is used when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<PathBuf>,
}

/// Requirement resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Clarity scores below this value select the cheapest plan
    pub clarity_threshold: u8,

    /// Candidates kept per capability and per stage when clarity is low
    pub max_nodes_when_unclear: usize,

    /// Selections smaller than this are padded from fallback assumptions
    pub min_selected_nodes: usize,

    /// How selected nodes are ordered into stages
    pub order: ScheduleOrder,
}

/// Workflow emission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Default workflow name
    pub workflow_name: String,

    /// GitHub Actions runner label
    pub runner: String,

    /// CLI tool invoked by generated steps
    pub cli_tool: String,

    /// Retention of uploaded artifacts, in days
    pub artifact_retention_days: u32,

    /// Minutes added to a single node's estimate for its job timeout
    pub job_timeout_buffer: u32,

    /// Minutes added to the summed estimate of a combined stage job
    pub combined_timeout_buffer: u32,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.mediaflow.toml` in current directory
    /// 2. `~/.config/mediaflow/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".mediaflow.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        tracing::debug!(path = ?path, "Loaded configuration");
        Ok(config)
    }

    /// Reject settings the planner cannot work with.
    pub fn validate(&self) -> FlowResult<()> {
        if self.resolver.clarity_threshold > 10 {
            return Err(FlowError::Config(format!(
                "resolver.clarity_threshold must be within 0-10, got {}",
                self.resolver.clarity_threshold
            )));
        }
        if self.resolver.max_nodes_when_unclear == 0 {
            return Err(FlowError::Config(
                "resolver.max_nodes_when_unclear must be at least 1".to_string(),
            ));
        }
        if self.emitter.runner.trim().is_empty() {
            return Err(FlowError::Config("emitter.runner cannot be empty".to_string()));
        }
        if self.emitter.cli_tool.trim().is_empty() {
            return Err(FlowError::Config("emitter.cli_tool cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mediaflow"))
    }
}

impl ResolverConfig {
    /// Thresholds handed to the requirement resolver.
    pub fn policy(&self) -> ResolverPolicy {
        ResolverPolicy {
            clarity_threshold: self.clarity_threshold,
            max_nodes_when_unclear: self.max_nodes_when_unclear,
            min_selected_nodes: self.min_selected_nodes,
        }
    }
}

impl EmitterConfig {
    /// Options handed to the workflow emitter.
    pub fn options(&self) -> EmitterOptions {
        EmitterOptions {
            runner: self.runner.clone(),
            cli_tool: self.cli_tool.clone(),
            artifact_retention_days: self.artifact_retention_days,
            job_timeout_buffer: self.job_timeout_buffer,
            combined_timeout_buffer: self.combined_timeout_buffer,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates_dir: PathBuf::from("meta/examples"),
            database: PathBuf::from(".meta/task-nodes.json"),
            output_dir: PathBuf::from("generated/workflows/staging"),
            keywords: None,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        let policy = ResolverPolicy::default();
        Self {
            clarity_threshold: policy.clarity_threshold,
            max_nodes_when_unclear: policy.max_nodes_when_unclear,
            min_selected_nodes: policy.min_selected_nodes,
            order: ScheduleOrder::default(),
        }
    }
}

impl Default for EmitterConfig {
    fn default() -> Self {
        let options = EmitterOptions::default();
        Self {
            workflow_name: "dynamic-multimedia-workflow".to_string(),
            runner: options.runner,
            cli_tool: options.cli_tool,
            artifact_retention_days: options.artifact_retention_days,
            job_timeout_buffer: options.job_timeout_buffer,
            combined_timeout_buffer: options.combined_timeout_buffer,
        }
    }
}
