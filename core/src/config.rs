//! Runtime configuration, loaded from `.agentrun/config.yaml`.
//!
//! A missing file yields the defaults; a malformed file is an error. The
//! core does not interpret these settings beyond handing them to the
//! components they configure.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sandbox::SandboxPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// How the runtime is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Interactive,
    Agent,
}

/// When plan execution requires human sign-off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    Always,
    #[default]
    Plan,
    Destructive,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_workdir")]
    pub workdir: String,
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    #[serde(default)]
    pub denied_paths: Vec<String>,
    #[serde(default)]
    pub max_file_size: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            allowed_paths: vec!["/workspace".to_string(), "/tmp".to_string()],
            denied_paths: vec!["/etc".to_string(), "/usr".to_string()],
            max_file_size: "10MB".to_string(),
        }
    }
}

impl SandboxConfig {
    /// The sandbox policy described by this config section.
    pub fn policy(&self) -> SandboxPolicy {
        SandboxPolicy {
            allowed_paths: self.allowed_paths.iter().map(PathBuf::from).collect(),
            denied_paths: self.denied_paths.iter().map(PathBuf::from).collect(),
            max_file_size: self.max_file_size.clone(),
        }
    }
}

fn default_workdir() -> String {
    "/workspace".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    #[serde(default)]
    pub mode: ApprovalMode,
    /// Seconds to wait for an approval decision.
    #[serde(default = "default_approval_timeout")]
    pub timeout: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            mode: ApprovalMode::default(),
            timeout: default_approval_timeout(),
        }
    }
}

fn default_approval_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default = "default_true")]
    pub fail_fast: bool,
    #[serde(default)]
    pub llm_judge_endpoint: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            fail_fast: true,
            llm_judge_endpoint: String::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_history_max_entries(),
            persist: true,
        }
    }
}

fn default_history_max_entries() -> usize {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_inspector_port")]
    pub port: u16,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_inspector_port(),
        }
    }
}

fn default_inspector_port() -> u16 {
    8377
}

/// The complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub inspector: InspectorConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            log_level: default_log_level(),
            sandbox: SandboxConfig::default(),
            approval: ApprovalConfig::default(),
            verify: VerifyConfig::default(),
            history: HistoryConfig::default(),
            inspector: InspectorConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a YAML file. A missing file is not an error;
    /// the defaults apply.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Default on-disk location: `.agentrun/config.yaml` under the current
    /// directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from(".agentrun").join("config.yaml")
    }
}
