//! Configuration schema for evaluation runs.
//!
//! One YAML file drives the CLI: environment options, evaluation knobs, the value-network
//! backend, default paths and logging. Every section except `env` may be omitted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::env::EnvOptions;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Environment options, shared by every graph.
    pub env: EnvOptions,
    /// Rollout / evaluation settings.
    #[serde(default)]
    pub eval: EvalConfig,
    /// Value-network backend.
    #[serde(default)]
    pub inference: InferenceConfig,
    /// Default input/output locations (CLI flags take precedence).
    #[serde(default)]
    pub paths: PathsConfig,
    /// Event log settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rollout / evaluation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvalConfig {
    /// Independent attempts per graph (forced to 1 for irreversible environments).
    #[serde(default = "default_n_attempts")]
    pub n_attempts: u32,
    /// Step budget per attempt, as a multiple of the vertex count.
    #[serde(default = "default_step_factor")]
    pub step_factor: f64,
    /// Use the batched scheduler (one network call per lockstep round).
    #[serde(default = "default_batched")]
    pub batched: bool,
    /// Cap on concurrent attempts per sub-batch. None runs all attempts at once.
    #[serde(default)]
    pub max_batch_size: Option<u32>,
    /// Also return per-attempt raw results.
    #[serde(default)]
    pub return_raw: bool,
    /// Also return per-attempt action/score/reward histories.
    #[serde(default)]
    pub return_history: bool,
    /// Base seed; each graph derives its own stream from it.
    #[serde(default)]
    pub seed: u64,
}

fn default_n_attempts() -> u32 {
    50
}

fn default_step_factor() -> f64 {
    1.0
}

fn default_batched() -> bool {
    true
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            n_attempts: default_n_attempts(),
            step_factor: default_step_factor(),
            batched: default_batched(),
            max_batch_size: None,
            return_raw: false,
            return_history: false,
            seed: 0,
        }
    }
}

/// Which value network answers `predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceBackend {
    /// In-process linear scorer.
    #[default]
    Local,
    /// Inference server reached over a socket.
    Remote,
}

/// Value-network configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceConfig {
    #[serde(default)]
    pub backend: InferenceBackend,
    /// Safetensors weights for the local backend. None uses the immediate-reward scorer.
    #[serde(default)]
    pub weights: Option<PathBuf>,
    /// Endpoint for the remote backend ("tcp://host:port" or "unix:///path").
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Model id sent with every remote request.
    #[serde(default)]
    pub model_id: u32,
    /// Compute device ("default", "cpu", "cuda", "cuda:N", "mps").
    #[serde(default = "default_device")]
    pub device: String,
}

fn default_device() -> String {
    "default".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: InferenceBackend::default(),
            weights: None,
            endpoint: None,
            model_id: 0,
            device: default_device(),
        }
    }
}

/// Default paths.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Graph collection to evaluate.
    #[serde(default)]
    pub graphs: Option<PathBuf>,
    /// Output directory for the manifest, event log and result tables.
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
}

/// Event log configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Flush the NDJSON event log every N lines (0 = only on exit).
    #[serde(default)]
    pub flush_every_lines: u64,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: EnvOptions::default(),
            eval: EvalConfig::default(),
            inference: InferenceConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
