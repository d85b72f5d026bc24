use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TaskweaveError};

/// Top-level taskweave configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of task bodies running on the worker pool at once.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Input key a Mapper reads its collection from when the node sets no `mapper_arg`.
    #[serde(default = "default_mapper_arg")]
    pub mapper_arg: String,
    /// Output key the default Collect reducer stores the aggregated sequence under.
    #[serde(default = "default_collect_key")]
    pub collect_key: String,
    /// Seed for Choice decisions. Unseeded runs use the thread RNG.
    #[serde(default)]
    pub choice_seed: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            mapper_arg: default_mapper_arg(),
            collect_key: default_collect_key(),
            choice_seed: None,
        }
    }
}

fn default_worker_threads() -> usize { 4 }

fn default_mapper_arg() -> String { "mapper".to_string() }

fn default_collect_key() -> String { "collected".to_string() }

/// Defaults stamped into every task at init time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_app")]
    pub app: String,
    #[serde(default)]
    pub realm: Option<String>,
    /// Falls back to `$USER` when unset.
    #[serde(default)]
    pub system_user: Option<String>,
    #[serde(default = "default_authrole")]
    pub authrole: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app: default_app(),
            realm: None,
            system_user: None,
            authrole: default_authrole(),
        }
    }
}

impl SessionConfig {
    /// The system account tasks run under.
    pub fn resolved_user(&self) -> String {
        self.system_user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn default_app() -> String { "taskweave".to_string() }

fn default_authrole() -> String { "default".to_string() }

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    #[serde(default)]
    pub filter: Option<String>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TaskweaveError::ConfigNotFound(path.display().to_string()))?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| TaskweaveError::Config(e.to_string()))
    }

    /// The configured log filter, if any.
    pub fn log_filter(&self) -> Option<&str> {
        self.log.as_ref().and_then(|l| l.filter.as_deref())
    }
}

/// Expand `${ENV_VAR}` patterns. Unset variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated reference
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
