//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Shared primitives and utilities for the agent runtime."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::error::ConfigError;
use crate::logging::LogFormat;
use crate::model::IntegrationState;

fn default_address() -> String {
    "localhost".to_owned()
}

fn default_port() -> u16 {
    50051
}

fn default_max_message_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_mock_mode() -> bool {
    true
}

fn default_version() -> String {
    "0.1.0-mock".to_owned()
}

fn default_model_id() -> String {
    "test-model-123".to_owned()
}

fn default_initial_integration() -> IntegrationState {
    IntegrationState::Idle
}

fn default_trace_quota() -> u32 {
    10
}

fn default_trace_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_trace_payload() -> String {
    "Mock trace event from TestAgentService".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9898))
}

/// Primary configuration object for the test agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub facts: FactsConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "TEST_AGENT_CONFIG";

    /// Load configuration, respecting the `TEST_AGENT_CONFIG` override.
    ///
    /// The environment override and `explicit` must point at readable files; the
    /// `candidates` are optional and skipped when absent. With nothing found the
    /// defaults are returned.
    pub fn load_with_source<P: AsRef<Path>>(
        explicit: Option<&Path>,
        candidates: &[P],
    ) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        if let Some(path) = explicit {
            let config = Self::from_path(path)?;
            return Ok(LoadedAppConfig {
                config,
                source: Some(path.to_path_buf()),
            });
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!("no configuration file found; using defaults");
        Ok(LoadedAppConfig {
            config: AppConfig::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.server.validate()?;
        self.facts.validate()?;
        self.trace.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Listener settings consumed once by the daemon at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl ServerConfig {
    /// `host:port` form accepted by `tokio::net::lookup_host`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::EmptyAddress);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.max_message_bytes == 0 {
            return Err(ConfigError::ZeroMessageCap);
        }
        Ok(())
    }
}

/// Values that stay fixed for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactsConfig {
    #[serde(default = "default_mock_mode")]
    pub mock_mode: bool,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

impl Default for FactsConfig {
    fn default() -> Self {
        Self {
            mock_mode: default_mock_mode(),
            version: default_version(),
            model_id: default_model_id(),
        }
    }
}

impl FactsConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::EmptyFact("version"));
        }
        if self.model_id.trim().is_empty() {
            return Err(ConfigError::EmptyFact("model_id"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_initial_integration")]
    pub initial_integration: IntegrationState,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            initial_integration: default_initial_integration(),
        }
    }
}

/// Pacing and quota for the trace stream.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default = "default_trace_quota")]
    pub quota: u32,
    #[serde(rename = "interval_ms", default = "default_trace_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
    #[serde(default = "default_trace_payload")]
    pub payload: String,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            quota: default_trace_quota(),
            interval: default_trace_interval(),
            payload: default_trace_payload(),
        }
    }
}

impl TraceConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.quota == 0 {
            return Err(ConfigError::ZeroTraceQuota);
        }
        if self.interval.is_zero() {
            return Err(ConfigError::ZeroTraceInterval);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub file_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}
