//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Shared primitives and utilities for the agent runtime."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
//! Shared primitives for the test agent workspace.
//! This crate exposes configuration loading, logging, the enumerations exchanged
//! at the remote-call boundary, and version metadata consumed across the workspace.

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod time;
pub mod version;

pub use config::{
    AppConfig, FactsConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, ServerConfig,
    StateConfig, TraceConfig,
};
pub use error::ConfigError;
pub use logging::{init_cli_tracing, init_tracing, LogFormat};
pub use model::{
    IntegrationState, ServiceKind, ServiceRunState, TraceEventType, TraceGroups, TraceSeverity,
};
pub use version::VersionInfo;
