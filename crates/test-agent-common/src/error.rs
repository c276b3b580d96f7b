//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Shared primitives and utilities for the agent runtime."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use thiserror::Error;

/// Structural problems detected while validating an [`crate::AppConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("server address must not be empty")]
    EmptyAddress,
    #[error("server port must be between 1 and 65535")]
    InvalidPort,
    #[error("server max_message_bytes must be greater than zero")]
    ZeroMessageCap,
    #[error("facts.{0} must not be empty")]
    EmptyFact(&'static str),
    #[error("trace quota must be at least 1")]
    ZeroTraceQuota,
    #[error("trace interval must be greater than zero")]
    ZeroTraceInterval,
}
