//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Shared primitives and utilities for the agent runtime."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "TEST_AGENT_LOG";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for the daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured-json" | "json" => Ok(LogFormat::StructuredJson),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

fn env_filter(fallback: &str) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to {} logging",
                LOG_ENV, err, fallback
            );
            EnvFilter::new(fallback)
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
    }
}

/// Initialize the daemon's tracing subscriber.
///
/// * `TEST_AGENT_LOG` overrides the filter, then `RUST_LOG`, defaulting to `info`.
/// * Stdout carries structured JSON unless `pretty` is configured.
/// * With `file_enabled` a daily rolling JSON file is written under `directory`.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = STDOUT_GUARD.set(stdout_guard);

    let fmt_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = if config.file_enabled {
        std::fs::create_dir_all(&config.directory)?;
        let prefix = config
            .file_prefix
            .clone()
            .unwrap_or_else(|| service_name.to_owned());
        let file_appender = daily(&config.directory, format!("{}.log", prefix));
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        let _ = FILE_GUARD.set(file_guard);
        Some(
            fmt::layer()
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer)
                .boxed(),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        format = ?config.format,
        file_enabled = config.file_enabled,
        log_dir = %config.directory.display(),
        "tracing initialised"
    );
    Ok(())
}

/// Baseline subscriber for the client CLI. Logs go to stderr so command
/// output on stdout stays machine readable.
pub fn init_cli_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
