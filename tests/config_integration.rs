//! ---
//! ta_section: "15-testing-qa-runbook"
//! ta_subsection: "integration-tests"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Configuration file driven server bootstrap tests."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
mod support;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::NamedTempFile;
use test_agent_common::config::AppConfig;
use test_agent_core::{CallDispatcher, IntegrationState, StateStore, StaticFacts, TraceSettings};
use test_agent_net::proto::{self, Empty};
use test_agent_net::{connect, GrpcServerBuilder};

const CUSTOM_CONFIG: &str = r#"
[server]
address = "127.0.0.1"
port = 50051
max_message_bytes = 1048576

[facts]
mock_mode = false
version = "9.9.9-rc1"
model_id = "from-config"

[state]
initial_integration = "manual"

[trace]
quota = 3
interval_ms = 10
payload = "configured payload"

[metrics]
enabled = false
"#;

fn write_config(contents: &str) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    Ok(file)
}

#[tokio::test]
async fn server_built_from_file_reflects_configuration() -> Result<()> {
    let file = write_config(CUSTOM_CONFIG)?;
    let loaded = AppConfig::load_with_source(Some(file.path()), &["does-not-exist.toml"])?;
    assert_eq!(loaded.source.as_deref(), Some(file.path()));
    let config = loaded.config;
    assert!(!config.metrics.enabled);

    let store = Arc::new(StateStore::new(StaticFacts::from(&config.facts)));
    store.set_integration_state(config.state.initial_integration);
    let dispatcher = CallDispatcher::new(store, TraceSettings::from(&config.trace));
    let handle = GrpcServerBuilder::new("127.0.0.1:0".parse()?, dispatcher)
        .max_message_bytes(config.server.max_message_bytes)
        .spawn()
        .await?;
    let mut client = connect("127.0.0.1", handle.local_addr().port()).await?;

    assert!(!client.query_mock_mode(Empty {}).await?.into_inner().value);
    assert_eq!(client.query_version(Empty {}).await?.into_inner().version, "9.9.9-rc1");
    assert_eq!(
        client.query_model_id(Empty {}).await?.into_inner().model_id,
        "from-config"
    );
    assert_eq!(
        client
            .query_integration_status(Empty {})
            .await?
            .into_inner()
            .state(),
        proto::IntegrationState::Manual
    );

    let mut stream = client.stream_trace(Empty {}).await?.into_inner();
    let mut received = 0;
    while let Some(event) = stream.message().await? {
        assert_eq!(event.message, b"configured payload");
        received += 1;
    }
    assert_eq!(received, 3);

    handle.shutdown().await?;
    Ok(())
}

#[test]
fn partial_file_falls_back_to_defaults() -> Result<()> {
    let file = write_config("[trace]\ninterval_ms = 250\n")?;
    let config = AppConfig::from_path(file.path())?;
    assert_eq!(config.trace.interval, Duration::from_millis(250));
    assert_eq!(config.trace.quota, 10);
    assert_eq!(config.server.endpoint(), "localhost:50051");
    assert_eq!(config.state.initial_integration, IntegrationState::Idle);
    assert_eq!(config.facts.model_id, "test-model-123");
    Ok(())
}

#[test]
fn invalid_values_are_rejected_with_context() {
    let file = write_config("[trace]\nquota = 0\n").unwrap();
    let err = AppConfig::from_path(file.path()).unwrap_err();
    let rendered = format!("{err:#}");
    assert!(rendered.contains("invalid config file"), "{rendered}");
    assert!(rendered.contains("quota"), "{rendered}");
}

#[test]
fn unreadable_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert!(AppConfig::load_with_source(Some(missing.as_path()), &[] as &[&str]).is_err());
}

#[tokio::test]
async fn default_harness_matches_default_config() {
    let defaults = AppConfig::default();
    let server = support::spawn_server(
        StaticFacts::from(&defaults.facts),
        support::fast_trace(),
    )
    .await;
    let mut client = server.client().await;
    assert_eq!(
        client.query_version(Empty {}).await.unwrap().into_inner().version,
        defaults.facts.version
    );
    server.shutdown().await;
}

#[test]
fn shipped_sample_matches_builtin_defaults() -> Result<()> {
    let sample: AppConfig = include_str!("../configs/test-agent.toml").parse()?;
    let defaults = AppConfig::default();
    assert_eq!(sample.server.endpoint(), defaults.server.endpoint());
    assert_eq!(sample.server.max_message_bytes, defaults.server.max_message_bytes);
    assert_eq!(sample.facts.version, defaults.facts.version);
    assert_eq!(sample.facts.model_id, defaults.facts.model_id);
    assert_eq!(sample.facts.mock_mode, defaults.facts.mock_mode);
    assert_eq!(sample.state.initial_integration, defaults.state.initial_integration);
    assert_eq!(sample.trace.quota, defaults.trace.quota);
    assert_eq!(sample.trace.interval, defaults.trace.interval);
    assert_eq!(sample.trace.payload, defaults.trace.payload);
    assert_eq!(sample.logging.directory, defaults.logging.directory);
    assert_eq!(sample.logging.format, defaults.logging.format);
    assert_eq!(sample.metrics.listen, defaults.metrics.listen);
    Ok(())
}
