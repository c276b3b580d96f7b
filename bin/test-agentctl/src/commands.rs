//! ---
//! ta_section: "05-networking-external-interfaces"
//! ta_subsection: "binary"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Client CLI for operators and test harnesses driving the test agent."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{Context, Result};
use test_agent_common::model::{IntegrationState, ServiceKind, ServiceRunState};
use test_agent_net::proto::{self, Empty, ServiceTypeRequest};
use test_agent_net::AgentClient;

use crate::stream::{self, StreamLimits};

fn service_request(kind: ServiceKind) -> ServiceTypeRequest {
    ServiceTypeRequest {
        service_type: proto::ServiceType::from(kind) as i32,
    }
}

pub async fn mock_mode(client: &mut AgentClient) -> Result<bool> {
    let value = client
        .query_mock_mode(Empty {})
        .await
        .context("QueryMockMode failed")?
        .into_inner()
        .value;
    println!("Mock mode: {}", if value { "enabled" } else { "disabled" });
    Ok(value)
}

pub async fn version(client: &mut AgentClient) -> Result<String> {
    let version = client
        .query_version(Empty {})
        .await
        .context("QueryVersion failed")?
        .into_inner()
        .version;
    println!("Driver version: {version}");
    Ok(version)
}

pub async fn integration(client: &mut AgentClient) -> Result<IntegrationState> {
    let response = client
        .query_integration_status(Empty {})
        .await
        .context("QueryIntegrationStatus failed")?
        .into_inner();
    let state = IntegrationState::from(response.state());
    println!("Integration status: {state}");
    Ok(state)
}

pub async fn model_id(client: &mut AgentClient) -> Result<String> {
    let model_id = client
        .query_model_id(Empty {})
        .await
        .context("QueryModelId failed")?
        .into_inner()
        .model_id;
    println!("Model ID: {model_id}");
    Ok(model_id)
}

/// Print the four static/integration values, one per line.
pub async fn info(client: &mut AgentClient) -> Result<()> {
    println!("Fetching server information...");
    mock_mode(client).await?;
    version(client).await?;
    integration(client).await?;
    model_id(client).await?;
    Ok(())
}

pub async fn service_status(client: &mut AgentClient, kind: ServiceKind) -> Result<ServiceRunState> {
    let response = client
        .query_service_status(service_request(kind))
        .await
        .with_context(|| format!("QueryServiceStatus failed for {kind}"))?
        .into_inner();
    let state = ServiceRunState::from(response.state());
    println!("Service {kind} status: {state}");
    Ok(state)
}

pub async fn start_service(client: &mut AgentClient, kind: ServiceKind) -> Result<()> {
    client
        .start_service(service_request(kind))
        .await
        .with_context(|| format!("StartService failed for {kind}"))?;
    println!("Service {kind} started");
    Ok(())
}

pub async fn stop_service(client: &mut AgentClient, kind: ServiceKind) -> Result<()> {
    client
        .stop_service(service_request(kind))
        .await
        .with_context(|| format!("StopService failed for {kind}"))?;
    println!("Service {kind} stopped");
    Ok(())
}

pub async fn engage(client: &mut AgentClient) -> Result<()> {
    client.engage(Empty {}).await.context("Engage failed")?;
    println!("Driver engaged");
    Ok(())
}

pub async fn disengage(client: &mut AgentClient) -> Result<()> {
    client.disengage(Empty {}).await.context("Disengage failed")?;
    println!("Driver disengaged");
    Ok(())
}

/// Walk through every remote call: info, per-kind lifecycle, engagement, streaming.
pub async fn demo(client: &mut AgentClient) -> Result<()> {
    println!("Starting TestAgent client demo");
    println!("{}", "=".repeat(50));

    println!("\n1. Basic information");
    info(client).await?;

    println!("\n2. Service management");
    for kind in ServiceKind::TRACKED {
        println!("\nService {kind}:");
        service_status(client, kind).await?;
        start_service(client, kind).await?;
        service_status(client, kind).await?;
        stop_service(client, kind).await?;
        service_status(client, kind).await?;
    }

    println!("\n3. Driver engagement");
    integration(client).await?;
    engage(client).await?;
    integration(client).await?;
    disengage(client).await?;
    integration(client).await?;

    println!("\n4. Trace streaming");
    stream::print_events(
        client,
        StreamLimits {
            max_events: 5,
            timeout: Duration::from_secs(10),
        },
    )
    .await?;

    println!("\n5. Concurrent streaming and info polling");
    stream::stream_while_polling(client, Duration::from_secs(10), Duration::from_secs(2)).await?;

    println!("\nDemo completed successfully");
    Ok(())
}
