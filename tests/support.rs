//! ---
//! ta_section: "15-testing-qa-runbook"
//! ta_subsection: "integration-tests"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Shared loopback server harness for end-to-end tests."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use test_agent_core::{CallDispatcher, StateStore, StaticFacts, TraceSettings};
use test_agent_metrics::{new_registry, DispatchMetrics};
use test_agent_net::proto::{ServiceType, ServiceTypeRequest};
use test_agent_net::{connect, AgentClient, GrpcServerBuilder, GrpcServerHandle};

pub struct TestServer {
    pub handle: GrpcServerHandle,
    pub store: Arc<StateStore>,
    pub metrics: DispatchMetrics,
}

impl TestServer {
    pub async fn client(&self) -> AgentClient {
        connect("127.0.0.1", self.handle.local_addr().port())
            .await
            .expect("connect to loopback server")
    }

    pub async fn shutdown(self) {
        self.handle.shutdown().await.expect("clean shutdown");
    }
}

/// Ten events at a short cadence so stream tests finish quickly.
pub fn fast_trace() -> TraceSettings {
    TraceSettings {
        quota: 10,
        interval: Duration::from_millis(20),
        payload: "integration sample".into(),
    }
}

pub async fn spawn_server(facts: StaticFacts, trace: TraceSettings) -> TestServer {
    let store = Arc::new(StateStore::new(facts));
    let metrics = DispatchMetrics::new(new_registry()).expect("register metrics");
    let dispatcher = CallDispatcher::new(store.clone(), trace).with_metrics(metrics.clone());
    let handle = GrpcServerBuilder::new("127.0.0.1:0".parse().unwrap(), dispatcher)
        .spawn()
        .await
        .expect("spawn loopback server");
    TestServer {
        handle,
        store,
        metrics,
    }
}

pub async fn spawn_default_server() -> TestServer {
    spawn_server(StaticFacts::default(), fast_trace()).await
}

pub fn kind_request(kind: ServiceType) -> ServiceTypeRequest {
    ServiceTypeRequest {
        service_type: kind as i32,
    }
}

/// Poll `condition` every 10ms for up to `limit`.
pub async fn eventually<F: Fn() -> bool>(limit: Duration, condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
