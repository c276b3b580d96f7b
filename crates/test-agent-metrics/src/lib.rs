//! ---
//! ta_section: "03-observability"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Metrics collection and export utilities."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across the workspace.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics` and a
/// liveness probe at `/healthz`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new()
        .route(
            "/metrics",
            get({
                let registry = registry.clone();
                move || metrics_handler(registry.clone())
            }),
        )
        .route("/healthz", get(|| async { "ok" }));

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let local_addr = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %local_addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

/// Prometheus scrape endpoint.
async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Return the bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "test_agentd_starts_total",
            "Total number of times the test agent daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.0005, 2.0, 12)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "test_agentd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new(
                "test_agent_build_info",
                "Build metadata for the running daemon binary",
            ),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }
}

/// Counters describing remote-call traffic and trace stream lifecycles.
#[derive(Clone, Debug)]
pub struct DispatchMetrics {
    rpc_calls: IntCounterVec,
    trace_events: IntCounter,
    streams_active: IntGauge,
    streams_closed: IntCounterVec,
}

impl DispatchMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let rpc_calls = IntCounterVec::new(
            Opts::new(
                "test_agent_rpc_calls_total",
                "Remote calls handled by the dispatcher, by operation",
            ),
            &["rpc"],
        )?;
        registry.register(Box::new(rpc_calls.clone()))?;

        let trace_events = IntCounter::with_opts(Opts::new(
            "test_agent_trace_events_total",
            "Trace events successfully handed to stream transports",
        ))?;
        registry.register(Box::new(trace_events.clone()))?;

        let streams_active = IntGauge::with_opts(Opts::new(
            "test_agent_trace_streams_active",
            "Trace streams currently emitting",
        ))?;
        registry.register(Box::new(streams_active.clone()))?;

        let streams_closed = IntCounterVec::new(
            Opts::new(
                "test_agent_trace_streams_closed_total",
                "Closed trace streams, by close reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(streams_closed.clone()))?;

        Ok(Self {
            rpc_calls,
            trace_events,
            streams_active,
            streams_closed,
        })
    }

    pub fn record_call(&self, rpc: &str) {
        self.rpc_calls.with_label_values(&[rpc]).inc();
    }

    pub fn calls(&self, rpc: &str) -> u64 {
        self.rpc_calls.with_label_values(&[rpc]).get()
    }

    pub fn record_trace_event(&self) {
        self.trace_events.inc();
    }

    pub fn trace_events(&self) -> u64 {
        self.trace_events.get()
    }

    pub fn stream_opened(&self) {
        self.streams_active.inc();
    }

    pub fn stream_closed(&self, reason: &str) {
        self.streams_active.dec();
        self.streams_closed.with_label_values(&[reason]).inc();
    }

    pub fn active_streams(&self) -> i64 {
        self.streams_active.get()
    }

    pub fn closed_streams(&self, reason: &str) -> u64 {
        self.streams_closed.with_label_values(&[reason]).get()
    }
}

pub use prometheus;
