//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Remote-call dispatch onto the state store and trace streams."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use test_agent_common::model::{IntegrationState, ServiceKind, ServiceRunState};
use test_agent_metrics::DispatchMetrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::StateStore;
use crate::trace::{StreamSummary, TraceEvent, TraceGenerator, TraceSettings, TraceStream};

/// Operation names used for logs and metric labels.
pub mod rpc {
    pub const QUERY_MOCK_MODE: &str = "query_mock_mode";
    pub const QUERY_VERSION: &str = "query_version";
    pub const QUERY_INTEGRATION_STATUS: &str = "query_integration_status";
    pub const QUERY_MODEL_ID: &str = "query_model_id";
    pub const QUERY_SERVICE_STATUS: &str = "query_service_status";
    pub const START_SERVICE: &str = "start_service";
    pub const STOP_SERVICE: &str = "stop_service";
    pub const ENGAGE: &str = "engage";
    pub const DISENGAGE: &str = "disengage";
    pub const STREAM_TRACE: &str = "stream_trace";
}

/// Service addressed by a start/stop/status call.
///
/// Wire values outside the declared kinds stay `Unrecognised`: they never
/// alias a real entry, read back as [`ServiceRunState::Unknown`], and
/// start/stop on them changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceTarget {
    Known(ServiceKind),
    Unrecognised(i32),
}

impl From<ServiceKind> for ServiceTarget {
    fn from(kind: ServiceKind) -> Self {
        ServiceTarget::Known(kind)
    }
}

impl fmt::Display for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceTarget::Known(kind) => write!(f, "{kind}"),
            ServiceTarget::Unrecognised(raw) => write!(f, "unrecognised({raw})"),
        }
    }
}

/// Receiving half of a trace stream plus the producer task driving it.
#[derive(Debug)]
pub struct TraceSubscription {
    pub events: mpsc::Receiver<TraceEvent>,
    pub task: JoinHandle<StreamSummary>,
}

/// Translates each remote call into one store operation.
///
/// Transport-agnostic: the gRPC adapter owns one instance and clones it freely,
/// all clones share the same [`StateStore`].
#[derive(Debug, Clone)]
pub struct CallDispatcher {
    store: Arc<StateStore>,
    trace: TraceSettings,
    shutdown: CancellationToken,
    metrics: Option<DispatchMetrics>,
}

impl CallDispatcher {
    pub fn new(store: Arc<StateStore>, trace: TraceSettings) -> Self {
        Self {
            store,
            trace,
            shutdown: CancellationToken::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: DispatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Token whose cancellation closes every open trace stream.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    #[cfg(test)]
    fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    fn record(&self, rpc: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_call(rpc);
        }
    }

    pub fn query_mock_mode(&self) -> bool {
        self.record(rpc::QUERY_MOCK_MODE);
        self.store.get_static_facts().mock_mode
    }

    pub fn query_version(&self) -> String {
        self.record(rpc::QUERY_VERSION);
        self.store.get_static_facts().version
    }

    pub fn query_integration_status(&self) -> IntegrationState {
        self.record(rpc::QUERY_INTEGRATION_STATUS);
        self.store.get_integration_state()
    }

    pub fn query_model_id(&self) -> String {
        self.record(rpc::QUERY_MODEL_ID);
        self.store.get_static_facts().model_id
    }

    pub fn query_service_status(&self, target: impl Into<ServiceTarget>) -> ServiceRunState {
        self.record(rpc::QUERY_SERVICE_STATUS);
        let target = target.into();
        let state = match target {
            ServiceTarget::Known(kind) => self.store.get_run_state(kind),
            ServiceTarget::Unrecognised(_) => ServiceRunState::Unknown,
        };
        debug!(rpc = rpc::QUERY_SERVICE_STATUS, service_kind = %target, state = %state, "service status queried");
        state
    }

    /// Does not consult the prior state; starting a running service is a no-op overwrite.
    pub fn start_service(&self, target: impl Into<ServiceTarget>) {
        self.record(rpc::START_SERVICE);
        self.apply_run_state(rpc::START_SERVICE, target.into(), ServiceRunState::Running);
    }

    pub fn stop_service(&self, target: impl Into<ServiceTarget>) {
        self.record(rpc::STOP_SERVICE);
        self.apply_run_state(rpc::STOP_SERVICE, target.into(), ServiceRunState::Stopped);
    }

    fn apply_run_state(&self, operation: &'static str, target: ServiceTarget, state: ServiceRunState) {
        match target {
            ServiceTarget::Known(kind) => {
                self.store.set_run_state(kind, state);
                info!(rpc = operation, service_kind = %kind, state = %state, "service state set");
            }
            ServiceTarget::Unrecognised(raw) => {
                warn!(rpc = operation, raw_service_type = raw, "ignoring unrecognised service kind");
            }
        }
    }

    pub fn engage(&self) {
        self.record(rpc::ENGAGE);
        self.store.set_integration_state(IntegrationState::Av);
        info!(rpc = rpc::ENGAGE, state = %IntegrationState::Av, "driver engaged");
    }

    pub fn disengage(&self) {
        self.record(rpc::DISENGAGE);
        self.store.set_integration_state(IntegrationState::Idle);
        info!(rpc = rpc::DISENGAGE, state = %IntegrationState::Idle, "driver disengaged");
    }

    /// Spawn an independent producer for one stream call. Dropping
    /// `events` cancels the producer within one tick.
    pub fn open_trace_stream(&self) -> TraceSubscription {
        self.record(rpc::STREAM_TRACE);
        let (tx, events) = mpsc::channel(1);
        let mut stream = TraceStream::new(
            self.trace.clone(),
            TraceGenerator::new(self.trace.payload.clone()),
        )
        .with_shutdown(self.shutdown.clone())
        .with_metrics(self.metrics.clone());

        info!(
            rpc = rpc::STREAM_TRACE,
            quota = self.trace.quota,
            interval_ms = self.trace.interval.as_millis() as u64,
            "trace stream opened"
        );
        let task = tokio::spawn(async move {
            let summary = stream.run(tx).await;
            info!(
                rpc = rpc::STREAM_TRACE,
                emitted = summary.emitted,
                reason = %summary.reason,
                "trace stream finished"
            );
            summary
        });
        TraceSubscription { events, task }
    }
}
