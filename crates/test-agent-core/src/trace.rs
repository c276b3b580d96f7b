//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Trace event generation and paced stream emission."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
//! Trace event generation and the paced, quota-bounded emission loop behind
//! the streaming call.

use std::fmt;
use std::time::Duration;

use rand::prelude::*;
use test_agent_common::config::TraceConfig;
use test_agent_common::model::{TraceEventType, TraceGroups, TraceSeverity};
use test_agent_common::time::unix_nanos_now;
use test_agent_metrics::DispatchMetrics;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Ephemeral diagnostic record. Never stored; discarded once transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub timestamp_ns: u64,
    pub groups: TraceGroups,
    pub severity: TraceSeverity,
    pub event_type: TraceEventType,
    pub payload: Vec<u8>,
}

/// Pacing, quota, and payload for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSettings {
    pub quota: u32,
    pub interval: Duration,
    pub payload: String,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self::from(&TraceConfig::default())
    }
}

impl From<&TraceConfig> for TraceSettings {
    fn from(config: &TraceConfig) -> Self {
        Self {
            quota: config.quota.max(1),
            interval: config.interval,
            payload: config.payload.clone(),
        }
    }
}

/// Builds trace events with pseudo-random tags.
#[derive(Debug)]
pub struct TraceGenerator {
    rng: StdRng,
    payload: Vec<u8>,
    last_timestamp_ns: u64,
}

impl TraceGenerator {
    pub fn new(payload: impl Into<String>) -> Self {
        Self::with_rng(payload, StdRng::from_entropy())
    }

    pub fn seeded(payload: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(payload, StdRng::seed_from_u64(seed))
    }

    fn with_rng(payload: impl Into<String>, rng: StdRng) -> Self {
        Self {
            rng,
            payload: payload.into().into_bytes(),
            last_timestamp_ns: 0,
        }
    }

    /// Timestamps never go backwards even if the wall clock does.
    pub fn next_event(&mut self) -> TraceEvent {
        let timestamp_ns = unix_nanos_now().max(self.last_timestamp_ns);
        self.last_timestamp_ns = timestamp_ns;
        TraceEvent {
            timestamp_ns,
            groups: TraceGroups::SINGLE[self.rng.gen_range(0..TraceGroups::SINGLE.len())],
            severity: TraceSeverity::EMITTED[self.rng.gen_range(0..TraceSeverity::EMITTED.len())],
            event_type: TraceEventType::EMITTED
                [self.rng.gen_range(0..TraceEventType::EMITTED.len())],
            payload: self.payload.clone(),
        }
    }
}

/// Lifecycle of a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Emitting,
    Closed,
}

/// Why a stream stopped emitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    QuotaReached,
    /// The caller went away between sends.
    Cancelled,
    /// The transport rejected an event.
    SendFailed,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::QuotaReached => "quota_reached",
            CloseReason::Cancelled => "cancelled",
            CloseReason::SendFailed => "send_failed",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// Events accepted by the stream channel; the last one may still be
    /// buffered when the transport drops it.
    pub emitted: u32,
    pub reason: CloseReason,
}

/// Producer side of one trace stream. Each call gets its own instance, so
/// quota and cancellation state are never shared between streams.
#[derive(Debug)]
pub struct TraceStream {
    settings: TraceSettings,
    generator: TraceGenerator,
    shutdown: CancellationToken,
    metrics: Option<DispatchMetrics>,
    phase: StreamPhase,
    emitted: u32,
}

impl TraceStream {
    pub fn new(settings: TraceSettings, generator: TraceGenerator) -> Self {
        Self {
            settings,
            generator,
            shutdown: CancellationToken::new(),
            metrics: None,
            phase: StreamPhase::Idle,
            emitted: 0,
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_metrics(mut self, metrics: Option<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Emit events into `tx` until the quota is met, the receiver is dropped,
    /// or shutdown is signalled. Cancellation is polled once per tick, both
    /// before building an event and while waiting out the pacing delay.
    pub async fn run(&mut self, tx: mpsc::Sender<TraceEvent>) -> StreamSummary {
        if let Some(metrics) = &self.metrics {
            metrics.stream_opened();
        }

        let reason = loop {
            if self.shutdown.is_cancelled() {
                break CloseReason::Shutdown;
            }
            if tx.is_closed() {
                break CloseReason::Cancelled;
            }

            let event = self.generator.next_event();
            let sent = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break CloseReason::Shutdown,
                result = tx.send(event) => result.is_ok(),
            };
            if !sent {
                break CloseReason::SendFailed;
            }

            self.phase = StreamPhase::Emitting;
            self.emitted += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_trace_event();
            }
            if self.emitted >= self.settings.quota {
                break CloseReason::QuotaReached;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = tx.closed() => break CloseReason::Cancelled,
                _ = self.shutdown.cancelled() => break CloseReason::Shutdown,
            }
        };

        self.phase = StreamPhase::Closed;
        if let Some(metrics) = &self.metrics {
            metrics.stream_closed(reason.as_str());
        }
        debug!(emitted = self.emitted, %reason, "trace stream closed");
        StreamSummary {
            emitted: self.emitted,
            reason,
        }
    }
}
