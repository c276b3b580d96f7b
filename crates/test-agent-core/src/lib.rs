//! ---
//! ta_section: "01-core-functionality"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Authoritative in-memory state and remote-call dispatch."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
//! State store, call dispatcher, and trace stream producer for the test agent.

pub mod dispatcher;
pub mod state;
pub mod trace;

pub use dispatcher::{rpc, CallDispatcher, ServiceTarget, TraceSubscription};
pub use state::{StateStore, StaticFacts, StoreSnapshot};
pub use test_agent_common::model::{
    IntegrationState, ServiceKind, ServiceRunState, TraceEventType, TraceGroups, TraceSeverity,
};
pub use trace::{
    CloseReason, StreamPhase, StreamSummary, TraceEvent, TraceGenerator, TraceSettings,
    TraceStream,
};
