//! ---
//! ta_section: "05-networking-external-interfaces"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "gRPC surface of the test agent."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
//! Remote-call boundary: protobuf contract, tonic service adapter over the
//! [`test_agent_core::CallDispatcher`], server lifecycle, and client helpers.

pub mod client;
pub mod grpc;

pub use client::{connect, AgentClient};
pub use grpc::{
    proto, resolve_listen, GrpcServerBuilder, GrpcServerHandle, TraceEventStream,
    DEFAULT_MAX_MESSAGE_BYTES,
};
