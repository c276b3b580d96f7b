//! ---
//! ta_section: "05-networking-external-interfaces"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "gRPC surface of the test agent."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::Context;
use tonic::transport::{Channel, Endpoint};

use crate::grpc::proto::test_agent_service_client::TestAgentServiceClient;
use crate::grpc::DEFAULT_MAX_MESSAGE_BYTES;

/// Generated client bound to a plaintext channel.
pub type AgentClient = TestAgentServiceClient<Channel>;

/// Open a plaintext channel to `host:port` and wrap it in the generated client.
pub async fn connect(host: &str, port: u16) -> anyhow::Result<AgentClient> {
    let uri = format!("http://{host}:{port}");
    let channel = Endpoint::from_shared(uri.clone())
        .with_context(|| format!("invalid server uri {uri}"))?
        .connect_timeout(Duration::from_secs(5))
        .connect()
        .await
        .with_context(|| format!("unable to connect to {uri}"))?;
    Ok(TestAgentServiceClient::new(channel)
        .max_decoding_message_size(DEFAULT_MAX_MESSAGE_BYTES)
        .max_encoding_message_size(DEFAULT_MAX_MESSAGE_BYTES))
}
