//! ---
//! ta_section: "05-networking-external-interfaces"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "gRPC surface of the test agent."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::pin::Pin;

use anyhow::{anyhow, Context};
use test_agent_core::{
    CallDispatcher, IntegrationState, ServiceKind, ServiceRunState, ServiceTarget, TraceEvent,
    TraceEventType, TraceSeverity,
};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

#[allow(missing_docs)]
pub mod proto {
    tonic::include_proto!("test_agent.v1");
}

use proto::test_agent_service_server::{TestAgentService, TestAgentServiceServer};
use proto::Empty;

/// Default cap applied to inbound and outbound messages.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Resolve a `host:port` endpoint, preferring IPv4 when the name has both.
pub async fn resolve_listen(endpoint: &str) -> anyhow::Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(endpoint)
        .await
        .with_context(|| format!("unable to resolve listen address {endpoint}"))?
        .collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| anyhow!("listen address {endpoint} resolved to nothing"))
}

/// Configures and spawns the gRPC server.
#[derive(Clone)]
pub struct GrpcServerBuilder {
    listen: SocketAddr,
    dispatcher: CallDispatcher,
    max_message_bytes: usize,
}

impl GrpcServerBuilder {
    pub fn new(listen: SocketAddr, dispatcher: CallDispatcher) -> Self {
        Self {
            listen,
            dispatcher,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    pub fn max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    /// Spawn the gRPC server and return a handle for coordinated shutdown.
    pub async fn spawn(self) -> anyhow::Result<GrpcServerHandle> {
        let listener = tokio::net::TcpListener::bind(self.listen)
            .await
            .with_context(|| format!("failed to bind grpc listener {}", self.listen))?;
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, "grpc api listening");

        // Cancelling this token both stops accepting calls and closes open trace streams.
        let shutdown = CancellationToken::new();
        let service = TestAgentSvc {
            dispatcher: self.dispatcher.with_shutdown(shutdown.clone()),
        };
        let server = TestAgentServiceServer::new(service)
            .max_decoding_message_size(self.max_message_bytes)
            .max_encoding_message_size(self.max_message_bytes);

        let incoming = TcpIncoming::from_listener(listener, true, None)
            .map_err(|err| anyhow!("failed to build grpc incoming listener: {err}"))?;
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let result = Server::builder()
                .add_service(server)
                .serve_with_incoming_shutdown(incoming, async move {
                    signal.cancelled().await;
                })
                .await;
            if let Err(err) = result {
                warn!(error = %err, "grpc server exited with error");
            }
        });

        Ok(GrpcServerHandle {
            address: local_addr,
            shutdown,
            task,
        })
    }
}

/// Handle returned when spawning the gRPC server.
pub struct GrpcServerHandle {
    address: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl GrpcServerHandle {
    /// Socket address the server bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown.cancel();
        match self.task.await {
            Ok(()) => Ok(()),
            Err(err) => Err(anyhow!(err)),
        }
    }
}

/// Boxed server-streaming body for `StreamTrace`.
pub type TraceEventStream =
    Pin<Box<dyn Stream<Item = Result<proto::TraceEvent, Status>> + Send + 'static>>;

struct TestAgentSvc {
    dispatcher: CallDispatcher,
}

#[tonic::async_trait]
impl TestAgentService for TestAgentSvc {
    async fn query_mock_mode(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<proto::Boolean>, Status> {
        Ok(Response::new(proto::Boolean {
            value: self.dispatcher.query_mock_mode(),
        }))
    }

    async fn query_version(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<proto::VersionResponse>, Status> {
        Ok(Response::new(proto::VersionResponse {
            version: self.dispatcher.query_version(),
        }))
    }

    async fn query_integration_status(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<proto::IntegrationStatusResponse>, Status> {
        let state = proto::IntegrationState::from(self.dispatcher.query_integration_status());
        Ok(Response::new(proto::IntegrationStatusResponse {
            state: state as i32,
        }))
    }

    async fn query_model_id(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<proto::ModelIdResponse>, Status> {
        Ok(Response::new(proto::ModelIdResponse {
            model_id: self.dispatcher.query_model_id(),
        }))
    }

    async fn query_service_status(
        &self,
        request: Request<proto::ServiceTypeRequest>,
    ) -> Result<Response<proto::ServiceStatusResponse>, Status> {
        let target = ServiceTarget::from(request.get_ref());
        let state = proto::ServiceState::from(self.dispatcher.query_service_status(target));
        Ok(Response::new(proto::ServiceStatusResponse {
            state: state as i32,
        }))
    }

    async fn start_service(
        &self,
        request: Request<proto::ServiceTypeRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.dispatcher
            .start_service(ServiceTarget::from(request.get_ref()));
        Ok(Response::new(Empty {}))
    }

    async fn stop_service(
        &self,
        request: Request<proto::ServiceTypeRequest>,
    ) -> Result<Response<Empty>, Status> {
        self.dispatcher
            .stop_service(ServiceTarget::from(request.get_ref()));
        Ok(Response::new(Empty {}))
    }

    async fn engage(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.dispatcher.engage();
        Ok(Response::new(Empty {}))
    }

    async fn disengage(&self, _request: Request<Empty>) -> Result<Response<Empty>, Status> {
        self.dispatcher.disengage();
        Ok(Response::new(Empty {}))
    }

    type StreamTraceStream = TraceEventStream;

    async fn stream_trace(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<Self::StreamTraceStream>, Status> {
        if let Some(peer) = request.remote_addr() {
            info!(%peer, "trace stream requested");
        }
        // The producer task is detached; dropping the response body drops the
        // receiver, which the producer observes as cancellation.
        let subscription = self.dispatcher.open_trace_stream();
        let stream = ReceiverStream::new(subscription.events)
            .map(|event| Ok(proto::TraceEvent::from(event)));
        Ok(Response::new(Box::pin(stream) as Self::StreamTraceStream))
    }
}

/// Values outside `ServiceType` stay distinct instead of folding into `Unknown`.
impl From<&proto::ServiceTypeRequest> for ServiceTarget {
    fn from(request: &proto::ServiceTypeRequest) -> Self {
        match proto::ServiceType::try_from(request.service_type) {
            Ok(kind) => ServiceTarget::Known(ServiceKind::from(kind)),
            Err(_) => ServiceTarget::Unrecognised(request.service_type),
        }
    }
}

impl From<proto::ServiceType> for ServiceKind {
    fn from(value: proto::ServiceType) -> Self {
        match value {
            proto::ServiceType::Unknown => ServiceKind::Unknown,
            proto::ServiceType::Trajectory => ServiceKind::Trajectory,
            proto::ServiceType::Navigation => ServiceKind::Navigation,
            proto::ServiceType::Inference => ServiceKind::Inference,
        }
    }
}

impl From<ServiceKind> for proto::ServiceType {
    fn from(value: ServiceKind) -> Self {
        match value {
            ServiceKind::Unknown => proto::ServiceType::Unknown,
            ServiceKind::Trajectory => proto::ServiceType::Trajectory,
            ServiceKind::Navigation => proto::ServiceType::Navigation,
            ServiceKind::Inference => proto::ServiceType::Inference,
        }
    }
}

impl From<ServiceRunState> for proto::ServiceState {
    fn from(value: ServiceRunState) -> Self {
        match value {
            ServiceRunState::Unknown => proto::ServiceState::Unknown,
            ServiceRunState::Initializing => proto::ServiceState::Initializing,
            ServiceRunState::Running => proto::ServiceState::Running,
            ServiceRunState::Stopped => proto::ServiceState::Stopped,
            ServiceRunState::Error => proto::ServiceState::Error,
        }
    }
}

impl From<proto::ServiceState> for ServiceRunState {
    fn from(value: proto::ServiceState) -> Self {
        match value {
            proto::ServiceState::Unknown => ServiceRunState::Unknown,
            proto::ServiceState::Initializing => ServiceRunState::Initializing,
            proto::ServiceState::Running => ServiceRunState::Running,
            proto::ServiceState::Stopped => ServiceRunState::Stopped,
            proto::ServiceState::Error => ServiceRunState::Error,
        }
    }
}

impl From<IntegrationState> for proto::IntegrationState {
    fn from(value: IntegrationState) -> Self {
        match value {
            IntegrationState::Unknown => proto::IntegrationState::Unknown,
            IntegrationState::Initializing => proto::IntegrationState::Initializing,
            IntegrationState::Idle => proto::IntegrationState::Idle,
            IntegrationState::AvLimited => proto::IntegrationState::AvLimited,
            IntegrationState::Av => proto::IntegrationState::Av,
            IntegrationState::Manual => proto::IntegrationState::Manual,
            IntegrationState::RemoteControl => proto::IntegrationState::RemoteControl,
            IntegrationState::Error => proto::IntegrationState::Error,
            IntegrationState::Shutdown => proto::IntegrationState::Shutdown,
        }
    }
}

impl From<proto::IntegrationState> for IntegrationState {
    fn from(value: proto::IntegrationState) -> Self {
        match value {
            proto::IntegrationState::Unknown => IntegrationState::Unknown,
            proto::IntegrationState::Initializing => IntegrationState::Initializing,
            proto::IntegrationState::Idle => IntegrationState::Idle,
            proto::IntegrationState::AvLimited => IntegrationState::AvLimited,
            proto::IntegrationState::Av => IntegrationState::Av,
            proto::IntegrationState::Manual => IntegrationState::Manual,
            proto::IntegrationState::RemoteControl => IntegrationState::RemoteControl,
            proto::IntegrationState::Error => IntegrationState::Error,
            proto::IntegrationState::Shutdown => IntegrationState::Shutdown,
        }
    }
}

impl From<TraceSeverity> for proto::TraceSeverity {
    fn from(value: TraceSeverity) -> Self {
        match value {
            TraceSeverity::Unknown => proto::TraceSeverity::Unknown,
            TraceSeverity::Debug => proto::TraceSeverity::Debug,
            TraceSeverity::Info => proto::TraceSeverity::Info,
            TraceSeverity::Error => proto::TraceSeverity::Error,
        }
    }
}

impl From<proto::TraceSeverity> for TraceSeverity {
    fn from(value: proto::TraceSeverity) -> Self {
        match value {
            proto::TraceSeverity::Unknown => TraceSeverity::Unknown,
            proto::TraceSeverity::Debug => TraceSeverity::Debug,
            proto::TraceSeverity::Info => TraceSeverity::Info,
            proto::TraceSeverity::Error => TraceSeverity::Error,
        }
    }
}

impl From<TraceEventType> for proto::TraceEventType {
    fn from(value: TraceEventType) -> Self {
        match value {
            TraceEventType::Unknown => proto::TraceEventType::Unknown,
            TraceEventType::FunctionCall => proto::TraceEventType::FunctionCall,
            TraceEventType::LogMessage => proto::TraceEventType::LogMessage,
        }
    }
}

impl From<proto::TraceEventType> for TraceEventType {
    fn from(value: proto::TraceEventType) -> Self {
        match value {
            proto::TraceEventType::Unknown => TraceEventType::Unknown,
            proto::TraceEventType::FunctionCall => TraceEventType::FunctionCall,
            proto::TraceEventType::LogMessage => TraceEventType::LogMessage,
        }
    }
}

impl From<TraceEvent> for proto::TraceEvent {
    fn from(event: TraceEvent) -> Self {
        Self {
            timestamp_ns: event.timestamp_ns,
            groups_mask: event.groups.bits(),
            severity: proto::TraceSeverity::from(event.severity) as i32,
            event_type: proto::TraceEventType::from(event.event_type) as i32,
            message: event.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use strum::IntoEnumIterator;
    use test_agent_core::{StateStore, TraceGroups, TraceSettings};
    use test_agent_metrics::{new_registry, DispatchMetrics};
    use tonic::transport::Channel;

    use proto::test_agent_service_client::TestAgentServiceClient;

    fn dispatcher(interval: Duration) -> CallDispatcher {
        CallDispatcher::new(
            Arc::new(StateStore::default()),
            TraceSettings {
                quota: 10,
                interval,
                payload: "grpc-sample".into(),
            },
        )
    }

    async fn connect(handle: &GrpcServerHandle) -> TestAgentServiceClient<Channel> {
        let channel = Channel::from_shared(format!("http://{}", handle.local_addr()))
            .unwrap()
            .connect()
            .await
            .unwrap();
        TestAgentServiceClient::new(channel)
    }

    #[test]
    fn kind_conversion_is_total_in_both_directions() {
        for kind in ServiceKind::iter() {
            assert_eq!(ServiceKind::from(proto::ServiceType::from(kind)), kind);
        }
        for state in IntegrationState::iter() {
            assert_eq!(
                IntegrationState::from(proto::IntegrationState::from(state)),
                state
            );
        }
    }

    #[test]
    fn trace_event_maps_mask_and_tags() {
        let wire = proto::TraceEvent::from(TraceEvent {
            timestamp_ns: 42,
            groups: TraceGroups::SAFETY_CRITICAL,
            severity: TraceSeverity::Error,
            event_type: TraceEventType::LogMessage,
            payload: b"hello".to_vec(),
        });
        assert_eq!(wire.timestamp_ns, 42);
        assert_eq!(wire.groups_mask, 8);
        assert_eq!(wire.severity(), proto::TraceSeverity::Error);
        assert_eq!(wire.event_type(), proto::TraceEventType::LogMessage);
        assert_eq!(wire.message, b"hello");
    }

    #[tokio::test]
    async fn resolves_localhost() {
        let addr = resolve_listen("localhost:0").await.unwrap();
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn grpc_point_operations_flow() {
        let handle = GrpcServerBuilder::new(
            "127.0.0.1:0".parse().unwrap(),
            dispatcher(Duration::from_millis(5)),
        )
        .spawn()
        .await
        .unwrap();
        let mut client = connect(&handle).await;

        let mock = client.query_mock_mode(Empty {}).await.unwrap().into_inner();
        assert!(mock.value);
        let version = client.query_version(Empty {}).await.unwrap().into_inner();
        assert_eq!(version.version, "0.1.0-mock");
        let model = client.query_model_id(Empty {}).await.unwrap().into_inner();
        assert_eq!(model.model_id, "test-model-123");

        let request = proto::ServiceTypeRequest {
            service_type: proto::ServiceType::Navigation as i32,
        };
        let status = client
            .query_service_status(request.clone())
            .await
            .unwrap()
            .into_inner();
        assert_eq!(status.state(), proto::ServiceState::Unknown);

        client.start_service(request.clone()).await.unwrap();
        let status = client
            .query_service_status(request.clone())
            .await
            .unwrap()
            .into_inner();
        assert_eq!(status.state(), proto::ServiceState::Running);

        client.stop_service(request.clone()).await.unwrap();
        let status = client
            .query_service_status(request)
            .await
            .unwrap()
            .into_inner();
        assert_eq!(status.state(), proto::ServiceState::Stopped);

        client.engage(Empty {}).await.unwrap();
        let integration = client
            .query_integration_status(Empty {})
            .await
            .unwrap()
            .into_inner();
        assert_eq!(integration.state(), proto::IntegrationState::Av);
        client.disengage(Empty {}).await.unwrap();
        let integration = client
            .query_integration_status(Empty {})
            .await
            .unwrap()
            .into_inner();
        assert_eq!(integration.state(), proto::IntegrationState::Idle);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn out_of_range_service_type_is_isolated() {
        let handle = GrpcServerBuilder::new(
            "127.0.0.1:0".parse().unwrap(),
            dispatcher(Duration::from_millis(5)),
        )
        .spawn()
        .await
        .unwrap();
        let mut client = connect(&handle).await;

        client
            .start_service(proto::ServiceTypeRequest { service_type: 99 })
            .await
            .unwrap();
        for service_type in [99, 98, 0] {
            let status = client
                .query_service_status(proto::ServiceTypeRequest { service_type })
                .await
                .unwrap()
                .into_inner();
            assert_eq!(
                status.state(),
                proto::ServiceState::Unknown,
                "service_type {service_type}"
            );
        }

        handle.shutdown().await.unwrap();
    }

    #[test]
    fn request_decoding_keeps_unrecognised_values() {
        let decode = |service_type| ServiceTarget::from(&proto::ServiceTypeRequest { service_type });
        assert_eq!(decode(0), ServiceTarget::Known(ServiceKind::Unknown));
        assert_eq!(decode(2), ServiceTarget::Known(ServiceKind::Navigation));
        assert_eq!(decode(99), ServiceTarget::Unrecognised(99));
        assert_eq!(decode(-4), ServiceTarget::Unrecognised(-4));
    }

    #[tokio::test]
    async fn grpc_trace_stream_delivers_quota() {
        let handle = GrpcServerBuilder::new(
            "127.0.0.1:0".parse().unwrap(),
            dispatcher(Duration::from_millis(5)),
        )
        .spawn()
        .await
        .unwrap();
        let mut client = connect(&handle).await;

        let mut stream = client.stream_trace(Empty {}).await.unwrap().into_inner();
        let mut events = Vec::new();
        while let Some(event) = stream.message().await.unwrap() {
            events.push(event);
        }
        assert_eq!(events.len(), 10);
        let mut previous = 0;
        for event in &events {
            assert!([1, 2, 4, 8].contains(&event.groups_mask));
            assert_ne!(event.severity(), proto::TraceSeverity::Unknown);
            assert_ne!(event.event_type(), proto::TraceEventType::Unknown);
            assert_eq!(event.message, b"grpc-sample");
            assert!(event.timestamp_ns >= previous);
            previous = event.timestamp_ns;
        }

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_producer() {
        let metrics = DispatchMetrics::new(new_registry()).unwrap();
        let handle = GrpcServerBuilder::new(
            "127.0.0.1:0".parse().unwrap(),
            dispatcher(Duration::from_millis(100)).with_metrics(metrics.clone()),
        )
        .spawn()
        .await
        .unwrap();
        let mut client = connect(&handle).await;

        let mut stream = client.stream_trace(Empty {}).await.unwrap().into_inner();
        assert!(stream.message().await.unwrap().is_some());
        drop(stream);

        let mut closed = false;
        for _ in 0..50 {
            if metrics.active_streams() == 0 {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(closed, "producer still running after caller dropped the stream");
        assert!(metrics.trace_events() < 10);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_closes_open_streams() {
        let handle = GrpcServerBuilder::new(
            "127.0.0.1:0".parse().unwrap(),
            dispatcher(Duration::from_secs(30)),
        )
        .spawn()
        .await
        .unwrap();
        let mut client = connect(&handle).await;
        let mut stream = client.stream_trace(Empty {}).await.unwrap().into_inner();
        assert!(stream.message().await.unwrap().is_some());

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("shutdown should not wait for the pacing delay")
            .unwrap();
    }
}
