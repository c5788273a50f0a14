//! Protocol compliance tests for the SotW stream machinery.
//!
//! These exercise a manager plus a live stream driver end to end over
//! channels, the way the transport adapter drives them in production.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use glue_core::{AckObserver, Acknowledgment, Resource, ResourceError, TypeUrl, XdsError, XdsResult};
use glue_wire::envoy::config::core::v3::Node;
use glue_wire::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
use glue_wire::google::rpc::Status;

use crate::drain::DrainController;
use crate::manager::Manager;
use crate::session::UpdateContext;

/// Test resource for protocol testing.
#[derive(Debug, Clone)]
struct TestCluster {
    name: String,
    endpoint: String,
}

impl TestCluster {
    fn new(name: &str) -> glue_core::BoxResource {
        Arc::new(Self {
            name: name.to_string(),
            endpoint: format!("{}.svc:443", name),
        })
    }

    fn with_endpoint(name: &str, endpoint: &str) -> glue_core::BoxResource {
        Arc::new(Self {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

impl Resource for TestCluster {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn validate(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn encode(&self) -> Result<prost_types::Any, ResourceError> {
        Ok(prost_types::Any {
            type_url: TypeUrl::CLUSTER.to_string(),
            value: self.endpoint.as_bytes().to_vec(),
        })
    }

    fn to_json(&self, _emit_defaults: bool) -> Result<serde_json::Value, ResourceError> {
        Ok(serde_json::json!({ "name": self.name, "endpoint": self.endpoint }))
    }
}

struct StreamHarness {
    requests: mpsc::Sender<DiscoveryRequest>,
    responses: mpsc::Receiver<DiscoveryResponse>,
    cancel: CancellationToken,
    drain: DrainController,
    handle: JoinHandle<XdsResult<()>>,
}

impl StreamHarness {
    async fn send(&self, request: DiscoveryRequest) {
        self.requests.send(request).await.expect("driver is alive");
    }

    async fn recv(&mut self) -> DiscoveryResponse {
        tokio::time::timeout(Duration::from_secs(10), self.responses.recv())
            .await
            .expect("timed out waiting for a response")
            .expect("response channel closed")
    }

    async fn expect_silence(&mut self) {
        let got = tokio::time::timeout(Duration::from_millis(250), self.responses.recv()).await;
        assert!(got.is_err(), "expected no response, got {:?}", got);
    }

    async fn finish(self) -> XdsResult<()> {
        drop(self.requests);
        self.handle.await.expect("driver task panicked")
    }
}

fn connect(manager: &Arc<Manager>) -> StreamHarness {
    connect_with_buffer(manager, 8)
}

fn connect_with_buffer(manager: &Arc<Manager>, buffer: usize) -> StreamHarness {
    let (req_tx, req_rx) = mpsc::channel(8);
    let (res_tx, res_rx) = mpsc::channel(buffer);
    let cancel = CancellationToken::new();
    let drain = DrainController::new();
    let handle = tokio::spawn(Arc::clone(manager).stream(
        cancel.clone(),
        drain.signal(),
        req_rx,
        res_tx,
    ));
    StreamHarness {
        requests: req_tx,
        responses: res_rx,
        cancel,
        drain,
        handle,
    }
}

fn subscribe(node: &str, names: &[&str]) -> DiscoveryRequest {
    DiscoveryRequest {
        version_info: String::new(),
        node: Some(Node {
            id: node.to_string(),
            ..Default::default()
        }),
        resource_names: names.iter().map(|s| s.to_string()).collect(),
        type_url: TypeUrl::CLUSTER.to_string(),
        response_nonce: String::new(),
        error_detail: None,
    }
}

fn ack(node: &str, names: &[&str], nonce: &str, version: &str) -> DiscoveryRequest {
    DiscoveryRequest {
        version_info: version.to_string(),
        response_nonce: nonce.to_string(),
        ..subscribe(node, names)
    }
}

fn nack(node: &str, names: &[&str], nonce: &str, version: &str, message: &str) -> DiscoveryRequest {
    DiscoveryRequest {
        error_detail: Some(Status {
            code: 3,
            message: message.to_string(),
            details: vec![],
        }),
        ..ack(node, names, nonce, version)
    }
}

fn observed_manager() -> (Arc<Manager>, mpsc::UnboundedReceiver<Acknowledgment>) {
    let (ack_tx, ack_rx) = mpsc::unbounded_channel();
    let observer: AckObserver = Arc::new(move |event| {
        let _ = ack_tx.send(event);
    });
    let manager = Arc::new(
        Manager::new("clusters", "v", TypeUrl::CLUSTER).with_ack_observer(observer),
    );
    (manager, ack_rx)
}

fn assert_nonce_format(nonce: &str, version: &str) {
    let suffix = nonce
        .strip_prefix(&format!("nonce-{}-", version))
        .unwrap_or_else(|| panic!("nonce {:?} does not carry version {:?}", nonce, version));
    assert_eq!(suffix.len(), 8);
    assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
}

// ============================================================================
// Concrete protocol scenarios
// ============================================================================

/// Cold start with a single wildcard client.
#[tokio::test]
async fn cold_start_wildcard_client() {
    let (manager, mut acks) = observed_manager();
    let ctx = UpdateContext::new();
    manager
        .add(&ctx, vec![TestCluster::new("a"), TestCluster::new("b")])
        .await
        .unwrap();

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &[])).await;

    let response = stream.recv().await;
    assert_eq!(response.version_info, "v1");
    assert_eq!(response.type_url, TypeUrl::CLUSTER);
    assert_eq!(response.resources.len(), 2);
    assert_nonce_format(&response.nonce, "v1");

    stream.send(ack("n1", &[], &response.nonce, "v1")).await;

    let event = acks.recv().await.unwrap();
    assert_eq!(
        event,
        Acknowledgment {
            node: "n1".to_string(),
            version: "v1".to_string(),
            ack: true,
        }
    );
}

/// A NACK is recorded and observed; the stream stays open.
#[tokio::test]
async fn nack_keeps_stream_open() {
    let (manager, mut acks) = observed_manager();
    let ctx = UpdateContext::new();
    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &[])).await;
    let first = stream.recv().await;
    stream.send(ack("n1", &[], &first.nonce, "v1")).await;
    let _ = acks.recv().await.unwrap();

    manager
        .replace(&ctx, vec![TestCluster::with_endpoint("a", "a.svc:8443")])
        .await
        .unwrap();
    let second = stream.recv().await;
    assert_eq!(second.version_info, "v2");

    stream
        .send(nack("n1", &[], &second.nonce, "v1", "bad"))
        .await;
    let event = acks.recv().await.unwrap();
    assert_eq!(
        event,
        Acknowledgment {
            node: "n1".to_string(),
            version: "v1".to_string(),
            ack: false,
        }
    );

    // Stream remains open: the next change is still pushed.
    manager.add(&ctx, vec![TestCluster::new("c")]).await.unwrap();
    let third = stream.recv().await;
    assert_eq!(third.version_info, "v3");
}

/// Rapid mutations against a stalled consumer coalesce in the single
/// notification slot; the eventual snapshot reflects the final state.
#[tokio::test(start_paused = true)]
async fn coalescing_under_slow_consumer() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));
    let (_id, mut rx) = manager.register_session().await;

    let ctx = UpdateContext::new().with_timeout(Duration::from_millis(20));
    for i in 0..10 {
        let result = manager
            .add(&ctx, vec![TestCluster::new(&format!("c{}", i))])
            .await;
        if i == 0 {
            result.expect("first notification lands in the empty slot");
        } else {
            let err = result.expect_err("slot is full and the consumer is stalled");
            assert!(matches!(err, XdsError::NotificationTimeout { .. }));
        }
    }

    // Exactly one pending notification is buffered.
    let _pending = rx.try_recv().expect("one notification pending");
    assert!(rx.try_recv().is_err(), "no further notifications buffered");

    // Consuming it triggers a rebuild against the final store.
    let built = manager.build_discovery_response(&[]).await.unwrap();
    assert_eq!(built.response.version_info, "v10");
    assert_eq!(built.names.len(), 10);
}

/// SotW does not allow changing the subscription on an open stream.
#[tokio::test]
async fn subscription_change_is_rejected() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));
    let ctx = UpdateContext::new();
    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &["a"])).await;
    let response = stream.recv().await;
    assert_eq!(response.resources.len(), 1);

    stream.send(ack("n1", &["a", "b"], &response.nonce, "v1")).await;

    let err = stream
        .handle
        .await
        .expect("driver task panicked")
        .unwrap_err();
    assert!(matches!(err, XdsError::SubscriptionChanged));
    assert!(
        stream.responses.recv().await.is_none(),
        "no response follows the rejected request"
    );
    assert_eq!(manager.session_count().await, 0, "session cleaned up");
}

/// Reordering the same subscription set is not a change.
#[tokio::test]
async fn subscription_reorder_is_tolerated() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));
    let ctx = UpdateContext::new();
    manager
        .add(&ctx, vec![TestCluster::new("a"), TestCluster::new("b")])
        .await
        .unwrap();

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &["a", "b"])).await;
    let response = stream.recv().await;

    stream.send(ack("n1", &["b", "a"], &response.nonce, "v1")).await;

    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();
    let next = stream.recv().await;
    assert_eq!(next.version_info, "v2");
}

/// A subscribed name that does not exist yet is omitted, not an error.
#[tokio::test]
async fn missing_resource_is_tolerated() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));
    let ctx = UpdateContext::new();
    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &["a", "b"])).await;

    let response = stream.recv().await;
    assert_eq!(response.version_info, "v1");
    assert_eq!(response.resources.len(), 1, "only the known resource");

    manager.add(&ctx, vec![TestCluster::new("b")]).await.unwrap();
    let response = stream.recv().await;
    assert_eq!(response.version_info, "v2");
    assert_eq!(response.resources.len(), 2);
}

/// An unacknowledged transaction is retired by the cleanup tick; the
/// stream keeps working and a late ack with that nonce becomes a re-push.
#[tokio::test(start_paused = true)]
async fn stale_transaction_is_cleaned_up() {
    let (manager, mut acks) = observed_manager();
    let ctx = UpdateContext::new();
    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &[])).await;
    let response = stream.recv().await;
    let stale_nonce = response.nonce.clone();

    // Two cleanup intervals: the first tick sees the transaction at
    // exactly its TTL, the second retires it.
    tokio::time::sleep(Duration::from_secs(150)).await;

    stream.send(ack("n1", &[], &stale_nonce, "v1")).await;

    // Not an acknowledgement anymore: the driver resends instead.
    let repush = stream.recv().await;
    assert_eq!(repush.version_info, "v1");
    assert_ne!(repush.nonce, stale_nonce);
    assert!(acks.try_recv().is_err(), "no ack event for a retired nonce");
}

// ============================================================================
// Boundary behaviors
// ============================================================================

#[tokio::test]
async fn wrong_type_terminates_stream() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));

    let mut stream = connect(&manager);
    let mut request = subscribe("n1", &[]);
    request.type_url = TypeUrl::LISTENER.to_string();
    stream.send(request).await;

    let err = stream.finish().await.unwrap_err();
    assert!(matches!(err, XdsError::WrongType { .. }));
}

#[tokio::test]
async fn unknown_nonce_triggers_fresh_push() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));
    let ctx = UpdateContext::new();
    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &[])).await;
    let first = stream.recv().await;

    stream
        .send(ack("n1", &[], "nonce-v0-zzzzzzzz", "v0"))
        .await;
    let resent = stream.recv().await;
    assert_eq!(resent.version_info, first.version_info);
    assert_ne!(resent.nonce, first.nonce);
}

#[tokio::test]
async fn specific_subscription_ignores_unrelated_changes() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));
    let ctx = UpdateContext::new();
    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &["a"])).await;
    let _ = stream.recv().await;

    manager
        .add(&ctx, vec![TestCluster::new("unrelated")])
        .await
        .unwrap();
    stream.expect_silence().await;

    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();
    let response = stream.recv().await;
    assert_eq!(response.version_info, "v3");
}

/// A push that misses its enqueue deadline is discarded; the stream
/// recovers on the next notification.
#[tokio::test(start_paused = true)]
async fn push_timeout_discards_transaction() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));
    let ctx = UpdateContext::new();
    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();

    // Outbound buffer of one: the initial response fills it.
    let mut stream = connect_with_buffer(&manager, 1);
    stream.send(subscribe("n1", &[])).await;

    // Give the driver time to enqueue the initial response, then stall.
    tokio::time::sleep(Duration::from_millis(10)).await;
    manager.add(&ctx, vec![TestCluster::new("b")]).await.unwrap();

    // The blocked push times out after five seconds of paused time.
    tokio::time::sleep(Duration::from_secs(6)).await;

    let first = stream.recv().await;
    assert_eq!(first.version_info, "v1");

    // The driver is still live and pushes the next change.
    manager.add(&ctx, vec![TestCluster::new("c")]).await.unwrap();
    let next = stream.recv().await;
    assert_eq!(next.version_info, "v3");
}

#[tokio::test]
async fn drain_terminates_every_stream() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &[])).await;
    let _ = stream.recv().await;

    stream.drain.drain();
    let err = stream.handle.await.expect("driver task panicked").unwrap_err();
    assert!(matches!(err, XdsError::Draining));
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn cancellation_terminates_stream() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));

    let stream = connect(&manager);
    stream.cancel.cancel();
    let err = stream.handle.await.expect("driver task panicked").unwrap_err();
    assert!(matches!(err, XdsError::StreamClosed { .. }));
}

#[tokio::test]
async fn closed_request_channel_terminates_stream() {
    let manager = Arc::new(Manager::new("clusters", "v", TypeUrl::CLUSTER));

    let stream = connect(&manager);
    let err = stream.finish().await.unwrap_err();
    assert!(matches!(err, XdsError::StreamClosed { .. }));
}

/// Ack with a different in-use version still counts as an ACK; the
/// mismatch is only warned about.
#[tokio::test]
async fn ack_with_mismatched_version_still_acks() {
    let (manager, mut acks) = observed_manager();
    let ctx = UpdateContext::new();
    manager.add(&ctx, vec![TestCluster::new("a")]).await.unwrap();

    let mut stream = connect(&manager);
    stream.send(subscribe("n1", &[])).await;
    let response = stream.recv().await;

    stream.send(ack("n1", &[], &response.nonce, "v0")).await;

    let event = acks.recv().await.unwrap();
    assert!(event.ack);
    assert_eq!(event.version, "v0", "observer sees the client's version");
}
