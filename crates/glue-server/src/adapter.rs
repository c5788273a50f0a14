//! Bridge between a bidirectional message transport and the stream driver.
//!
//! The adapter runs three concurrent pieces: a receive pump forwarding
//! inbound requests (closing the request channel on receive error), a send
//! pump draining the response channel, and the driver itself. The adapter
//! completes when the driver returns; closing the response channel then
//! lets the send pump exit.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::{Status, Streaming};
use tracing::{debug, warn};

use glue_core::XdsResult;
use glue_manager::{DrainSignal, Manager, StreamConfig};
use glue_wire::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};

/// Buffer between the receive pump and the driver.
const REQUEST_BUFFER: usize = 16;

/// Buffer between the driver and the send pump. The driver's push deadline
/// bounds how long a full buffer can stall a push.
const RESPONSE_BUFFER: usize = 16;

/// Inbound half of a discovery transport.
#[async_trait]
pub trait RequestStream: Send + 'static {
    /// Receive the next request. `Ok(None)` means the client closed the
    /// stream cleanly.
    async fn recv(&mut self) -> Result<Option<DiscoveryRequest>, Status>;
}

/// Outbound half of a discovery transport.
#[async_trait]
pub trait ResponseSink: Send + 'static {
    /// Write one response to the client.
    async fn send(&mut self, response: DiscoveryResponse) -> Result<(), Status>;
}

#[async_trait]
impl RequestStream for Streaming<DiscoveryRequest> {
    async fn recv(&mut self) -> Result<Option<DiscoveryRequest>, Status> {
        self.message().await
    }
}

/// The tonic outbound idiom: responses are written into the channel that
/// backs the server-streaming response.
#[async_trait]
impl ResponseSink for mpsc::Sender<Result<DiscoveryResponse, Status>> {
    async fn send(&mut self, response: DiscoveryResponse) -> Result<(), Status> {
        mpsc::Sender::send(self, Ok(response))
            .await
            .map_err(|_| Status::unavailable("response channel closed"))
    }
}

/// Run a discovery stream over the given transport halves with the default
/// [`StreamConfig`].
pub async fn run_discovery_stream<I, O>(
    manager: Arc<Manager>,
    inbound: I,
    outbound: O,
    cancel: CancellationToken,
    drain: DrainSignal,
) -> XdsResult<()>
where
    I: RequestStream,
    O: ResponseSink,
{
    run_discovery_stream_with_config(manager, StreamConfig::default(), inbound, outbound, cancel, drain)
        .await
}

/// Run a discovery stream with an explicit driver configuration.
pub async fn run_discovery_stream_with_config<I, O>(
    manager: Arc<Manager>,
    config: StreamConfig,
    inbound: I,
    outbound: O,
    cancel: CancellationToken,
    drain: DrainSignal,
) -> XdsResult<()>
where
    I: RequestStream,
    O: ResponseSink,
{
    let (req_tx, req_rx) = mpsc::channel(REQUEST_BUFFER);
    let (res_tx, res_rx) = mpsc::channel(RESPONSE_BUFFER);

    let recv_pump = tokio::spawn(pump_requests(inbound, req_tx));
    let send_pump = tokio::spawn(pump_responses(res_rx, outbound));

    let result = manager
        .stream_with_config(config, cancel, drain, req_rx, res_tx)
        .await;

    // The driver dropped its response sender on return; the send pump
    // drains what is left and exits. The receive pump may still be parked
    // on a dead transport.
    recv_pump.abort();
    let _ = send_pump.await;
    result
}

/// Drive a tonic server stream to completion, forwarding the driver's
/// terminal error to the client as a gRPC status.
pub async fn serve_discovery_stream(
    manager: Arc<Manager>,
    inbound: Streaming<DiscoveryRequest>,
    outbound: mpsc::Sender<Result<DiscoveryResponse, Status>>,
    cancel: CancellationToken,
    drain: DrainSignal,
) {
    if let Err(err) = run_discovery_stream(manager, inbound, outbound.clone(), cancel, drain).await
    {
        warn!(error = %err, "discovery stream terminated");
        let _ = outbound.send(Err(err.into())).await;
    }
}

async fn pump_requests<I: RequestStream>(
    mut inbound: I,
    requests: mpsc::Sender<DiscoveryRequest>,
) {
    loop {
        match inbound.recv().await {
            Ok(Some(request)) => {
                if requests.send(request).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(status) => {
                debug!(error = %status, "error receiving from stream");
                return;
            }
        }
    }
    // The request sender drops here, closing the driver's request channel.
}

async fn pump_responses<O: ResponseSink>(
    mut responses: mpsc::Receiver<DiscoveryResponse>,
    mut outbound: O,
) {
    while let Some(response) = responses.recv().await {
        if let Err(status) = outbound.send(response).await {
            // Transport failure is observed through the receive pump; a
            // failed write does not terminate the driver.
            debug!(error = %status, "error writing message to stream");
        }
    }
}
