//! Per-stream driver: the SotW state machine.
//!
//! One driver runs per connected client. It multiplexes inbound requests,
//! change notifications from the manager, a periodic transaction sweep, the
//! stream's cancellation, and the process drain signal, and keeps the
//! nonce -> transaction map for in-flight pushes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Span};

use glue_core::{Acknowledgment, XdsError, XdsResult};
use glue_wire::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};

use crate::config::StreamConfig;
use crate::drain::DrainSignal;
use crate::manager::Manager;
use crate::session::{SessionId, SessionReceiver, Update};

/// A single outstanding push awaiting acknowledgement.
///
/// The span lives exactly as long as the transaction: it is closed on
/// ack, nack, push timeout, staleness, and stream exit.
struct Transaction {
    nonce: String,
    version: String,
    started: Instant,
    span: Span,
}

impl Transaction {
    fn new(nonce: String, version: String, span: Span) -> Self {
        Self {
            nonce,
            version,
            started: Instant::now(),
            span,
        }
    }
}

impl std::fmt::Display for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "nonce={} version={} age={:?}",
            self.nonce,
            self.version,
            self.started.elapsed()
        )
    }
}

impl Manager {
    /// Drive a client stream with the default [`StreamConfig`].
    ///
    /// Requests from the client arrive on `requests`, responses go out on
    /// `responses`, and the call returns when no further progress can be
    /// made: the request channel closes, the stream is cancelled, the
    /// process drains, or the client violates the protocol.
    pub async fn stream(
        self: Arc<Self>,
        cancel: CancellationToken,
        drain: DrainSignal,
        requests: mpsc::Receiver<DiscoveryRequest>,
        responses: mpsc::Sender<DiscoveryResponse>,
    ) -> XdsResult<()> {
        self.stream_with_config(StreamConfig::default(), cancel, drain, requests, responses)
            .await
    }

    /// Drive a client stream with an explicit configuration.
    pub async fn stream_with_config(
        self: Arc<Self>,
        config: StreamConfig,
        cancel: CancellationToken,
        drain: DrainSignal,
        requests: mpsc::Receiver<DiscoveryRequest>,
        responses: mpsc::Sender<DiscoveryResponse>,
    ) -> XdsResult<()> {
        let (session_id, notifications) = self.register_session().await;
        let driver = StreamDriver {
            manager: Arc::clone(&self),
            config,
            session_id,
            responses,
            node: None,
            subscription: Vec::new(),
            txs: HashMap::new(),
        };
        driver.run(cancel, drain, requests, notifications).await
    }
}

struct StreamDriver {
    manager: Arc<Manager>,
    config: StreamConfig,
    session_id: SessionId,
    responses: mpsc::Sender<DiscoveryResponse>,
    /// Node identity, latched from the first request.
    node: Option<String>,
    /// Subscribed resource names, latched with the node. Empty = wildcard.
    subscription: Vec<String>,
    /// In-flight transactions keyed by nonce.
    txs: HashMap<String, Transaction>,
}

impl StreamDriver {
    async fn run(
        mut self,
        cancel: CancellationToken,
        mut drain: DrainSignal,
        mut requests: mpsc::Receiver<DiscoveryRequest>,
        mut notifications: SessionReceiver,
    ) -> XdsResult<()> {
        info!(
            manager = %self.manager.name(),
            session = %self.session_id,
            type_url = %self.manager.type_url(),
            "discovery stream started"
        );

        let mut cleanup = interval_at(
            Instant::now() + self.config.cleanup_interval,
            self.config.cleanup_interval,
        );
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                _ = drain.wait() => {
                    break Err(XdsError::Draining);
                }
                _ = cancel.cancelled() => {
                    break Err(XdsError::StreamClosed {
                        reason: "stream context cancelled".to_string(),
                    });
                }
                _ = cleanup.tick() => {
                    self.expire_stale_transactions();
                }
                request = requests.recv() => match request {
                    Some(request) => {
                        if let Err(e) = self.handle_request(request).await {
                            break Err(e);
                        }
                    }
                    None => {
                        break Err(XdsError::StreamClosed {
                            reason: "request channel closed".to_string(),
                        });
                    }
                },
                update = notifications.recv() => match update {
                    Some(update) => self.handle_update(update).await,
                    None => {
                        break Err(XdsError::StreamClosed {
                            reason: "manager dropped".to_string(),
                        });
                    }
                },
            }
        };

        // Exit path: drop the receiver first so a fan-out blocked on this
        // session observes a closed channel instead of waiting out the
        // producer deadline, then deregister and finish open spans.
        drop(notifications);
        self.manager.unregister_session(self.session_id).await;
        for (_, tx) in self.txs.drain() {
            tx.span
                .in_scope(|| debug!("stream closed with transaction in flight"));
        }

        info!(
            manager = %self.manager.name(),
            session = %self.session_id,
            result = %result.as_ref().err().map(ToString::to_string).unwrap_or_default(),
            "discovery stream ended"
        );
        result
    }

    fn node_id(&self) -> &str {
        self.node.as_deref().unwrap_or("")
    }

    async fn handle_request(&mut self, request: DiscoveryRequest) -> XdsResult<()> {
        if self.node.is_none() {
            let node = request
                .node
                .as_ref()
                .map(|n| n.id.clone())
                .unwrap_or_default();
            self.subscription = request.resource_names.clone();
            info!(
                session = %self.session_id,
                node = %node,
                subscribed_resources = ?self.subscription,
                "subscription latched"
            );
            self.node = Some(node);
        }

        if request.type_url != self.manager.type_url().as_str() {
            error!(
                session = %self.session_id,
                manager_type = %self.manager.type_url(),
                requested_type = %request.type_url,
                "rejecting wrong-type discovery request"
            );
            return Err(XdsError::WrongType {
                expected: self.manager.type_url().as_str().to_string(),
                got: request.type_url,
            });
        }

        if !same_names(&self.subscription, &request.resource_names) {
            warn!(
                session = %self.session_id,
                node = %self.node_id(),
                new_resources = ?request.resource_names,
                "client changed resource subscriptions without opening a new stream"
            );
            return Err(XdsError::SubscriptionChanged);
        }

        if !request.response_nonce.is_empty() {
            if let Some(tx) = self.txs.remove(&request.response_nonce) {
                self.handle_ack(tx, &request);
                return Ok(());
            }
            warn!(
                session = %self.session_id,
                nonce = %request.response_nonce,
                "acknowledgement carries an unknown nonce, resending current snapshot"
            );
        } else {
            info!(session = %self.session_id, node = %self.node_id(), "sending initial configuration");
        }

        self.push_snapshot(&Span::current()).await;
        Ok(())
    }

    /// React to a change notification: rebuild and push when the wildcard
    /// subscription is active or the changed set intersects ours.
    async fn handle_update(&mut self, update: Update) {
        let interested =
            self.subscription.is_empty() || self.subscription.iter().any(|n| update.contains(n));
        if !interested {
            trace!(
                session = %self.session_id,
                changed = update.len(),
                "ignoring notification for unsubscribed resources"
            );
            return;
        }
        self.push_snapshot(&update.span).await;
    }

    /// Build the current snapshot, start a transaction, and enqueue the
    /// response under the push deadline.
    async fn push_snapshot(&mut self, parent: &Span) {
        let built = match self
            .manager
            .build_discovery_response(&self.subscription)
            .await
        {
            Ok(built) => built,
            Err(e) => {
                // The stream stays open; the next notification retries.
                error!(
                    session = %self.session_id,
                    error = %e,
                    "problem building discovery response"
                );
                return;
            }
        };

        let span = info_span!(
            parent: parent,
            "xds_push",
            node = %self.node_id(),
            type_url = %self.manager.type_url(),
            version = %built.response.version_info,
            nonce = %built.response.nonce,
        );
        let tx = Transaction::new(
            built.response.nonce.clone(),
            built.response.version_info.clone(),
            span,
        );
        info!(
            session = %self.session_id,
            tx = %tx,
            resources = ?built.names,
            "pushing updated resources"
        );

        tokio::select! {
            sent = self.responses.send(built.response) => match sent {
                Ok(()) => {
                    for name in &built.names {
                        self.manager.metrics().resource_pushed(name);
                    }
                    tx.span.in_scope(|| trace!("response enqueued"));
                    self.txs.insert(tx.nonce.clone(), tx);
                }
                Err(_) => {
                    tx.span.in_scope(|| {
                        debug!("response channel closed, discarding transaction");
                    });
                }
            },
            _ = tokio::time::sleep(self.config.push_timeout) => {
                let timeout = XdsError::PushTimeout {
                    timeout: self.config.push_timeout,
                };
                warn!(session = %self.session_id, tx = %tx, "push timed out");
                tx.span.in_scope(|| error!(error = %timeout, "push timed out"));
                // The transaction is not recorded; the next notification or
                // client retry resynchronizes.
            }
        }
    }

    /// Retire an in-flight transaction on ack or nack.
    fn handle_ack(&mut self, tx: Transaction, request: &DiscoveryRequest) {
        let in_use = request.version_info.clone();
        let ack = request.error_detail.is_none();

        if let Some(detail) = &request.error_detail {
            let rejection = XdsError::ClientRejection {
                node: self.node_id().to_string(),
                message: detail.message.clone(),
            };
            tx.span.in_scope(|| {
                error!(
                    error = %rejection,
                    code = detail.code,
                    version_rejected = %tx.version,
                    version_in_use = %in_use,
                    tx = %tx,
                    "client rejected configuration"
                );
            });
            self.manager.metrics().acceptance(false);
        } else {
            tx.span.in_scope(|| {
                info!(
                    version_in_use = %in_use,
                    version_sent = %tx.version,
                    tx = %tx,
                    "client accepted configuration"
                );
            });
            self.manager.metrics().acceptance(true);
            if in_use != tx.version {
                warn!(
                    session = %self.session_id,
                    version_in_use = %in_use,
                    version_sent = %tx.version,
                    "client acknowledged a version that does not match what was sent"
                );
            }
        }

        if let Some(observer) = self.manager.ack_observer() {
            observer(Acknowledgment {
                node: self.node_id().to_string(),
                version: in_use,
                ack,
            });
        }
        // Transaction dropped here; its span closes with it.
    }

    /// Retire transactions whose acknowledgement never arrived.
    fn expire_stale_transactions(&mut self) {
        let ttl = self.config.transaction_ttl;
        let session = self.session_id;
        self.txs.retain(|nonce, tx| {
            if tx.started.elapsed() <= ttl {
                return true;
            }
            let stale = XdsError::StaleTransaction {
                nonce: nonce.clone(),
            };
            debug!(session = %session, tx = %tx, "cleaning up stale transaction");
            tx.span.in_scope(|| error!(error = %stale, "transaction went stale"));
            false
        });
    }
}

/// Order-independent comparison of two resource-name sets.
fn same_names(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}
