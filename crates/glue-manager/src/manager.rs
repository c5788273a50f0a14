//! The per-resource-type authoritative store.
//!
//! A [`Manager`] owns the resource map for a single type URL, a monotonic
//! version counter, and the set of connected sessions. Mutations publish a
//! change notification to every session; each stream driver reacts by
//! rebuilding a snapshot of its subscribed names.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use glue_core::{resource_name, AckObserver, BoxResource, TypeUrl, XdsError, XdsResult};
use glue_wire::envoy::service::discovery::v3::DiscoveryResponse;

use crate::metrics::ManagerMetrics;
use crate::session::{session_channel, SessionId, SessionReceiver, SessionSender, Update, UpdateContext};

/// A point-in-time view of a subset of the store.
#[derive(Debug, Clone)]
pub struct ResourceSnapshot {
    /// Any-wrapped resource payloads.
    pub resources: Vec<prost_types::Any>,
    /// Names of the resources actually present, in payload order.
    pub names: Vec<String>,
    /// Version string at the time of the snapshot.
    pub version: String,
}

/// A discovery response plus the names it carries, for metrics and logging.
#[derive(Debug, Clone)]
pub struct BuiltResponse {
    /// The response ready to enqueue.
    pub response: DiscoveryResponse,
    /// Names of the resources in the response.
    pub names: Vec<String>,
}

#[derive(Debug, Default)]
struct ManagerState {
    version: u64,
    resources: BTreeMap<String, BoxResource>,
    sessions: HashMap<SessionId, SessionSender>,
}

/// Consumes a stream of resource changes and notifies connected xDS clients.
///
/// One instance exists per managed resource type. All reads and writes of
/// the resource map, version counter, and session set go through a single
/// async mutex, so no stream ever observes a partial mutation.
pub struct Manager {
    name: String,
    version_prefix: String,
    type_url: TypeUrl,
    on_ack: Option<AckObserver>,
    metrics: ManagerMetrics,
    state: Mutex<ManagerState>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("name", &self.name)
            .field("version_prefix", &self.version_prefix)
            .field("type_url", &self.type_url)
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Create a new manager.
    ///
    /// `name` labels logs and metrics; `version_prefix` (typically the
    /// server's pod name) is prepended to the version counter in every
    /// published version string; `type_url` is the resource type served,
    /// e.g. [`TypeUrl::CLUSTER`].
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version_prefix: impl Into<String>,
        type_url: impl Into<TypeUrl>,
    ) -> Self {
        let name = name.into();
        let type_url = type_url.into();
        let metrics = ManagerMetrics::new(name.clone(), type_url.as_str());
        Self {
            name,
            version_prefix: version_prefix.into(),
            type_url,
            on_ack: None,
            metrics,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Install a callback fired once per ack/nack event.
    #[must_use]
    pub fn with_ack_observer(mut self, observer: AckObserver) -> Self {
        self.on_ack = Some(observer);
        self
    }

    /// The manager's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type URL this manager serves.
    #[inline]
    #[must_use]
    pub fn type_url(&self) -> &TypeUrl {
        &self.type_url
    }

    pub(crate) fn ack_observer(&self) -> Option<&AckObserver> {
        self.on_ack.as_ref()
    }

    pub(crate) fn metrics(&self) -> &ManagerMetrics {
        &self.metrics
    }

    /// Current value of the version counter.
    pub async fn current_version(&self) -> u64 {
        self.state.lock().await.version
    }

    /// Current published version string (prefix + counter).
    pub async fn version_info(&self) -> String {
        let state = self.state.lock().await;
        self.version_string(&state)
    }

    /// Number of registered sessions.
    pub async fn session_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    fn version_string(&self, state: &ManagerState) -> String {
        format!("{}{}", self.version_prefix, state.version)
    }

    /// Add or replace (by name) managed resources and notify clients.
    ///
    /// The whole batch is validated first; on any failure the store is left
    /// unchanged and the error names the offending resource.
    pub async fn add(&self, ctx: &UpdateContext, resources: Vec<BoxResource>) -> XdsResult<()> {
        let batch = Self::validate_batch(resources)?;

        let mut state = self.state.lock().await;
        let mut changed = Vec::with_capacity(batch.len());
        for (name, resource) in batch {
            if state.resources.insert(name.clone(), resource).is_some() {
                info!(manager = %self.name, name = %name, "resource updated");
            } else {
                info!(manager = %self.name, name = %name, "resource added");
            }
            changed.push(name);
        }
        self.notify(&mut state, ctx, changed).await
    }

    /// Replace the entire set of managed resources and notify clients.
    ///
    /// The changed-name set covers every added, updated, and removed name.
    pub async fn replace(&self, ctx: &UpdateContext, resources: Vec<BoxResource>) -> XdsResult<()> {
        let batch = Self::validate_batch(resources)?;
        let mut next = BTreeMap::new();
        for (name, resource) in batch {
            next.insert(name, resource);
        }

        let mut state = self.state.lock().await;
        let old = std::mem::replace(&mut state.resources, next);
        let mut changed = Vec::new();
        for name in state.resources.keys() {
            if old.contains_key(name) {
                info!(manager = %self.name, name = %name, "resource updated");
            } else {
                info!(manager = %self.name, name = %name, "resource added");
            }
            changed.push(name.clone());
        }
        for name in old.keys() {
            if !state.resources.contains_key(name) {
                info!(manager = %self.name, name = %name, "resource deleted");
                changed.push(name.clone());
            }
        }
        self.notify(&mut state, ctx, changed).await
    }

    /// Delete a single resource by name and notify clients.
    ///
    /// Deleting an absent name is a no-op: no version bump, no notification.
    pub async fn delete(&self, ctx: &UpdateContext, name: &str) -> XdsResult<()> {
        let mut state = self.state.lock().await;
        if state.resources.remove(name).is_none() {
            return Ok(());
        }
        info!(manager = %self.name, name = %name, "resource deleted");
        self.notify(&mut state, ctx, vec![name.to_string()]).await
    }

    /// The managed resources, ascending by name.
    pub async fn list(&self) -> Vec<BoxResource> {
        let state = self.state.lock().await;
        state.resources.values().cloned().collect()
    }

    /// The names of the managed resources, ascending.
    pub async fn list_keys(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.resources.keys().cloned().collect()
    }

    /// Snapshot a subset of the store.
    ///
    /// With `want` empty, every resource is returned in name order. With
    /// `want` non-empty, the subset present is returned in requested order;
    /// names not currently known are silently omitted, because discovery is
    /// eventually consistent and a subscribed name may simply not exist yet.
    pub async fn snapshot(&self, want: &[String]) -> XdsResult<ResourceSnapshot> {
        let state = self.state.lock().await;
        self.snapshot_locked(&state, want)
    }

    fn snapshot_locked(&self, state: &ManagerState, want: &[String]) -> XdsResult<ResourceSnapshot> {
        let mut resources = Vec::new();
        let mut names = Vec::new();
        let mut push = |name: &str, resource: &BoxResource| -> XdsResult<()> {
            let any = resource.encode().map_err(|e| XdsError::Encoding {
                what: name.to_string(),
                reason: e.to_string(),
            })?;
            names.push(name.to_string());
            resources.push(any);
            Ok(())
        };

        if want.is_empty() {
            for (name, resource) in &state.resources {
                push(name, resource)?;
            }
        } else {
            for name in want {
                match state.resources.get(name) {
                    Some(resource) => push(name, resource)?,
                    None => {
                        debug!(
                            manager = %self.name,
                            resource_name = %name,
                            "requested resource is not available"
                        );
                    }
                }
            }
        }

        Ok(ResourceSnapshot {
            resources,
            names,
            version: self.version_string(state),
        })
    }

    /// Build a discovery response for the given subscription.
    ///
    /// The response carries the current version string, the manager's type
    /// URL, the Any-wrapped snapshot of `subscribed`, and a fresh nonce. It
    /// is self-validated before being returned.
    pub async fn build_discovery_response(&self, subscribed: &[String]) -> XdsResult<BuiltResponse> {
        let snapshot = {
            let state = self.state.lock().await;
            self.snapshot_locked(&state, subscribed)
                .map_err(|e| XdsError::ResponseBuildFailed {
                    reason: e.to_string(),
                })?
        };

        let nonce = format!("nonce-{}-{}", snapshot.version, nonce_suffix());
        let response = DiscoveryResponse {
            version_info: snapshot.version,
            resources: snapshot.resources,
            canary: false,
            type_url: self.type_url.as_str().to_string(),
            nonce,
            control_plane: None,
        };
        response
            .validate()
            .map_err(|reason| XdsError::ResponseBuildFailed { reason })?;

        Ok(BuiltResponse {
            response,
            names: snapshot.names,
        })
    }

    /// Register a session. Called by the stream driver on connect.
    pub(crate) async fn register_session(&self) -> (SessionId, SessionReceiver) {
        let (tx, rx) = session_channel();
        let id = SessionId::next();
        let mut state = self.state.lock().await;
        state.sessions.insert(id, tx);
        debug!(manager = %self.name, session = %id, "session registered");
        (id, rx)
    }

    /// Deregister a session. Called by the stream driver on exit, after it
    /// has dropped its receiver.
    pub(crate) async fn unregister_session(&self, id: SessionId) {
        let mut state = self.state.lock().await;
        state.sessions.remove(&id);
        debug!(manager = %self.name, session = %id, "session deregistered");
    }

    fn validate_batch(resources: Vec<BoxResource>) -> XdsResult<Vec<(String, BoxResource)>> {
        let mut batch = Vec::with_capacity(resources.len());
        for resource in resources {
            let name = resource_name(resource.as_ref())?.to_string();
            resource
                .validate()
                .map_err(|e| XdsError::ValidationFailed {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            batch.push((name, resource));
        }
        Ok(batch)
    }

    /// Publish a change notification to every session.
    ///
    /// Runs under the manager lock: bumps the version, then sends in two
    /// phases. The first pass is non-blocking; sessions with a full slot are
    /// retried with blocking sends raced against the producer's context. On
    /// expiry the remaining sessions are abandoned; they resync on the next
    /// event because the store is already mutated.
    async fn notify(
        &self,
        state: &mut ManagerState,
        ctx: &UpdateContext,
        changed: Vec<String>,
    ) -> XdsResult<()> {
        if changed.is_empty() {
            return Ok(());
        }
        state.version += 1;
        self.metrics.config_updated();
        debug!(
            manager = %self.name,
            version = state.version,
            resources = ?changed,
            "new resource version"
        );

        let update = Update {
            names: Arc::new(changed.into_iter().collect()),
            span: ctx.span().clone(),
        };

        let mut blocked = Vec::new();
        let mut closed = Vec::new();
        for (id, sender) in &state.sessions {
            match sender.try_send(update.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => blocked.push(*id),
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        let mut result = Ok(());
        for (i, id) in blocked.iter().enumerate() {
            let Some(sender) = state.sessions.get(id) else {
                continue;
            };
            tokio::select! {
                sent = sender.send(update.clone()) => {
                    if sent.is_err() {
                        closed.push(*id);
                    }
                }
                _ = ctx.expired() => {
                    let missed = blocked.len() - i;
                    warn!(
                        manager = %self.name,
                        sessions_missed = missed,
                        "change notification timed out"
                    );
                    result = Err(XdsError::NotificationTimeout { missed });
                    break;
                }
            }
        }

        for id in closed {
            state.sessions.remove(&id);
            debug!(manager = %self.name, session = %id, "pruned closed session");
        }
        result
    }
}

fn nonce_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..8).map(|_| rng.gen_range(b'a'..=b'z') as char).collect()
}
