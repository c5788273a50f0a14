//! Sessions and change notifications.
//!
//! Each connected stream registers a [`Session`]: a notification channel of
//! capacity exactly one. A full slot means the stream has an unconsumed
//! notification; newer ones coalesce because every notification triggers a
//! full snapshot rebuild on the consumer side.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Unique identifier for a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric value.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Notification slot capacity. Exactly one: newer notifications coalesce
/// with older unconsumed ones.
pub(crate) const SESSION_SLOT: usize = 1;

/// Sender half of a session's notification channel, stored by the manager.
pub(crate) type SessionSender = mpsc::Sender<Update>;

/// Receiver half of a session's notification channel, owned by the driver.
pub(crate) type SessionReceiver = mpsc::Receiver<Update>;

/// Create a session channel pair.
pub(crate) fn session_channel() -> (SessionSender, SessionReceiver) {
    mpsc::channel(SESSION_SLOT)
}

/// A change notification published to every session.
///
/// Immutable once published; cloning is cheap.
#[derive(Debug, Clone)]
pub struct Update {
    /// Names of the resources that changed in this mutation batch.
    pub(crate) names: Arc<HashSet<String>>,
    /// Producer span; pushes triggered by this update are parented to it.
    pub(crate) span: Span,
}

impl Update {
    /// Whether the given resource name changed in this batch.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of changed resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the batch is empty. Published updates never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Producer-side context for a mutation batch.
///
/// Carries the cancellation and deadline that bound the blocking half of
/// notification fan-out, and the span that parents the resulting pushes.
/// The default context never expires, so fan-out to a stuck session blocks
/// until that session drains or disconnects.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    span: Span,
}

impl UpdateContext {
    /// Create a context with no deadline, parented to the current span.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            span: Span::current(),
        }
    }

    /// Bound fan-out by a deadline relative to now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Bound fan-out by an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Resolve once the context is cancelled or its deadline passes.
    /// Pends forever when neither applies.
    pub(crate) async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            },
            None => self.cancel.cancelled().await,
        }
    }
}

impl Default for UpdateContext {
    fn default() -> Self {
        Self::new()
    }
}
