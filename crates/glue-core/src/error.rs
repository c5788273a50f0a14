//! Error types for control-plane operations.
//!
//! This module provides [`XdsError`], the stable error taxonomy shared by
//! the store, the stream drivers, and the transport adapter, with proper
//! conversion to gRPC status codes.

use std::time::Duration;

/// Error type covering all failure modes of the control plane.
///
/// Per-push and per-transaction errors are recovered locally by the stream
/// driver; protocol violations terminate only the offending stream; batch
/// validation errors leave the store untouched.
#[derive(Debug, thiserror::Error)]
pub enum XdsError {
    /// A resource yielded no name from either naming field.
    #[error("invalid resource: {reason}")]
    InvalidResource {
        /// Why the resource could not be ingested.
        reason: String,
    },

    /// A resource in a mutation batch failed its self-validation.
    #[error("resource {name:?} failed validation: {reason}")]
    ValidationFailed {
        /// Name of the offending resource.
        name: String,
        /// Reason reported by the resource's validation predicate.
        reason: String,
    },

    /// Building a discovery response failed; the stream stays open and the
    /// next notification retries.
    #[error("building discovery response failed: {reason}")]
    ResponseBuildFailed {
        /// Underlying snapshot or validation failure.
        reason: String,
    },

    /// A stream requested a type URL this manager does not serve.
    #[error("wrong resource type requested: expected {expected}, got {got}")]
    WrongType {
        /// The manager's type URL.
        expected: String,
        /// The type URL the client asked for.
        got: String,
    },

    /// A stream changed its subscribed resource names mid-stream.
    #[error("resource subscriptions changed unexpectedly")]
    SubscriptionChanged,

    /// Enqueueing a response missed its deadline; the transaction is
    /// discarded and the next notification resynchronizes the client.
    #[error("response push timed out after {timeout:?}")]
    PushTimeout {
        /// The enqueue deadline that expired.
        timeout: Duration,
    },

    /// The producer's deadline expired while fanning out a change
    /// notification to blocked sessions.
    #[error("change notification timed out with {missed} session(s) unnotified")]
    NotificationTimeout {
        /// Sessions that did not receive this notification. They resync on
        /// the next event since the store is already mutated.
        missed: usize,
    },

    /// A transaction was never acknowledged and aged out.
    #[error("transaction went stale: nonce={nonce}")]
    StaleTransaction {
        /// Nonce of the retired transaction.
        nonce: String,
    },

    /// The client rejected a pushed configuration (NACK).
    #[error("client {node} rejected configuration: {message}")]
    ClientRejection {
        /// Node id of the rejecting client.
        node: String,
        /// Message from the client's error detail.
        message: String,
    },

    /// The process is draining; every stream returns this error.
    #[error("server draining")]
    Draining,

    /// The stream transport went away.
    #[error("stream closed: {reason}")]
    StreamClosed {
        /// Reason for stream closure.
        reason: String,
    },

    /// Marshalling a resource or document failed.
    #[error("encoding {what} failed: {reason}")]
    Encoding {
        /// What was being encoded (resource name or document).
        what: String,
        /// Error reported by the encoder.
        reason: String,
    },
}

/// Convert to `tonic::Status` for gRPC stream termination.
///
/// Maps each variant to the status code the SotW protocol expects the
/// client to observe.
impl From<XdsError> for tonic::Status {
    fn from(err: XdsError) -> Self {
        match &err {
            XdsError::WrongType { .. }
            | XdsError::InvalidResource { .. }
            | XdsError::ValidationFailed { .. } => tonic::Status::invalid_argument(err.to_string()),
            XdsError::SubscriptionChanged => tonic::Status::failed_precondition(err.to_string()),
            XdsError::NotificationTimeout { .. } | XdsError::PushTimeout { .. } => {
                tonic::Status::deadline_exceeded(err.to_string())
            }
            XdsError::Draining | XdsError::StreamClosed { .. } => {
                tonic::Status::unavailable(err.to_string())
            }
            XdsError::ResponseBuildFailed { .. }
            | XdsError::StaleTransaction { .. }
            | XdsError::ClientRejection { .. }
            | XdsError::Encoding { .. } => tonic::Status::internal(err.to_string()),
        }
    }
}
