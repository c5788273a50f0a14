//! Acknowledgement events.

use std::sync::Arc;

/// Event representing a client accepting or rejecting a configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acknowledgment {
    /// The id of the node.
    pub node: String,
    /// The version the client reports in use.
    pub version: String,
    /// Whether this is an ack or nack.
    pub ack: bool,
}

/// Callback invoked once per ack/nack event.
///
/// The driver holds no locks during the call, but it will not process
/// further stream events until the callback returns, so observers must not
/// block significantly.
pub type AckObserver = Arc<dyn Fn(Acknowledgment) + Send + Sync>;
