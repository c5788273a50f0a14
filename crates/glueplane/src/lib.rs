//! # glueplane
//!
//! An xDS (Envoy service-discovery) control-plane manager: a versioned
//! in-memory resource store that streams consistent, acknowledged snapshots
//! of itself to any number of connected proxy clients over the
//! State-of-the-World protocol.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use glueplane::prelude::*;
//!
//! // One manager per resource type.
//! let manager = Arc::new(Manager::new("clusters", "pod-1-", TypeUrl::CLUSTER));
//! let drain = DrainController::new();
//!
//! // Producer side: feed resource changes in.
//! manager.add(&UpdateContext::new(), clusters).await?;
//!
//! // Consumer side: drive each connected client stream.
//! glue_server::serve_discovery_stream(
//!     Arc::clone(&manager), inbound, outbound, cancel, drain.signal(),
//! ).await;
//! ```
//!
//! ## Architecture
//!
//! The workspace is organized into focused crates:
//!
//! - `glue-core` - resource trait, type URLs, error taxonomy
//! - `glue-wire` - SotW discovery wire types
//! - `glue-manager` - store, fan-out, and per-stream drivers
//! - `glue-server` - transport adapter and admin endpoint
//!
//! This crate re-exports all public APIs for convenience.
//!
//! ## Design principles
//!
//! 1. **No panics in library code** - all errors are returned as `Result`
//! 2. **One lock** - the manager mutex serializes store, counter, and sessions
//! 3. **Coalescing fan-out** - slow streams cost one slot, not a queue
//! 4. **Observable** - structured logs, push/ack metrics, per-push spans

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

// Re-export the workspace crates.
pub use glue_core as core;
pub use glue_manager as manager;
pub use glue_server as server;
pub use glue_wire as wire;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use glueplane::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use glue_core::{
        resource_name, Acknowledgment, AckObserver, BoxResource, Resource, ResourceError,
        TypeUrl, XdsError, XdsResult,
    };

    // Store and stream types
    pub use glue_manager::{
        BuiltResponse, DrainController, DrainSignal, Manager, ResourceSnapshot, SessionId,
        StreamConfig, Update, UpdateContext,
    };

    // Transport seams
    pub use glue_server::{
        admin_router, run_discovery_stream, serve_discovery_stream, RequestStream, ResponseSink,
    };

    // Wire messages
    pub use glue_wire::envoy::service::discovery::v3::{DiscoveryRequest, DiscoveryResponse};
}

/// Version information for this crate.
pub mod version {
    /// Crate version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Minimum supported Rust version.
    pub const MSRV: &str = "1.75";
}
