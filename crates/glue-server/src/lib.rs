//! # glue-server
//!
//! Transport-facing layer of the glueplane control plane.
//!
//! This crate bridges the stream drivers in `glue-manager` to concrete
//! surfaces:
//!
//! - [`run_discovery_stream`] - pump a bidirectional transport into a driver
//! - [`serve_discovery_stream`] - the tonic server-streaming wiring
//! - [`admin_router`] - `GET /config_dump` introspection endpoint
//!
//! The gRPC service registration itself (which of Envoy's discovery
//! services a binary exposes, on which listener) stays with the binary;
//! every service method body reduces to [`serve_discovery_stream`] with
//! that service's manager.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod admin;

pub use adapter::{
    run_discovery_stream, run_discovery_stream_with_config, serve_discovery_stream,
    RequestStream, ResponseSink,
};
pub use admin::admin_router;
