//! # glue-manager
//!
//! The authoritative resource store and per-client stream drivers of the
//! glueplane control plane.
//!
//! A [`Manager`] owns the named resources of a single xDS type, a
//! monotonically increasing version counter, and the set of connected
//! sessions. Mutations ([`Manager::add`], [`Manager::replace`],
//! [`Manager::delete`]) publish coalescing change notifications; each
//! connected client runs a driver ([`Manager::stream`]) that turns
//! notifications and inbound `DiscoveryRequest`s into acknowledged
//! `DiscoveryResponse` pushes.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use glue_manager::{DrainController, Manager, UpdateContext};
//!
//! let manager = Arc::new(Manager::new("clusters", "pod-1-", glue_core::TypeUrl::CLUSTER));
//! let drain = DrainController::new();
//!
//! // Producer side: ingest resources.
//! manager.add(&UpdateContext::new(), clusters).await?;
//!
//! // Consumer side: one driver per connected client.
//! tokio::spawn(manager.clone().stream(cancel, drain.signal(), req_rx, res_tx));
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod drain;
mod driver;
mod dump;
mod manager;
mod metrics;
mod session;

#[cfg(test)]
mod protocol_tests;

pub use config::StreamConfig;
pub use drain::{wait_for_signal, DrainController, DrainSignal};
pub use manager::{BuiltResponse, Manager, ResourceSnapshot};
pub use session::{SessionId, Update, UpdateContext};
