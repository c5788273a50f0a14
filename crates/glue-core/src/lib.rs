//! # glue-core
//!
//! Core types, traits, and error handling for the glueplane control plane.
//!
//! This crate provides the foundational types used across the other
//! workspace crates:
//!
//! - [`XdsError`] - Stable error taxonomy with gRPC status code mapping
//! - [`Resource`] - Trait for opaque, self-naming, self-validating payloads
//! - [`resource_name`] - Name extraction with the cluster-name fallback
//! - [`TypeUrl`] - Type URL handling and well-known Envoy constants
//! - [`Acknowledgment`] - Ack/nack events delivered to observers

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ack;
mod error;
mod resource;
mod type_url;

pub use ack::{Acknowledgment, AckObserver};
pub use error::XdsError;
pub use resource::{resource_name, BoxResource, Resource, ResourceError};
pub use type_url::TypeUrl;

/// Result type alias using [`XdsError`].
pub type Result<T> = std::result::Result<T, XdsError>;

/// Alias for [`Result`] that avoids shadowing `std::result::Result`.
pub type XdsResult<T> = Result<T>;
