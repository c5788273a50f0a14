//! Resource trait for managed xDS payloads.
//!
//! The control plane treats resources as opaque, self-naming, self-validating
//! messages. Implement [`Resource`] for each payload type a manager serves.

use std::fmt;
use std::sync::Arc;

use crate::{XdsError, XdsResult};

/// Boxed error returned by resource implementations.
pub type ResourceError = Box<dyn std::error::Error + Send + Sync>;

/// Trait for managed xDS resources.
///
/// A resource identifies itself through one of two naming fields: most types
/// carry a primary `name`, while endpoint-style types are keyed by the
/// cluster they belong to. [`resource_name`] resolves the effective name.
///
/// # Example
///
/// ```rust
/// use glue_core::{resource_name, Resource, ResourceError};
///
/// #[derive(Debug)]
/// struct Cluster {
///     name: String,
/// }
///
/// impl Resource for Cluster {
///     fn name(&self) -> Option<&str> {
///         Some(&self.name)
///     }
///
///     fn validate(&self) -> Result<(), ResourceError> {
///         Ok(())
///     }
///
///     fn encode(&self) -> Result<prost_types::Any, ResourceError> {
///         Ok(prost_types::Any {
///             type_url: "type.googleapis.com/envoy.config.cluster.v3.Cluster".to_string(),
///             value: vec![],
///         })
///     }
///
///     fn to_json(&self, _emit_defaults: bool) -> Result<serde_json::Value, ResourceError> {
///         Ok(serde_json::json!({ "name": self.name }))
///     }
/// }
///
/// let c = Cluster { name: "edge".to_string() };
/// assert_eq!(resource_name(&c).unwrap(), "edge");
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// The value of the type's primary name field, if it has one.
    fn name(&self) -> Option<&str>;

    /// The value of the type's cluster-name field, for types identified by
    /// their owning cluster (e.g. endpoint assignments).
    fn cluster_name(&self) -> Option<&str> {
        None
    }

    /// Run the payload's self-validation.
    fn validate(&self) -> Result<(), ResourceError>;

    /// Encode the resource into a protobuf `Any` envelope.
    fn encode(&self) -> Result<prost_types::Any, ResourceError>;

    /// Render the resource as JSON for the config dump.
    ///
    /// With `emit_defaults` set, default-valued fields are included in the
    /// output; otherwise they are omitted.
    fn to_json(&self, emit_defaults: bool) -> Result<serde_json::Value, ResourceError>;
}

/// Type alias for a shared resource.
/// Uses Arc for cheap cloning into snapshots.
pub type BoxResource = Arc<dyn Resource>;

/// Resolve the effective name of a resource.
///
/// Tries the primary name field first, then the cluster-name fallback; the
/// first non-empty value wins. Resolution is deterministic and total: a
/// resource yielding neither is rejected with [`XdsError::InvalidResource`].
pub fn resource_name(r: &dyn Resource) -> XdsResult<&str> {
    if let Some(name) = r.name() {
        if !name.is_empty() {
            return Ok(name);
        }
    }
    if let Some(name) = r.cluster_name() {
        if !name.is_empty() {
            return Ok(name);
        }
    }
    Err(XdsError::InvalidResource {
        reason: format!("unable to name resource {:?}", r),
    })
}
