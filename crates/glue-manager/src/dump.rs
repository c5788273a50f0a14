//! Read-only introspection: the YAML config dump.

use tracing::debug;

use glue_core::{resource_name, XdsError, XdsResult};

use crate::manager::Manager;

impl Manager {
    /// Render the currently managed resources as a YAML document.
    ///
    /// The top-level object has a single `resources` key bound to the
    /// marshalled resources, ascending by name. With `verbose` set,
    /// default-valued fields are emitted too.
    pub async fn config_as_yaml(&self, verbose: bool) -> XdsResult<String> {
        let resources = self.list().await;
        debug!(
            manager = %self.name(),
            count = resources.len(),
            verbose,
            "rendering config dump"
        );

        let mut docs = Vec::with_capacity(resources.len());
        for resource in &resources {
            let value = resource.to_json(verbose).map_err(|e| XdsError::Encoding {
                what: resource_name(resource.as_ref())
                    .map(str::to_string)
                    .unwrap_or_else(|_| "resource".to_string()),
                reason: e.to_string(),
            })?;
            docs.push(value);
        }

        let doc = serde_json::json!({ "resources": docs });
        serde_yaml::to_string(&doc).map_err(|e| XdsError::Encoding {
            what: "config dump".to_string(),
            reason: e.to_string(),
        })
    }
}
