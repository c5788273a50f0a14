//! Metrics for the resource manager.
//!
//! Four series, labelled by manager name and resource type URL, with a
//! `resource_name` label where applicable:
//!
//! - `xds_config_last_updated` (gauge) - when a notification fan-out last started
//! - `xds_config_acceptance_status` (counter, `status` = ACK|NACK) - per ack event
//! - `xds_resource_push_count` (counter) - per successful response enqueue
//! - `xds_resource_push_age` (gauge) - when the named resource was last pushed

use std::time::{SystemTime, UNIX_EPOCH};

use metrics::{counter, gauge};

/// Metric emitter bound to one manager's identity labels.
#[derive(Debug, Clone)]
pub struct ManagerMetrics {
    manager: String,
    type_url: String,
}

impl ManagerMetrics {
    /// Create an emitter for the given manager name and type URL.
    pub(crate) fn new(manager: impl Into<String>, type_url: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
            type_url: type_url.into(),
        }
    }

    /// Record the start of a notification fan-out.
    pub(crate) fn config_updated(&self) {
        gauge!(
            "xds_config_last_updated",
            "manager" => self.manager.clone(),
            "type_url" => self.type_url.clone()
        )
        .set(unix_now());
    }

    /// Record a client accepting or rejecting a configuration.
    pub(crate) fn acceptance(&self, ack: bool) {
        counter!(
            "xds_config_acceptance_status",
            "manager" => self.manager.clone(),
            "type_url" => self.type_url.clone(),
            "status" => if ack { "ACK" } else { "NACK" }
        )
        .increment(1);
    }

    /// Record a named resource going out in an enqueued response.
    pub(crate) fn resource_pushed(&self, name: &str) {
        counter!(
            "xds_resource_push_count",
            "manager" => self.manager.clone(),
            "type_url" => self.type_url.clone(),
            "resource_name" => name.to_string()
        )
        .increment(1);
        gauge!(
            "xds_resource_push_age",
            "manager" => self.manager.clone(),
            "type_url" => self.type_url.clone(),
            "resource_name" => name.to_string()
        )
        .set(unix_now());
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
