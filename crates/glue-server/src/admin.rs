//! Read-only admin HTTP surface.
//!
//! Exposes `GET /config_dump`, returning the manager's resource set as
//! YAML. The `verbose` query parameter (presence only, value ignored)
//! switches to emit-defaults mode.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::error;

use glue_manager::Manager;

/// Build the admin router for one manager.
///
/// Serve it from any HTTP listener; for multiple managers, nest one router
/// per manager under distinct path prefixes.
pub fn admin_router(manager: Arc<Manager>) -> Router {
    Router::new()
        .route("/config_dump", get(config_dump))
        .with_state(manager)
}

async fn config_dump(
    State(manager): State<Arc<Manager>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let verbose = params.contains_key("verbose");
    match manager.config_as_yaml(verbose).await {
        Ok(yaml) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/yaml; charset=utf-8")],
            yaml,
        )
            .into_response(),
        Err(err) => {
            error!(manager = %manager.name(), error = %err, "config dump failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
