//! The binder entry point.
//!
//! Accepts opaque request bodies, derives a verification artifact
//! (fingerprint plus binding), and fans it out to the configured relays
//! through the fire-and-forget pool. The only inspection performed here is
//! the size cap: an oversized body gets `413`, everything else gets `204`
//! with an empty body, no matter what happens downstream.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use tracing::debug;

use verimesh_core::{bind, check_request_size, fingerprint, Artifact};

use crate::forward::Forwarder;
use crate::metrics::MeshMetrics;

/// Category assumed when the caller does not send one.
pub const DEFAULT_CATEGORY: &str = "default";

/// Shared state for one binder instance.
pub struct BinderState {
    /// Node id, for logs only.
    pub node_id: String,
    /// Inbound body cap in bytes.
    pub max_request_bytes: usize,
    /// Relay `/relay` URLs the derived artifact is posted to.
    pub relay_endpoints: Vec<String>,
    /// Outbound pool.
    pub forwarder: Forwarder,
    /// Shared metric families.
    pub metrics: MeshMetrics,
}

/// Builds the binder's router.
pub fn binder_router(state: Arc<BinderState>) -> Router {
    Router::new()
        .route("/submit", post(submit))
        .with_state(state)
}

/// `POST /submit`.
///
/// The response is fixed before any forwarding happens: `413` for an
/// oversized body, `204` otherwise. Callers learn nothing else.
async fn submit(
    State(state): State<Arc<BinderState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if check_request_size(body.len(), state.max_request_bytes).is_err() {
        state.metrics.reject("binder", "oversized");
        state.metrics.ingress_request("binder", "413");
        debug!(
            node = %state.node_id,
            size = body.len(),
            max = state.max_request_bytes,
            "rejecting oversized submission"
        );
        return StatusCode::PAYLOAD_TOO_LARGE;
    }

    let context = header_str(&headers, "x-verification-context");
    let category = match header_str(&headers, "x-category") {
        c if c.is_empty() => DEFAULT_CATEGORY.to_string(),
        c => c,
    };
    let sequence = header_str(&headers, "x-sequence").parse().unwrap_or(0);

    let fp = fingerprint(&body);
    let binding = bind(&fp, &context, &category);
    let artifact = Artifact {
        fingerprint: fp,
        context,
        category,
        binding,
        sequence,
        relayed: false,
    };

    match serde_json::to_value(&artifact) {
        Ok(value) => {
            for endpoint in &state.relay_endpoints {
                state.forwarder.enqueue(endpoint.clone(), value.clone());
            }
        },
        Err(e) => debug!(node = %state.node_id, error = %e, "artifact serialization failed"),
    }

    state.metrics.ingress_request("binder", "204");
    StatusCode::NO_CONTENT
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
