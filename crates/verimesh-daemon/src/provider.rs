//! The provider ingest service.
//!
//! A thin shell over [`ProviderBoundary`]: each `/ingest` body is parsed,
//! evaluated, and the signed outcome is forwarded to the auditor through
//! the fire-and-forget pool. The ingress response is always `204` and
//! carries no trace of the decision; the only observable output of a
//! provider is the outcome report the auditor eventually receives.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tracing::debug;

use verimesh_core::{Artifact, ProviderBoundary};

use crate::forward::Forwarder;
use crate::metrics::MeshMetrics;

/// Shared state for one provider instance.
pub struct ProviderState {
    /// The decision pipeline.
    pub boundary: ProviderBoundary,
    /// Auditor `/outcome` URL outcomes are reported to.
    pub auditor_endpoint: String,
    /// Outbound pool.
    pub forwarder: Forwarder,
    /// Shared metric families.
    pub metrics: MeshMetrics,
}

/// Builds the provider's router.
pub fn provider_router(state: Arc<ProviderState>) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .with_state(state)
}

/// `POST /ingest`: evaluate one artifact and report the outcome.
async fn ingest(State(state): State<Arc<ProviderState>>, body: Bytes) -> StatusCode {
    let provider_id = state.boundary.provider_id();

    let artifact: Artifact = match serde_json::from_slice(&body) {
        Ok(artifact) => artifact,
        Err(e) => {
            state.metrics.reject("provider", "malformed");
            debug!(provider_id, error = %e, "dropping unparseable artifact");
            state.metrics.ingress_request("provider", "204");
            return StatusCode::NO_CONTENT;
        },
    };

    match state.boundary.evaluate(&artifact) {
        Ok(evaluation) => {
            debug!(
                provider_id,
                sequence = artifact.sequence,
                binding_ok = evaluation.binding_ok,
                score = evaluation.score,
                threshold = evaluation.threshold,
                reported = evaluation.reported,
                "evaluated artifact"
            );
            match serde_json::to_value(&evaluation.outcome) {
                Ok(value) => state.forwarder.enqueue(state.auditor_endpoint.clone(), value),
                Err(e) => debug!(provider_id, error = %e, "outcome serialization failed"),
            }
        },
        Err(e) => {
            state.metrics.reject("provider", "malformed_fingerprint");
            debug!(provider_id, sequence = artifact.sequence, error = %e, "rejecting artifact");
        },
    }

    state.metrics.ingress_request("provider", "204");
    StatusCode::NO_CONTENT
}
