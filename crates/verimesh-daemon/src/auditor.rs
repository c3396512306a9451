//! The quorum auditor service.
//!
//! Wraps [`QuorumLedger`] in the mesh's only stateful endpoint set:
//! providers (directly or via a relay) post signed outcomes to
//! `/outcome`, and observers read per-fingerprint records and run-level
//! tallies back out. The auditor never contacts any other component; its
//! ingress ack is the same unconditional `204` as everywhere else, so a
//! reporting provider cannot learn the quorum state from its ack.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::Mutex;
use tracing::debug;

use verimesh_core::quorum::QuorumStats;
use verimesh_core::{ProviderOutcome, QuorumLedger, QuorumRecord, RecordDisposition};

use crate::metrics::MeshMetrics;

/// Shared state for the auditor.
pub struct AuditorState {
    /// The vote ledger. One lock; every operation on it is short.
    pub ledger: Mutex<QuorumLedger>,
    /// Shared metric families.
    pub metrics: MeshMetrics,
}

/// Builds the auditor's router.
pub fn auditor_router(state: Arc<AuditorState>) -> Router {
    Router::new()
        .route("/outcome", post(outcome))
        .route("/records/{fingerprint}", get(record))
        .route("/stats", get(stats))
        .with_state(state)
}

/// `POST /outcome`: record one provider outcome.
async fn outcome(State(state): State<Arc<AuditorState>>, body: Bytes) -> StatusCode {
    let outcome: ProviderOutcome = match serde_json::from_slice(&body) {
        Ok(outcome) => outcome,
        Err(e) => {
            state.metrics.reject("auditor", "malformed");
            debug!(error = %e, "dropping unparseable outcome");
            state.metrics.ingress_request("auditor", "204");
            return StatusCode::NO_CONTENT;
        },
    };

    let (disposition, open) = {
        let mut ledger = state.ledger.lock().await;
        (ledger.record(&outcome), ledger.open_records())
    };

    state.metrics.outcome_recorded(disposition.label());
    if let RecordDisposition::Resolved { success } = disposition {
        state.metrics.quorum_resolved(success);
        debug!(
            fingerprint = %outcome.fingerprint,
            success,
            "quorum record resolved"
        );
    }
    state.metrics.set_open_records(open);

    state.metrics.ingress_request("auditor", "204");
    StatusCode::NO_CONTENT
}

/// `GET /records/{fingerprint}`: the vote set for one fingerprint.
async fn record(
    State(state): State<Arc<AuditorState>>,
    Path(fingerprint): Path<String>,
) -> Result<Json<QuorumRecord>, StatusCode> {
    let ledger = state.ledger.lock().await;
    ledger
        .get(&fingerprint)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// `GET /stats`: the run-level tallies.
async fn stats(State(state): State<Arc<AuditorState>>) -> Json<QuorumStats> {
    let ledger = state.ledger.lock().await;
    Json(ledger.stats().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::new_shared_registry;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::collections::BTreeMap;
    use tower::ServiceExt;
    use verimesh_core::quorum::RecordState;
    use verimesh_core::{fingerprint, sign_outcome};

    fn test_auditor() -> Router {
        let providers = vec!["A".to_string(), "B".to_string()];
        let keys: BTreeMap<String, Vec<u8>> = providers
            .iter()
            .map(|p| (p.clone(), format!("{p}_KEY").into_bytes()))
            .collect();
        let ledger = QuorumLedger::new(2, &providers, keys).unwrap();
        let state = Arc::new(AuditorState {
            ledger: Mutex::new(ledger),
            metrics: new_shared_registry().unwrap().mesh_metrics().clone(),
        });
        auditor_router(state)
    }

    fn vote_body(provider: &str, fp: &str, initiated: bool) -> Vec<u8> {
        let key = format!("{provider}_KEY");
        let outcome = ProviderOutcome {
            provider_id: provider.to_string(),
            fingerprint: fp.to_string(),
            category: "payments".to_string(),
            sequence: 0,
            initiated,
            signature: sign_outcome(key.as_bytes(), fp, initiated),
        };
        serde_json::to_vec(&outcome).unwrap()
    }

    async fn post_outcome(router: &Router, body: Vec<u8>) -> StatusCode {
        let request = Request::post("/outcome").body(Body::from(body)).unwrap();
        router.clone().oneshot(request).await.unwrap().status()
    }

    async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn full_vote_set_resolves_and_is_queryable() {
        let router = test_auditor();
        let fp = fingerprint(b"auditor test");

        assert_eq!(
            post_outcome(&router, vote_body("A", &fp, true)).await,
            StatusCode::NO_CONTENT
        );
        assert_eq!(
            post_outcome(&router, vote_body("B", &fp, true)).await,
            StatusCode::NO_CONTENT
        );

        let (status, value) = get_json(&router, &format!("/records/{fp}")).await;
        assert_eq!(status, StatusCode::OK);
        let record: QuorumRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.state, RecordState::Resolved { success: true });
        assert_eq!(record.votes.len(), 2);

        let (status, stats) = get_json(&router, "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["quorum_success"], 1);
        assert_eq!(stats["quorum_fail"], 0);
        assert_eq!(stats["by_provider"]["A"]["resolved_votes"], 1);
    }

    #[tokio::test]
    async fn unknown_fingerprint_is_404() {
        let router = test_auditor();
        let (status, _) = get_json(&router, "/records/deadbeef").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn forged_signature_is_counted_not_recorded() {
        let router = test_auditor();
        let fp = fingerprint(b"auditor test");

        let outcome = ProviderOutcome {
            provider_id: "A".to_string(),
            fingerprint: fp.clone(),
            category: "payments".to_string(),
            sequence: 0,
            initiated: true,
            signature: sign_outcome(b"WRONG_KEY", &fp, true),
        };
        let status = post_outcome(&router, serde_json::to_vec(&outcome).unwrap()).await;
        // The ack stays constant even for a rejected outcome.
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = get_json(&router, &format!("/records/{fp}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (_, stats) = get_json(&router, "/stats").await;
        assert_eq!(stats["rejected_signatures"], 1);
    }

    #[tokio::test]
    async fn unparseable_outcome_still_gets_204() {
        let router = test_auditor();
        assert_eq!(
            post_outcome(&router, b"{broken".to_vec()).await,
            StatusCode::NO_CONTENT
        );
    }

    #[tokio::test]
    async fn partial_votes_leave_the_record_open() {
        let router = test_auditor();
        let fp = fingerprint(b"auditor test");
        post_outcome(&router, vote_body("A", &fp, true)).await;

        let (status, value) = get_json(&router, &format!("/records/{fp}")).await;
        assert_eq!(status, StatusCode::OK);
        let record: QuorumRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.state, RecordState::Open);

        let (_, stats) = get_json(&router, "/stats").await;
        assert_eq!(stats["quorum_success"], 0);
        assert_eq!(stats["quorum_fail"], 0);
    }
}
