//! The mechanical relay.
//!
//! A relay conveys artifacts without interpreting them: every artifact it
//! parses goes to all of its providers, and artifacts that arrived
//! directly (not from a peer) additionally go to peer relays with the
//! provenance flag set. Peer-received artifacts are never re-relayed,
//! which bounds the mesh to one peer hop.
//!
//! The relay also carries provider outcome reports to the auditor on
//! behalf of its region, again verbatim. All ingress returns `204`; a
//! body that does not parse is dropped and counted, not rejected.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tracing::debug;

use verimesh_core::Artifact;

use crate::forward::Forwarder;
use crate::metrics::MeshMetrics;

/// Shared state for one relay instance.
pub struct RelayState {
    /// Node id, for logs only.
    pub node_id: String,
    /// Provider `/ingest` URLs.
    pub provider_endpoints: Vec<String>,
    /// Peer relay `/relay` URLs.
    pub peer_endpoints: Vec<String>,
    /// Auditor `/outcome` URL for forwarded outcome reports.
    pub auditor_endpoint: String,
    /// Outbound pool.
    pub forwarder: Forwarder,
    /// Shared metric families.
    pub metrics: MeshMetrics,
}

/// One fan-out send the relay intends to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutTarget {
    /// Destination URL.
    pub url: String,
    /// The artifact to post there, provenance flag included.
    pub artifact: Artifact,
    /// `"provider"` or `"peer"`, for the fan-out counter.
    pub kind: &'static str,
}

/// Computes the full fan-out for one received artifact.
///
/// Providers always receive the artifact exactly as it arrived. Peers
/// receive a copy marked `relayed`, and only when the artifact itself was
/// not peer-received.
#[must_use]
pub fn fanout_targets(
    artifact: &Artifact,
    provider_endpoints: &[String],
    peer_endpoints: &[String],
) -> Vec<FanoutTarget> {
    let mut targets: Vec<FanoutTarget> = provider_endpoints
        .iter()
        .map(|url| FanoutTarget {
            url: url.clone(),
            artifact: artifact.clone(),
            kind: "provider",
        })
        .collect();

    if !artifact.relayed {
        let marked = artifact.clone().into_relayed();
        targets.extend(peer_endpoints.iter().map(|url| FanoutTarget {
            url: url.clone(),
            artifact: marked.clone(),
            kind: "peer",
        }));
    }

    targets
}

/// Builds the relay's router.
pub fn relay_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/relay", post(relay))
        .route("/outcome", post(outcome))
        .with_state(state)
}

/// `POST /relay`: fan an artifact out to providers and peers.
async fn relay(State(state): State<Arc<RelayState>>, body: Bytes) -> StatusCode {
    let artifact: Artifact = match serde_json::from_slice(&body) {
        Ok(artifact) => artifact,
        Err(e) => {
            state.metrics.reject("relay", "malformed");
            debug!(node = %state.node_id, error = %e, "dropping unparseable artifact");
            state.metrics.ingress_request("relay", "204");
            return StatusCode::NO_CONTENT;
        },
    };

    for target in fanout_targets(&artifact, &state.provider_endpoints, &state.peer_endpoints) {
        match serde_json::to_value(&target.artifact) {
            Ok(value) => {
                state.metrics.relay_fanout(target.kind);
                state.forwarder.enqueue(target.url, value);
            },
            Err(e) => debug!(node = %state.node_id, error = %e, "artifact serialization failed"),
        }
    }

    state.metrics.ingress_request("relay", "204");
    StatusCode::NO_CONTENT
}

/// `POST /outcome`: carry a provider's outcome report to the auditor,
/// verbatim. The relay does not verify signatures or inspect fields.
async fn outcome(State(state): State<Arc<RelayState>>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(value) => {
            state.metrics.relay_fanout("outcome");
            state.forwarder.enqueue(state.auditor_endpoint.clone(), value);
        },
        Err(e) => {
            state.metrics.reject("relay", "malformed_outcome");
            debug!(node = %state.node_id, error = %e, "dropping unparseable outcome");
        },
    }

    state.metrics.ingress_request("relay", "204");
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::new_shared_registry;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use verimesh_core::{bind, fingerprint};

    fn sample_artifact(relayed: bool) -> Artifact {
        let fp = fingerprint(b"relay test");
        Artifact {
            binding: bind(&fp, "CTX_ALPHA", "payments"),
            fingerprint: fp,
            context: "CTX_ALPHA".to_string(),
            category: "payments".to_string(),
            sequence: 3,
            relayed,
        }
    }

    fn endpoints(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|u| (*u).to_string()).collect()
    }

    #[test]
    fn direct_artifact_fans_to_providers_and_peers() {
        let artifact = sample_artifact(false);
        let targets = fanout_targets(
            &artifact,
            &endpoints(&["http://p1/ingest", "http://p2/ingest"]),
            &endpoints(&["http://peer/relay"]),
        );

        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].kind, "provider");
        assert!(!targets[0].artifact.relayed);
        assert_eq!(targets[2].kind, "peer");
        assert!(targets[2].artifact.relayed);
        // The peer copy differs only in provenance.
        assert_eq!(targets[2].artifact.fingerprint, artifact.fingerprint);
    }

    #[test]
    fn peer_received_artifact_never_reaches_peers() {
        let artifact = sample_artifact(true);
        let targets = fanout_targets(
            &artifact,
            &endpoints(&["http://p1/ingest"]),
            &endpoints(&["http://peer/relay"]),
        );

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].kind, "provider");
        assert!(targets[0].artifact.relayed);
    }

    fn test_relay() -> (Router, mpsc::Receiver<crate::forward::ForwardJob>) {
        let metrics = new_shared_registry().unwrap().mesh_metrics().clone();
        let (forwarder, rx) = Forwarder::detached(64, metrics.clone());
        let state = Arc::new(RelayState {
            node_id: "relay-test".to_string(),
            provider_endpoints: endpoints(&["http://127.0.0.1:8210/ingest"]),
            peer_endpoints: endpoints(&["http://127.0.0.1:8111/relay"]),
            auditor_endpoint: "http://127.0.0.1:8310/outcome".to_string(),
            forwarder,
            metrics,
        });
        (relay_router(state), rx)
    }

    #[tokio::test]
    async fn relay_endpoint_forwards_and_marks_peer_copy() {
        let (router, mut rx) = test_relay();
        let body = serde_json::to_vec(&sample_artifact(false)).unwrap();
        let request = Request::post("/relay").body(Body::from(body)).unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let provider_job = rx.recv().await.unwrap();
        assert_eq!(provider_job.url, "http://127.0.0.1:8210/ingest");
        let sent: Artifact = serde_json::from_value(provider_job.body).unwrap();
        assert!(!sent.relayed);

        let peer_job = rx.recv().await.unwrap();
        assert_eq!(peer_job.url, "http://127.0.0.1:8111/relay");
        let sent: Artifact = serde_json::from_value(peer_job.body).unwrap();
        assert!(sent.relayed);
    }

    #[tokio::test]
    async fn malformed_artifact_is_dropped_with_204() {
        let (router, mut rx) = test_relay();
        let request = Request::post("/relay")
            .body(Body::from("{not json"))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn outcome_is_forwarded_verbatim_to_the_auditor() {
        let (router, mut rx) = test_relay();
        let outcome = serde_json::json!({
            "provider_id": "provider-a",
            "fingerprint": "aa",
            "initiated": true,
            "signature": "sig"
        });
        let request = Request::post("/outcome")
            .body(Body::from(outcome.to_string()))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let job = rx.recv().await.unwrap();
        assert_eq!(job.url, "http://127.0.0.1:8310/outcome");
        assert_eq!(job.body, outcome);
    }
}
