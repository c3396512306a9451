//! Prometheus metrics for mesh observability.
//!
//! Transport failures in this system are swallowed by design, so the
//! counters here are the only place they become visible. Every role shares
//! one registry and the same metric families:
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `verimesh_ingress_requests_total` | Counter | `role`, `status` |
//! | `verimesh_forward_jobs_total` | Counter | `status` |
//! | `verimesh_relay_fanout_total` | Counter | `kind` |
//! | `verimesh_rejects_total` | Counter | `role`, `reason` |
//! | `verimesh_outcomes_recorded_total` | Counter | `disposition` |
//! | `verimesh_quorum_resolved_total` | Counter | `result` |
//! | `verimesh_open_records` | Gauge | — |

use std::sync::Arc;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Failed to register a metric with Prometheus.
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    /// Failed to encode metrics output.
    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// The mesh's metric families.
///
/// All metrics use interior mutability; the struct is `Clone`, `Send`, and
/// `Sync`.
#[derive(Clone)]
pub struct MeshMetrics {
    ingress_requests_total: IntCounterVec,
    forward_jobs_total: IntCounterVec,
    relay_fanout_total: IntCounterVec,
    rejects_total: IntCounterVec,
    outcomes_recorded_total: IntCounterVec,
    quorum_resolved_total: IntCounterVec,
    open_records: IntGauge,
}

impl MeshMetrics {
    /// Creates the metric families and registers them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register.
    pub fn new(registry: &Registry) -> MetricsResult<Self> {
        let ingress_requests_total = IntCounterVec::new(
            Opts::new(
                "verimesh_ingress_requests_total",
                "Inbound requests by role and response status",
            ),
            &["role", "status"],
        )?;
        registry.register(Box::new(ingress_requests_total.clone()))?;

        let forward_jobs_total = IntCounterVec::new(
            Opts::new(
                "verimesh_forward_jobs_total",
                "Fire-and-forget forward jobs by outcome",
            ),
            &["status"],
        )?;
        registry.register(Box::new(forward_jobs_total.clone()))?;

        let relay_fanout_total = IntCounterVec::new(
            Opts::new(
                "verimesh_relay_fanout_total",
                "Relay fan-out sends by target kind",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(relay_fanout_total.clone()))?;

        let rejects_total = IntCounterVec::new(
            Opts::new(
                "verimesh_rejects_total",
                "Requests rejected at a boundary, by role and reason",
            ),
            &["role", "reason"],
        )?;
        registry.register(Box::new(rejects_total.clone()))?;

        let outcomes_recorded_total = IntCounterVec::new(
            Opts::new(
                "verimesh_outcomes_recorded_total",
                "Provider outcomes received by the auditor, by disposition",
            ),
            &["disposition"],
        )?;
        registry.register(Box::new(outcomes_recorded_total.clone()))?;

        let quorum_resolved_total = IntCounterVec::new(
            Opts::new(
                "verimesh_quorum_resolved_total",
                "Quorum records resolved, by result",
            ),
            &["result"],
        )?;
        registry.register(Box::new(quorum_resolved_total.clone()))?;

        let open_records = IntGauge::new(
            "verimesh_open_records",
            "Quorum records still short of the full provider set",
        )?;
        registry.register(Box::new(open_records.clone()))?;

        Ok(Self {
            ingress_requests_total,
            forward_jobs_total,
            relay_fanout_total,
            rejects_total,
            outcomes_recorded_total,
            quorum_resolved_total,
            open_records,
        })
    }

    /// Records one inbound request.
    pub fn ingress_request(&self, role: &str, status: &str) {
        self.ingress_requests_total
            .with_label_values(&[role, status])
            .inc();
    }

    /// Records a forward job transition (`enqueued`, `dropped`, `sent`,
    /// `failed`).
    pub fn forward_job(&self, status: &str) {
        self.forward_jobs_total.with_label_values(&[status]).inc();
    }

    /// Records a relay fan-out send (`provider`, `peer`, `outcome`).
    pub fn relay_fanout(&self, kind: &str) {
        self.relay_fanout_total.with_label_values(&[kind]).inc();
    }

    /// Records a boundary rejection.
    pub fn reject(&self, role: &str, reason: &str) {
        self.rejects_total.with_label_values(&[role, reason]).inc();
    }

    /// Records an outcome disposition at the auditor.
    pub fn outcome_recorded(&self, disposition: &str) {
        self.outcomes_recorded_total
            .with_label_values(&[disposition])
            .inc();
    }

    /// Records a quorum resolution.
    pub fn quorum_resolved(&self, success: bool) {
        let result = if success { "success" } else { "fail" };
        self.quorum_resolved_total
            .with_label_values(&[result])
            .inc();
    }

    /// Sets the open-record gauge.
    #[allow(clippy::cast_possible_wrap)]
    pub fn set_open_records(&self, count: usize) {
        self.open_records.set(count as i64);
    }
}

/// A registry bundled with its mesh metrics.
pub struct MetricsRegistry {
    registry: Registry,
    metrics: MeshMetrics,
}

/// Shared handle to the metrics registry.
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

/// Creates a shared registry with all families registered.
///
/// # Errors
///
/// Returns an error if metric registration fails.
pub fn new_shared_registry() -> MetricsResult<SharedMetricsRegistry> {
    let registry = Registry::new();
    let metrics = MeshMetrics::new(&registry)?;
    Ok(Arc::new(MetricsRegistry { registry, metrics }))
}

impl MetricsRegistry {
    /// The mesh metric families.
    #[must_use]
    pub fn mesh_metrics(&self) -> &MeshMetrics {
        &self.metrics
    }

    /// Encodes all metrics in Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}

/// Builds the `/metrics` router for one role's scrape endpoint.
#[must_use]
pub fn metrics_router(registry: SharedMetricsRegistry) -> axum::Router {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;

    let handler = move || {
        let registry = Arc::clone(&registry);
        async move {
            match registry.encode_text() {
                Ok(body) => (
                    StatusCode::OK,
                    [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                    body,
                )
                    .into_response(),
                Err(e) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("failed to encode metrics: {e}"),
                )
                    .into_response(),
            }
        }
    };

    axum::Router::new().route("/metrics", get(handler))
}
