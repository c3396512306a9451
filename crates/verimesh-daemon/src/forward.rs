//! The bounded fire-and-forget forwarder.
//!
//! Every outbound call between mesh components goes through this pool: a
//! bounded mpsc queue drained by a fixed number of worker tasks, each
//! posting JSON with a bounded per-call timeout. Saturation drops the
//! newest job; send failures and timeouts are identical and both are
//! swallowed into metrics. Nothing upstream ever observes a forward's
//! fate, which is what keeps every ingress response constant.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use verimesh_core::config::ForwardConfig;

use crate::metrics::MeshMetrics;

/// One queued outbound post.
#[derive(Debug)]
pub struct ForwardJob {
    /// Target URL.
    pub url: String,
    /// JSON body.
    pub body: serde_json::Value,
}

/// Handle for enqueueing fire-and-forget posts.
#[derive(Clone)]
pub struct Forwarder {
    tx: mpsc::Sender<ForwardJob>,
    metrics: MeshMetrics,
}

impl Forwarder {
    /// Spawns the worker pool and returns the enqueue handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn spawn(config: &ForwardConfig, metrics: MeshMetrics) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for _ in 0..config.workers {
            let client = client.clone();
            let rx = Arc::clone(&rx);
            let metrics = metrics.clone();
            tokio::spawn(worker_loop(client, rx, metrics));
        }

        Ok(Self { tx, metrics })
    }

    /// Creates a forwarder backed by a raw channel with no workers; the
    /// caller drains the receiver. Used by tests to observe what would
    /// have been sent.
    #[must_use]
    pub fn detached(
        queue_capacity: usize,
        metrics: MeshMetrics,
    ) -> (Self, mpsc::Receiver<ForwardJob>) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        (Self { tx, metrics }, rx)
    }

    /// Enqueues one post. Never blocks and never fails the caller: a full
    /// queue drops the job (newest-dropped saturation policy).
    pub fn enqueue(&self, url: impl Into<String>, body: serde_json::Value) {
        let job = ForwardJob {
            url: url.into(),
            body,
        };
        match self.tx.try_send(job) {
            Ok(()) => self.metrics.forward_job("enqueued"),
            Err(TrySendError::Full(job)) => {
                self.metrics.forward_job("dropped");
                debug!(url = %job.url, "forward queue saturated, dropping job");
            },
            Err(TrySendError::Closed(job)) => {
                self.metrics.forward_job("dropped");
                debug!(url = %job.url, "forward pool stopped, dropping job");
            },
        }
    }
}

/// Drains the shared queue and posts each job.
///
/// The mutex is held only for the dequeue; the HTTP call happens outside
/// it so workers post concurrently.
async fn worker_loop(
    client: reqwest::Client,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<ForwardJob>>>,
    metrics: MeshMetrics,
) {
    loop {
        let job = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(job) = job else {
            break;
        };
        match client.post(&job.url).json(&job.body).send().await {
            Ok(response) if response.status().is_success() => metrics.forward_job("sent"),
            Ok(response) => {
                metrics.forward_job("failed");
                debug!(url = %job.url, status = %response.status(), "forward rejected");
            },
            Err(e) => {
                metrics.forward_job("failed");
                debug!(url = %job.url, error = %e, "forward failed");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::new_shared_registry;

    fn test_metrics() -> MeshMetrics {
        new_shared_registry().unwrap().mesh_metrics().clone()
    }

    #[tokio::test]
    async fn enqueue_delivers_within_capacity() {
        let (forwarder, mut rx) = Forwarder::detached(8, test_metrics());
        forwarder.enqueue("http://127.0.0.1:1/ingest", serde_json::json!({"a": 1}));
        forwarder.enqueue("http://127.0.0.1:2/ingest", serde_json::json!({"a": 2}));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.url, "http://127.0.0.1:1/ingest");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.body["a"], 2);
    }

    #[tokio::test]
    async fn saturation_drops_the_newest_job() {
        let (forwarder, mut rx) = Forwarder::detached(2, test_metrics());
        for i in 0..5 {
            forwarder.enqueue("http://127.0.0.1:1/ingest", serde_json::json!({"i": i}));
        }
        // Only the first two jobs fit; the rest were dropped, not queued.
        assert_eq!(rx.recv().await.unwrap().body["i"], 0);
        assert_eq!(rx.recv().await.unwrap().body["i"], 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn enqueue_never_fails_after_receiver_drop() {
        let (forwarder, rx) = Forwarder::detached(2, test_metrics());
        drop(rx);
        // Must not panic or error; the drop is only visible in metrics.
        forwarder.enqueue("http://127.0.0.1:1/ingest", serde_json::json!({}));
    }

    #[tokio::test]
    async fn dropped_jobs_are_counted() {
        let registry = new_shared_registry().unwrap();
        let (forwarder, _rx) = Forwarder::detached(1, registry.mesh_metrics().clone());
        forwarder.enqueue("http://127.0.0.1:1/a", serde_json::json!({}));
        forwarder.enqueue("http://127.0.0.1:1/b", serde_json::json!({}));

        let text = registry.encode_text().unwrap();
        assert!(text.contains(r#"verimesh_forward_jobs_total{status="dropped"} 1"#));
        assert!(text.contains(r#"verimesh_forward_jobs_total{status="enqueued"} 1"#));
    }
}
