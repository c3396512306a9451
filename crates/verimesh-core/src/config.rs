//! Configuration parsing and validation.
//!
//! One TOML file describes the whole mesh: every binder, relay, provider,
//! and the auditor, plus the run-level failover, drift, and workload-mix
//! parameters. Each process loads the same file at startup, picks out its
//! own node by role and id, and never mutates any of it afterwards.
//!
//! Validation is fail-closed: a file that names a drift provider the mesh
//! does not have, or a quorum threshold the provider set cannot meet,
//! refuses to load instead of degrading silently at runtime.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drift::DriftPlan;
use crate::score::ThresholdTable;
use crate::workload::MixWeights;

/// Default cap on inbound request bodies (64 KiB).
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Default outbound worker count for the fire-and-forget pool.
pub const DEFAULT_FORWARD_WORKERS: usize = 10;

/// Default bound on the outbound queue.
pub const DEFAULT_FORWARD_QUEUE: usize = 2000;

/// Default per-call timeout for outbound posts, in milliseconds.
pub const DEFAULT_FORWARD_TIMEOUT_MS: u64 = 2000;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantic validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Top-level mesh configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MeshConfig {
    /// Context value providers treat as expected when scoring.
    #[serde(default = "default_expected_context")]
    pub expected_context: String,

    /// Seed string feeding the deterministic drift schedule.
    #[serde(default = "default_run_seed")]
    pub run_seed: String,

    /// Maximum accepted request body, in bytes.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Outbound fire-and-forget pool settings.
    #[serde(default)]
    pub forward: ForwardConfig,

    /// Shared per-category thresholds (providers may override).
    #[serde(default)]
    pub thresholds: ThresholdTable,

    /// Binder entry points.
    #[serde(default)]
    pub binders: Vec<BinderConfig>,

    /// Relay mesh nodes.
    #[serde(default)]
    pub relays: Vec<RelayConfig>,

    /// Provider boundaries.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// The quorum auditor.
    #[serde(default)]
    pub auditor: Option<AuditorConfig>,

    /// Byzantine drift selection for this run.
    #[serde(default)]
    pub drift: Option<DriftConfig>,

    /// Benchmark driver settings.
    #[serde(default)]
    pub run: Option<RunConfig>,
}

/// Fire-and-forget pool settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForwardConfig {
    /// Number of outbound worker tasks.
    #[serde(default = "default_forward_workers")]
    pub workers: usize,

    /// Bound on the outbound job queue; saturation drops the newest job.
    #[serde(default = "default_forward_queue")]
    pub queue_capacity: usize,

    /// Per-call timeout in milliseconds; a timed-out call counts as a
    /// failed call.
    #[serde(default = "default_forward_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_FORWARD_WORKERS,
            queue_capacity: DEFAULT_FORWARD_QUEUE,
            request_timeout_ms: DEFAULT_FORWARD_TIMEOUT_MS,
        }
    }
}

/// One binder entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinderConfig {
    /// Unique node id.
    pub id: String,

    /// Listen address, e.g. `127.0.0.1:8010`.
    pub listen: String,

    /// Relay `/relay` endpoints to forward artifacts to.
    pub relay_endpoints: Vec<String>,
}

/// One relay mesh node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Unique node id.
    pub id: String,

    /// Listen address.
    pub listen: String,

    /// Provider `/ingest` endpoints for fan-out.
    pub provider_endpoints: Vec<String>,

    /// Peer relay `/relay` endpoints; peer-received artifacts are never
    /// re-relayed here.
    #[serde(default)]
    pub peer_endpoints: Vec<String>,

    /// Auditor `/outcome` endpoint for the observability sink.
    pub auditor_endpoint: String,
}

/// One provider boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider id; also the id outcomes are signed under.
    pub id: String,

    /// Listen address.
    pub listen: String,

    /// Auditor `/outcome` endpoint outcomes are reported to.
    pub auditor_endpoint: String,

    /// Seed for the keyed adaptive score. Provider-local.
    pub model_seed: String,

    /// Key outcomes are MAC-signed with. Shared only with the auditor.
    pub signing_key: String,

    /// Optional per-provider threshold override; falls back to the shared
    /// table.
    #[serde(default)]
    pub thresholds: Option<ThresholdTable>,
}

/// The quorum auditor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditorConfig {
    /// Listen address.
    pub listen: String,

    /// Minimum `initiated = true` votes for a successful quorum.
    pub quorum_k: usize,

    /// The full expected provider set.
    pub expected_providers: Vec<String>,

    /// MAC verification keys per provider id.
    pub keys: BTreeMap<String, String>,
}

/// How the drifting provider and start index are chosen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DriftConfig {
    /// Provider and start index both configured directly.
    Explicit {
        /// The drifting provider.
        provider: String,
        /// First drifting sequence.
        start_at: u64,
    },

    /// Provider configured; start index derived from the run seed so it
    /// lands after the failover point.
    Deterministic {
        /// The drifting provider.
        provider: String,
    },

    /// Provider and start index drawn once from a seeded RNG.
    Seeded {
        /// RNG seed for the draw.
        rng_seed: u64,
    },
}

/// Benchmark driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Total requests to drive.
    pub total_requests: u64,

    /// Sequence index at which the entry point switches.
    pub failover_at: u64,

    /// Exactly two binder `/submit` URLs: primary then secondary.
    pub entry_points: Vec<String>,

    /// Relay `/relay` URL used by the malformed-artifact mode.
    #[serde(default)]
    pub relay_endpoint: Option<String>,

    /// Auditor base URL for the end-of-run report.
    pub auditor_endpoint: String,

    /// Seed for the workload-mix draw.
    #[serde(default)]
    pub seed: u64,

    /// Milliseconds to wait after the last request before collecting the
    /// report, letting in-flight outcomes settle.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Request-mix weights.
    #[serde(default)]
    pub mix: MixWeights,
}

fn default_expected_context() -> String {
    "CTX_ALPHA".to_string()
}

fn default_run_seed() -> String {
    "VERIMESH_RUN_SEED_V1".to_string()
}

const fn default_max_request_bytes() -> usize {
    DEFAULT_MAX_REQUEST_BYTES
}

const fn default_forward_workers() -> usize {
    DEFAULT_FORWARD_WORKERS
}

const fn default_forward_queue() -> usize {
    DEFAULT_FORWARD_QUEUE
}

const fn default_forward_timeout_ms() -> u64 {
    DEFAULT_FORWARD_TIMEOUT_MS
}

const fn default_settle_ms() -> u64 {
    1500
}

impl MeshConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_request_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_request_bytes must be at least 1".to_string(),
            ));
        }
        if self.forward.workers == 0 {
            return Err(ConfigError::Validation(
                "forward.workers must be at least 1".to_string(),
            ));
        }
        if self.forward.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "forward.queue_capacity must be at least 1".to_string(),
            ));
        }

        let mut ids: Vec<&str> = Vec::new();
        for id in self
            .binders
            .iter()
            .map(|b| b.id.as_str())
            .chain(self.relays.iter().map(|r| r.id.as_str()))
            .chain(self.providers.iter().map(|p| p.id.as_str()))
        {
            if ids.contains(&id) {
                return Err(ConfigError::Validation(format!(
                    "duplicate node id: {id}"
                )));
            }
            ids.push(id);
        }

        if let Some(auditor) = &self.auditor {
            let n = auditor.expected_providers.len();
            if auditor.quorum_k == 0 || auditor.quorum_k > n {
                return Err(ConfigError::Validation(format!(
                    "auditor.quorum_k {} is outside 1..={n}",
                    auditor.quorum_k
                )));
            }
            for provider in &auditor.expected_providers {
                if !auditor.keys.contains_key(provider) {
                    return Err(ConfigError::Validation(format!(
                        "auditor.keys is missing expected provider {provider}"
                    )));
                }
            }
        }

        if let Some(drift) = &self.drift {
            let named = match drift {
                DriftConfig::Explicit { provider, .. }
                | DriftConfig::Deterministic { provider } => Some(provider),
                DriftConfig::Seeded { .. } => None,
            };
            if let Some(provider) = named {
                if !self.providers.iter().any(|p| &p.id == provider) {
                    return Err(ConfigError::Validation(format!(
                        "drift provider {provider} is not a configured provider"
                    )));
                }
            }
            if !matches!(drift, DriftConfig::Explicit { .. }) && self.run.is_none() {
                return Err(ConfigError::Validation(
                    "derived drift modes require a [run] section for the run length".to_string(),
                ));
            }
        }

        if let Some(run) = &self.run {
            if run.entry_points.len() != 2 {
                return Err(ConfigError::Validation(format!(
                    "run.entry_points must list exactly 2 binder URLs, got {}",
                    run.entry_points.len()
                )));
            }
            if run.failover_at > run.total_requests {
                return Err(ConfigError::Validation(format!(
                    "run.failover_at {} exceeds run.total_requests {}",
                    run.failover_at, run.total_requests
                )));
            }
            if run.mix.malformed > 0 && run.relay_endpoint.is_none() {
                return Err(ConfigError::Validation(
                    "run.mix.malformed requires run.relay_endpoint".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Resolves the run's drift plan, if any.
    ///
    /// Derived modes use the `[run]` section for the run length; explicit
    /// mode needs nothing beyond its own fields.
    #[must_use]
    pub fn drift_plan(&self) -> Option<DriftPlan> {
        let seed = self.run_seed.as_bytes();
        match self.drift.as_ref()? {
            DriftConfig::Explicit { provider, start_at } => {
                Some(DriftPlan::new(provider.clone(), *start_at, seed))
            },
            DriftConfig::Deterministic { provider } => {
                let run = self.run.as_ref()?;
                let start =
                    DriftPlan::deterministic_start(run.total_requests, run.failover_at, seed);
                Some(DriftPlan::new(provider.clone(), start, seed))
            },
            DriftConfig::Seeded { rng_seed } => {
                let run = self.run.as_ref()?;
                let providers: Vec<String> =
                    self.providers.iter().map(|p| p.id.clone()).collect();
                DriftPlan::seeded(&providers, run.total_requests, *rng_seed, seed)
            },
        }
    }

    /// The drift plan scoped to one provider instance, or `None` when that
    /// instance does not drift this run.
    #[must_use]
    pub fn drift_plan_for(&self, provider_id: &str) -> Option<DriftPlan> {
        self.drift_plan()
            .filter(|plan| plan.provider_id == provider_id)
    }

    /// Effective threshold table for a provider (override or shared).
    #[must_use]
    pub fn thresholds_for(&self, provider: &ProviderConfig) -> ThresholdTable {
        provider
            .thresholds
            .clone()
            .unwrap_or_else(|| self.thresholds.clone())
    }

    /// Finds a binder node by id, or the sole binder when `id` is `None`.
    #[must_use]
    pub fn binder(&self, id: Option<&str>) -> Option<&BinderConfig> {
        select_node(&self.binders, id, |b| &b.id)
    }

    /// Finds a relay node by id, or the sole relay when `id` is `None`.
    #[must_use]
    pub fn relay(&self, id: Option<&str>) -> Option<&RelayConfig> {
        select_node(&self.relays, id, |r| &r.id)
    }

    /// Finds a provider node by id, or the sole provider when `id` is
    /// `None`.
    #[must_use]
    pub fn provider(&self, id: Option<&str>) -> Option<&ProviderConfig> {
        select_node(&self.providers, id, |p| &p.id)
    }
}

fn select_node<'a, T>(
    nodes: &'a [T],
    id: Option<&str>,
    node_id: impl Fn(&T) -> &String,
) -> Option<&'a T> {
    match id {
        Some(id) => nodes.iter().find(|n| node_id(n) == id),
        None if nodes.len() == 1 => nodes.first(),
        None => None,
    }
}
