//! verimesh-core - Verification-artifact pipeline kernel.
//!
//! This crate holds the pure logic of the verimesh pipeline: a stateless
//! binder derives a deterministic artifact from an opaque request, a relay
//! mesh conveys it without interpretation, independent provider boundaries
//! evaluate it against local adaptive thresholds, and a non-authoritative
//! auditor aggregates provider-signed outcomes into a k-of-n quorum
//! judgment. Regional failover and Byzantine reporting drift are layered on
//! top as run-level controls.
//!
//! Nothing in this crate performs I/O. The network services in
//! `verimesh-daemon` and the benchmark driver in `verimesh-cli` are thin
//! shells over these types.
//!
//! # Modules
//!
//! - [`artifact`]: request fingerprinting and the immutable artifact model
//! - [`binding`]: the deterministic binding transform and tamper check
//! - [`score`]: keyed adaptive scoring and per-category thresholds
//! - [`outcome`]: provider-signed outcome records and MAC verification
//! - [`boundary`]: the provider decision pipeline
//! - [`quorum`]: the auditor's vote ledger and disagreement statistics
//! - [`failover`]: the one-shot entry-point router
//! - [`drift`]: Byzantine drift plan selection and flip schedule
//! - [`workload`]: seeded request-mix selection for the benchmark driver
//! - [`config`]: the immutable startup configuration surface

pub mod artifact;
pub mod binding;
pub mod boundary;
pub mod config;
pub mod drift;
pub mod failover;
pub mod outcome;
pub mod quorum;
pub mod score;
pub mod workload;

pub use artifact::{Artifact, ArtifactError, Fingerprint, check_request_size, fingerprint};
pub use binding::{bind, binding_matches};
pub use boundary::{Evaluation, ProviderBoundary};
pub use config::{ConfigError, MeshConfig};
pub use drift::DriftPlan;
pub use failover::{EntryPoint, FailoverRouter, RoutingPhase};
pub use outcome::{ProviderOutcome, sign_outcome, verify_outcome};
pub use quorum::{QuorumLedger, QuorumRecord, RecordDisposition, RecordState};
pub use score::{ThresholdTable, keyed_score};
pub use workload::{MixWeights, RequestMode};
