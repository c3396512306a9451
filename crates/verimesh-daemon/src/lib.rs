//! verimesh-daemon - Verification-artifact mesh services.
//!
//! This crate hosts the four network roles of the pipeline as independent
//! tokio services sharing one binary:
//!
//! - [`binder`]: derives artifacts from opaque requests and forwards them
//! - [`relay`]: mechanical fan-out to providers and peer relays
//! - [`provider`]: the decision boundary, wired to `verimesh-core`
//! - [`auditor`]: the observational quorum ledger
//!
//! Cross-component traffic is strictly fire-and-forget: every outbound
//! call goes through the bounded [`forward`] pool and failures are
//! swallowed into metrics. No role ever blocks on another role's result,
//! and no acknowledgment anywhere reflects downstream success.
//!
//! Each role exposes Prometheus metrics (see [`metrics`]) on a separate
//! port so a scrape can observe the whole mesh.

pub mod auditor;
pub mod binder;
pub mod forward;
pub mod metrics;
pub mod provider;
pub mod relay;
