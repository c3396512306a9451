//! verimesh-daemon - one mesh role per process.
//!
//! Every process loads the same mesh TOML, picks its node out by role and
//! id, and serves that role's endpoints until killed. A full mesh is a
//! handful of these processes plus the `verimesh-cli` driver.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use verimesh_core::{MeshConfig, ProviderBoundary, QuorumLedger};
use verimesh_daemon::auditor::{AuditorState, auditor_router};
use verimesh_daemon::binder::{BinderState, binder_router};
use verimesh_daemon::forward::Forwarder;
use verimesh_daemon::metrics::{SharedMetricsRegistry, metrics_router, new_shared_registry};
use verimesh_daemon::provider::{ProviderState, provider_router};
use verimesh_daemon::relay::{RelayState, relay_router};

/// verimesh daemon - verification-artifact mesh node
#[derive(Parser, Debug)]
#[command(name = "verimesh-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to mesh configuration file
    #[arg(short, long, default_value = "mesh.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Port for the Prometheus metrics HTTP endpoint
    #[arg(long, default_value = "9100")]
    metrics_port: u16,

    /// Disable the metrics HTTP endpoint
    #[arg(long)]
    no_metrics: bool,

    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Run a binder entry point
    Binder {
        /// Node id; may be omitted when the file configures exactly one
        #[arg(long)]
        id: Option<String>,
    },
    /// Run a relay mesh node
    Relay {
        /// Node id; may be omitted when the file configures exactly one
        #[arg(long)]
        id: Option<String>,
    },
    /// Run a provider boundary
    Provider {
        /// Provider id; may be omitted when the file configures exactly one
        #[arg(long)]
        id: Option<String>,
    },
    /// Run the quorum auditor
    Auditor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MeshConfig::from_file(&args.config)
        .with_context(|| format!("failed to load mesh configuration {}", args.config.display()))?;

    let registry = new_shared_registry().context("failed to build metrics registry")?;
    let metrics = registry.mesh_metrics().clone();
    let forwarder = Forwarder::spawn(&config.forward, metrics.clone())
        .context("failed to start forward pool")?;

    if !args.no_metrics {
        spawn_metrics_server(args.metrics_port, Arc::clone(&registry));
    }

    let (role_name, listen, router) = match &args.role {
        Role::Binder { id } => {
            let Some(node) = config.binder(id.as_deref()) else {
                bail!("no matching binder node in {}", args.config.display());
            };
            let state = Arc::new(BinderState {
                node_id: node.id.clone(),
                max_request_bytes: config.max_request_bytes,
                relay_endpoints: node.relay_endpoints.clone(),
                forwarder,
                metrics,
            });
            ("binder", node.listen.clone(), binder_router(state))
        },
        Role::Relay { id } => {
            let Some(node) = config.relay(id.as_deref()) else {
                bail!("no matching relay node in {}", args.config.display());
            };
            let state = Arc::new(RelayState {
                node_id: node.id.clone(),
                provider_endpoints: node.provider_endpoints.clone(),
                peer_endpoints: node.peer_endpoints.clone(),
                auditor_endpoint: node.auditor_endpoint.clone(),
                forwarder,
                metrics,
            });
            ("relay", node.listen.clone(), relay_router(state))
        },
        Role::Provider { id } => {
            let Some(node) = config.provider(id.as_deref()) else {
                bail!("no matching provider node in {}", args.config.display());
            };
            let boundary = ProviderBoundary::new(
                node.id.clone(),
                config.expected_context.clone(),
                node.model_seed.as_bytes(),
                node.signing_key.as_bytes(),
                config.thresholds_for(node),
                config.drift_plan_for(&node.id),
            );
            if boundary.drifts() {
                info!(provider_id = %node.id, "this instance carries the run's drift plan");
            }
            let state = Arc::new(ProviderState {
                boundary,
                auditor_endpoint: node.auditor_endpoint.clone(),
                forwarder,
                metrics,
            });
            ("provider", node.listen.clone(), provider_router(state))
        },
        Role::Auditor => {
            let Some(node) = &config.auditor else {
                bail!("no [auditor] section in {}", args.config.display());
            };
            let keys: BTreeMap<String, Vec<u8>> = node
                .keys
                .iter()
                .map(|(p, k)| (p.clone(), k.as_bytes().to_vec()))
                .collect();
            let ledger = QuorumLedger::new(node.quorum_k, &node.expected_providers, keys)
                .context("failed to build quorum ledger")?;
            let state = Arc::new(AuditorState {
                ledger: Mutex::new(ledger),
                metrics,
            });
            ("auditor", node.listen.clone(), auditor_router(state))
        },
    };

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    info!(role = role_name, addr = %listen, "mesh node listening");

    axum::serve(listener, router)
        .await
        .context("server error")?;

    Ok(())
}

/// Serves `/metrics` on its own port so scrapes never contend with mesh
/// traffic.
fn spawn_metrics_server(port: u16, registry: SharedMetricsRegistry) {
    tokio::spawn(async move {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let app: Router = metrics_router(registry);
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(addr = %addr, error = %e, "failed to bind metrics server");
                return;
            },
        };
        info!(addr = %addr, "metrics server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "metrics server error");
        }
    });
}
