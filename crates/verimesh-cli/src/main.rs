//! verimesh - benchmark driver and query client for the mesh.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use verimesh_core::MeshConfig;

mod driver;

/// verimesh - verification-artifact mesh driver
#[derive(Parser, Debug)]
#[command(name = "verimesh")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to mesh configuration file
    #[arg(short, long, default_value = "mesh.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive the configured run against a live mesh and print the report
    Run,

    /// Submit one ad-hoc request through a binder
    Submit {
        /// Binder /submit URL
        #[arg(long)]
        url: String,

        /// Verification context header
        #[arg(long, default_value = "CTX_ALPHA")]
        context: String,

        /// Category header
        #[arg(long, default_value = "default")]
        category: String,

        /// Sequence header
        #[arg(long, default_value = "0")]
        sequence: u64,

        /// Request body
        payload: String,
    },

    /// Fetch and print the auditor's run statistics
    Stats {
        /// Auditor base URL; defaults to the configured run target
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Run => {
            let config = MeshConfig::from_file(&cli.config).with_context(|| {
                format!("failed to load mesh configuration {}", cli.config.display())
            })?;
            driver::run(&config).await
        },
        Commands::Submit {
            url,
            context,
            category,
            sequence,
            payload,
        } => {
            let client = reqwest::Client::new();
            let response = client
                .post(&url)
                .header("x-verification-context", context)
                .header("x-category", category)
                .header("x-sequence", sequence.to_string())
                .body(payload)
                .send()
                .await
                .with_context(|| format!("failed to reach {url}"))?;
            println!("{}", response.status());
            Ok(())
        },
        Commands::Stats { url } => {
            let base = match url {
                Some(url) => url,
                None => {
                    let config = MeshConfig::from_file(&cli.config).with_context(|| {
                        format!("failed to load mesh configuration {}", cli.config.display())
                    })?;
                    let Some(run) = config.run else {
                        bail!("no --url given and no [run] section in the configuration");
                    };
                    run.auditor_endpoint
                },
            };
            let stats = driver::fetch_stats(&reqwest::Client::new(), &base).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        },
    }
}
