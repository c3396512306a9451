//! The benchmark run driver.
//!
//! Drives `total_requests` submissions through the two configured entry
//! points, switching at the failover index, with a seeded mix of good and
//! adversarial requests. After the settle window it pulls the auditor's
//! tallies and prints the run report, including each provider's
//! disagreement rate so a drifting provider stands out.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use tracing::warn;
use verimesh_core::config::RunConfig;
use verimesh_core::workload::make_payload;
use verimesh_core::{EntryPoint, FailoverRouter, MeshConfig, RequestMode};

/// Categories cycled through the request corpus.
const CATEGORIES: [&str; 3] = ["payments", "storage", "compute"];

/// The category for one sequence number.
fn category_for(sequence: u64) -> &'static str {
    CATEGORIES[usize::try_from(sequence % CATEGORIES.len() as u64).unwrap_or(0)]
}

#[derive(Debug, Default)]
struct SendTally {
    good: u64,
    spoofed: u64,
    malformed: u64,
    oversized: u64,
    dropped: u64,
    delivery_failures: u64,
    unexpected_statuses: u64,
}

/// Fetches the auditor's `/stats` document.
pub async fn fetch_stats(client: &reqwest::Client, base: &str) -> Result<serde_json::Value> {
    let url = format!("{}/stats", base.trim_end_matches('/'));
    client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?
        .json()
        .await
        .context("auditor returned unparseable statistics")
}

/// Executes the configured run and prints the report.
pub async fn run(config: &MeshConfig) -> Result<()> {
    let Some(run) = &config.run else {
        bail!("configuration has no [run] section");
    };

    let client = reqwest::Client::new();
    let mut router = FailoverRouter::new(run.failover_at);
    let mut tally = SendTally::default();
    let started = Instant::now();

    for sequence in 0..run.total_requests {
        let mode = run.mix.pick(run.seed, sequence);
        let entry = match router.route(sequence) {
            EntryPoint::Primary => &run.entry_points[0],
            EntryPoint::Secondary => &run.entry_points[1],
        };
        drive_one(config, run, &client, &mut tally, sequence, mode, entry).await;
    }

    let elapsed = started.elapsed();
    tokio::time::sleep(Duration::from_millis(run.settle_ms)).await;
    let stats = fetch_stats(&client, &run.auditor_endpoint).await?;
    print_report(config, run, &tally, &stats, elapsed);
    Ok(())
}

async fn drive_one(
    config: &MeshConfig,
    run: &RunConfig,
    client: &reqwest::Client,
    tally: &mut SendTally,
    sequence: u64,
    mode: RequestMode,
    entry: &str,
) {
    let category = category_for(sequence);
    let (context, body, expected) = match mode {
        RequestMode::Good => {
            tally.good += 1;
            (
                config.expected_context.clone(),
                make_payload(sequence, category),
                StatusCode::NO_CONTENT,
            )
        },
        RequestMode::SpoofedContext => {
            tally.spoofed += 1;
            (
                "CTX_SPOOFED".to_string(),
                make_payload(sequence, category),
                StatusCode::NO_CONTENT,
            )
        },
        RequestMode::Oversized => {
            tally.oversized += 1;
            (
                config.expected_context.clone(),
                vec![0u8; config.max_request_bytes + 1],
                StatusCode::PAYLOAD_TOO_LARGE,
            )
        },
        RequestMode::Malformed => {
            tally.malformed += 1;
            // Unparsable artifact bytes, posted straight at a relay.
            let Some(relay) = &run.relay_endpoint else {
                return;
            };
            match client
                .post(relay)
                .body(format!("{{malformed artifact {sequence}"))
                .send()
                .await
            {
                Ok(response) if response.status() == StatusCode::NO_CONTENT => {},
                Ok(response) => {
                    warn!(sequence, status = %response.status(), "unexpected relay status");
                    tally.unexpected_statuses += 1;
                },
                Err(e) => {
                    warn!(sequence, error = %e, "relay injection failed");
                    tally.delivery_failures += 1;
                },
            }
            return;
        },
        RequestMode::DropForward => {
            tally.dropped += 1;
            return;
        },
    };

    let result = client
        .post(entry)
        .header("x-verification-context", context)
        .header("x-category", category)
        .header("x-sequence", sequence.to_string())
        .body(body)
        .send()
        .await;
    match result {
        Ok(response) if response.status() == expected => {},
        Ok(response) => {
            warn!(sequence, status = %response.status(), expected = %expected, "unexpected status");
            tally.unexpected_statuses += 1;
        },
        Err(e) => {
            warn!(sequence, error = %e, "submission failed");
            tally.delivery_failures += 1;
        },
    }
}

fn print_report(
    config: &MeshConfig,
    run: &RunConfig,
    tally: &SendTally,
    stats: &serde_json::Value,
    elapsed: Duration,
) {
    println!(
        "run complete: {} requests in {:.2}s, failover at {}",
        run.total_requests,
        elapsed.as_secs_f64(),
        run.failover_at
    );
    println!(
        "  sent: good={} spoofed={} malformed={} oversized={} dropped={}",
        tally.good, tally.spoofed, tally.malformed, tally.oversized, tally.dropped
    );
    if tally.delivery_failures > 0 || tally.unexpected_statuses > 0 {
        println!(
            "  anomalies: delivery_failures={} unexpected_statuses={}",
            tally.delivery_failures, tally.unexpected_statuses
        );
    }

    println!(
        "quorum: success={} fail={}",
        stats["quorum_success"], stats["quorum_fail"]
    );
    println!(
        "  rejected_signatures={} unknown_providers={} duplicate_votes={} category_conflicts={}",
        stats["rejected_signatures"],
        stats["unknown_providers"],
        stats["duplicate_votes"],
        stats["category_conflicts"]
    );

    if let Some(by_category) = stats["by_category"].as_object() {
        for (category, tally) in by_category {
            println!(
                "  category {category}: success={} fail={}",
                tally["success"], tally["fail"]
            );
        }
    }

    if let Some(by_provider) = stats["by_provider"].as_object() {
        for (provider, tally) in by_provider {
            let votes = tally["resolved_votes"].as_u64().unwrap_or(0);
            let disagreements = tally["disagreements"].as_u64().unwrap_or(0);
            #[allow(clippy::cast_precision_loss)]
            let rate = if votes == 0 {
                0.0
            } else {
                disagreements as f64 / votes as f64 * 100.0
            };
            println!(
                "  provider {provider}: votes={votes} disagreements={disagreements} ({rate:.1}%)"
            );
        }
    }

    if let Some(plan) = config.drift_plan() {
        println!(
            "drift plan: provider={} start_at={}",
            plan.provider_id, plan.start_at
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_cycle_deterministically() {
        assert_eq!(category_for(0), "payments");
        assert_eq!(category_for(1), "storage");
        assert_eq!(category_for(2), "compute");
        assert_eq!(category_for(3), "payments");
        assert_eq!(category_for(300), category_for(0));
    }
}
