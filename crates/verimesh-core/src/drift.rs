//! Byzantine drift plan selection and flip schedule.
//!
//! Exactly one provider per run may carry a drift plan. From `start_at`
//! onward, that provider's *reported* decision is inverted on a
//! deterministic schedule while its internal decision is unchanged; this
//! models a reporting-channel fault, not an execution fault. The plan is
//! chosen once at startup (deterministically from the run seed, or via a
//! seeded random draw) and is immutable for the rest of the run.

use hmac::{Hmac, Mac};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Label under which the deterministic start index is derived.
const START_LABEL: &[u8] = b"BYZ_START";

/// Lower fraction of the run for the seeded start draw.
const SEEDED_START_LO: f64 = 0.55;

/// Upper fraction of the run for the seeded start draw.
const SEEDED_START_HI: f64 = 0.9;

/// The drift configuration fixed for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftPlan {
    /// The single provider whose reporting channel drifts.
    pub provider_id: String,

    /// First sequence number at which drift applies.
    pub start_at: u64,

    /// Run seed feeding the per-sequence flip schedule.
    run_seed: Vec<u8>,
}

impl DriftPlan {
    /// Builds a plan with an explicitly configured provider and start.
    #[must_use]
    pub fn new(provider_id: impl Into<String>, start_at: u64, run_seed: &[u8]) -> Self {
        Self {
            provider_id: provider_id.into(),
            start_at,
            run_seed: run_seed.to_vec(),
        }
    }

    /// Derives the drift start index deterministically from the run seed.
    ///
    /// The start always lands after the failover point when the run is long
    /// enough: the offset is the first byte of `HMAC(run_seed, "BYZ_START")`
    /// reduced into the remaining span.
    #[must_use]
    pub fn deterministic_start(total_requests: u64, failover_at: u64, run_seed: &[u8]) -> u64 {
        if total_requests <= 1 {
            return 0;
        }
        let lo = (failover_at + 1).min(total_requests - 1);
        let span = (total_requests - lo).max(1);

        let mut mac = HmacSha256::new_from_slice(run_seed).expect("HMAC key should be valid");
        mac.update(START_LABEL);
        let digest = mac.finalize().into_bytes();
        lo + u64::from(digest[0]) % span
    }

    /// Draws a provider and start index once from a seeded RNG.
    ///
    /// The start falls in the 55%-90% window of the run so the drifted and
    /// undrifted regimes are both observable. Same seed, same draw.
    ///
    /// Returns `None` when `providers` is empty.
    #[must_use]
    pub fn seeded(
        providers: &[String],
        total_requests: u64,
        rng_seed: u64,
        run_seed: &[u8],
    ) -> Option<Self> {
        let mut rng = StdRng::seed_from_u64(rng_seed);
        let provider_id = providers.choose(&mut rng)?.clone();
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (lo, hi) = (
            (total_requests as f64 * SEEDED_START_LO) as u64,
            (total_requests as f64 * SEEDED_START_HI) as u64,
        );
        let start_at = rng.gen_range(lo..=hi.max(lo));
        Some(Self::new(provider_id, start_at, run_seed))
    }

    /// Whether the reported decision for `sequence` is inverted.
    ///
    /// Before `start_at` nothing drifts. From `start_at` onward the low bit
    /// of `HMAC(run_seed, "FLIP|{sequence}")` selects roughly half of the
    /// sequences, deterministically.
    #[must_use]
    pub fn flips(&self, sequence: u64) -> bool {
        if sequence < self.start_at {
            return false;
        }
        let mut mac =
            HmacSha256::new_from_slice(&self.run_seed).expect("HMAC key should be valid");
        mac.update(format!("FLIP|{sequence}").as_bytes());
        let digest = mac.finalize().into_bytes();
        digest[0] & 1 == 1
    }
}
