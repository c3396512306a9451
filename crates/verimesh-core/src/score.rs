//! Keyed adaptive scoring and per-category thresholds.
//!
//! The score stands in for a provider's real adaptive evaluation: a
//! deterministic pseudo-random value in `[0, 1]` derived from the
//! provider's model seed and the artifact tuple. Each provider holds its
//! own seed, so the same artifact lands differently at each boundary, and
//! the same artifact always lands identically at the same boundary.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Modulus mapping the keyed digest into the unit interval. Seven decimal
/// digits of resolution, matching the original evaluation.
pub const SCORE_MODULUS: u64 = 10_000_000;

/// Additive boost applied when the artifact's context matches the
/// provider's expected context, capped at 1.0.
pub const CONTEXT_MATCH_BOOST: f64 = 0.15;

/// Threshold applied to categories with no explicit entry.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Computes the keyed score for an artifact at one provider boundary.
///
/// The digest is HMAC-SHA256 under the provider's model seed over
/// `provider_id | category | fingerprint | context`; the first eight bytes
/// are reduced modulo [`SCORE_MODULUS`] into `[0, 1)`, then boosted by
/// [`CONTEXT_MATCH_BOOST`] when the context matches `expected_context`.
#[must_use]
pub fn keyed_score(
    model_seed: &[u8],
    provider_id: &str,
    category: &str,
    fingerprint: &str,
    context: &str,
    expected_context: &str,
) -> f64 {
    let mut mac = HmacSha256::new_from_slice(model_seed).expect("HMAC key should be valid");
    mac.update(provider_id.as_bytes());
    mac.update(b"|");
    mac.update(category.as_bytes());
    mac.update(b"|");
    mac.update(fingerprint.as_bytes());
    mac.update(b"|");
    mac.update(context.as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let n = u64::from_be_bytes(prefix);

    #[allow(clippy::cast_precision_loss)]
    let base = (n % SCORE_MODULUS) as f64 / SCORE_MODULUS as f64;
    if context == expected_context {
        (base + CONTEXT_MATCH_BOOST).min(1.0)
    } else {
        base
    }
}

/// Per-category initiation thresholds with a default fallback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdTable {
    /// Explicit per-category thresholds.
    #[serde(default)]
    pub categories: BTreeMap<String, f64>,

    /// Threshold for categories without an explicit entry.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

const fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            categories: BTreeMap::new(),
            default_threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ThresholdTable {
    /// Looks up the threshold for a category.
    #[must_use]
    pub fn threshold_for(&self, category: &str) -> f64 {
        self.categories
            .get(category)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}
