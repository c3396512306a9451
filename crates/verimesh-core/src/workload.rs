//! Seeded request-mix selection for the benchmark driver.
//!
//! The driver exercises failure paths alongside the happy path by choosing
//! a mode per request: a valid submission, a spoofed context, malformed
//! artifact bytes posted straight at a relay, an oversized body, or a
//! deliberately dropped send. The choice is a pure function of the run
//! seed, the sequence number, and the configured weights; replays of the
//! same run pick the same modes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// What the driver does with one sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    /// Valid request with the expected context.
    Good,
    /// Valid request with a spoofed context; providers will score it
    /// without the boost and the binding still matches its own tuple.
    SpoofedContext,
    /// Unparsable artifact bytes posted directly to a relay.
    Malformed,
    /// Body one byte over the binder's maximum; expects the fixed
    /// rejection status.
    Oversized,
    /// The send is skipped entirely; downstream sees nothing.
    DropForward,
}

/// Relative weights for the mode draw. All-zero weights degenerate to
/// [`RequestMode::Good`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixWeights {
    /// Weight of [`RequestMode::Good`].
    #[serde(default = "default_good_weight")]
    pub good: u32,
    /// Weight of [`RequestMode::SpoofedContext`].
    #[serde(default)]
    pub spoofed_context: u32,
    /// Weight of [`RequestMode::Malformed`].
    #[serde(default)]
    pub malformed: u32,
    /// Weight of [`RequestMode::Oversized`].
    #[serde(default)]
    pub oversized: u32,
    /// Weight of [`RequestMode::DropForward`].
    #[serde(default)]
    pub drop_forward: u32,
}

const fn default_good_weight() -> u32 {
    1
}

impl Default for MixWeights {
    fn default() -> Self {
        Self {
            good: 1,
            spoofed_context: 0,
            malformed: 0,
            oversized: 0,
            drop_forward: 0,
        }
    }
}

impl MixWeights {
    /// Picks the mode for `sequence` under `seed`.
    #[must_use]
    pub fn pick(&self, seed: u64, sequence: u64) -> RequestMode {
        let total = u64::from(self.good)
            + u64::from(self.spoofed_context)
            + u64::from(self.malformed)
            + u64::from(self.oversized)
            + u64::from(self.drop_forward);
        if total == 0 {
            return RequestMode::Good;
        }

        // One short-lived RNG per (seed, sequence) keeps the pick a pure
        // function of its inputs instead of a stateful stream.
        let mut rng = StdRng::seed_from_u64(seed ^ sequence.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let mut draw = rng.gen_range(0..total);

        for (weight, mode) in [
            (u64::from(self.good), RequestMode::Good),
            (u64::from(self.spoofed_context), RequestMode::SpoofedContext),
            (u64::from(self.malformed), RequestMode::Malformed),
            (u64::from(self.oversized), RequestMode::Oversized),
            (u64::from(self.drop_forward), RequestMode::DropForward),
        ] {
            if draw < weight {
                return mode;
            }
            draw -= weight;
        }
        RequestMode::Good
    }
}

/// Builds the deterministic request payload for one sequence number.
///
/// The corpus is reproducible so repeated runs produce identical
/// fingerprints end to end.
#[must_use]
pub fn make_payload(sequence: u64, category: &str) -> Vec<u8> {
    let body = serde_json::json!({
        "op": "dispatch",
        "seq": sequence,
        "category": category,
        "amount": 100 + (sequence % 7),
        "to": format!("acct_{}", 1000 + (sequence % 23)),
    });
    body.to_string().into_bytes()
}
