//! The auditor's vote ledger.
//!
//! The ledger aggregates provider-signed outcomes into per-fingerprint
//! quorum records and keeps the run's observability tallies. It is
//! strictly observational: nothing here initiates work or communicates
//! back to the components that produced the votes.
//!
//! Aggregation is a monotonic merge over a commutative vote set, so
//! resolution is independent of arrival order. Duplicate votes from the
//! same provider are idempotently ignored (first vote wins), which keeps
//! the merge monotonic under at-least-once delivery.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::outcome::{ProviderOutcome, verify_outcome};

/// Errors raised when constructing a ledger.
#[derive(Debug, Error)]
pub enum QuorumError {
    /// The quorum threshold is outside `1..=n`.
    #[error("quorum threshold {k} is outside 1..={n}")]
    InvalidThreshold {
        /// Configured threshold.
        k: usize,
        /// Number of expected providers.
        n: usize,
    },

    /// An expected provider has no verification key.
    #[error("no verification key configured for expected provider {0}")]
    MissingKey(String),
}

/// Resolution state of a quorum record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordState {
    /// Fewer than the full expected provider set has voted.
    Open,
    /// All expected providers voted; the result is final.
    Resolved {
        /// Whether at least `k` providers reported `initiated = true`.
        success: bool,
    },
}

/// The vote set for one fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumRecord {
    /// Category of the artifact, fixed by the first vote to arrive.
    pub category: String,

    /// Votes keyed by provider id.
    pub votes: BTreeMap<String, bool>,

    /// Open or resolved; never transitions back.
    pub state: RecordState,
}

impl QuorumRecord {
    fn new(category: String) -> Self {
        Self {
            category,
            votes: BTreeMap::new(),
            state: RecordState::Open,
        }
    }

    /// Number of `initiated = true` votes.
    #[must_use]
    pub fn trues(&self) -> usize {
        self.votes.values().filter(|v| **v).count()
    }
}

/// What the ledger did with a submitted outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDisposition {
    /// Vote accepted; record still open.
    Accepted,
    /// Vote accepted and it completed the expected set; record resolved.
    Resolved {
        /// The quorum result.
        success: bool,
    },
    /// Signature did not verify under the claimed provider's key.
    RejectedSignature,
    /// The claimed provider is not in the expected set.
    UnknownProvider,
    /// This provider already voted for this fingerprint.
    DuplicateVote,
    /// The record was already resolved; the vote is ignored.
    AlreadyResolved,
}

impl RecordDisposition {
    /// Stable label for metrics and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Resolved { .. } => "resolved",
            Self::RejectedSignature => "rejected_signature",
            Self::UnknownProvider => "unknown_provider",
            Self::DuplicateVote => "duplicate_vote",
            Self::AlreadyResolved => "already_resolved",
        }
    }
}

/// Success/failure tally for one category.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryTally {
    /// Resolved records with a successful quorum.
    pub success: u64,
    /// Resolved records without one.
    pub fail: u64,
}

/// Per-provider participation and disagreement counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProviderTally {
    /// Votes this provider contributed to resolved records.
    pub resolved_votes: u64,
    /// Of those, votes that differed from the quorum result.
    pub disagreements: u64,
}

impl ProviderTally {
    /// Disagreement rate in `[0, 1]`; zero when no resolved votes exist.
    #[must_use]
    pub fn disagreement_rate(&self) -> f64 {
        if self.resolved_votes == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.disagreements as f64 / self.resolved_votes as f64
        }
    }
}

/// Running tallies across the whole run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuorumStats {
    /// Resolved records with `trues >= k`.
    pub quorum_success: u64,

    /// Resolved records with `trues < k`.
    pub quorum_fail: u64,

    /// Outcomes dropped for a bad signature.
    pub rejected_signatures: u64,

    /// Outcomes dropped for an unknown provider id.
    pub unknown_providers: u64,

    /// Duplicate votes ignored.
    pub duplicate_votes: u64,

    /// Votes whose category disagreed with the record's first vote. A
    /// detectable anomaly among honest providers, not a crash.
    pub category_conflicts: u64,

    /// Per-category success/failure tallies.
    pub by_category: BTreeMap<String, CategoryTally>,

    /// Per-provider participation and disagreement.
    pub by_provider: BTreeMap<String, ProviderTally>,
}

/// The auditor's record table plus verification key material.
pub struct QuorumLedger {
    quorum_k: usize,
    /// Expected provider set and their MAC verification keys.
    keys: BTreeMap<String, Vec<u8>>,
    records: BTreeMap<String, QuorumRecord>,
    stats: QuorumStats,
}

impl QuorumLedger {
    /// Builds a ledger for the expected provider set.
    ///
    /// # Errors
    ///
    /// Returns [`QuorumError::InvalidThreshold`] when `quorum_k` is outside
    /// `1..=n`, or [`QuorumError::MissingKey`] when an expected provider
    /// has no key.
    pub fn new(
        quorum_k: usize,
        expected_providers: &[String],
        keys: BTreeMap<String, Vec<u8>>,
    ) -> Result<Self, QuorumError> {
        let n = expected_providers.len();
        if quorum_k == 0 || quorum_k > n {
            return Err(QuorumError::InvalidThreshold { k: quorum_k, n });
        }
        for provider in expected_providers {
            if !keys.contains_key(provider) {
                return Err(QuorumError::MissingKey(provider.clone()));
            }
        }
        let keys = expected_providers
            .iter()
            .filter_map(|p| keys.get(p).map(|k| (p.clone(), k.clone())))
            .collect();
        Ok(Self {
            quorum_k,
            keys,
            records: BTreeMap::new(),
            stats: QuorumStats::default(),
        })
    }

    /// Number of expected providers.
    #[must_use]
    pub fn expected_voters(&self) -> usize {
        self.keys.len()
    }

    /// Records one provider outcome.
    ///
    /// Signature verification happens before anything is written: an
    /// outcome that fails it never touches a record or a tally other than
    /// the rejection counters.
    pub fn record(&mut self, outcome: &ProviderOutcome) -> RecordDisposition {
        let Some(key) = self.keys.get(&outcome.provider_id) else {
            self.stats.unknown_providers += 1;
            return RecordDisposition::UnknownProvider;
        };
        if !verify_outcome(key, outcome) {
            self.stats.rejected_signatures += 1;
            warn!(
                provider_id = %outcome.provider_id,
                fingerprint = %outcome.fingerprint,
                "outcome signature rejected"
            );
            return RecordDisposition::RejectedSignature;
        }

        let record = self
            .records
            .entry(outcome.fingerprint.clone())
            .or_insert_with(|| QuorumRecord::new(outcome.category.clone()));

        if matches!(record.state, RecordState::Resolved { .. }) {
            return RecordDisposition::AlreadyResolved;
        }
        if record.votes.contains_key(&outcome.provider_id) {
            self.stats.duplicate_votes += 1;
            return RecordDisposition::DuplicateVote;
        }
        if record.category != outcome.category {
            self.stats.category_conflicts += 1;
            warn!(
                fingerprint = %outcome.fingerprint,
                expected = %record.category,
                got = %outcome.category,
                "category conflict across provider votes"
            );
        }

        record
            .votes
            .insert(outcome.provider_id.clone(), outcome.initiated);

        if record.votes.len() < self.keys.len() {
            return RecordDisposition::Accepted;
        }

        // Full expected set present: resolve once, permanently.
        let success = record.trues() >= self.quorum_k;
        record.state = RecordState::Resolved { success };

        if success {
            self.stats.quorum_success += 1;
        } else {
            self.stats.quorum_fail += 1;
        }
        let tally = self
            .stats
            .by_category
            .entry(record.category.clone())
            .or_default();
        if success {
            tally.success += 1;
        } else {
            tally.fail += 1;
        }
        for (provider, vote) in &record.votes {
            let entry = self.stats.by_provider.entry(provider.clone()).or_default();
            entry.resolved_votes += 1;
            if *vote != success {
                entry.disagreements += 1;
            }
        }

        RecordDisposition::Resolved { success }
    }

    /// Looks up the record for a fingerprint.
    #[must_use]
    pub fn get(&self, fingerprint: &str) -> Option<&QuorumRecord> {
        self.records.get(fingerprint)
    }

    /// The running tallies.
    #[must_use]
    pub fn stats(&self) -> &QuorumStats {
        &self.stats
    }

    /// Number of records still short of the full expected set.
    #[must_use]
    pub fn open_records(&self) -> usize {
        self.records
            .values()
            .filter(|r| matches!(r.state, RecordState::Open))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::sign_outcome;

    const KEY_A: &[u8] = b"A_KEY";
    const KEY_B: &[u8] = b"B_KEY";
    const KEY_C: &[u8] = b"C_KEY";

    fn providers() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    fn keys() -> BTreeMap<String, Vec<u8>> {
        [
            ("A".to_string(), KEY_A.to_vec()),
            ("B".to_string(), KEY_B.to_vec()),
            ("C".to_string(), KEY_C.to_vec()),
        ]
        .into_iter()
        .collect()
    }

    fn ledger(k: usize) -> QuorumLedger {
        QuorumLedger::new(k, &providers(), keys()).unwrap()
    }

    fn vote(provider: &str, key: &[u8], fingerprint: &str, initiated: bool) -> ProviderOutcome {
        ProviderOutcome {
            provider_id: provider.to_string(),
            fingerprint: fingerprint.to_string(),
            category: "payments".to_string(),
            sequence: 0,
            initiated,
            signature: sign_outcome(key, fingerprint, initiated),
        }
    }

    #[test]
    fn two_of_three_majority_resolves_success() {
        let mut ledger = ledger(2);
        let fp = crate::artifact::fingerprint(b"F");

        assert_eq!(
            ledger.record(&vote("A", KEY_A, &fp, true)),
            RecordDisposition::Accepted
        );
        assert_eq!(
            ledger.record(&vote("B", KEY_B, &fp, true)),
            RecordDisposition::Accepted
        );
        assert_eq!(
            ledger.record(&vote("C", KEY_C, &fp, false)),
            RecordDisposition::Resolved { success: true }
        );

        let stats = ledger.stats();
        assert_eq!(stats.quorum_success, 1);
        assert_eq!(stats.quorum_fail, 0);
        assert_eq!(stats.by_category["payments"].success, 1);
        // C voted against the resolved result.
        assert_eq!(stats.by_provider["C"].disagreements, 1);
        assert_eq!(stats.by_provider["C"].resolved_votes, 1);
        assert_eq!(stats.by_provider["A"].disagreements, 0);
        assert_eq!(stats.by_provider["B"].disagreements, 0);
    }

    #[test]
    fn minority_true_resolves_failure() {
        let mut ledger = ledger(2);
        let fp = crate::artifact::fingerprint(b"F");

        ledger.record(&vote("A", KEY_A, &fp, true));
        ledger.record(&vote("B", KEY_B, &fp, false));
        assert_eq!(
            ledger.record(&vote("C", KEY_C, &fp, false)),
            RecordDisposition::Resolved { success: false }
        );
        assert_eq!(ledger.stats().quorum_fail, 1);
        assert_eq!(ledger.stats().by_provider["A"].disagreements, 1);
    }

    #[test]
    fn bad_signature_never_reaches_a_record() {
        let mut ledger = ledger(2);
        let fp = crate::artifact::fingerprint(b"F");

        let mut forged = vote("A", KEY_A, &fp, true);
        forged.signature = sign_outcome(b"WRONG_KEY", &fp, true);
        assert_eq!(
            ledger.record(&forged),
            RecordDisposition::RejectedSignature
        );
        assert_eq!(ledger.stats().rejected_signatures, 1);
        assert!(ledger.get(&fp).is_none());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut ledger = ledger(2);
        let fp = crate::artifact::fingerprint(b"F");
        let outcome = vote("EVE", b"EVE_KEY", &fp, true);
        assert_eq!(ledger.record(&outcome), RecordDisposition::UnknownProvider);
        assert_eq!(ledger.stats().unknown_providers, 1);
    }

    #[test]
    fn duplicate_votes_are_idempotently_ignored() {
        let mut ledger = ledger(2);
        let fp = crate::artifact::fingerprint(b"F");

        ledger.record(&vote("A", KEY_A, &fp, true));
        // A tries to flip its vote; the first vote stands.
        assert_eq!(
            ledger.record(&vote("A", KEY_A, &fp, false)),
            RecordDisposition::DuplicateVote
        );
        ledger.record(&vote("B", KEY_B, &fp, true));
        let disposition = ledger.record(&vote("C", KEY_C, &fp, false));
        assert_eq!(disposition, RecordDisposition::Resolved { success: true });
        assert_eq!(ledger.stats().duplicate_votes, 1);
    }

    #[test]
    fn resolved_records_never_reopen() {
        let mut ledger = ledger(2);
        let fp = crate::artifact::fingerprint(b"F");
        ledger.record(&vote("A", KEY_A, &fp, true));
        ledger.record(&vote("B", KEY_B, &fp, true));
        ledger.record(&vote("C", KEY_C, &fp, true));

        assert_eq!(
            ledger.record(&vote("A", KEY_A, &fp, false)),
            RecordDisposition::AlreadyResolved
        );
        assert_eq!(ledger.stats().quorum_success, 1);
    }

    #[test]
    fn partial_records_stay_open_indefinitely() {
        let mut ledger = ledger(2);
        let fp = crate::artifact::fingerprint(b"F");
        ledger.record(&vote("A", KEY_A, &fp, true));
        assert_eq!(ledger.open_records(), 1);
        assert!(matches!(ledger.get(&fp).unwrap().state, RecordState::Open));
        assert_eq!(ledger.stats().quorum_success + ledger.stats().quorum_fail, 0);
    }

    #[test]
    fn category_is_first_vote_wins_and_conflicts_are_counted() {
        let mut ledger = ledger(2);
        let fp = crate::artifact::fingerprint(b"F");
        ledger.record(&vote("A", KEY_A, &fp, true));

        let mut conflicting = vote("B", KEY_B, &fp, true);
        conflicting.category = "storage".to_string();
        ledger.record(&conflicting);

        assert_eq!(ledger.stats().category_conflicts, 1);
        assert_eq!(ledger.get(&fp).unwrap().category, "payments");
    }

    #[test]
    fn threshold_validation_is_fail_closed() {
        assert!(matches!(
            QuorumLedger::new(0, &providers(), keys()),
            Err(QuorumError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            QuorumLedger::new(4, &providers(), keys()),
            Err(QuorumError::InvalidThreshold { .. })
        ));
        let mut missing = keys();
        missing.remove("B");
        assert!(matches!(
            QuorumLedger::new(2, &providers(), missing),
            Err(QuorumError::MissingKey(_))
        ));
    }
}


#[cfg(test)]
mod tests_support {
    use std::collections::BTreeMap;

    use super::{QuorumLedger, RecordState};
    use crate::outcome::{ProviderOutcome, sign_outcome};

    pub fn test_ledger(k: usize) -> QuorumLedger {
        let providers = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let keys: BTreeMap<String, Vec<u8>> = providers
            .iter()
            .map(|p| (p.clone(), format!("{p}_KEY").into_bytes()))
            .collect();
        QuorumLedger::new(k, &providers, keys).unwrap()
    }

    pub fn provider_votes(votes: &[bool]) -> Vec<(String, Vec<u8>, bool)> {
        ["A", "B", "C"]
            .iter()
            .zip(votes)
            .map(|(p, v)| ((*p).to_string(), format!("{p}_KEY").into_bytes(), *v))
            .collect()
    }

    pub fn signed(provider: &str, key: &[u8], fp: &str, initiated: bool) -> ProviderOutcome {
        ProviderOutcome {
            provider_id: provider.to_string(),
            fingerprint: fp.to_string(),
            category: "payments".to_string(),
            sequence: 0,
            initiated,
            signature: sign_outcome(key, fp, initiated),
        }
    }

    pub fn resolved_success(ledger: &QuorumLedger, fp: &str) -> Option<bool> {
        match ledger.get(fp).map(|r| r.state) {
            Some(RecordState::Resolved { success }) => Some(success),
            _ => None,
        }
    }
}
