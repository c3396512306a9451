//! Provider-signed outcome records.
//!
//! Every provider reports each decision to the auditor exactly once, as a
//! `ProviderOutcome` authenticated with an HMAC-SHA256 tag over the
//! fingerprint and the reported decision. The auditor holds the same key
//! material and rejects any outcome whose tag does not verify, so a relay
//! (or anything else on the path) cannot fabricate or flip votes.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// One provider's reported decision for one artifact.
///
/// Generated once per artifact per provider and never mutated. `initiated`
/// is the *reported* decision: under drift it may differ from the decision
/// the provider actually computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOutcome {
    /// Identifier of the reporting provider.
    pub provider_id: String,

    /// Fingerprint of the artifact the decision is for.
    pub fingerprint: String,

    /// Category carried over from the artifact.
    pub category: String,

    /// Sequence number carried over from the artifact.
    pub sequence: u64,

    /// The reported decision.
    pub initiated: bool,

    /// Hex HMAC-SHA256 over `fingerprint | initiated` under the provider's
    /// signing key.
    pub signature: String,
}

/// Computes the outcome signature for `(fingerprint, initiated)`.
///
/// Covering the decision bit means a forwarder cannot flip a vote and
/// replay the original tag.
#[must_use]
pub fn sign_outcome(signing_key: &[u8], fingerprint: &str, initiated: bool) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_key).expect("HMAC key should be valid");
    mac.update(fingerprint.as_bytes());
    mac.update(b"|");
    mac.update(if initiated { b"1" } else { b"0" });
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies an outcome's signature against the given key in constant time.
#[must_use]
pub fn verify_outcome(signing_key: &[u8], outcome: &ProviderOutcome) -> bool {
    let expected = sign_outcome(signing_key, &outcome.fingerprint, outcome.initiated);
    outcome
        .signature
        .as_bytes()
        .ct_eq(expected.as_bytes())
        .into()
}
