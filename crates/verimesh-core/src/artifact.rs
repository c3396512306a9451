//! Request fingerprinting and the immutable artifact model.
//!
//! A fingerprint is the lowercase hex SHA-256 digest of a request's raw
//! bytes. It is the only identity an artifact carries: the binder never
//! retains the request, and downstream components only ever see the
//! fingerprint, the two opaque tags, and the binding derived from them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length of a fingerprint in hex characters (SHA-256).
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// Type alias for a request fingerprint (lowercase hex SHA-256).
pub type Fingerprint = String;

/// Errors raised when validating inbound requests and artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// The request body exceeds the configured maximum size.
    #[error("request of {size} bytes exceeds maximum of {max} bytes")]
    Oversized {
        /// Observed body size in bytes.
        size: usize,
        /// Configured maximum in bytes.
        max: usize,
    },

    /// The fingerprint field is not a well-formed SHA-256 hex digest.
    #[error("fingerprint is not {FINGERPRINT_HEX_LEN} lowercase hex characters")]
    MalformedFingerprint,
}

/// Computes the fingerprint of a request's raw bytes.
#[must_use]
pub fn fingerprint(request_bytes: &[u8]) -> Fingerprint {
    hex::encode(Sha256::digest(request_bytes))
}

/// The unit of conveyance between binder, relays, and providers.
///
/// Artifacts are immutable once constructed and have no identity beyond
/// their fingerprint. The binder builds one per accepted request; relays
/// forward the same bytes verbatim and never recompute any field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Hex SHA-256 digest of the original request bytes.
    pub fingerprint: Fingerprint,

    /// Opaque verification-context tag supplied by the requester.
    pub context: String,

    /// Opaque category tag; selects provider thresholds, otherwise
    /// uninterpreted.
    pub category: String,

    /// Deterministic binding over `(fingerprint, context, category)`.
    pub binding: String,

    /// Monotonic sequence number assigned by the requester.
    pub sequence: u64,

    /// Provenance flag: set when the artifact was received from a peer
    /// relay. A relay never re-relays a peer-received artifact, which is
    /// what keeps the two-node mesh from cycling.
    #[serde(default)]
    pub relayed: bool,
}

impl Artifact {
    /// Checks that the fingerprint field is shaped like a SHA-256 hex
    /// digest.
    ///
    /// Providers reject artifacts that fail this check before any scoring
    /// happens; a mangled fingerprint can never reach the quorum ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::MalformedFingerprint`] if the field has the
    /// wrong length or contains non-hex characters.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let well_formed = self.fingerprint.len() == FINGERPRINT_HEX_LEN
            && self
                .fingerprint
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if well_formed {
            Ok(())
        } else {
            Err(ArtifactError::MalformedFingerprint)
        }
    }

    /// Returns a copy marked as having passed through a peer relay.
    #[must_use]
    pub fn into_relayed(mut self) -> Self {
        self.relayed = true;
        self
    }
}

/// Rejects oversized request bodies before any fingerprinting work.
///
/// # Errors
///
/// Returns [`ArtifactError::Oversized`] when `size > max`.
pub const fn check_request_size(size: usize, max: usize) -> Result<(), ArtifactError> {
    if size > max {
        Err(ArtifactError::Oversized { size, max })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_artifact() -> Artifact {
        let fp = fingerprint(b"sample request");
        Artifact {
            binding: crate::binding::bind(&fp, "CTX_ALPHA", "payments"),
            fingerprint: fp,
            context: "CTX_ALPHA".to_string(),
            category: "payments".to_string(),
            sequence: 7,
            relayed: false,
        }
    }

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let a = fingerprint(b"hello");
        let b = fingerprint(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), FINGERPRINT_HEX_LEN);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));

        let c = fingerprint(b"hello!");
        assert_ne!(a, c);
    }

    #[test]
    fn validate_accepts_well_formed_fingerprint() {
        sample_artifact().validate().unwrap();
    }

    #[test]
    fn validate_rejects_short_fingerprint() {
        let mut artifact = sample_artifact();
        artifact.fingerprint.truncate(10);
        assert!(matches!(
            artifact.validate(),
            Err(ArtifactError::MalformedFingerprint)
        ));
    }

    #[test]
    fn validate_rejects_non_hex_fingerprint() {
        let mut artifact = sample_artifact();
        artifact.fingerprint = "Z".repeat(FINGERPRINT_HEX_LEN);
        assert!(artifact.validate().is_err());
    }

    #[test]
    fn size_check_is_fail_closed_at_boundary() {
        assert!(check_request_size(64, 64).is_ok());
        assert!(matches!(
            check_request_size(65, 64),
            Err(ArtifactError::Oversized { size: 65, max: 64 })
        ));
    }

    #[test]
    fn serde_round_trip_preserves_all_fields() {
        let artifact = sample_artifact();
        let json = serde_json::to_string(&artifact).unwrap();
        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(artifact, back);
    }

    #[test]
    fn relayed_flag_defaults_to_false_on_the_wire() {
        // Older senders omit the provenance flag entirely.
        let json = r#"{
            "fingerprint": "aa",
            "context": "c",
            "category": "payments",
            "binding": "bb",
            "sequence": 1
        }"#;
        let artifact: Artifact = serde_json::from_str(json).unwrap();
        assert!(!artifact.relayed);
    }

    #[test]
    fn into_relayed_marks_provenance() {
        let artifact = sample_artifact().into_relayed();
        assert!(artifact.relayed);
    }
}
