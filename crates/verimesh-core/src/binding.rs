//! The deterministic binding transform.
//!
//! The binding ties a fingerprint to the two opaque tags it was submitted
//! with. It is a domain-separated SHA-256 over the tuple, not a secret:
//! the binder computes it mechanically and every provider re-derives the
//! same value to detect tampering or tag substitution in flight. Two
//! distinct input tuples colliding would require a SHA-256 collision.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Domain-separation tag for the binding transform. Changing this value
/// invalidates every binding previously derived, so it is versioned.
pub const BIND_TAG: &str = "VM_BIND_V1";

/// Derives the binding for `(fingerprint, context, category)`.
///
/// Same inputs always yield the same output, across calls and across
/// process restarts.
#[must_use]
pub fn bind(fingerprint: &str, context: &str, category: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(BIND_TAG.as_bytes());
    hasher.update(b"|");
    hasher.update(fingerprint.as_bytes());
    hasher.update(b"|");
    hasher.update(context.as_bytes());
    hasher.update(b"|");
    hasher.update(category.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares a presented binding against the expected one in constant time.
///
/// Length mismatch short-circuits to `false`, which leaks only the length
/// of the presented value, never its content.
#[must_use]
pub fn binding_matches(presented: &str, expected: &str) -> bool {
    presented
        .as_bytes()
        .ct_eq(expected.as_bytes())
        .into()
}
