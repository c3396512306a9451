//! The provider decision pipeline.
//!
//! A provider boundary is the only decision-making unit in the mesh. Given
//! an artifact it re-derives the expected binding, computes its keyed
//! score, applies the category threshold, decides, signs, and reports. It
//! never waits for or consults any other provider.

use serde::Serialize;
use tracing::debug;

use crate::artifact::{Artifact, ArtifactError};
use crate::binding::{bind, binding_matches};
use crate::drift::DriftPlan;
use crate::outcome::{ProviderOutcome, sign_outcome};
use crate::score::{ThresholdTable, keyed_score};

/// One provider's immutable evaluation state.
pub struct ProviderBoundary {
    provider_id: String,
    expected_context: String,
    model_seed: Vec<u8>,
    signing_key: Vec<u8>,
    thresholds: ThresholdTable,
    /// Present only on the one instance selected by the drift injector.
    drift: Option<DriftPlan>,
}

/// The full result of evaluating one artifact, for logging and tests. Only
/// `outcome` leaves the boundary.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    /// Whether the presented binding matched the re-derived one.
    pub binding_ok: bool,

    /// The keyed score in `[0, 1]`.
    pub score: f64,

    /// The threshold applied for the artifact's category.
    pub threshold: f64,

    /// The decision the provider actually computed.
    pub decision: bool,

    /// The decision reported to the auditor (differs from `decision` only
    /// under drift).
    pub reported: bool,

    /// The signed outcome to emit.
    pub outcome: ProviderOutcome,
}

impl ProviderBoundary {
    /// Builds a boundary from its configuration material.
    #[must_use]
    pub fn new(
        provider_id: impl Into<String>,
        expected_context: impl Into<String>,
        model_seed: &[u8],
        signing_key: &[u8],
        thresholds: ThresholdTable,
        drift: Option<DriftPlan>,
    ) -> Self {
        let provider_id = provider_id.into();
        let drift = drift.filter(|plan| plan.provider_id == provider_id);
        Self {
            provider_id,
            expected_context: expected_context.into(),
            model_seed: model_seed.to_vec(),
            signing_key: signing_key.to_vec(),
            thresholds,
            drift,
        }
    }

    /// The provider's identifier.
    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Whether this instance carries the run's drift plan.
    #[must_use]
    pub fn drifts(&self) -> bool {
        self.drift.is_some()
    }

    /// Evaluates one artifact.
    ///
    /// Malformed artifacts are rejected before any scoring; no outcome is
    /// produced for them.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::MalformedFingerprint`] when the artifact
    /// fails shape validation.
    pub fn evaluate(&self, artifact: &Artifact) -> Result<Evaluation, ArtifactError> {
        artifact.validate()?;

        let expected = bind(&artifact.fingerprint, &artifact.context, &artifact.category);
        let binding_ok = binding_matches(&artifact.binding, &expected);

        let score = keyed_score(
            &self.model_seed,
            &self.provider_id,
            &artifact.category,
            &artifact.fingerprint,
            &artifact.context,
            &self.expected_context,
        );
        let threshold = self.thresholds.threshold_for(&artifact.category);
        let decision = binding_ok && score >= threshold;

        let reported = match &self.drift {
            Some(plan) if plan.flips(artifact.sequence) => !decision,
            _ => decision,
        };
        if reported != decision {
            debug!(
                provider_id = %self.provider_id,
                sequence = artifact.sequence,
                "reported decision drifted from computed decision"
            );
        }

        let outcome = ProviderOutcome {
            provider_id: self.provider_id.clone(),
            fingerprint: artifact.fingerprint.clone(),
            category: artifact.category.clone(),
            sequence: artifact.sequence,
            initiated: reported,
            signature: sign_outcome(&self.signing_key, &artifact.fingerprint, reported),
        };

        Ok(Evaluation {
            binding_ok,
            score,
            threshold,
            decision,
            reported,
            outcome,
        })
    }
}
