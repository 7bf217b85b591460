//! Landmarks in, attendance decisions out.
//!
//! Wires the builder, matcher, threshold and debouncer together, plus the
//! enrollment path (builder + aggregator) that produces registry entries.

use crate::aggregate::{aggregate, AggregateError};
use crate::debounce::{DebounceStore, Debouncer, MemoryDebounceStore};
use crate::features::{FeatureBuilder, FeatureError};
use crate::landmark::LandmarkSet;
use crate::matcher::{Candidate, CosineMatcher, MatchError, Matcher};
use crate::registry::{Identity, RegistryError, SharedRegistry};
use thiserror::Error;

/// Reference cosine similarity a candidate must reach to count as a match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.1;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("feature extraction: {0}")]
    Feature(#[from] FeatureError),
    #[error("matching: {0}")]
    Match(#[from] MatchError),
    #[error("aggregation: {0}")]
    Aggregate(#[from] AggregateError),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
}

/// What happened to one observed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The detector found no face; nothing was built.
    NoFace,
    /// Registry empty (`best` is `None`) or best candidate below threshold.
    Unknown { best: Option<Candidate> },
    /// Recognized, but logged too recently.
    Suppressed(Candidate),
    /// Recognized and due for a new attendance record.
    Logged(Candidate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub outcome: Outcome,
    /// The query or the matched entry had a zero-norm part.
    pub degenerate: bool,
}

/// Thread-safe recognition pipeline. Share it behind an `Arc` between
/// camera streams; all streams then share one registry and one debouncer.
pub struct RecognitionPipeline<S: DebounceStore = MemoryDebounceStore> {
    builder: FeatureBuilder,
    matcher: CosineMatcher,
    registry: SharedRegistry,
    debouncer: Debouncer<S>,
    threshold: f32,
}

impl<S: DebounceStore> RecognitionPipeline<S> {
    pub fn new(
        builder: FeatureBuilder,
        registry: SharedRegistry,
        debouncer: Debouncer<S>,
        threshold: f32,
    ) -> Self {
        Self {
            builder,
            matcher: CosineMatcher,
            registry,
            debouncer,
            threshold,
        }
    }

    pub fn builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn debouncer(&self) -> &Debouncer<S> {
        &self.debouncer
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Process one detector result observed at `now_ms`.
    ///
    /// Shape errors (landmark count, dimension or scheme mismatch against the
    /// registry) are returned; everything else is an [`Outcome`].
    pub fn observe(
        &self,
        detection: Option<&LandmarkSet>,
        now_ms: u64,
    ) -> Result<Recognition, PipelineError> {
        let Some(query) = self.builder.build_detection(detection)? else {
            return Ok(Recognition {
                outcome: Outcome::NoFace,
                degenerate: false,
            });
        };

        let registry = self.registry.snapshot();
        let result = self.matcher.best_match(&query, &registry)?;

        let outcome = match result.accepted(self.threshold) {
            None => Outcome::Unknown {
                best: result.best.clone(),
            },
            Some(candidate) => {
                if self.debouncer.should_log(&candidate.name, now_ms) {
                    tracing::info!(
                        name = %candidate.name,
                        similarity = candidate.similarity,
                        now_ms,
                        "attendance accepted"
                    );
                    Outcome::Logged(candidate.clone())
                } else {
                    Outcome::Suppressed(candidate.clone())
                }
            }
        };

        if result.degenerate {
            tracing::warn!(?outcome, "match computed against a degenerate embedding");
        }

        Ok(Recognition {
            outcome,
            degenerate: result.degenerate,
        })
    }
}

/// Outcome of training one identity from a batch of samples.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub identity: Identity,
    /// Samples that contributed to the canonical embedding.
    pub used: usize,
    /// Samples where the detector found no face.
    pub skipped: usize,
}

/// Build an embedding per detected face and aggregate them into an identity.
///
/// Samples without a face are skipped; if none remain the result is
/// [`AggregateError::EmptyEnrollmentSet`].
pub fn enroll<'a, I>(builder: &FeatureBuilder, name: &str, samples: I) -> Result<Enrollment, PipelineError>
where
    I: IntoIterator<Item = Option<&'a LandmarkSet>>,
{
    let mut embeddings = Vec::new();
    let mut skipped = 0;
    for sample in samples {
        match builder.build_detection(sample)? {
            Some(embedding) => embeddings.push(embedding),
            None => skipped += 1,
        }
    }

    if embeddings.is_empty() {
        tracing::warn!(name, skipped, "no valid samples for identity");
    }
    let canonical = aggregate(&embeddings)?;
    let identity = Identity::new(name, canonical)?;

    tracing::info!(name = %identity.name, used = embeddings.len(), skipped, "identity trained");

    Ok(Enrollment {
        identity,
        used: embeddings.len(),
        skipped,
    })
}
