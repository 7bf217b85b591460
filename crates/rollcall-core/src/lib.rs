//! rollcall-core — Face mesh identification and attendance debouncing.
//!
//! Turns landmark meshes into embeddings, aggregates enrollment samples into
//! canonical identities, matches queries by cosine similarity and gates
//! repeated identifications behind a per-identity cooldown.

pub mod aggregate;
pub mod debounce;
pub mod embedding;
pub mod features;
pub mod landmark;
pub mod matcher;
pub mod pipeline;
pub mod registry;

pub use aggregate::{aggregate, AggregateError};
pub use debounce::{CooldownState, DebounceStore, Debouncer, MemoryDebounceStore, DEFAULT_LOG_INTERVAL};
pub use embedding::Embedding;
pub use features::{FeatureBuilder, FeatureError, FeatureTable, MESH_PAIRS_V1};
pub use landmark::{Landmark, LandmarkSet, FACE_MESH_LANDMARKS};
pub use matcher::{Candidate, CosineMatcher, MatchError, MatchResult, Matcher};
pub use pipeline::{enroll, Enrollment, Outcome, PipelineError, Recognition, RecognitionPipeline, DEFAULT_SIMILARITY_THRESHOLD};
pub use registry::{Identity, Registry, RegistryError, SharedRegistry};

/// Look up a feature table by its version tag.
pub fn feature_table(version: &str) -> Option<FeatureTable> {
    [MESH_PAIRS_V1].into_iter().find(|t| t.version == version)
}
