//! Landmark mesh → embedding builder.
//!
//! An embedding is the flattened landmark coordinates (raw segment) followed
//! by distances between a fixed set of anatomical landmark pairs (derived
//! segment). Each segment is L2-normalized on its own.
//!
//! The pair table is a protocol shared by every producer of embeddings that
//! must be comparable: registry entries and live queries have to be built from
//! the same [`FeatureTable`], which is why its version is stamped on every
//! embedding as the scheme tag.

use crate::embedding::{normalize_in_place, Embedding};
use crate::landmark::LandmarkSet;
use thiserror::Error;

/// Anatomical points referenced by the derived feature table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anatomy {
    LeftEye,
    RightEye,
    Nose,
    Chin,
    LeftMouth,
    RightMouth,
}

impl Anatomy {
    /// Face mesh landmark index for this point.
    pub const fn mesh_index(self) -> usize {
        match self {
            Anatomy::LeftEye => 33,
            Anatomy::RightEye => 263,
            Anatomy::Nose => 1,
            Anatomy::Chin => 152,
            Anatomy::LeftMouth => 61,
            Anatomy::RightMouth => 291,
        }
    }
}

/// A versioned, ordered list of landmark pairs whose distances form the
/// derived segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureTable {
    pub version: &'static str,
    pub pairs: &'static [(Anatomy, Anatomy)],
}

/// Seven-distance table over the MediaPipe face mesh.
pub const MESH_PAIRS_V1: FeatureTable = FeatureTable {
    version: "mesh-pairs/v1",
    pairs: &[
        (Anatomy::LeftEye, Anatomy::RightEye),
        (Anatomy::LeftEye, Anatomy::Nose),
        (Anatomy::RightEye, Anatomy::Nose),
        (Anatomy::Nose, Anatomy::Chin),
        (Anatomy::LeftMouth, Anatomy::RightMouth),
        (Anatomy::LeftEye, Anatomy::Chin),
        (Anatomy::RightEye, Anatomy::Chin),
    ],
};

impl FeatureTable {
    /// Number of derived scalar features (K).
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn max_index(&self) -> Option<usize> {
        self.pairs
            .iter()
            .flat_map(|(a, b)| [a.mesh_index(), b.mesh_index()])
            .max()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum FeatureError {
    #[error("expected {expected} landmarks, got {actual}")]
    LandmarkCount { expected: usize, actual: usize },
    #[error("feature table {version} references landmark {index}, but the mesh has only {landmark_count}")]
    IndexOutOfRange {
        version: &'static str,
        index: usize,
        landmark_count: usize,
    },
    #[error("feature table {0} has no pairs")]
    EmptyTable(&'static str),
}

/// Builds embeddings from landmark sets of a fixed size.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    table: FeatureTable,
    landmark_count: usize,
}

impl FeatureBuilder {
    /// Create a builder for meshes of `landmark_count` points.
    ///
    /// Fails if the table is empty or references an index outside the mesh.
    pub fn new(table: FeatureTable, landmark_count: usize) -> Result<Self, FeatureError> {
        let max_index = table.max_index().ok_or(FeatureError::EmptyTable(table.version))?;
        if max_index >= landmark_count {
            return Err(FeatureError::IndexOutOfRange {
                version: table.version,
                index: max_index,
                landmark_count,
            });
        }
        Ok(Self {
            table,
            landmark_count,
        })
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    /// Scheme tag stamped on every embedding this builder produces.
    pub fn scheme(&self) -> &'static str {
        self.table.version
    }

    pub fn landmark_count(&self) -> usize {
        self.landmark_count
    }

    /// Embedding dimension `D = 3·L + K`.
    pub fn dim(&self) -> usize {
        self.raw_len() + self.table.len()
    }

    /// Length of the raw (flattened coordinate) segment.
    pub fn raw_len(&self) -> usize {
        3 * self.landmark_count
    }

    /// Build the embedding for one face.
    ///
    /// A segment whose norm is zero is kept as is and the embedding is
    /// flagged `degenerate`.
    pub fn build(&self, landmarks: &LandmarkSet) -> Result<Embedding, FeatureError> {
        if landmarks.len() != self.landmark_count {
            return Err(FeatureError::LandmarkCount {
                expected: self.landmark_count,
                actual: landmarks.len(),
            });
        }

        let mut values = Vec::with_capacity(self.dim());
        for lm in landmarks.points() {
            values.extend_from_slice(&[lm.x, lm.y, lm.z]);
        }

        let points = landmarks.points();
        values.extend(
            self.table
                .pairs
                .iter()
                .map(|(a, b)| points[a.mesh_index()].distance(&points[b.mesh_index()])),
        );

        let (raw, derived) = values.split_at_mut(self.raw_len());
        let raw_ok = normalize_in_place(raw);
        let derived_ok = normalize_in_place(derived);

        if !(raw_ok && derived_ok) {
            tracing::warn!(
                scheme = self.scheme(),
                raw_zero = !raw_ok,
                derived_zero = !derived_ok,
                "degenerate landmark set: segment left unnormalized"
            );
        }

        Ok(Embedding {
            values,
            scheme: Some(self.scheme().to_string()),
            degenerate: !(raw_ok && derived_ok),
        })
    }

    /// Embed a detector result. `None` (no face) yields no embedding rather
    /// than a zero vector.
    pub fn build_detection(
        &self,
        detection: Option<&LandmarkSet>,
    ) -> Result<Option<Embedding>, FeatureError> {
        detection.map(|landmarks| self.build(landmarks)).transpose()
    }
}
