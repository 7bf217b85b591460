use serde::{Deserialize, Serialize};

/// Face embedding vector (`3·L + K` values for a landmark-mesh builder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Feature scheme that produced this embedding (e.g., "mesh-pairs/v1").
    /// `None` for embeddings persisted before scheme tagging existed.
    #[serde(default)]
    pub scheme: Option<String>,
    /// Set when some part of the vector had zero norm and was left unnormalized.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degenerate: bool,
}

impl Embedding {
    /// Untagged embedding from raw values.
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            scheme: None,
            degenerate: false,
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// L2 norm over the full vector.
    pub fn norm(&self) -> f32 {
        l2_norm(&self.values)
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. Zero when either
    /// vector has zero norm. `None` when the dimensions differ.
    pub fn similarity(&self, other: &Embedding) -> Option<f32> {
        cosine_similarity(&self.values, &other.values)
    }

    /// Whether two scheme tags can be compared. Untagged embeddings are
    /// accepted against anything.
    pub fn scheme_compatible(&self, other: &Embedding) -> bool {
        match (&self.scheme, &other.scheme) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Cosine similarity of two slices, 0.0 if either has zero norm.
///
/// `None` when the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        Some((dot / denom).clamp(-1.0, 1.0))
    } else {
        Some(0.0)
    }
}

pub fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Divide `values` by their L2 norm in place.
///
/// Returns `false` and leaves the slice untouched when the norm is zero.
pub fn normalize_in_place(values: &mut [f32]) -> bool {
    let norm = l2_norm(values);
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
        true
    } else {
        false
    }
}
