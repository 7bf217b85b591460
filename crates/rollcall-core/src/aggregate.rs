//! Reduce several embeddings of one person to a canonical reference vector.

use crate::embedding::Embedding;
use ndarray::{Array2, Axis};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum AggregateError {
    #[error("no valid samples for this identity")]
    EmptyEnrollmentSet,
    #[error("sample {index} has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("sample {index} was built with scheme {actual}, expected {expected}")]
    SchemeMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}

/// Element-wise mean of `embeddings`, L2-normalized over the full length.
///
/// Every sample carries equal weight. The result does not depend on input
/// order beyond floating-point rounding. A zero mean is returned as is and
/// flagged `degenerate`.
pub fn aggregate(embeddings: &[Embedding]) -> Result<Embedding, AggregateError> {
    let first = embeddings.first().ok_or(AggregateError::EmptyEnrollmentSet)?;
    let dim = first.dim();
    let mut scheme: Option<&String> = None;

    for (index, e) in embeddings.iter().enumerate() {
        if e.dim() != dim {
            return Err(AggregateError::DimensionMismatch {
                index,
                expected: dim,
                actual: e.dim(),
            });
        }
        match (scheme, &e.scheme) {
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(AggregateError::SchemeMismatch {
                    index,
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
            (None, Some(actual)) => scheme = Some(actual),
            _ => {}
        }
    }

    let samples = Array2::from_shape_fn((embeddings.len(), dim), |(i, j)| embeddings[i].values[j]);
    let mut mean = samples
        .mean_axis(Axis(0))
        .ok_or(AggregateError::EmptyEnrollmentSet)?;

    let norm = mean.dot(&mean).sqrt();
    let degenerate = norm <= 0.0;
    if degenerate {
        tracing::warn!(samples = embeddings.len(), "mean embedding has zero norm");
    } else {
        mean /= norm;
    }

    tracing::debug!(
        samples = embeddings.len(),
        dim,
        degenerate_inputs = embeddings.iter().filter(|e| e.degenerate).count(),
        "aggregated identity embedding"
    );

    Ok(Embedding {
        values: mean.to_vec(),
        scheme: scheme.cloned(),
        degenerate,
    })
}
