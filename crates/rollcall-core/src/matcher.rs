use crate::embedding::Embedding;
use crate::registry::{Identity, Registry};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("registry entry {name:?} has dimension {actual}, query has {expected}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("registry entry {name:?} was built with scheme {entry}, query with {query}")]
    SchemeMismatch {
        name: String,
        query: String,
        entry: String,
    },
}

/// Best registry entry for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    /// Cosine similarity in [-1, 1].
    pub similarity: f32,
}

/// Result of matching a query embedding against a registry.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// `None` when the registry was empty.
    pub best: Option<Candidate>,
    /// True when the query or the best entry is degenerate.
    pub degenerate: bool,
    pub query: Embedding,
}

impl MatchResult {
    /// The best candidate if it clears `threshold`. An empty registry never
    /// clears any threshold.
    pub fn accepted(&self, threshold: f32) -> Option<&Candidate> {
        self.best.as_ref().filter(|c| c.similarity >= threshold)
    }

    pub fn is_match(&self, threshold: f32) -> bool {
        self.accepted(threshold).is_some()
    }
}

/// Strategy for comparing a query embedding against the registry.
pub trait Matcher {
    fn best_match(&self, query: &Embedding, registry: &Registry) -> Result<MatchResult, MatchError>;
}

/// Cosine similarity matcher.
///
/// Validates every entry before scoring any of them, then scores every
/// entry. Ties go to the first entry in registry order.
pub struct CosineMatcher;

impl CosineMatcher {
    fn validate(query: &Embedding, registry: &Registry) -> Result<(), MatchError> {
        for identity in registry.iter() {
            let entry = &identity.embedding;
            if entry.dim() != query.dim() {
                return Err(MatchError::DimensionMismatch {
                    name: identity.name.clone(),
                    expected: query.dim(),
                    actual: entry.dim(),
                });
            }
            if !query.scheme_compatible(entry) {
                return Err(MatchError::SchemeMismatch {
                    name: identity.name.clone(),
                    query: query.scheme.clone().unwrap_or_default(),
                    entry: entry.scheme.clone().unwrap_or_default(),
                });
            }
        }
        Ok(())
    }
}

impl Matcher for CosineMatcher {
    fn best_match(&self, query: &Embedding, registry: &Registry) -> Result<MatchResult, MatchError> {
        Self::validate(query, registry)?;

        let mut best: Option<(&Identity, f32)> = None;
        for identity in registry.iter() {
            let sim = query
                .similarity(&identity.embedding)
                .ok_or_else(|| MatchError::DimensionMismatch {
                    name: identity.name.clone(),
                    expected: query.dim(),
                    actual: identity.embedding.dim(),
                })?;
            if best.map_or(true, |(_, best_sim)| sim > best_sim) {
                best = Some((identity, sim));
            }
        }

        let degenerate = query.degenerate
            || query.norm() == 0.0
            || best.is_some_and(|(identity, _)| {
                identity.embedding.degenerate || identity.embedding.norm() == 0.0
            });

        Ok(MatchResult {
            best: best.map(|(identity, similarity)| Candidate {
                name: identity.name.clone(),
                similarity,
            }),
            degenerate,
            query: query.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(entries: &[(&str, &[f32])]) -> Registry {
        entries
            .iter()
            .map(|(name, v)| Identity::new(name, Embedding::new(v.to_vec())).unwrap())
            .collect()
    }

    #[test]
    fn test_identical_entry_wins() {
        let query = Embedding::new(vec![0.6, 0.8, 0.0]);
        let reg = registry(&[("A", &[0.6, 0.8, 0.0]), ("B", &[0.8, 0.6, 0.0])]);
        let result = CosineMatcher.best_match(&query, &reg).unwrap();
        let best = result.best.unwrap();
        assert_eq!(best.name, "A");
        assert!((best.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_scans_whole_registry() {
        // Best match sorts last.
        let query = Embedding::new(vec![1.0, 0.0, 0.0]);
        let reg = registry(&[
            ("decoy1", &[0.0, 1.0, 0.0]),
            ("decoy2", &[0.0, 0.0, 1.0]),
            ("match", &[1.0, 0.0, 0.0]),
        ]);
        let result = CosineMatcher.best_match(&query, &reg).unwrap();
        assert_eq!(result.best.unwrap().name, "match");
    }

    #[test]
    fn test_below_threshold_still_reports_best() {
        let query = Embedding::new(vec![1.0, 0.0, 0.0]);
        let reg = registry(&[("other", &[0.0, 1.0, 0.0])]);
        let result = CosineMatcher.best_match(&query, &reg).unwrap();
        assert_eq!(result.best.as_ref().unwrap().name, "other");
        assert!(result.best.as_ref().unwrap().similarity.abs() < 1e-6);
        assert!(!result.is_match(0.1));
        assert!(result.accepted(0.1).is_none());
    }

    #[test]
    fn test_empty_registry_is_no_match() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let result = CosineMatcher.best_match(&query, &Registry::new()).unwrap();
        assert!(result.best.is_none());
        assert!(!result.is_match(-1.0));
    }

    #[test]
    fn test_tie_goes_to_first_name() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let reg = registry(&[("zed", &[1.0, 0.0]), ("amy", &[2.0, 0.0])]);
        let result = CosineMatcher.best_match(&query, &reg).unwrap();
        assert_eq!(result.best.unwrap().name, "amy");
    }

    #[test]
    fn test_dimension_mismatch_fails_fast() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let reg = registry(&[("A", &[1.0, 0.0]), ("B", &[1.0, 0.0, 0.0])]);
        let err = CosineMatcher.best_match(&query, &reg).unwrap_err();
        assert_eq!(
            err,
            MatchError::DimensionMismatch {
                name: "B".into(),
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_scheme_mismatch() {
        let query = Embedding::new(vec![1.0, 0.0]).with_scheme("mesh-pairs/v2");
        let mut reg = Registry::new();
        reg.insert(Identity::new("A", Embedding::new(vec![1.0, 0.0]).with_scheme("mesh-pairs/v1")).unwrap());
        let err = CosineMatcher.best_match(&query, &reg).unwrap_err();
        assert!(matches!(err, MatchError::SchemeMismatch { .. }));
    }

    #[test]
    fn test_degenerate_query_flagged() {
        let query = Embedding::new(vec![0.0, 0.0]);
        let reg = registry(&[("A", &[1.0, 0.0])]);
        let result = CosineMatcher.best_match(&query, &reg).unwrap();
        assert!(result.degenerate);
        assert_eq!(result.best.unwrap().similarity, 0.0);
    }

    #[test]
    fn test_zero_norm_entry_flagged() {
        // Untagged and unflagged, as an entry read back from disk would be.
        let query = Embedding::new(vec![0.6, 0.8]);
        let reg = registry(&[("zero", &[0.0, 0.0])]);
        let result = CosineMatcher.best_match(&query, &reg).unwrap();
        let best = result.best.as_ref().unwrap();
        assert_eq!(best.name, "zero");
        assert_eq!(best.similarity, 0.0);
        assert!(result.degenerate);
    }

    #[test]
    fn test_healthy_match_not_flagged() {
        let query = Embedding::new(vec![0.6, 0.8]);
        let reg = registry(&[("A", &[0.6, 0.8]), ("zero", &[0.0, 0.0])]);
        let result = CosineMatcher.best_match(&query, &reg).unwrap();
        assert_eq!(result.best.as_ref().unwrap().name, "A");
        assert!(!result.degenerate);
    }
}
