//! Per-event scoring of a key-pair timing against one identity.

use crate::collector::types::KeyPair;
use crate::core::registry::{Identity, IdentityRegistry};

/// Scores an observed key-pair timing against an identity's models.
///
/// `None` means the identity cannot score this event, usually because the
/// key-pair is missing from its reference data.
pub trait Scorer: Send + Sync {
    fn score(&self, pair: KeyPair, elapsed_secs: f64, identity: &Identity) -> Option<f64>;

    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;
}

/// Normal (or log-normal) density of the elapsed time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParametricScorer;

impl Scorer for ParametricScorer {
    fn score(&self, pair: KeyPair, elapsed_secs: f64, identity: &Identity) -> Option<f64> {
        identity.models().parametric(&pair)?.density(elapsed_secs)
    }

    fn name(&self) -> &'static str {
        "parametric"
    }
}

/// Kernel density estimate of the elapsed time.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelScorer;

impl Scorer for KernelScorer {
    fn score(&self, pair: KeyPair, elapsed_secs: f64, identity: &Identity) -> Option<f64> {
        if !elapsed_secs.is_finite() {
            return None;
        }
        let density = identity.models().kernel(&pair)?.density(elapsed_secs);
        density.is_finite().then_some(density)
    }

    fn name(&self) -> &'static str {
        "kernel-window"
    }
}

/// Score an event against every identity, in registry order.
///
/// Fills `scores` and returns `true` only if every identity succeeded; on
/// failure the contents of `scores` are unspecified.
pub fn score_all<S: Scorer + ?Sized>(
    scorer: &S,
    registry: &IdentityRegistry,
    pair: KeyPair,
    elapsed_secs: f64,
    scores: &mut Vec<f64>,
) -> bool {
    scores.clear();
    for identity in registry.iter() {
        match scorer.score(pair, elapsed_secs, identity) {
            Some(score) => scores.push(score),
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::corpus::ReferenceCorpus;
    use crate::core::model::ModelOptions;

    fn registry(log_transform: bool) -> IdentityRegistry {
        let mut a = ReferenceCorpus::new();
        let mut b = ReferenceCorpus::new();
        for s in [0.10, 0.12, 0.11] {
            a.push(KeyPair::new(104, 101), s);
        }
        for s in [0.30, 0.31, 0.29] {
            b.push(KeyPair::new(104, 101), s);
        }
        a.push(KeyPair::new(116, 104), 0.2);
        a.push(KeyPair::new(116, 104), 0.25);
        // single sample: degenerate for B
        b.push(KeyPair::new(116, 104), 0.2);

        let options = ModelOptions {
            log_transform,
            ..ModelOptions::default()
        };
        IdentityRegistry::from_corpora(vec![("A".into(), a), ("B".into(), b)], &options).unwrap()
    }

    #[test]
    fn test_parametric_scores_closer_identity_higher() {
        let registry = registry(false);
        let pair = KeyPair::new(104, 101);
        let a = ParametricScorer.score(pair, 0.11, registry.get(0).unwrap()).unwrap();
        let b = ParametricScorer.score(pair, 0.11, registry.get(1).unwrap()).unwrap();
        assert!(a > b);
    }

    #[test]
    fn test_kernel_scores_closer_identity_higher() {
        let registry = registry(false);
        let pair = KeyPair::new(104, 101);
        let a = KernelScorer.score(pair, 0.11, registry.get(0).unwrap()).unwrap();
        let b = KernelScorer.score(pair, 0.11, registry.get(1).unwrap()).unwrap();
        assert!(a > 0.0);
        assert!(a > b);
        assert!(KernelScorer.score(pair, f64::NAN, registry.get(0).unwrap()).is_none());
    }

    #[test]
    fn test_unknown_pair_fails() {
        let registry = registry(false);
        let identity = registry.get(0).unwrap();
        assert!(ParametricScorer
            .score(KeyPair::new(1, 2), 0.1, identity)
            .is_none());
        assert!(KernelScorer.score(KeyPair::new(1, 2), 0.1, identity).is_none());
    }

    #[test]
    fn test_degenerate_pair_never_scores() {
        let registry = registry(false);
        let b = registry.get(1).unwrap();
        for elapsed in [0.1, 0.2, 0.3] {
            assert!(ParametricScorer
                .score(KeyPair::new(116, 104), elapsed, b)
                .is_none());
        }
    }

    #[test]
    fn test_log_transform_rejects_non_positive_elapsed() {
        let registry = registry(true);
        let a = registry.get(0).unwrap();
        let pair = KeyPair::new(104, 101);
        assert!(ParametricScorer.score(pair, 0.0, a).is_none());
        assert!(ParametricScorer.score(pair, -0.05, a).is_none());
        assert!(ParametricScorer.score(pair, 0.11, a).is_some());
    }

    #[test]
    fn test_score_all_is_all_or_nothing() {
        let registry = registry(false);
        let mut scores = Vec::new();

        assert!(score_all(
            &ParametricScorer,
            &registry,
            KeyPair::new(104, 101),
            0.11,
            &mut scores
        ));
        assert_eq!(scores.len(), 2);

        // A can score (116, 104) but B's model is degenerate
        assert!(!score_all(
            &ParametricScorer,
            &registry,
            KeyPair::new(116, 104),
            0.2,
            &mut scores
        ));
    }
}
