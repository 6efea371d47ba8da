//! Reference corpus: per key-pair inter-key timings from an identity's samples.
//!
//! Consecutive keystrokes form a key-pair; the absolute time between them is
//! kept as a rhythm sample only when it is strictly below the gap threshold.
//! Longer gaps are pauses, not typing rhythm.

use crate::collector::reader::{read_keystrokes, DataFormatError};
use crate::collector::types::{KeyPair, Keystroke};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Timing samples per key-pair, in encounter order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCorpus {
    pairs: BTreeMap<KeyPair, Vec<f64>>,
}

impl ReferenceCorpus {
    /// Create an empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and concatenate the samples of one or more keystroke files.
    ///
    /// Key-pairs never span file boundaries.
    pub fn load<P: AsRef<Path>>(
        paths: &[P],
        gap_threshold_secs: f64,
    ) -> Result<Self, DataFormatError> {
        let mut corpus = Self::new();
        for path in paths {
            let keystrokes = read_keystrokes(path.as_ref())?;
            corpus.extend_from_keystrokes(&keystrokes, gap_threshold_secs);
        }
        Ok(corpus)
    }

    /// Build a corpus from keystrokes already in memory.
    pub fn from_keystrokes(keystrokes: &[Keystroke], gap_threshold_secs: f64) -> Self {
        let mut corpus = Self::new();
        corpus.extend_from_keystrokes(keystrokes, gap_threshold_secs);
        corpus
    }

    /// Append the key-pairs of one contiguous keystroke sequence.
    pub fn extend_from_keystrokes(&mut self, keystrokes: &[Keystroke], gap_threshold_secs: f64) {
        for window in keystrokes.windows(2) {
            let elapsed = (window[1].timestamp - window[0].timestamp).abs();
            if elapsed < gap_threshold_secs {
                self.push(KeyPair::between(&window[0], &window[1]), elapsed);
            }
        }
    }

    /// Record one sample for a key-pair.
    pub fn push(&mut self, pair: KeyPair, elapsed_secs: f64) {
        self.pairs.entry(pair).or_default().push(elapsed_secs);
    }

    /// Samples recorded for a key-pair.
    pub fn samples(&self, pair: &KeyPair) -> Option<&[f64]> {
        self.pairs.get(pair).map(Vec::as_slice)
    }

    /// Check whether a key-pair has any samples.
    pub fn contains(&self, pair: &KeyPair) -> bool {
        self.pairs.contains_key(pair)
    }

    /// Iterate key-pairs and their samples in key-pair order.
    pub fn iter(&self) -> impl Iterator<Item = (&KeyPair, &[f64])> {
        self.pairs.iter().map(|(pair, samples)| (pair, samples.as_slice()))
    }

    /// Number of distinct key-pairs.
    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    /// Total number of samples across all key-pairs.
    pub fn sample_count(&self) -> usize {
        self.pairs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Key-pairs with at least `min_count` samples, with their mean timing.
    pub fn frequent_pairs(&self, min_count: usize) -> Vec<(KeyPair, usize, f64)> {
        self.pairs
            .iter()
            .filter(|(_, samples)| samples.len() >= min_count.max(1))
            .map(|(pair, samples)| {
                let mean = samples.iter().sum::<f64>() / samples.len() as f64;
                (*pair, samples.len(), mean)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strokes(records: &[(u32, f64)]) -> Vec<Keystroke> {
        records
            .iter()
            .map(|&(code, timestamp)| Keystroke::new(code, timestamp))
            .collect()
    }

    #[test]
    fn test_pairs_and_timings() {
        let corpus = ReferenceCorpus::from_keystrokes(
            &strokes(&[(104, 0.0), (101, 0.1), (104, 0.3), (101, 0.42)]),
            1.0,
        );

        let he = corpus.samples(&KeyPair::new(104, 101)).unwrap();
        assert_eq!(he.len(), 2);
        assert!((he[0] - 0.1).abs() < 1e-9);
        assert!((he[1] - 0.12).abs() < 1e-9);
        assert!(corpus.contains(&KeyPair::new(101, 104)));
        assert_eq!(corpus.pair_count(), 2);
        assert_eq!(corpus.sample_count(), 3);
    }

    #[test]
    fn test_gap_threshold_excludes_pauses() {
        let corpus =
            ReferenceCorpus::from_keystrokes(&strokes(&[(104, 0.0), (101, 5.0)]), 1.0);
        assert!(!corpus.contains(&KeyPair::new(104, 101)));
        assert!(corpus.is_empty());

        // Exactly at the threshold is a pause too
        let corpus =
            ReferenceCorpus::from_keystrokes(&strokes(&[(104, 0.0), (101, 1.0)]), 1.0);
        assert!(corpus.is_empty());
    }

    #[test]
    fn test_out_of_order_timestamps_use_absolute_gap() {
        let corpus =
            ReferenceCorpus::from_keystrokes(&strokes(&[(104, 0.5), (101, 0.3)]), 1.0);
        let samples = corpus.samples(&KeyPair::new(104, 101)).unwrap();
        assert!((samples[0] - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_sequences_concatenate_without_spanning() {
        let mut corpus =
            ReferenceCorpus::from_keystrokes(&strokes(&[(104, 0.0), (101, 0.1)]), 1.0);
        corpus.extend_from_keystrokes(&strokes(&[(104, 0.0), (101, 0.2)]), 1.0);

        assert_eq!(corpus.samples(&KeyPair::new(104, 101)).unwrap().len(), 2);
        // (101, 104) would only exist if the two sequences were joined
        assert!(!corpus.contains(&KeyPair::new(101, 104)));
    }

    #[test]
    fn test_frequent_pairs() {
        let corpus = ReferenceCorpus::from_keystrokes(
            &strokes(&[(104, 0.0), (101, 0.1), (104, 0.2), (101, 0.4)]),
            1.0,
        );
        let frequent = corpus.frequent_pairs(2);
        assert_eq!(frequent.len(), 1);
        assert_eq!(frequent[0].0, KeyPair::new(104, 101));
        assert!((frequent[0].2 - 0.15).abs() < 1e-9);
    }
}
