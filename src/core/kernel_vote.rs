//! Kernel-density majority vote over recently typed key-pairs.
//!
//! Instead of scoring each event on its own, this backend buffers the timings
//! of the most recent key-pair occurrences. For every key-pair it asks each
//! identity's kernel density estimator how likely the buffered timings are;
//! the best-fitting identity wins that key-pair's vote, and the identity with
//! the most votes is the guess.
//!
//! Only key-pairs that appear in every identity's reference data take part
//! in the vote.

use crate::collector::types::KeyPair;
use crate::core::backend::{Backend, Guess};
use crate::core::corpus::ReferenceCorpus;
use crate::core::registry::SharedRegistry;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

/// Default number of key-pair occurrences kept for voting.
pub const DEFAULT_HISTORY_LENGTH: usize = 200;

/// What to report when no key-pair could cast a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum FallbackPolicy {
    /// Report no guess
    #[default]
    Undetermined,
    /// Pick an identity uniformly at random; seeded for reproducible runs
    Random { seed: Option<u64> },
}

/// Settings for the voting backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VotingSettings {
    /// Key-pair occurrences kept in the timing buffer
    pub history_length: usize,
    pub fallback: FallbackPolicy,
}

impl Default for VotingSettings {
    fn default() -> Self {
        Self {
            history_length: DEFAULT_HISTORY_LENGTH,
            fallback: FallbackPolicy::default(),
        }
    }
}

/// Timings of the most recent key-pair occurrences.
///
/// When the occurrence history overflows, the oldest occurrence's key-pair
/// gives up its oldest timing.
#[derive(Debug, Clone)]
pub struct TimingBuffer {
    history: VecDeque<KeyPair>,
    timings: HashMap<KeyPair, VecDeque<f64>>,
    capacity: usize,
}

impl TimingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity + 1),
            timings: HashMap::new(),
            capacity,
        }
    }

    pub fn push(&mut self, pair: KeyPair, elapsed_secs: f64) {
        self.history.push_back(pair);
        self.timings
            .entry(pair)
            .or_default()
            .push_back(elapsed_secs);

        while self.history.len() > self.capacity {
            let Some(oldest) = self.history.pop_front() else {
                break;
            };
            if let Entry::Occupied(mut entry) = self.timings.entry(oldest) {
                if entry.get().len() <= 1 {
                    entry.remove();
                } else {
                    entry.get_mut().pop_front();
                }
            }
        }
    }

    /// Buffered timings of a key-pair, oldest first, as the two halves of
    /// the ring.
    pub fn timings(&self, pair: &KeyPair) -> Option<(&[f64], &[f64])> {
        self.timings.get(pair).map(VecDeque::as_slices)
    }

    /// Number of buffered occurrences.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Total buffered timings across key-pairs. Always equals `len()`.
    pub fn timing_count(&self) -> usize {
        self.timings.values().map(VecDeque::len).sum()
    }
}

/// Casts per-key-pair votes using the identities' kernel estimators.
pub struct KernelVoter {
    registry: SharedRegistry,
    pairs: Vec<KeyPair>,
    fallback: FallbackPolicy,
    rng: Option<StdRng>,
}

impl KernelVoter {
    pub fn new(registry: SharedRegistry, fallback: FallbackPolicy) -> Self {
        let pairs = registry.common_pairs();
        tracing::info!("Kernel vote over {} common key-pairs", pairs.len());

        let rng = match fallback {
            FallbackPolicy::Undetermined => None,
            FallbackPolicy::Random { seed: Some(seed) } => Some(StdRng::seed_from_u64(seed)),
            FallbackPolicy::Random { seed: None } => Some(StdRng::from_entropy()),
        };

        Self {
            registry,
            pairs,
            fallback,
            rng,
        }
    }

    /// Key-pairs that take part in the vote.
    pub fn voting_pairs(&self) -> &[KeyPair] {
        &self.pairs
    }

    /// Classify a whole batch of timings at once.
    pub fn predict(&mut self, data: &ReferenceCorpus) -> Guess {
        self.predict_with_votes(data).0
    }

    /// Like [`Self::predict`], also returning the per-identity vote counts.
    pub fn predict_with_votes(&mut self, data: &ReferenceCorpus) -> (Guess, Vec<u32>) {
        let votes = self.tally(|pair| data.samples(pair).map(|s| (s, &[][..])));
        let guess = self.decide(&votes);
        (guess, votes)
    }

    /// Count votes per identity. `lookup` returns the observed timings for a
    /// key-pair, possibly split in two slices.
    pub fn tally<'a, F>(&self, lookup: F) -> Vec<u32>
    where
        F: Fn(&KeyPair) -> Option<(&'a [f64], &'a [f64])>,
    {
        let mut votes = vec![0u32; self.registry.len()];
        for pair in &self.pairs {
            let Some((front, back)) = lookup(pair) else {
                continue;
            };
            if front.is_empty() && back.is_empty() {
                continue;
            }
            if let Some(winner) = self.best_fit(pair, front, back) {
                votes[winner] += 1;
            }
        }
        votes
    }

    /// Identity whose estimator gives the observed timings the highest
    /// log-likelihood; the first one wins ties.
    fn best_fit(&self, pair: &KeyPair, front: &[f64], back: &[f64]) -> Option<usize> {
        let mut best_score = f64::NEG_INFINITY;
        let mut best = None;
        for (index, identity) in self.registry.iter().enumerate() {
            let Some(kde) = identity.models().kernel(pair) else {
                continue;
            };
            let score = kde.score(front) + kde.score(back);
            if score > best_score {
                best_score = score;
                best = Some(index);
            }
        }
        best
    }

    /// Majority label, first identity on ties; fallback policy if nobody voted.
    pub fn decide(&mut self, votes: &[u32]) -> Guess {
        let mut best: Option<(usize, u32)> = None;
        for (index, &count) in votes.iter().enumerate() {
            if count > 0 && best.map_or(true, |(_, top)| count > top) {
                best = Some((index, count));
            }
        }

        if let Some((index, _)) = best {
            return Guess::Identity(index);
        }

        match (self.fallback, self.rng.as_mut()) {
            (FallbackPolicy::Random { .. }, Some(rng)) if !votes.is_empty() => {
                Guess::Identity(rng.gen_range(0..votes.len()))
            }
            _ => Guess::Undetermined,
        }
    }
}

/// Backend adapter: buffers every event, then re-votes.
pub struct KernelVoteBackend {
    voter: KernelVoter,
    buffer: TimingBuffer,
    guess: Guess,
    votes: Vec<f64>,
}

impl KernelVoteBackend {
    pub fn new(registry: SharedRegistry, settings: &VotingSettings) -> Self {
        let identity_count = registry.len();
        Self {
            voter: KernelVoter::new(registry, settings.fallback),
            buffer: TimingBuffer::new(settings.history_length),
            guess: Guess::Undetermined,
            votes: vec![0.0; identity_count],
        }
    }

    pub fn buffer(&self) -> &TimingBuffer {
        &self.buffer
    }
}

impl Backend for KernelVoteBackend {
    fn observe(&mut self, pair: KeyPair, elapsed_secs: f64) -> bool {
        self.buffer.push(pair, elapsed_secs);

        let buffer = &self.buffer;
        let votes = self.voter.tally(|p| buffer.timings(p));
        self.guess = self.voter.decide(&votes);
        self.votes = votes.into_iter().map(f64::from).collect();
        true
    }

    fn guess(&self) -> Guess {
        self.guess
    }

    fn totals(&self) -> &[f64] {
        &self.votes
    }

    fn name(&self) -> &'static str {
        "kernel-vote"
    }
}
