//! Rolling aggregation of per-event scores.
//!
//! Every identity owns a fixed-length window of its most recent scores. The
//! windows only move together: an update pushes exactly one score into each
//! of them, so position `k` in every window refers to the same event.

use crate::core::backend::Guess;
use serde::{Deserialize, Serialize};

/// Fixed-capacity FIFO of scores, backed by a ring buffer.
///
/// Starts full of zeros and stays at exactly its capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WindowState")]
pub struct RollingWindow {
    values: Vec<f64>,
    /// Index of the oldest value, which the next push overwrites
    head: usize,
}

#[derive(Deserialize)]
struct WindowState {
    values: Vec<f64>,
    head: usize,
}

impl TryFrom<WindowState> for RollingWindow {
    type Error = String;

    fn try_from(state: WindowState) -> Result<Self, Self::Error> {
        if state.values.is_empty() {
            return Err("rolling window must hold at least one value".to_string());
        }
        if state.head >= state.values.len() {
            return Err(format!(
                "window head {} out of range for {} values",
                state.head,
                state.values.len()
            ));
        }
        Ok(Self {
            values: state.values,
            head: state.head,
        })
    }
}

impl RollingWindow {
    /// Create a window of `capacity` zero scores.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Sessions check this up front and return
    /// an error instead.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "rolling window capacity must be non-zero");
        Self {
            values: vec![0.0; capacity],
            head: 0,
        }
    }

    /// Push a score, evicting and returning the oldest one.
    pub fn push(&mut self, score: f64) -> f64 {
        let evicted = std::mem::replace(&mut self.values[self.head], score);
        self.head = (self.head + 1) % self.values.len();
        evicted
    }

    /// Always equal to the capacity.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sum of all values in the window.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }

    /// Values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let (newer, older) = self.values.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    /// Most recently pushed value.
    pub fn latest(&self) -> f64 {
        let len = self.values.len();
        self.values[(self.head + len - 1) % len]
    }
}

/// Per-identity rolling windows and the resulting leader.
#[derive(Debug, Clone)]
pub struct RollingAggregator {
    windows: Vec<RollingWindow>,
    totals: Vec<f64>,
    guess: Guess,
}

impl RollingAggregator {
    /// One zero-filled window of `window_length` per identity.
    pub fn new(identity_count: usize, window_length: usize) -> Self {
        Self {
            windows: (0..identity_count)
                .map(|_| RollingWindow::new(window_length))
                .collect(),
            totals: vec![0.0; identity_count],
            guess: Guess::Undetermined,
        }
    }

    /// Push one score per identity and re-elect the leader.
    ///
    /// `scores` must hold exactly one score per identity, in registry order.
    pub fn update(&mut self, scores: &[f64]) -> Guess {
        debug_assert_eq!(scores.len(), self.windows.len());

        for ((window, total), &score) in self
            .windows
            .iter_mut()
            .zip(self.totals.iter_mut())
            .zip(scores)
        {
            window.push(score);
            *total = window.sum();
        }

        self.guess = leader(&self.totals, self.guess);
        self.guess
    }

    pub fn guess(&self) -> Guess {
        self.guess
    }

    /// Windowed totals, in registry order.
    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    pub fn windows(&self) -> &[RollingWindow] {
        &self.windows
    }
}

/// Identity with the strictly greatest total.
///
/// On a tie the previous leader keeps the lead if it is among the tied
/// identities; otherwise the first tied identity wins.
fn leader(totals: &[f64], previous: Guess) -> Guess {
    let Some(best) = totals
        .iter()
        .copied()
        .filter(|t| !t.is_nan())
        .reduce(f64::max)
    else {
        return previous;
    };

    if let Guess::Identity(index) = previous {
        if totals.get(index) == Some(&best) {
            return previous;
        }
    }

    totals
        .iter()
        .position(|&t| t == best)
        .map_or(previous, Guess::Identity)
}
