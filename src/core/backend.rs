//! Identification backends.
//!
//! A backend consumes key-pair timings one at a time and maintains a guess.
//! The session only talks to the [`Backend`] trait, so scoring strategies
//! can be swapped without touching event handling.

use crate::collector::types::KeyPair;
use crate::core::aggregator::RollingAggregator;
use crate::core::kernel_vote::{KernelVoteBackend, VotingSettings};
use crate::core::registry::SharedRegistry;
use crate::core::scorer::{score_all, KernelScorer, ParametricScorer, Scorer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Current best guess of who is typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Guess {
    /// No event has been scorable yet
    #[default]
    Undetermined,
    /// Index into the identity registry
    Identity(usize),
}

impl Guess {
    pub fn index(&self) -> Option<usize> {
        match self {
            Guess::Identity(index) => Some(*index),
            Guess::Undetermined => None,
        }
    }

    pub fn is_determined(&self) -> bool {
        matches!(self, Guess::Identity(_))
    }
}

/// A strategy that turns key-pair timings into a guess.
pub trait Backend: Send {
    /// Feed one key-pair timing. Returns `true` if the guess state was
    /// updated, `false` if the event was skipped.
    fn observe(&mut self, pair: KeyPair, elapsed_secs: f64) -> bool;

    fn guess(&self) -> Guess;

    /// Per-identity evidence behind the guess (windowed totals or vote
    /// counts), in registry order.
    fn totals(&self) -> &[f64];

    fn name(&self) -> &'static str;
}

/// Which backend a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Normal density per event, rolling window sum
    #[default]
    Parametric,
    /// Kernel density per event, rolling window sum
    KernelWindow,
    /// Kernel density majority vote over buffered key-pairs
    KernelVote,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Parametric => "parametric",
            BackendKind::KernelWindow => "kernel-window",
            BackendKind::KernelVote => "kernel-vote",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parametric" => Ok(BackendKind::Parametric),
            "kernel-window" => Ok(BackendKind::KernelWindow),
            "kernel-vote" => Ok(BackendKind::KernelVote),
            other => Err(format!(
                "unknown backend {other:?} (expected parametric, kernel-window or kernel-vote)"
            )),
        }
    }
}

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub backend: BackendKind,
    /// Number of recent scores summed per identity
    pub window_length: usize,
    pub voting: VotingSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            window_length: 100,
            voting: VotingSettings::default(),
        }
    }
}

impl SessionSettings {
    /// Reject settings a backend cannot be built with.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.window_length == 0 {
            return Err(SessionError::ZeroWindow);
        }
        if self.voting.history_length == 0 {
            return Err(SessionError::ZeroHistory);
        }
        Ok(())
    }
}

/// Errors raised while setting up a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("window length must be at least 1")]
    ZeroWindow,
    #[error("voting history length must be at least 1")]
    ZeroHistory,
}

/// Instantiate the configured backend over a registry.
pub fn create_backend(
    registry: SharedRegistry,
    settings: &SessionSettings,
) -> Result<Box<dyn Backend>, SessionError> {
    settings.validate()?;
    let backend: Box<dyn Backend> = match settings.backend {
        BackendKind::Parametric => Box::new(WindowedBackend::new(
            registry,
            ParametricScorer,
            settings.window_length,
        )),
        BackendKind::KernelWindow => Box::new(WindowedBackend::new(
            registry,
            KernelScorer,
            settings.window_length,
        )),
        BackendKind::KernelVote => Box::new(KernelVoteBackend::new(registry, &settings.voting)),
    };
    Ok(backend)
}

/// Scores every event with a [`Scorer`] and keeps rolling per-identity sums.
///
/// An event reaches the windows only if every identity could score it, so
/// the windows stay aligned event-for-event.
pub struct WindowedBackend<S: Scorer> {
    registry: SharedRegistry,
    scorer: S,
    aggregator: RollingAggregator,
    scratch: Vec<f64>,
}

impl<S: Scorer> WindowedBackend<S> {
    pub fn new(registry: SharedRegistry, scorer: S, window_length: usize) -> Self {
        let aggregator = RollingAggregator::new(registry.len(), window_length);
        let scratch = Vec::with_capacity(registry.len());
        Self {
            registry,
            scorer,
            aggregator,
            scratch,
        }
    }

    pub fn aggregator(&self) -> &RollingAggregator {
        &self.aggregator
    }
}

impl<S: Scorer> Backend for WindowedBackend<S> {
    fn observe(&mut self, pair: KeyPair, elapsed_secs: f64) -> bool {
        if !score_all(
            &self.scorer,
            &self.registry,
            pair,
            elapsed_secs,
            &mut self.scratch,
        ) {
            tracing::debug!(
                "Skipping {} ({:.3}s): not scorable by every identity",
                pair,
                elapsed_secs
            );
            return false;
        }
        self.aggregator.update(&self.scratch);
        true
    }

    fn guess(&self) -> Guess {
        self.aggregator.guess()
    }

    fn totals(&self) -> &[f64] {
        self.aggregator.totals()
    }

    fn name(&self) -> &'static str {
        self.scorer.name()
    }
}
