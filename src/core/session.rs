//! Identification session: turns a keystroke stream into a running guess.
//!
//! A session pairs each keystroke with the one before it, hands the key-pair
//! and elapsed time to its backend, and exposes the backend's guess. Sessions
//! are cheap; the registry they read from is shared.

use crate::collector::types::{KeyCode, KeyPair, Keystroke};
use crate::core::backend::{create_backend, Backend, Guess, SessionError, SessionSettings};
use crate::core::registry::SharedRegistry;
use crate::report::stats::SessionStats;
use serde::{Deserialize, Serialize};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    AwaitingFirstEvent,
    Running,
}

/// What happened to a processed event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventOutcome {
    /// First keystroke; it only becomes the previous key
    Primed,
    /// The key-pair reached the backend and updated its state
    Scored { pair: KeyPair, elapsed_secs: f64 },
    /// The backend could not use the key-pair
    Skipped { pair: KeyPair, elapsed_secs: f64 },
}

/// Online identification over one keystroke stream.
pub struct IdentificationSession {
    registry: SharedRegistry,
    backend: Box<dyn Backend>,
    previous: Option<Keystroke>,
    stats: SessionStats,
}

impl IdentificationSession {
    /// Create a session with the backend named in `settings`.
    pub fn new(
        registry: SharedRegistry,
        settings: &SessionSettings,
    ) -> Result<Self, SessionError> {
        let backend = create_backend(registry.clone(), settings)?;
        Ok(Self::with_backend(registry, backend))
    }

    /// Create a session around an already built backend.
    pub fn with_backend(registry: SharedRegistry, backend: Box<dyn Backend>) -> Self {
        Self {
            registry,
            backend,
            previous: None,
            stats: SessionStats::new(),
        }
    }

    /// Process one keystroke.
    ///
    /// The elapsed time is taken as given, even when negative; only the
    /// backend decides whether it can score it.
    pub fn process_event(&mut self, code: KeyCode, timestamp: f64) -> EventOutcome {
        let current = Keystroke::new(code, timestamp);
        let before = self.backend.guess();

        let outcome = match self.previous.replace(current) {
            None => EventOutcome::Primed,
            Some(previous) => {
                let pair = KeyPair::between(&previous, &current);
                let elapsed_secs = current.timestamp - previous.timestamp;
                if self.backend.observe(pair, elapsed_secs) {
                    EventOutcome::Scored { pair, elapsed_secs }
                } else {
                    EventOutcome::Skipped { pair, elapsed_secs }
                }
            }
        };

        self.stats.record(&outcome, before != self.backend.guess());
        outcome
    }

    /// Convenience wrapper for [`Self::process_event`].
    pub fn process_keystroke(&mut self, keystroke: Keystroke) -> EventOutcome {
        self.process_event(keystroke.code, keystroke.timestamp)
    }

    pub fn phase(&self) -> SessionPhase {
        if self.previous.is_some() {
            SessionPhase::Running
        } else {
            SessionPhase::AwaitingFirstEvent
        }
    }

    pub fn guess(&self) -> Guess {
        self.backend.guess()
    }

    /// Label of the guessed identity, `None` while undetermined.
    pub fn guess_label(&self) -> Option<&str> {
        self.backend
            .guess()
            .index()
            .and_then(|index| self.registry.get(index))
            .map(|identity| identity.label())
    }

    /// Per-identity totals behind the guess, labelled, in registry order.
    pub fn totals(&self) -> Vec<(&str, f64)> {
        self.registry
            .iter()
            .map(|identity| identity.label())
            .zip(self.backend.totals().iter().copied())
            .collect()
    }

    pub fn previous(&self) -> Option<Keystroke> {
        self.previous
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::BackendKind;
    use crate::core::corpus::ReferenceCorpus;
    use crate::core::model::ModelOptions;
    use crate::core::registry::IdentityRegistry;

    fn registry() -> SharedRegistry {
        let mut a = ReferenceCorpus::new();
        let mut b = ReferenceCorpus::new();
        for s in [0.10, 0.12, 0.11] {
            a.push(KeyPair::new(104, 101), s);
        }
        for s in [0.30, 0.31, 0.29] {
            b.push(KeyPair::new(104, 101), s);
        }
        IdentityRegistry::from_corpora(
            vec![("A".into(), a), ("B".into(), b)],
            &ModelOptions {
                log_transform: false,
                ..ModelOptions::default()
            },
        )
        .unwrap()
        .shared()
    }

    fn settings(window_length: usize) -> SessionSettings {
        SessionSettings {
            backend: BackendKind::Parametric,
            window_length,
            ..SessionSettings::default()
        }
    }

    #[test]
    fn test_first_event_only_primes() {
        let mut session = IdentificationSession::new(registry(), &settings(1)).unwrap();
        assert_eq!(session.phase(), SessionPhase::AwaitingFirstEvent);

        assert_eq!(session.process_event(104, 10.0), EventOutcome::Primed);
        assert_eq!(session.phase(), SessionPhase::Running);
        assert_eq!(session.guess(), Guess::Undetermined);
        assert_eq!(session.guess_label(), None);
    }

    #[test]
    fn test_guesses_closest_identity() {
        let mut session = IdentificationSession::new(registry(), &settings(1)).unwrap();
        session.process_event(104, 10.0);
        let outcome = session.process_event(101, 10.11);

        assert!(matches!(outcome, EventOutcome::Scored { .. }));
        assert_eq!(session.guess_label(), Some("A"));

        session.process_event(104, 11.0);
        session.process_event(101, 11.30);
        assert_eq!(session.guess_label(), Some("B"));
    }

    #[test]
    fn test_unscorable_pair_leaves_state_alone() {
        let mut session = IdentificationSession::new(registry(), &settings(3)).unwrap();
        session.process_event(104, 10.0);
        session.process_event(101, 10.11);
        let totals_before: Vec<f64> = session.totals().iter().map(|(_, t)| *t).collect();

        let outcome = session.process_event(120, 10.2);
        assert!(matches!(outcome, EventOutcome::Skipped { .. }));
        let totals_after: Vec<f64> = session.totals().iter().map(|(_, t)| *t).collect();
        assert_eq!(totals_before, totals_after);
        assert_eq!(session.guess_label(), Some("A"));

        // the skipped keystroke still becomes the previous one
        assert_eq!(session.previous().map(|k| k.code), Some(120));
    }

    #[test]
    fn test_stats_track_outcomes() {
        let mut session = IdentificationSession::new(registry(), &settings(2)).unwrap();
        session.process_event(104, 0.0);
        session.process_event(101, 0.11);
        session.process_event(120, 0.2);

        let stats = session.stats();
        assert_eq!(stats.events, 3);
        assert_eq!(stats.scored, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.guess_changes, 1);
    }

    #[test]
    fn test_zero_window_is_an_error() {
        let result = IdentificationSession::new(registry(), &settings(0));
        assert!(matches!(result, Err(SessionError::ZeroWindow)));
    }
}
