//! Per-session counters.

use crate::core::session::EventOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts of what a session did with its events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Keystrokes processed
    pub events: u64,
    /// Key-pairs that updated the backend
    pub scored: u64,
    /// Key-pairs the backend could not use
    pub skipped: u64,
    /// Number of times the guess changed
    pub guess_changes: u64,
    /// Session start time
    pub session_start: DateTime<Utc>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            events: 0,
            scored: 0,
            skipped: 0,
            guess_changes: 0,
            session_start: Utc::now(),
        }
    }

    /// Record one processed event.
    pub fn record(&mut self, outcome: &EventOutcome, guess_changed: bool) {
        self.events += 1;
        match outcome {
            EventOutcome::Primed => {}
            EventOutcome::Scored { .. } => self.scored += 1,
            EventOutcome::Skipped { .. } => self.skipped += 1,
        }
        if guess_changed {
            self.guess_changes += 1;
        }
    }

    /// Share of key-pairs that could be scored, 0 when none were seen.
    pub fn coverage(&self) -> f64 {
        let pairs = self.scored + self.skipped;
        if pairs == 0 {
            0.0
        } else {
            self.scored as f64 / pairs as f64
        }
    }

    pub fn session_duration_secs(&self) -> u64 {
        (Utc::now() - self.session_start).num_seconds().max(0) as u64
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        format!(
            "Session Statistics:\n\
             - Keystrokes processed: {}\n\
             - Key-pairs scored: {}\n\
             - Key-pairs skipped: {}\n\
             - Coverage: {:.1}%\n\
             - Guess changes: {}\n\
             - Session duration: {} seconds",
            self.events,
            self.scored,
            self.skipped,
            self.coverage() * 100.0,
            self.guess_changes,
            self.session_duration_secs()
        )
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::KeyPair;

    #[test]
    fn test_counting() {
        let mut stats = SessionStats::new();
        let pair = KeyPair::new(104, 101);

        stats.record(&EventOutcome::Primed, false);
        stats.record(
            &EventOutcome::Scored {
                pair,
                elapsed_secs: 0.1,
            },
            true,
        );
        stats.record(
            &EventOutcome::Skipped {
                pair,
                elapsed_secs: 0.1,
            },
            false,
        );

        assert_eq!(stats.events, 3);
        assert_eq!(stats.scored, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.guess_changes, 1);
        assert!((stats.coverage() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_summary_format() {
        let summary = SessionStats::new().summary();
        assert!(summary.contains("Keystrokes processed: 0"));
        assert!(summary.contains("Coverage: 0.0%"));
    }
}
