//! Serializable per-event guess snapshots and end-of-session summaries.

use crate::collector::types::Keystroke;
use crate::core::session::{EventOutcome, IdentificationSession};
use crate::report::stats::SessionStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The current report format version.
pub const REPORT_VERSION: &str = "1.0";

/// The name of this producer.
pub const PRODUCER_NAME: &str = "typist-id";

/// Windowed total (or vote count) for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityTotal {
    pub label: String,
    pub total: f64,
}

/// State of a session right after one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuessSnapshot {
    /// Session this snapshot belongs to
    pub session_id: String,
    /// 0-based index of the event within the session
    pub event_index: u64,
    /// Key code of the event
    pub key_code: u32,
    /// Event time (RFC3339), if the timestamp is representable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<String>,
    /// What the session did with the event
    pub outcome: EventOutcome,
    /// Key-pair in readable form, absent for the first event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_pair: Option<String>,
    /// Current guess, `None` while undetermined
    pub guess: Option<String>,
    pub totals: Vec<IdentityTotal>,
}

impl GuessSnapshot {
    /// One-line rendering for terminal output.
    pub fn to_line(&self) -> String {
        let guess = self.guess.as_deref().unwrap_or("undetermined");
        let totals: Vec<String> = self
            .totals
            .iter()
            .map(|t| format!("{}={:.4}", t.label, t.total))
            .collect();
        match (&self.outcome, &self.key_pair) {
            (EventOutcome::Scored { elapsed_secs, .. }, Some(pair)) => format!(
                "#{} {} {:.3}s -> {} [{}]",
                self.event_index,
                pair,
                elapsed_secs,
                guess,
                totals.join(" ")
            ),
            (EventOutcome::Skipped { elapsed_secs, .. }, Some(pair)) => format!(
                "#{} {} {:.3}s skipped -> {}",
                self.event_index, pair, elapsed_secs, guess
            ),
            _ => format!("#{} first key {} -> {}", self.event_index, self.key_code, guess),
        }
    }
}

/// End-of-session report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub producer: String,
    pub version: String,
    pub session_id: String,
    pub backend: String,
    pub guess: Option<String>,
    pub totals: Vec<IdentityTotal>,
    pub stats: SessionStats,
    pub computed_at: String,
}

/// Builds snapshots for one session.
pub struct SnapshotBuilder {
    session_id: String,
    event_index: u64,
}

impl SnapshotBuilder {
    /// Create a builder with a fresh session id.
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            event_index: 0,
        }
    }

    /// Get the session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Snapshot the session after it processed `keystroke`.
    pub fn snapshot(
        &mut self,
        session: &IdentificationSession,
        keystroke: &Keystroke,
        outcome: EventOutcome,
    ) -> GuessSnapshot {
        let key_pair = match outcome {
            EventOutcome::Scored { pair, .. } | EventOutcome::Skipped { pair, .. } => {
                Some(pair.to_string())
            }
            EventOutcome::Primed => None,
        };

        let snapshot = GuessSnapshot {
            session_id: self.session_id.clone(),
            event_index: self.event_index,
            key_code: keystroke.code,
            observed_at: to_rfc3339(keystroke.timestamp),
            outcome,
            key_pair,
            guess: session.guess_label().map(str::to_string),
            totals: totals(session),
        };
        self.event_index += 1;
        snapshot
    }

    /// Summarize the session.
    pub fn summary(&self, session: &IdentificationSession) -> SessionSummary {
        SessionSummary {
            producer: PRODUCER_NAME.to_string(),
            version: REPORT_VERSION.to_string(),
            session_id: self.session_id.clone(),
            backend: session.backend_name().to_string(),
            guess: session.guess_label().map(str::to_string),
            totals: totals(session),
            stats: session.stats().clone(),
            computed_at: Utc::now().to_rfc3339(),
        }
    }
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn totals(session: &IdentificationSession) -> Vec<IdentityTotal> {
    session
        .totals()
        .into_iter()
        .map(|(label, total)| IdentityTotal {
            label: label.to_string(),
            total,
        })
        .collect()
}

fn to_rfc3339(timestamp: f64) -> Option<String> {
    if !timestamp.is_finite() {
        return None;
    }
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos).map(|t| t.to_rfc3339())
}
