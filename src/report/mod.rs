//! Reporting for identification sessions.
//!
//! Counters and serializable snapshots consumed by the CLI for display and
//! JSON output. Nothing here feeds back into identification.

pub mod snapshot;
pub mod stats;

// Re-export commonly used types
pub use snapshot::{
    GuessSnapshot, IdentityTotal, SessionSummary, SnapshotBuilder, PRODUCER_NAME, REPORT_VERSION,
};
pub use stats::SessionStats;
