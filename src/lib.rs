//! Typist ID - online identification of who is typing from keystroke timing.
//!
//! Each known identity contributes reference typing samples. From them the
//! engine learns, per key-pair, how long that person takes to go from one key
//! to the next. A live keystroke stream is then scored event by event against
//! every identity, and the session keeps a running best guess.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Typist ID                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Reference  │──▶│   Timing    │──▶│  Identity   │       │
//! │  │   Corpus    │   │   Models    │   │  Registry   │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                                             │ (Arc)         │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │  Collector  │──▶│  Session    │──▶│  Backend    │       │
//! │  │ (file/stdin)│   │ (key-pairs) │   │ (scorer +   │       │
//! │  └─────────────┘   └─────────────┘   │  window)    │       │
//! │                           │          └─────────────┘       │
//! │                           ▼                                 │
//! │                    ┌─────────────┐                          │
//! │                    │   Report    │                          │
//! │                    │ (snapshots) │                          │
//! │                    └─────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use typist_id::{IdentificationSession, IdentityRegistry, IdentitySource, SessionSettings};
//! use typist_id::core::ModelOptions;
//!
//! let sources = vec![
//!     IdentitySource::new("steven", vec!["data/steven.txt".into()]),
//!     IdentitySource::new("joanna", vec!["data/joanna.txt".into()]),
//! ];
//! let registry = IdentityRegistry::build(&sources, 1.2, &ModelOptions::default())
//!     .expect("Failed to load reference data")
//!     .shared();
//!
//! let mut session = IdentificationSession::new(registry, &SessionSettings::default())
//!     .expect("Invalid session settings");
//! session.process_event(104, 0.00);
//! session.process_event(101, 0.11);
//! println!("{:?}", session.guess_label());
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod report;

// Re-export key types at crate root for convenience
pub use collector::{read_keystrokes, DataFormatError, KeyPair, Keystroke, LineCollector};
pub use config::{Config, ConfigError};
pub use core::{
    BackendKind, FallbackPolicy, Guess, IdentificationSession, IdentityRegistry, IdentitySource,
    KernelVoter, ReferenceCorpus, RegistryError, SessionError, SessionSettings, SharedRegistry,
};
pub use report::{GuessSnapshot, SessionSummary, SnapshotBuilder};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_package() {
        assert!(!VERSION.is_empty());
        assert_eq!(VERSION.split('.').count(), 3);
    }
}
