//! Core identification engine.
//!
//! This module contains:
//! - Reference corpus loading and timing model fitting
//! - The identity registry shared by all sessions
//! - Per-event scorers, the rolling aggregator and the kernel voting backend
//! - The identification session that drives them

pub mod aggregator;
pub mod backend;
pub mod corpus;
pub mod kernel_vote;
pub mod model;
pub mod registry;
pub mod scorer;
pub mod session;

// Re-export commonly used types
pub use aggregator::{RollingAggregator, RollingWindow};
pub use backend::{
    create_backend, Backend, BackendKind, Guess, SessionError, SessionSettings, WindowedBackend,
};
pub use corpus::ReferenceCorpus;
pub use kernel_vote::{
    FallbackPolicy, KernelVoteBackend, KernelVoter, TimingBuffer, VotingSettings,
    DEFAULT_HISTORY_LENGTH,
};
pub use model::{Bandwidth, KernelDensity, ModelError, ModelOptions, ParametricModel, TimingModels};
pub use registry::{Identity, IdentityRegistry, IdentitySource, RegistryError, SharedRegistry};
pub use scorer::{score_all, KernelScorer, ParametricScorer, Scorer};
pub use session::{EventOutcome, IdentificationSession, SessionPhase};
