//! Identity registry: the known typists and their timing models.
//!
//! The registry is built once from reference files and never changes after
//! that. Identities keep the order they were configured in; that order is
//! the tie-break order everywhere downstream.

use crate::collector::reader::DataFormatError;
use crate::collector::types::KeyPair;
use crate::core::corpus::ReferenceCorpus;
use crate::core::model::{ModelError, ModelOptions, TimingModels};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("at least one identity is required")]
    Empty,
    #[error("identity {0:?} is listed more than once")]
    DuplicateLabel(String),
    #[error("identity {0:?} has no reference files")]
    NoFiles(String),
    #[error("reference data for {label:?}: {source}")]
    Data {
        label: String,
        #[source]
        source: DataFormatError,
    },
    #[error("timing models for {label:?}: {source}")]
    Model {
        label: String,
        #[source]
        source: ModelError,
    },
}

/// Where an identity's reference samples live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySource {
    pub label: String,
    pub files: Vec<PathBuf>,
}

impl IdentitySource {
    pub fn new(label: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            label: label.into(),
            files,
        }
    }

    /// Parse `LABEL=FILE[,FILE...]`.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let (label, files) = spec
            .split_once('=')
            .ok_or_else(|| format!("expected LABEL=FILE[,FILE...], got {spec:?}"))?;
        let label = label.trim();
        if label.is_empty() {
            return Err(format!("missing label in {spec:?}"));
        }
        let files: Vec<PathBuf> = files
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(PathBuf::from)
            .collect();
        Ok(Self::new(label, files))
    }
}

/// A known typist.
#[derive(Debug, Clone)]
pub struct Identity {
    label: String,
    corpus: ReferenceCorpus,
    models: TimingModels,
}

impl Identity {
    pub fn new(
        label: impl Into<String>,
        corpus: ReferenceCorpus,
        options: &ModelOptions,
    ) -> Result<Self, RegistryError> {
        let label = label.into();
        let models = TimingModels::fit(&corpus, options).map_err(|source| RegistryError::Model {
            label: label.clone(),
            source,
        })?;

        let degenerate = models.degenerate_pairs().len();
        if degenerate > 0 {
            tracing::warn!(
                "{}: {} key-pair(s) have degenerate timing models and will not be scored",
                label,
                degenerate
            );
        }

        Ok(Self {
            label,
            corpus,
            models,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn corpus(&self) -> &ReferenceCorpus {
        &self.corpus
    }

    pub fn models(&self) -> &TimingModels {
        &self.models
    }
}

/// Immutable, ordered set of identities.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    identities: Vec<Identity>,
    options: ModelOptions,
}

/// Registry shared read-only between sessions.
pub type SharedRegistry = Arc<IdentityRegistry>;

impl IdentityRegistry {
    /// Load every identity's reference files and fit its models.
    pub fn build(
        sources: &[IdentitySource],
        gap_threshold_secs: f64,
        options: &ModelOptions,
    ) -> Result<Self, RegistryError> {
        check_labels(sources.iter().map(|s| s.label.as_str()))?;

        let mut corpora = Vec::with_capacity(sources.len());
        for source in sources {
            if source.files.is_empty() {
                return Err(RegistryError::NoFiles(source.label.clone()));
            }
            let corpus = ReferenceCorpus::load(&source.files, gap_threshold_secs).map_err(
                |source_err| RegistryError::Data {
                    label: source.label.clone(),
                    source: source_err,
                },
            )?;
            corpora.push((source.label.clone(), corpus));
        }

        Self::from_corpora(corpora, options)
    }

    /// Build from corpora already in memory.
    pub fn from_corpora(
        corpora: Vec<(String, ReferenceCorpus)>,
        options: &ModelOptions,
    ) -> Result<Self, RegistryError> {
        check_labels(corpora.iter().map(|(label, _)| label.as_str()))?;

        let identities = corpora
            .into_iter()
            .map(|(label, corpus)| Identity::new(label, corpus, options))
            .collect::<Result<Vec<_>, _>>()?;

        for identity in &identities {
            tracing::info!(
                "Loaded identity {}: {} key-pairs, {} samples, {} scorable",
                identity.label(),
                identity.corpus().pair_count(),
                identity.corpus().sample_count(),
                identity.models().parametric_count()
            );
        }

        Ok(Self {
            identities,
            options: *options,
        })
    }

    /// Wrap in an `Arc` for sharing between sessions.
    pub fn shared(self) -> SharedRegistry {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Identity> {
        self.identities.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.identities.iter().map(Identity::label).collect()
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.identities.iter().position(|i| i.label() == label)
    }

    pub fn options(&self) -> &ModelOptions {
        &self.options
    }

    /// Key-pairs every identity has a kernel model for, in key-pair order.
    pub fn common_pairs(&self) -> Vec<KeyPair> {
        let Some(first) = self.identities.first() else {
            return Vec::new();
        };
        first
            .corpus()
            .iter()
            .map(|(pair, _)| *pair)
            .filter(|pair| {
                self.identities
                    .iter()
                    .all(|i| i.models().kernel(pair).is_some())
            })
            .collect()
    }
}

fn check_labels<'a>(labels: impl Iterator<Item = &'a str>) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for label in labels {
        if !seen.insert(label) {
            return Err(RegistryError::DuplicateLabel(label.to_string()));
        }
    }
    if seen.is_empty() {
        return Err(RegistryError::Empty);
    }
    Ok(())
}
