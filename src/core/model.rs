//! Timing models fitted from a reference corpus.
//!
//! Two model families are built for every key-pair with samples:
//!
//! - a parametric normal model over the raw or log-transformed timings
//! - a Gaussian kernel density estimator over the raw timings
//!
//! Parametric fits with zero or non-finite spread are rejected instead of
//! being given a made-up variance; the key-pair is then simply absent from
//! the parametric model set. In log space, zero-length samples (two keys
//! logged with the same timestamp) have no logarithm and are left out of the
//! fit.
//!
//! Key-pairs with fewer than [`ModelOptions::min_samples`] samples get no
//! model of either kind.

use crate::collector::types::KeyPair;
use crate::core::corpus::ReferenceCorpus;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::collections::BTreeMap;
use thiserror::Error;

/// Smallest kernel bandwidth, in seconds. Roughly the resolution of a
/// keystroke timestamp.
pub const MIN_BANDWIDTH_SECS: f64 = 1e-3;

/// Why a model could not be fitted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("no samples")]
    Empty,
    #[error("zero variance over {samples} sample(s)")]
    ZeroVariance { samples: usize },
    #[error("non-finite statistics (mean {mean}, std dev {std_dev})")]
    NonFinite { mean: f64, std_dev: f64 },
    #[error("invalid bandwidth {0}")]
    InvalidBandwidth(f64),
}

/// Kernel bandwidth selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    /// Silverman's rule of thumb, per key-pair
    #[default]
    Silverman,
    /// The same bandwidth in seconds for every key-pair
    Fixed(f64),
}

/// How timing models are fitted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Fit the parametric model on the natural log of the timings
    pub log_transform: bool,
    /// Bandwidth rule for the kernel density estimators
    pub bandwidth: Bandwidth,
    /// Key-pairs with fewer reference samples are not modelled
    pub min_samples: usize,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            log_transform: true,
            bandwidth: Bandwidth::Silverman,
            min_samples: 1,
        }
    }
}

/// Normal model of one key-pair's timings.
#[derive(Debug, Clone)]
pub struct ParametricModel {
    mean: f64,
    std_dev: f64,
    log_space: bool,
    normal: Normal,
}

impl ParametricModel {
    /// Fit mean and population standard deviation, in log space if requested.
    pub fn fit(samples: &[f64], log_space: bool) -> Result<Self, ModelError> {
        if samples.is_empty() {
            return Err(ModelError::Empty);
        }

        let values: Vec<f64> = if log_space {
            samples.iter().filter(|&&s| s > 0.0).map(|s| s.ln()).collect()
        } else {
            samples.to_vec()
        };
        if values.is_empty() {
            return Err(ModelError::Empty);
        }

        let mean = values.iter().mean();
        let std_dev = values.iter().population_std_dev();

        if !mean.is_finite() || !std_dev.is_finite() {
            return Err(ModelError::NonFinite { mean, std_dev });
        }
        if std_dev <= 0.0 {
            return Err(ModelError::ZeroVariance {
                samples: samples.len(),
            });
        }

        let normal = Normal::new(mean, std_dev).map_err(|_| ModelError::NonFinite {
            mean,
            std_dev,
        })?;

        Ok(Self {
            mean,
            std_dev,
            log_space,
            normal,
        })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std_dev(&self) -> f64 {
        self.std_dev
    }

    pub fn is_log_space(&self) -> bool {
        self.log_space
    }

    /// Density at an elapsed time.
    ///
    /// In log space the density is evaluated at `ln(elapsed)`, so a
    /// non-positive elapsed time has no score.
    pub fn density(&self, elapsed_secs: f64) -> Option<f64> {
        if !elapsed_secs.is_finite() {
            return None;
        }
        let x = if self.log_space {
            if elapsed_secs <= 0.0 {
                return None;
            }
            elapsed_secs.ln()
        } else {
            elapsed_secs
        };
        Some(self.normal.pdf(x))
    }
}

/// Gaussian kernel density estimator over one key-pair's raw timings.
#[derive(Debug, Clone)]
pub struct KernelDensity {
    samples: Vec<f64>,
    bandwidth: f64,
    kernel: Normal,
}

impl KernelDensity {
    pub fn fit(samples: &[f64], bandwidth: Bandwidth) -> Result<Self, ModelError> {
        if samples.is_empty() {
            return Err(ModelError::Empty);
        }

        let bandwidth = match bandwidth {
            Bandwidth::Fixed(h) if h.is_finite() && h > 0.0 => h,
            Bandwidth::Fixed(h) => return Err(ModelError::InvalidBandwidth(h)),
            Bandwidth::Silverman => silverman_bandwidth(samples),
        };

        let kernel = Normal::new(0.0, 1.0).map_err(|_| ModelError::NonFinite {
            mean: 0.0,
            std_dev: 1.0,
        })?;

        Ok(Self {
            samples: samples.to_vec(),
            bandwidth,
            kernel,
        })
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Log density at a single value.
    pub fn ln_density(&self, x: f64) -> f64 {
        let ln_h = self.bandwidth.ln();
        let terms: Vec<f64> = self
            .samples
            .iter()
            .map(|&s| self.kernel.ln_pdf((x - s) / self.bandwidth) - ln_h)
            .collect();
        log_sum_exp(&terms) - (self.samples.len() as f64).ln()
    }

    pub fn density(&self, x: f64) -> f64 {
        self.ln_density(x).exp()
    }

    /// Total log-likelihood of a batch of values.
    pub fn score(&self, values: &[f64]) -> f64 {
        values.iter().map(|&x| self.ln_density(x)).sum()
    }
}

/// Silverman's rule: `0.9 * min(sd, IQR / 1.34) * n^(-1/5)`, floored.
fn silverman_bandwidth(samples: &[f64]) -> f64 {
    let n = samples.len() as f64;
    let sd = if samples.len() > 1 {
        samples.iter().std_dev()
    } else {
        0.0
    };
    let iqr = Data::new(samples.to_vec()).interquartile_range() / 1.34;

    let spread = match (sd.is_finite() && sd > 0.0, iqr.is_finite() && iqr > 0.0) {
        (true, true) => sd.min(iqr),
        (true, false) => sd,
        (false, true) => iqr,
        (false, false) => 0.0,
    };

    (0.9 * spread * n.powf(-0.2)).max(MIN_BANDWIDTH_SECS)
}

fn log_sum_exp(terms: &[f64]) -> f64 {
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

/// All timing models of one identity.
#[derive(Debug, Clone, Default)]
pub struct TimingModels {
    parametric: BTreeMap<KeyPair, ParametricModel>,
    kernel: BTreeMap<KeyPair, KernelDensity>,
    degenerate: Vec<KeyPair>,
}

impl TimingModels {
    /// Fit every key-pair of a corpus.
    pub fn fit(corpus: &ReferenceCorpus, options: &ModelOptions) -> Result<Self, ModelError> {
        let mut models = Self::default();

        for (pair, samples) in corpus.iter() {
            if samples.len() < options.min_samples {
                tracing::trace!(
                    "{} has {} sample(s), below the minimum of {}",
                    pair,
                    samples.len(),
                    options.min_samples
                );
                continue;
            }
            match ParametricModel::fit(samples, options.log_transform) {
                Ok(model) => {
                    models.parametric.insert(*pair, model);
                }
                Err(e) => {
                    tracing::trace!("Parametric model for {} excluded: {}", pair, e);
                    models.degenerate.push(*pair);
                }
            }
            models
                .kernel
                .insert(*pair, KernelDensity::fit(samples, options.bandwidth)?);
        }

        Ok(models)
    }

    pub fn parametric(&self, pair: &KeyPair) -> Option<&ParametricModel> {
        self.parametric.get(pair)
    }

    pub fn kernel(&self, pair: &KeyPair) -> Option<&KernelDensity> {
        self.kernel.get(pair)
    }

    /// Key-pairs whose parametric fit was rejected.
    pub fn degenerate_pairs(&self) -> &[KeyPair] {
        &self.degenerate
    }

    pub fn parametric_count(&self) -> usize {
        self.parametric.len()
    }

    pub fn kernel_count(&self) -> usize {
        self.kernel.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parametric_fit_raw() {
        let model = ParametricModel::fit(&[0.10, 0.12, 0.11], false).unwrap();
        assert!((model.mean() - 0.11).abs() < 1e-9);
        // population std dev of [0.10, 0.12, 0.11]
        assert!((model.std_dev() - (2.0f64 / 3.0).sqrt() * 0.01).abs() < 1e-9);
        assert!(!model.is_log_space());
    }

    #[test]
    fn test_density_formula() {
        let model = ParametricModel::fit(&[1.0, 3.0], false).unwrap();
        // mean 2, std dev 1
        let expected = 1.0 / (2.0 * std::f64::consts::PI).sqrt();
        assert!((model.density(2.0).unwrap() - expected).abs() < 1e-12);
        let expected = (-0.5f64).exp() / (2.0 * std::f64::consts::PI).sqrt();
        assert!((model.density(3.0).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_single_sample_is_degenerate() {
        assert_eq!(
            ParametricModel::fit(&[0.2], false).unwrap_err(),
            ModelError::ZeroVariance { samples: 1 }
        );
        assert!(ParametricModel::fit(&[0.2, 0.2, 0.2], true).is_err());
        assert_eq!(ParametricModel::fit(&[], false).unwrap_err(), ModelError::Empty);
    }

    #[test]
    fn test_zero_sample_is_left_out_of_log_fit() {
        let with_zero = ParametricModel::fit(&[0.0, 0.1, 0.12], true).unwrap();
        let without = ParametricModel::fit(&[0.1, 0.12], true).unwrap();
        assert_eq!(with_zero.mean(), without.mean());
        assert_eq!(with_zero.std_dev(), without.std_dev());

        // raw space keeps it
        let raw = ParametricModel::fit(&[0.0, 0.1, 0.12], false).unwrap();
        assert!(raw.mean() < 0.1);

        assert_eq!(
            ParametricModel::fit(&[0.0, 0.0], true).unwrap_err(),
            ModelError::Empty
        );
    }

    #[test]
    fn test_log_space_density() {
        let model = ParametricModel::fit(&[0.1, 0.2, 0.4], true).unwrap();
        assert!(model.is_log_space());
        assert!(model.density(0.0).is_none());
        assert!(model.density(-0.1).is_none());
        assert!(model.density(0.2).unwrap() > model.density(2.0).unwrap());
    }

    #[test]
    fn test_density_peaks_at_mean() {
        let model = ParametricModel::fit(&[0.1, 0.15, 0.2, 0.25, 0.3], false).unwrap();
        let (mu, sigma) = (model.mean(), model.std_dev());
        let peak = model.density(mu).unwrap();
        for distance in [3.01, 4.0, 10.0] {
            assert!(peak > model.density(mu + distance * sigma).unwrap());
            assert!(peak > model.density(mu - distance * sigma).unwrap());
        }
    }

    #[test]
    fn test_kernel_density_integrates_to_one() {
        let kde = KernelDensity::fit(&[0.1, 0.12, 0.3, 0.31], Bandwidth::Fixed(0.05)).unwrap();
        let step = 0.001;
        let total: f64 = (-1000..2000)
            .map(|i| kde.density(i as f64 * step) * step)
            .sum();
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_kernel_density_single_sample() {
        let kde = KernelDensity::fit(&[0.2], Bandwidth::Silverman).unwrap();
        assert_eq!(kde.bandwidth(), MIN_BANDWIDTH_SECS);
        assert!(kde.density(0.2) > kde.density(0.25));
    }

    #[test]
    fn test_kernel_score_prefers_close_data() {
        let fast = KernelDensity::fit(&[0.10, 0.12, 0.11], Bandwidth::Silverman).unwrap();
        let slow = KernelDensity::fit(&[0.30, 0.31, 0.29], Bandwidth::Silverman).unwrap();
        let observed = [0.11, 0.115];
        assert!(fast.score(&observed) > slow.score(&observed));
    }

    #[test]
    fn test_invalid_fixed_bandwidth() {
        assert!(KernelDensity::fit(&[0.1], Bandwidth::Fixed(0.0)).is_err());
        assert!(KernelDensity::fit(&[0.1], Bandwidth::Fixed(-1.0)).is_err());
    }

    #[test]
    fn test_timing_models_record_degenerate_pairs() {
        let mut corpus = ReferenceCorpus::new();
        corpus.push(KeyPair::new(104, 101), 0.10);
        corpus.push(KeyPair::new(104, 101), 0.12);
        corpus.push(KeyPair::new(116, 104), 0.20);

        let models = TimingModels::fit(&corpus, &ModelOptions::default()).unwrap();
        assert!(models.parametric(&KeyPair::new(104, 101)).is_some());
        assert!(models.parametric(&KeyPair::new(116, 104)).is_none());
        assert!(models.kernel(&KeyPair::new(116, 104)).is_some());
        assert_eq!(models.degenerate_pairs(), &[KeyPair::new(116, 104)]);
    }

    #[test]
    fn test_sparse_pairs_are_not_modelled() {
        let mut corpus = ReferenceCorpus::new();
        for s in [0.10, 0.12, 0.11] {
            corpus.push(KeyPair::new(104, 101), s);
        }
        corpus.push(KeyPair::new(116, 104), 0.20);
        corpus.push(KeyPair::new(116, 104), 0.22);

        let options = ModelOptions {
            min_samples: 3,
            ..ModelOptions::default()
        };
        let models = TimingModels::fit(&corpus, &options).unwrap();
        assert!(models.parametric(&KeyPair::new(104, 101)).is_some());
        assert!(models.parametric(&KeyPair::new(116, 104)).is_none());
        assert!(models.kernel(&KeyPair::new(116, 104)).is_none());
        assert!(models.degenerate_pairs().is_empty());
        assert_eq!(models.kernel_count(), 1);
    }
}
