//! # Gaussian Travel-Time Model
//!
//! Observation times are modelled as jointly Gaussian given the diffusion
//! paths. Each edge `k` contributes an independent transit time with mean
//! `μθ[k] = distance[k] / speed` and variance `(dev_frac · μθ[k])²`; every
//! observation adds an independent fixed delay (two storage rounds plus
//! incubation) with mean 8.5 days and variance 12.25 days². For an incidence
//! matrix `C`:
//!
//! ```text
//! μs = C·μθ + μd
//! Σs = C·Σθ·Cᵀ + σd²·I
//! ```
//!
//! The contamination start time `ts` shifts every observation equally. Two
//! evaluation modes handle it:
//!
//! - **Integrated**: `ts` is marginalized under a flat prior. With
//!   `α = ½·1ᵀΣs⁻¹1`, `β = (t−μs)ᵀΣs⁻¹1`, `c = ½·(t−μs)ᵀΣs⁻¹(t−μs)` and
//!   `D = (2π)^(−O/2)·det(Σs)^(−½)` the likelihood is
//!   `D·exp(β²/(4α) − c)·sqrt(π/α)`.
//! - **Point estimate**: `ts* = β / (2α)` and the likelihood is the Gaussian
//!   density of `t` around `μs + ts*`.
//!
//! Everything is evaluated in the log domain.

use nalgebra::{DMatrix, DVector};

use crate::engine::errors::TraceError;
use crate::engine::incidence::{EdgeList, IncidenceMatrix};
use crate::engine::network::NodeId;
use crate::engine::numeric::LN_2PI;

/// Transport speed dividing edge distance into mean transit time.
pub const DEFAULT_TRANSPORT_SPEED: f64 = 630.0;

/// Mean of the fixed per-observation delay, in days.
pub const DEFAULT_DELAY_MEAN: f64 = 8.5;

/// Variance of the fixed per-observation delay, in days².
pub const DEFAULT_DELAY_VARIANCE: f64 = 12.25;

/// Default relative standard deviation of per-edge transit time.
pub const DEFAULT_TRANSPORT_DEV_FRAC: f64 = 0.1;

/// How a covariance that is not positive-definite is handled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum CovarianceFallback {
    /// Report [`TraceError::SingularCovariance`].
    #[default]
    Fail,
    /// Use the Moore–Penrose pseudo-inverse and pseudo-determinant, treating
    /// singular values at or below `tolerance` as zero.
    PseudoInverse { tolerance: f64 },
}

/// Configuration for the travel-time model.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimeModelConfig {
    /// Transit-time standard deviation as a fraction of its mean.
    pub transport_dev_frac: f64,
    /// Distance units travelled per day.
    pub transport_speed: f64,
    /// Fixed per-observation delay mean.
    pub delay_mean: f64,
    /// Fixed per-observation delay variance.
    pub delay_variance: f64,
    pub covariance_fallback: CovarianceFallback,
}

impl Default for TimeModelConfig {
    fn default() -> Self {
        Self {
            transport_dev_frac: DEFAULT_TRANSPORT_DEV_FRAC,
            transport_speed: DEFAULT_TRANSPORT_SPEED,
            delay_mean: DEFAULT_DELAY_MEAN,
            delay_variance: DEFAULT_DELAY_VARIANCE,
            covariance_fallback: CovarianceFallback::Fail,
        }
    }
}

impl TimeModelConfig {
    pub fn with_transport_dev_frac(mut self, frac: f64) -> Self {
        self.transport_dev_frac = frac;
        self
    }

    pub fn validate(self) -> Result<Self, TraceError> {
        if !self.transport_dev_frac.is_finite() || self.transport_dev_frac < 0.0 {
            return Err(TraceError::Validation(
                "time model: transport_dev_frac must be finite and >= 0".into(),
            ));
        }
        if !self.transport_speed.is_finite() || self.transport_speed <= 0.0 {
            return Err(TraceError::Validation(
                "time model: transport_speed must be finite and > 0".into(),
            ));
        }
        if !self.delay_mean.is_finite() {
            return Err(TraceError::Validation(
                "time model: delay_mean must be finite".into(),
            ));
        }
        if !self.delay_variance.is_finite() || self.delay_variance < 0.0 {
            return Err(TraceError::Validation(
                "time model: delay_variance must be finite and >= 0".into(),
            ));
        }
        if let CovarianceFallback::PseudoInverse { tolerance } = self.covariance_fallback {
            if !tolerance.is_finite() || tolerance <= 0.0 {
                return Err(TraceError::Validation(
                    "time model: pseudo-inverse tolerance must be finite and > 0".into(),
                ));
            }
        }
        Ok(self)
    }
}

/// How the unknown start time enters the likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TimeMode {
    /// Marginalize the start time.
    Integrated,
    /// Plug in the maximum-likelihood start time.
    PointEstimate,
}

/// Peak likelihood and the start time achieving it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeEstimate {
    pub log_likelihood: f64,
    /// Maximum-likelihood start time `ts*`.
    pub start_time: f64,
}

impl TimeEstimate {
    pub fn likelihood(&self) -> f64 {
        self.log_likelihood.exp()
    }
}

/// Mean vector and covariance of the observation times for one incidence matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationMoments {
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

/// Travel-time likelihood over a fixed edge list.
#[derive(Debug, Clone)]
pub struct GaussianTimeModel {
    config: TimeModelConfig,
    transit_mean: Vec<f64>,
    transit_variance: Vec<f64>,
}

impl GaussianTimeModel {
    pub fn new(edges: &EdgeList, config: TimeModelConfig) -> Result<Self, TraceError> {
        let config = config.validate()?;
        let transit_mean: Vec<f64> = edges
            .edges()
            .iter()
            .map(|e| e.distance / config.transport_speed)
            .collect();
        let transit_variance = transit_mean
            .iter()
            .map(|mu| (config.transport_dev_frac * mu).powi(2))
            .collect();
        Ok(Self {
            config,
            transit_mean,
            transit_variance,
        })
    }

    pub fn config(&self) -> &TimeModelConfig {
        &self.config
    }

    /// Per-edge mean transit times `μθ`.
    pub fn transit_mean(&self) -> &[f64] {
        &self.transit_mean
    }

    /// Per-edge transit variances, the diagonal of `Σθ`.
    pub fn transit_variance(&self) -> &[f64] {
        &self.transit_variance
    }

    /// `μs` and `Σs` for the observations described by `c`.
    ///
    /// `Σs[i, j]` sums the variances of the edges rows `i` and `j` share,
    /// which equals `(C·Σθ·Cᵀ)[i, j]` for a binary `C`.
    pub fn observation_moments(
        &self,
        c: &IncidenceMatrix,
    ) -> Result<ObservationMoments, TraceError> {
        if c.edge_count() != self.transit_mean.len() {
            return Err(TraceError::Internal(format!(
                "incidence matrix has {} columns but the time model has {} edges",
                c.edge_count(),
                self.transit_mean.len()
            )));
        }
        let o = c.observation_count();
        let mean = DVector::from_iterator(
            o,
            c.rows().iter().map(|row| {
                row.iter().map(|&k| self.transit_mean[k]).sum::<f64>() + self.config.delay_mean
            }),
        );

        let mut covariance = DMatrix::zeros(o, o);
        for i in 0..o {
            for j in i..o {
                let mut shared = self.shared_variance(c.row(i), c.row(j));
                if i == j {
                    shared += self.config.delay_variance;
                }
                covariance[(i, j)] = shared;
                covariance[(j, i)] = shared;
            }
        }
        Ok(ObservationMoments { mean, covariance })
    }

    /// Log of the start-time-marginalized likelihood of `times`.
    pub fn integrated_log_likelihood(
        &self,
        source: NodeId,
        c: &IncidenceMatrix,
        times: &[f64],
    ) -> Result<f64, TraceError> {
        let prepared = self.prepare(source, c, times)?;
        let alpha = 0.5 * prepared.ones_quad;
        let beta = prepared.cross;
        let quad = 0.5 * prepared.residual_quad;
        Ok(prepared.log_normalizer + beta * beta / (4.0 * alpha) - quad
            + 0.5 * (std::f64::consts::PI / alpha).ln())
    }

    /// Maximum-likelihood start time and the peak log-likelihood.
    pub fn point_estimate(
        &self,
        source: NodeId,
        c: &IncidenceMatrix,
        times: &[f64],
    ) -> Result<TimeEstimate, TraceError> {
        let prepared = self.prepare(source, c, times)?;
        let start_time = prepared.cross / prepared.ones_quad;
        Ok(TimeEstimate {
            log_likelihood: prepared.log_density_at(start_time),
            start_time,
        })
    }

    /// Log density of `times` given that contamination started at `start_time`.
    pub fn log_density_given_start(
        &self,
        source: NodeId,
        c: &IncidenceMatrix,
        times: &[f64],
        start_time: f64,
    ) -> Result<f64, TraceError> {
        Ok(self.prepare(source, c, times)?.log_density_at(start_time))
    }

    /// Dispatches on `mode`; only the point estimate yields a start time.
    pub fn evaluate(
        &self,
        mode: TimeMode,
        source: NodeId,
        c: &IncidenceMatrix,
        times: &[f64],
    ) -> Result<(f64, Option<f64>), TraceError> {
        match mode {
            TimeMode::Integrated => Ok((self.integrated_log_likelihood(source, c, times)?, None)),
            TimeMode::PointEstimate => {
                let estimate = self.point_estimate(source, c, times)?;
                Ok((estimate.log_likelihood, Some(estimate.start_time)))
            }
        }
    }

    fn shared_variance(&self, a: &[usize], b: &[usize]) -> f64 {
        let (mut i, mut j, mut total) = (0, 0, 0.0);
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    total += self.transit_variance[a[i]];
                    i += 1;
                    j += 1;
                }
            }
        }
        total
    }

    fn prepare(
        &self,
        source: NodeId,
        c: &IncidenceMatrix,
        times: &[f64],
    ) -> Result<Prepared, TraceError> {
        if c.observation_count() == 0 {
            return Err(TraceError::Validation(
                "time model needs at least one observation".into(),
            ));
        }
        if times.len() != c.observation_count() {
            return Err(TraceError::Internal(format!(
                "{} observation times for an incidence matrix with {} rows",
                times.len(),
                c.observation_count()
            )));
        }

        let moments = self.observation_moments(c)?;
        let o = times.len();
        let (inverse, log_det) = self.invert(source, moments.covariance)?;

        let residual = DVector::from_column_slice(times) - moments.mean;
        let ones = DVector::from_element(o, 1.0);
        let inv_ones = &inverse * &ones;
        let inv_residual = &inverse * &residual;

        let ones_quad = ones.dot(&inv_ones);
        if !(ones_quad.is_finite() && ones_quad > 0.0) {
            return Err(TraceError::SingularCovariance { node: source });
        }

        Ok(Prepared {
            log_normalizer: -0.5 * (o as f64) * LN_2PI - 0.5 * log_det,
            ones_quad,
            cross: residual.dot(&inv_ones),
            residual_quad: residual.dot(&inv_residual),
        })
    }

    /// `(Σs⁻¹, ln det Σs)`, honoring the configured fallback.
    fn invert(
        &self,
        source: NodeId,
        covariance: DMatrix<f64>,
    ) -> Result<(DMatrix<f64>, f64), TraceError> {
        if let Some(chol) = covariance.clone().cholesky() {
            let log_det = 2.0 * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>();
            if log_det.is_finite() {
                return Ok((chol.inverse(), log_det));
            }
        }

        match self.config.covariance_fallback {
            CovarianceFallback::Fail => Err(TraceError::SingularCovariance { node: source }),
            CovarianceFallback::PseudoInverse { tolerance } => {
                let svd = covariance.svd(true, true);
                let log_det = svd
                    .singular_values
                    .iter()
                    .filter(|&&s| s > tolerance)
                    .map(|s| s.ln())
                    .sum::<f64>();
                let inverse = svd
                    .pseudo_inverse(tolerance)
                    .map_err(|_| TraceError::SingularCovariance { node: source })?;
                Ok((inverse, log_det))
            }
        }
    }
}

/// Scalars shared by every evaluation mode.
struct Prepared {
    log_normalizer: f64,
    /// `1ᵀΣs⁻¹1`
    ones_quad: f64,
    /// `(t−μs)ᵀΣs⁻¹1`
    cross: f64,
    /// `(t−μs)ᵀΣs⁻¹(t−μs)`
    residual_quad: f64,
}

impl Prepared {
    /// Log density with every observation mean shifted by `shift`.
    fn log_density_at(&self, shift: f64) -> f64 {
        // (r - s·1)ᵀΣ⁻¹(r - s·1) expanded
        let quad = self.residual_quad - 2.0 * shift * self.cross + shift * shift * self.ones_quad;
        self.log_normalizer - 0.5 * quad
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::network::{FlowEdge, SupplyNetwork};
    use crate::engine::paths::Path;

    fn assert_close(actual: f64, expected: f64, tol: f64, label: &str) {
        assert!(
            (actual - expected).abs() <= tol,
            "{} mismatch: expected {:.15}, got {:.15}",
            label,
            expected,
            actual
        );
    }

    /// 0 -> 1 -> {2, 3}, distances chosen to give 1, 2 and 3 days of transit.
    fn fork() -> (SupplyNetwork, EdgeList) {
        let net = SupplyNetwork::new(
            vec![0, 1, 3],
            vec![
                FlowEdge::new(0, 1, 1.0, 630.0),
                FlowEdge::new(1, 2, 0.5, 1260.0),
                FlowEdge::new(1, 3, 0.5, 1890.0),
            ],
        )
        .unwrap();
        let edges = EdgeList::from_network(&net);
        (net, edges)
    }

    #[test]
    fn moments_match_dense_formula() {
        let (_, edges) = fork();
        let model = GaussianTimeModel::new(
            &edges,
            TimeModelConfig::default().with_transport_dev_frac(0.2),
        )
        .unwrap();
        let paths = [Path::from(vec![0, 1, 2]), Path::from(vec![0, 1, 3])];
        let c = IncidenceMatrix::build(&paths, &edges).unwrap();
        let moments = model.observation_moments(&c).unwrap();

        let dense = c.to_dense();
        let mu_theta = DVector::from_column_slice(model.transit_mean());
        let sigma_theta = DMatrix::from_diagonal(&DVector::from_column_slice(model.transit_variance()));
        let expected_mean = &dense * &mu_theta + DVector::from_element(2, DEFAULT_DELAY_MEAN);
        let expected_cov = &dense * sigma_theta * dense.transpose()
            + DMatrix::identity(2, 2) * DEFAULT_DELAY_VARIANCE;

        assert!((moments.mean - expected_mean).norm() < 1e-12);
        assert!((moments.covariance - expected_cov).norm() < 1e-12);
    }

    #[test]
    fn single_observation_integrates_to_one() {
        // For O = 1 the flat-prior marginal of a Gaussian is exactly 1.
        let (_, edges) = fork();
        let model = GaussianTimeModel::new(&edges, TimeModelConfig::default()).unwrap();
        let c = IncidenceMatrix::build(&[Path::from(vec![0, 1, 2])], &edges).unwrap();
        for t in [-30.0, 0.0, 11.5, 400.0] {
            let ll = model.integrated_log_likelihood(NodeId(0), &c, &[t]).unwrap();
            assert_close(ll, 0.0, 1e-10, "log integrated likelihood");
        }
    }

    #[test]
    fn point_estimate_recovers_the_offset() {
        let (_, edges) = fork();
        let model = GaussianTimeModel::new(&edges, TimeModelConfig::default()).unwrap();
        let paths = [Path::from(vec![0, 1, 2]), Path::from(vec![0, 1, 3])];
        let c = IncidenceMatrix::build(&paths, &edges).unwrap();
        // means are 3 + 8.5 and 4 + 8.5; observing both shifted by 5 days
        let times = [16.5, 17.5];
        let estimate = model.point_estimate(NodeId(0), &c, &times).unwrap();
        assert_close(estimate.start_time, 5.0, 1e-10, "ts*");

        let off_peak = model
            .log_density_given_start(NodeId(0), &c, &times, 6.0)
            .unwrap();
        assert!(estimate.log_likelihood > off_peak);
    }

    #[test]
    fn integrated_prefers_consistent_spacing() {
        let (_, edges) = fork();
        let model = GaussianTimeModel::new(&edges, TimeModelConfig::default()).unwrap();
        let paths = [Path::from(vec![0, 1, 2]), Path::from(vec![0, 1, 3])];
        let c = IncidenceMatrix::build(&paths, &edges).unwrap();
        let consistent = model
            .integrated_log_likelihood(NodeId(0), &c, &[20.0, 21.0])
            .unwrap();
        let inconsistent = model
            .integrated_log_likelihood(NodeId(0), &c, &[20.0, 35.0])
            .unwrap();
        assert!(consistent > inconsistent);
    }

    #[test]
    fn zero_variance_is_singular_even_with_pseudo_inverse() {
        let (_, edges) = fork();
        let config = TimeModelConfig {
            transport_dev_frac: 0.0,
            delay_variance: 0.0,
            ..TimeModelConfig::default()
        };
        let c = IncidenceMatrix::build(&[Path::from(vec![0, 1, 2])], &edges).unwrap();

        let strict = GaussianTimeModel::new(&edges, config).unwrap();
        assert_eq!(
            strict.integrated_log_likelihood(NodeId(0), &c, &[11.5]),
            Err(TraceError::SingularCovariance { node: NodeId(0) })
        );

        let lenient = GaussianTimeModel::new(
            &edges,
            TimeModelConfig {
                covariance_fallback: CovarianceFallback::PseudoInverse { tolerance: 1e-9 },
                ..config
            },
        )
        .unwrap();
        assert_eq!(
            lenient.integrated_log_likelihood(NodeId(0), &c, &[11.5]),
            Err(TraceError::SingularCovariance { node: NodeId(0) })
        );
    }

    #[test]
    fn pseudo_inverse_handles_duplicate_degenerate_paths() {
        // one 630 km edge: transit mean 1 day, variance 0.25, so Σs = 0.25·11ᵀ exactly
        let (_, edges) = fork();
        let config = TimeModelConfig {
            transport_dev_frac: 0.5,
            delay_variance: 0.0,
            ..TimeModelConfig::default()
        };
        let paths = [Path::from(vec![0, 1]), Path::from(vec![0, 1])];
        let c = IncidenceMatrix::build(&paths, &edges).unwrap();

        let strict = GaussianTimeModel::new(&edges, config).unwrap();
        assert!(matches!(
            strict.integrated_log_likelihood(NodeId(0), &c, &[12.0, 12.0]),
            Err(TraceError::SingularCovariance { .. })
        ));

        let lenient = GaussianTimeModel::new(
            &edges,
            TimeModelConfig {
                covariance_fallback: CovarianceFallback::PseudoInverse { tolerance: 1e-9 },
                ..config
            },
        )
        .unwrap();
        let estimate = lenient.point_estimate(NodeId(0), &c, &[12.0, 12.0]).unwrap();
        assert_close(estimate.start_time, 2.5, 1e-9, "ts*");
        assert!(estimate.log_likelihood.is_finite());
    }

    #[test]
    fn rejects_negative_deviation() {
        let (_, edges) = fork();
        let config = TimeModelConfig::default().with_transport_dev_frac(-0.1);
        assert!(GaussianTimeModel::new(&edges, config).is_err());
    }
}
