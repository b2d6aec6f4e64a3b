//! Log-domain numeric helpers.
//!
//! Likelihoods are carried as natural logarithms throughout the engine; a zero
//! likelihood is `f64::NEG_INFINITY`.

/// Tolerance for checking that a probability vector sums to one.
pub const NORMALIZATION_EPSILON: f64 = 1e-9;

/// `ln(2π)`.
pub const LN_2PI: f64 = 1.837_877_066_409_345_3;

/// `ln(e^a + e^b)` without overflow.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Running log-sum-exp accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogSumExp {
    value: f64,
}

impl Default for LogSumExp {
    fn default() -> Self {
        Self {
            value: f64::NEG_INFINITY,
        }
    }
}

impl LogSumExp {
    pub fn add(&mut self, log_term: f64) {
        self.value = log_sum_exp(self.value, log_term);
    }

    /// Log of the accumulated sum; `NEG_INFINITY` when nothing positive was added.
    pub fn value(self) -> f64 {
        self.value
    }
}

/// Normalizes log weights into probabilities that sum to one.
///
/// Returns `None` when every weight is `-inf` (zero total mass) or any weight
/// is NaN or `+inf`.
pub fn normalize_log_weights(log_weights: &[f64]) -> Option<Vec<f64>> {
    if log_weights
        .iter()
        .any(|w| w.is_nan() || *w == f64::INFINITY)
    {
        return None;
    }
    let max = log_weights
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return None;
    }
    let shifted: Vec<f64> = log_weights.iter().map(|w| (w - max).exp()).collect();
    let total: f64 = shifted.iter().sum();
    Some(shifted.into_iter().map(|w| w / total).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {:.15}, got {:.15}",
            expected,
            actual
        );
    }

    #[test]
    fn log_sum_exp_matches_direct_sum() {
        assert_close(log_sum_exp(0.3_f64.ln(), 0.5_f64.ln()), 0.8_f64.ln(), 1e-12);
        assert_eq!(log_sum_exp(f64::NEG_INFINITY, 2.0), 2.0);
        assert_eq!(
            log_sum_exp(f64::NEG_INFINITY, f64::NEG_INFINITY),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn accumulator_survives_underflow() {
        let mut acc = LogSumExp::default();
        acc.add(-2000.0);
        acc.add(-2000.0);
        assert_close(acc.value(), -2000.0 + 2.0_f64.ln(), 1e-9);
    }

    #[test]
    fn normalization_handles_tiny_weights() {
        let probs = normalize_log_weights(&[-1000.0, -1000.0 + 3.0_f64.ln(), f64::NEG_INFINITY])
            .unwrap();
        assert_close(probs[0], 0.25, 1e-12);
        assert_close(probs[1], 0.75, 1e-12);
        assert_eq!(probs[2], 0.0);
    }

    #[test]
    fn zero_mass_cannot_be_normalized() {
        assert!(normalize_log_weights(&[f64::NEG_INFINITY, f64::NEG_INFINITY]).is_none());
        assert!(normalize_log_weights(&[]).is_none());
        assert!(normalize_log_weights(&[0.0, f64::NAN]).is_none());
    }
}
