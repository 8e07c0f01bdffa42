//! Scalar statistics over latency samples
//!
//! Small, allocation-light helpers shared by the aggregator and the
//! cross-run differ:
//!
//! - **Mean / population variance / stddev**: summary of elementwise diffs
//! - **Percentile**: linear interpolation over the sorted sample
//! - **Welch's t-test**: significance check when comparing two runs
//!
//! Every function returns `None` for an empty sample. Callers must treat
//! that as "insufficient data", never as zero.

#![allow(clippy::cast_precision_loss)] // Statistical functions need usize->f64

/// Arithmetic mean, or `None` for an empty sample
#[must_use]
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Population variance (ddof = 0), or `None` for an empty sample
#[must_use]
pub fn population_variance(samples: &[f64]) -> Option<f64> {
    let m = mean(samples)?;
    let n = samples.len() as f64;
    Some(samples.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n)
}

/// Population standard deviation, or `None` for an empty sample
#[must_use]
pub fn population_stddev(samples: &[f64]) -> Option<f64> {
    population_variance(samples).map(f64::sqrt)
}

/// Percentile via linear interpolation over the sorted sample
///
/// Matches the default interpolation of the reference tooling: rank
/// `(n - 1) * p / 100` is split into an integer part and a fraction, and
/// the two neighboring order statistics are blended by the fraction.
#[must_use]
pub fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (sorted.len() - 1) as f64 * (p / 100.0).clamp(0.0, 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Maximum of the sample, or `None` when empty
#[must_use]
pub fn max(samples: &[f64]) -> Option<f64> {
    samples
        .iter()
        .copied()
        .fold(None, |acc, x| Some(acc.map_or(x, |m: f64| m.max(x))))
}

/// Result of Welch's t-test for comparing two latency samples
#[derive(Debug, Clone)]
pub struct WelchResult {
    /// Calculated t-statistic
    pub t_statistic: f64,
    /// Two-tailed p-value (normal approximation, valid for large n)
    pub p_value: f64,
    /// Whether the difference is significant at alpha = 0.05
    pub significant: bool,
}

/// Welch's t-test on two independent samples
///
/// Used only for reporting: the diff output format stays fixed whether or
/// not the difference is significant. Returns `None` when either sample
/// has fewer than two observations.
#[must_use]
pub fn welch_t_test(current: &[f64], baseline: &[f64]) -> Option<WelchResult> {
    if current.len() < 2 || baseline.len() < 2 {
        return None;
    }
    let n1 = current.len() as f64;
    let n2 = baseline.len() as f64;
    let m1 = mean(current)?;
    let m2 = mean(baseline)?;

    let var1 = current.iter().map(|x| (x - m1).powi(2)).sum::<f64>() / (n1 - 1.0);
    let var2 = baseline.iter().map(|x| (x - m2).powi(2)).sum::<f64>() / (n2 - 1.0);

    let se = (var1 / n1 + var2 / n2).sqrt();
    if se <= 0.0 {
        // Two constant, equal samples: no detectable difference
        return Some(WelchResult {
            t_statistic: 0.0,
            p_value: 1.0,
            significant: false,
        });
    }
    let t_statistic = (m1 - m2) / se;
    let p_value = 2.0 * (1.0 - normal_cdf(t_statistic.abs()));
    Some(WelchResult {
        t_statistic,
        p_value,
        significant: p_value < 0.05,
    })
}

/// Normal CDF approximation (Abramowitz and Stegun)
#[allow(clippy::unreadable_literal)] // Standard statistical constants
fn normal_cdf(x: f64) -> f64 {
    let a1 = 0.254_829_592;
    let a2 = -0.284_496_736;
    let a3 = 1.421_413_741;
    let a4 = -1.453_152_027;
    let a5 = 1.061_405_429;
    let p = 0.327_591;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs() / std::f64::consts::SQRT_2;

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    0.5 * (1.0 + sign * y)
}
