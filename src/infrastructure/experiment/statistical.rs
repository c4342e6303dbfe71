//! Statistical primitives for experiment analysis
//!
//! Significance testing uses Welch's t-test, which tolerates unequal
//! variances and sample sizes. The power and required-sample-size functions
//! are simplified approximations kept for behavioral parity with the source
//! decision logic; they are not a production power calculator.

/// Calculate p-value using Welch's t-test for two independent samples
///
/// Returns `None` if either sample has fewer than 2 elements or both samples
/// have zero variance.
pub fn welch_t_test(sample1: &[f64], sample2: &[f64]) -> Option<f64> {
    if sample1.len() < 2 || sample2.len() < 2 {
        return None;
    }

    let n1 = sample1.len() as f64;
    let n2 = sample2.len() as f64;

    let mean1 = sample1.iter().sum::<f64>() / n1;
    let mean2 = sample2.iter().sum::<f64>() / n2;

    let var1 = sample1.iter().map(|x| (x - mean1).powi(2)).sum::<f64>() / (n1 - 1.0);
    let var2 = sample2.iter().map(|x| (x - mean2).powi(2)).sum::<f64>() / (n2 - 1.0);

    let se = ((var1 / n1) + (var2 / n2)).sqrt();

    if se == 0.0 {
        return None;
    }

    let t = (mean1 - mean2) / se;

    // Welch-Satterthwaite degrees of freedom
    let df_num = (var1 / n1 + var2 / n2).powi(2);
    let df_denom = ((var1 / n1).powi(2) / (n1 - 1.0)) + ((var2 / n2).powi(2) / (n2 - 1.0));

    if df_denom == 0.0 {
        return None;
    }

    let df = df_num / df_denom;

    Some(approximate_p_value(t.abs(), df))
}

/// Calculate mean of a sample
pub fn mean(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    sample.iter().sum::<f64>() / sample.len() as f64
}

/// Calculate variance of a sample (sample variance, n-1 denominator)
pub fn variance(sample: &[f64]) -> f64 {
    if sample.len() < 2 {
        return 0.0;
    }

    let m = mean(sample);
    let n = sample.len() as f64;
    sample.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1.0)
}

/// Calculate standard deviation of a sample
pub fn std_dev(sample: &[f64]) -> f64 {
    variance(sample).sqrt()
}

/// Required sample size for the configured minimum effect size
///
/// Approximation: inversely proportional to the minimum detectable effect.
/// A 5% minimum effect requires 320 observations per the 16/effect rule of
/// thumb.
pub fn required_sample_size(minimum_effect_size: f64) -> u64 {
    if minimum_effect_size <= 0.0 {
        return u64::MAX;
    }
    (16.0 / minimum_effect_size).ceil() as u64
}

/// Observed statistical power
///
/// Approximation: monotonically increasing in both the control sample size
/// and the observed effect magnitude, capped at 0.95. `observed_effect` and
/// `minimum_effect` are fractions (0.1 = 10%).
pub fn observed_power(
    control_samples: u64,
    observed_effect: f64,
    minimum_effect: f64,
) -> f64 {
    let required = required_sample_size(minimum_effect);
    if required == 0 || minimum_effect <= 0.0 {
        return 0.0;
    }

    let sample_term = control_samples as f64 / required as f64;
    let effect_term = observed_effect.abs() / minimum_effect;

    (sample_term * effect_term).clamp(0.0, 0.95)
}

/// Approximate p-value from t-statistic and degrees of freedom
///
/// Uses normal approximation for large df and a correction factor for
/// smaller df.
fn approximate_p_value(t: f64, df: f64) -> f64 {
    // Two-tailed p-value
    if df > 30.0 {
        2.0 * (1.0 - normal_cdf(t))
    } else {
        let correction = 1.0 - 1.0 / (4.0 * df);
        2.0 * (1.0 - normal_cdf(t * correction.sqrt()))
    }
}

/// Standard normal cumulative distribution function
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function approximation, accurate to about 1.5e-7
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}
