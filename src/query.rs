//! Probability statements and intervals computed from posterior draws.

use crate::draws::PosteriorDraws;
use crate::eda::{mean_sd, quantile, sorted};
use crate::error::{Result, check_level, invalid};
use rand::Rng;
use rand::distributions::Distribution;
use serde::Serialize;
use statrs::distribution::Normal;

fn non_empty(samples: &[f64]) -> Result<()> {
    if samples.is_empty() {
        return invalid("no posterior samples");
    }
    Ok(())
}

fn share(samples: &[f64], pred: impl Fn(f64) -> bool) -> Result<f64> {
    non_empty(samples)?;
    Ok(samples.iter().filter(|v| pred(**v)).count() as f64 / samples.len() as f64)
}

/// `P(θ > threshold)`
pub fn prob_greater(samples: &[f64], threshold: f64) -> Result<f64> {
    share(samples, |v| v > threshold)
}

/// `P(θ < threshold)`
pub fn prob_less(samples: &[f64], threshold: f64) -> Result<f64> {
    share(samples, |v| v < threshold)
}

/// `P(lo ≤ θ ≤ hi)`
pub fn prob_between(samples: &[f64], lo: f64, hi: f64) -> Result<f64> {
    if lo > hi {
        return invalid(format!("empty range [{lo}, {hi}]"));
    }
    share(samples, |v| lo <= v && v <= hi)
}

/// Equal-tailed credible interval.
pub fn credible_interval(samples: &[f64], level: f64) -> Result<(f64, f64)> {
    non_empty(samples)?;
    check_level(level)?;
    let s = sorted(samples);
    let tail = (1.0 - level) / 2.0;
    Ok((quantile(&s, tail), quantile(&s, 1.0 - tail)))
}

/// Highest posterior density interval: the narrowest window holding `⌈level · n⌉` sorted
/// draws.
///
/// Only meaningful for unimodal posteriors.
pub fn hpd_interval(samples: &[f64], level: f64) -> Result<(f64, f64)> {
    non_empty(samples)?;
    check_level(level)?;
    let s = sorted(samples);
    let n = s.len();
    let m = ((level * n as f64).ceil() as usize).clamp(1, n);
    let best = (0..=n - m)
        .min_by(|&a, &b| (s[a + m - 1] - s[a]).total_cmp(&(s[b + m - 1] - s[b])))
        .unwrap_or(0);
    Ok((s[best], s[best + m - 1]))
}

/// `P(θ_a > θ_b)` from the joint draws.
pub fn prob_exceeds(draws: &PosteriorDraws, a: &str, b: &str) -> Result<f64> {
    let ia = draws.param_index(a)?;
    let ib = draws.param_index(b)?;
    let diff: Vec<f64> = draws
        .pooled(ia)
        .iter()
        .zip(draws.pooled(ib))
        .map(|(x, y)| x - y)
        .collect();
    prob_greater(&diff, 0.0)
}

fn check_row(draws: &PosteriorDraws, x_row: &[f64]) -> Result<usize> {
    let p = draws.n_coef()?;
    if x_row.len() != p {
        return invalid(format!(
            "covariate row has {} values, model has {p} coefficients",
            x_row.len()
        ));
    }
    Ok(p)
}

/// Posterior draws of the mean response `xᵀβ` at covariate row `x_row`.
///
/// `x_row` must include the leading 1 when the model has an intercept.
pub fn expected_response(draws: &PosteriorDraws, x_row: &[f64]) -> Result<Vec<f64>> {
    let p = check_row(draws, x_row)?;
    Ok(draws
        .coefficient_rows()
        .map(|row| row[..p].iter().zip(x_row).map(|(b, x)| b * x).sum())
        .collect())
}

/// Posterior predictive draws of a new observation at `x_row`: `xᵀβ + σε` for every draw.
pub fn predictive_draws<R: Rng + ?Sized>(
    draws: &PosteriorDraws,
    x_row: &[f64],
    rng: &mut R,
) -> Result<Vec<f64>> {
    let p = check_row(draws, x_row)?;
    let z = Normal::standard();
    Ok(draws
        .coefficient_rows()
        .map(|row| {
            let mu: f64 = row[..p].iter().zip(x_row).map(|(b, x)| b * x).sum();
            mu + row[p] * z.sample(rng)
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSummary {
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub median: f64,
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

pub fn summarize_samples(samples: &[f64], level: f64) -> Result<SampleSummary> {
    let (lower, upper) = credible_interval(samples, level)?;
    let (mean, sd) = mean_sd(samples);
    Ok(SampleSummary {
        n: samples.len(),
        mean,
        sd,
        median: quantile(&sorted(samples), 0.5),
        level,
        lower,
        upper,
    })
}
