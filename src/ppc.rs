//! Posterior predictive checks.
//!
//! Replicated datasets are simulated from the fitted model, one per selected posterior
//! draw, and a test statistic of the observed response is compared with its distribution
//! over the replicates.

use crate::draws::PosteriorDraws;
use crate::eda::{mean_sd, quantile, sorted};
use crate::error::{Result, check_level, invalid};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::Serialize;
use statrs::distribution::Normal;
use std::fmt;

/// Replicates simulated with one seed. Fixed so the output does not depend on the thread count.
const CHUNK: usize = 32;

/// Simulate `n_rep` replicated responses at design `x`, shape `(n_rep, n_obs)`.
///
/// Replicate `r` uses the pooled draw at index `⌊r · n_draws / n_rep⌋`, so the replicates
/// spread evenly over all chains. Chunks of replicates are seeded with `seed + chunk` and
/// simulated in parallel when the `rayon` feature is on; both paths give identical output.
pub fn simulate_replicates(
    x: ArrayView2<'_, f64>,
    draws: &PosteriorDraws,
    n_rep: usize,
    seed: u64,
) -> Result<Array2<f64>> {
    let p = draws.n_coef()?;
    if x.ncols() != p {
        return invalid(format!("design has {} columns, draws have {p} coefficients", x.ncols()));
    }
    if n_rep == 0 {
        return invalid("at least one replicate is required");
    }
    let rows: Vec<Vec<f64>> = draws.coefficient_rows().collect();
    let n_obs = x.nrows();
    let n_chunks = n_rep.div_ceil(CHUNK);

    let simulate_chunk = |chunk: usize| -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(chunk as u64));
        let z = Normal::standard();
        let start = chunk * CHUNK;
        let end = (start + CHUNK).min(n_rep);
        let mut out = Vec::with_capacity((end - start) * n_obs);
        for r in start..end {
            let draw = &rows[r * rows.len() / n_rep];
            let beta = ArrayView1::from(&draw[..p]);
            let sigma = draw[p];
            let mu = x.dot(&beta);
            out.extend(mu.iter().map(|m| m + sigma * rand::Rng::sample(&mut rng, z)));
        }
        out
    };

    #[cfg(feature = "rayon")]
    let chunks: Vec<Vec<f64>> = (0..n_chunks).into_par_iter().map(simulate_chunk).collect();
    #[cfg(not(feature = "rayon"))]
    let chunks: Vec<Vec<f64>> = (0..n_chunks).map(simulate_chunk).collect();

    tracing::debug!(
        replicates = n_rep,
        observations = n_obs,
        chunks = n_chunks,
        "simulated replicates"
    );
    Ok(Array2::from_shape_vec((n_rep, n_obs), chunks.concat())?)
}

/// Scalar summary of a dataset used as a discrepancy measure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatistic {
    Mean,
    Sd,
    Min,
    Max,
    Median,
    Quantile(f64),
    Skewness,
}

impl TestStatistic {
    /// The statistics the CLI reports by default.
    pub const DEFAULTS: [TestStatistic; 5] = [
        TestStatistic::Mean,
        TestStatistic::Sd,
        TestStatistic::Min,
        TestStatistic::Max,
        TestStatistic::Skewness,
    ];

    pub fn compute(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        match *self {
            TestStatistic::Mean => values.iter().sum::<f64>() / values.len() as f64,
            TestStatistic::Sd => mean_sd(values).1,
            TestStatistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            TestStatistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            TestStatistic::Median => quantile(&sorted(values), 0.5),
            TestStatistic::Quantile(q) => quantile(&sorted(values), q),
            TestStatistic::Skewness => {
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let m2 = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let m3 = values.iter().map(|v| (v - mean).powi(3)).sum::<f64>() / n;
                m3 / m2.powf(1.5)
            }
        }
    }
}

impl fmt::Display for TestStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatistic::Mean => write!(f, "mean"),
            TestStatistic::Sd => write!(f, "sd"),
            TestStatistic::Min => write!(f, "min"),
            TestStatistic::Max => write!(f, "max"),
            TestStatistic::Median => write!(f, "median"),
            TestStatistic::Quantile(q) => write!(f, "q{:.0}", q * 100.0),
            TestStatistic::Skewness => write!(f, "skewness"),
        }
    }
}

/// Outcome of a posterior predictive check for one statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PpcResult {
    pub statistic: TestStatistic,
    pub observed: f64,
    /// Statistic of every replicate, in replicate order.
    pub replicated: Vec<f64>,
    /// Posterior predictive p-value `P(T(y_rep) ≥ T(y))`.
    pub p_value: f64,
}

impl PpcResult {
    /// True when the p-value falls in either tail of size `alpha / 2`.
    pub fn is_extreme(&self, alpha: f64) -> bool {
        self.p_value < alpha / 2.0 || self.p_value > 1.0 - alpha / 2.0
    }
}

fn check_shapes(y: &[f64], y_rep: &Array2<f64>) -> Result<()> {
    if y_rep.nrows() == 0 {
        return invalid("no replicated datasets");
    }
    if y.len() != y_rep.ncols() {
        return invalid(format!(
            "{} observations but replicates have {} columns",
            y.len(),
            y_rep.ncols()
        ));
    }
    Ok(())
}

/// Compare `stat(y)` with `stat` over the rows of `y_rep`.
pub fn check(y: &[f64], y_rep: &Array2<f64>, stat: TestStatistic) -> Result<PpcResult> {
    check_shapes(y, y_rep)?;
    if let TestStatistic::Quantile(q) = stat {
        if !(0.0..=1.0).contains(&q) {
            return invalid(format!("quantile must lie in [0, 1], got {q}"));
        }
    }
    let observed = stat.compute(y);
    let replicated: Vec<f64> = y_rep
        .axis_iter(Axis(0))
        .map(|row| stat.compute(&row.to_vec()))
        .collect();
    let exceed = replicated.iter().filter(|t| **t >= observed).count();
    let p_value = exceed as f64 / replicated.len() as f64;
    Ok(PpcResult {
        statistic: stat,
        observed,
        replicated,
        p_value,
    })
}

/// Share of observations inside their equal-tailed posterior predictive interval at `level`.
pub fn interval_coverage(y: &[f64], y_rep: &Array2<f64>, level: f64) -> Result<f64> {
    check_shapes(y, y_rep)?;
    check_level(level)?;
    let tail = (1.0 - level) / 2.0;
    let inside = y_rep
        .axis_iter(Axis(1))
        .zip(y)
        .filter(|(col, obs)| {
            let s = sorted(&col.to_vec());
            quantile(&s, tail) <= **obs && **obs <= quantile(&s, 1.0 - tail)
        })
        .count();
    Ok(inside as f64 / y.len() as f64)
}

/// `(y_i - mean(y_rep_i)) / sd(y_rep_i)` for every observation.
pub fn standardized_residuals(y: &[f64], y_rep: &Array2<f64>) -> Result<Vec<f64>> {
    check_shapes(y, y_rep)?;
    if y_rep.nrows() < 2 {
        return invalid("standardized residuals need at least two replicates");
    }
    Ok(y_rep
        .axis_iter(Axis(1))
        .zip(y)
        .map(|(col, obs)| {
            let (mean, sd) = mean_sd(&col.to_vec());
            (obs - mean) / sd
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regression::SIGMA;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array3, array};

    fn draws() -> PosteriorDraws {
        // β = (1, 2), σ = 0.5 in every draw
        let arr = Array3::from_shape_fn((2, 50, 3), |(_, _, j)| [1.0, 2.0, 0.5][j]);
        PosteriorDraws::new(arr, vec!["(Intercept)".into(), "x".into(), SIGMA.into()]).unwrap()
    }

    fn design() -> Array2<f64> {
        Array2::from_shape_fn((40, 2), |(i, j)| if j == 0 { 1.0 } else { i as f64 / 10.0 })
    }

    #[test]
    fn replicates_have_right_shape_and_are_reproducible() {
        let x = design();
        let a = simulate_replicates(x.view(), &draws(), 70, 5).unwrap();
        let b = simulate_replicates(x.view(), &draws(), 70, 5).unwrap();
        assert_eq!(a.dim(), (70, 40));
        assert_eq!(a, b);
        assert_ne!(a, simulate_replicates(x.view(), &draws(), 70, 6).unwrap());
    }

    #[test]
    fn replicates_centre_on_linear_predictor() {
        let x = design();
        let rep = simulate_replicates(x.view(), &draws(), 400, 1).unwrap();
        let col_means = rep.mean_axis(Axis(0)).unwrap();
        for i in [0, 20, 39] {
            let mu = 1.0 + 2.0 * (i as f64 / 10.0);
            assert_abs_diff_eq!(col_means[i], mu, epsilon = 0.1);
        }
    }

    #[test]
    fn replicates_reject_mismatched_design() {
        let x = Array2::ones((10, 3));
        assert!(simulate_replicates(x.view(), &draws(), 10, 0).is_err());
        assert!(simulate_replicates(design().view(), &draws(), 0, 0).is_err());
    }

    #[test]
    fn statistics() {
        let v = [1.0, 2.0, 3.0, 4.0, 10.0];
        assert_abs_diff_eq!(TestStatistic::Mean.compute(&v), 4.0);
        assert_abs_diff_eq!(TestStatistic::Median.compute(&v), 3.0);
        assert_abs_diff_eq!(TestStatistic::Min.compute(&v), 1.0);
        assert_abs_diff_eq!(TestStatistic::Max.compute(&v), 10.0);
        assert_abs_diff_eq!(TestStatistic::Quantile(0.25).compute(&v), 2.0);
        assert!(TestStatistic::Skewness.compute(&v) > 0.0);
        assert_abs_diff_eq!(TestStatistic::Skewness.compute(&[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(TestStatistic::Quantile(0.9).to_string(), "q90");
    }

    #[test]
    fn p_value_counts_exceedances() {
        let y_rep = array![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let res = check(&[1.0, 1.0], &y_rep, TestStatistic::Mean).unwrap();
        assert_abs_diff_eq!(res.observed, 1.0);
        assert_abs_diff_eq!(res.p_value, 0.75);
        assert!(!res.is_extreme(0.05));

        let res = check(&[9.0, 9.0], &y_rep, TestStatistic::Mean).unwrap();
        assert_abs_diff_eq!(res.p_value, 0.0);
        assert!(res.is_extreme(0.05));

        assert!(check(&[1.0], &y_rep, TestStatistic::Mean).is_err());
        assert!(check(&[1.0, 1.0], &y_rep, TestStatistic::Quantile(1.5)).is_err());
    }

    #[test]
    fn coverage_and_residuals() {
        let y_rep = Array2::from_shape_fn((101, 2), |(r, _)| r as f64);
        let cov = interval_coverage(&[50.0, 1000.0], &y_rep, 0.9).unwrap();
        assert_abs_diff_eq!(cov, 0.5);
        assert!(interval_coverage(&[50.0, 1.0], &y_rep, 1.0).is_err());

        let z = standardized_residuals(&[50.0, 50.0 + 29.3], &y_rep).unwrap();
        assert_abs_diff_eq!(z[0], 0.0, epsilon = 1e-12);
        assert!(z[1] > 0.99 && z[1] < 1.01);
    }
}
