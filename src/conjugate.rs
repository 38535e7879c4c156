//! Closed-form conjugate Bayesian updating.
//!
//! Three conjugate pairs are covered:
//! - [`BetaBinomial`]: a proportion with a Beta prior.
//! - [`NormalKnownVariance`]: a normal mean with known observation variance.
//! - [`NormalInverseGamma`]: the joint prior for the coefficients and noise variance of a
//!   linear regression, with exact posterior draws via [`NormalInverseGamma::sample`].

use crate::data::Design;
use crate::error::{Error, Result, check_level, invalid};
use crate::ols::to_nalgebra;
use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use rand::{Rng, prelude::Distribution};
use statrs::distribution::{Beta, ContinuousCDF, Gamma, Normal, StudentsT};

/// Beta(α, β) belief about a success probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaBinomial {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaBinomial {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        if !(alpha > 0.0 && beta > 0.0) {
            return invalid("Beta parameters must be positive");
        }
        Ok(Self { alpha, beta })
    }

    /// Posterior after observing `successes` out of `trials`.
    pub fn update(&self, successes: u64, trials: u64) -> Result<Self> {
        if successes > trials {
            return invalid(format!("{successes} successes out of {trials} trials"));
        }
        Ok(Self {
            alpha: self.alpha + successes as f64,
            beta: self.beta + (trials - successes) as f64,
        })
    }

    pub fn mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn variance(&self) -> f64 {
        let s = self.alpha + self.beta;
        self.alpha * self.beta / (s * s * (s + 1.0))
    }

    /// Equal-tailed credible interval.
    pub fn credible_interval(&self, level: f64) -> Result<(f64, f64)> {
        check_level(level)?;
        let dist = Beta::new(self.alpha, self.beta).map_err(|e| Error::Computation(e.to_string()))?;
        let tail = (1.0 - level) / 2.0;
        Ok((dist.inverse_cdf(tail), dist.inverse_cdf(1.0 - tail)))
    }
}

/// Normal belief `N(mean, variance)` about the mean of observations with known variance `sigma2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalKnownVariance {
    pub mean: f64,
    pub variance: f64,
    pub sigma2: f64,
}

impl NormalKnownVariance {
    pub fn new(mean: f64, variance: f64, sigma2: f64) -> Result<Self> {
        if !(variance > 0.0 && sigma2 > 0.0) || !mean.is_finite() {
            return invalid("prior variance and observation variance must be positive");
        }
        Ok(Self {
            mean,
            variance,
            sigma2,
        })
    }

    /// Precision-weighted update with the observations in `data`.
    pub fn update(&self, data: &[f64]) -> Result<Self> {
        if data.is_empty() {
            return Ok(*self);
        }
        let n = data.len() as f64;
        let prior_prec = 1.0 / self.variance;
        let data_prec = n / self.sigma2;
        let post_var = 1.0 / (prior_prec + data_prec);
        let xbar = data.iter().sum::<f64>() / n;
        let post_mean = post_var * (prior_prec * self.mean + data_prec * xbar);
        Ok(Self {
            mean: post_mean,
            variance: post_var,
            sigma2: self.sigma2,
        })
    }

    pub fn credible_interval(&self, level: f64) -> Result<(f64, f64)> {
        check_level(level)?;
        let z = Normal::standard().inverse_cdf(0.5 + level / 2.0);
        let sd = self.variance.sqrt();
        Ok((self.mean - z * sd, self.mean + z * sd))
    }
}

/// Normal-inverse-gamma prior for linear regression:
/// `β | σ² ~ N(mean, σ² precision⁻¹)`, `σ² ~ IG(shape, rate)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalInverseGamma {
    pub mean: DVector<f64>,
    pub precision: DMatrix<f64>,
    pub shape: f64,
    pub rate: f64,
}

impl NormalInverseGamma {
    pub fn new(mean: DVector<f64>, precision: DMatrix<f64>, shape: f64, rate: f64) -> Result<Self> {
        let p = mean.len();
        if precision.nrows() != p || precision.ncols() != p {
            return invalid(format!("precision must be {p}x{p}"));
        }
        if !(shape > 0.0 && rate > 0.0) {
            return invalid("inverse-gamma shape and rate must be positive");
        }
        Ok(Self {
            mean,
            precision,
            shape,
            rate,
        })
    }

    /// Zero-mean prior with `variance · I` scale and a vague IG(0.01, 0.01) on `σ²`.
    pub fn weakly_informative(p: usize, variance: f64) -> Result<Self> {
        if variance <= 0.0 {
            return invalid("prior variance must be positive");
        }
        Self::new(
            DVector::zeros(p),
            DMatrix::identity(p, p) / variance,
            0.01,
            0.01,
        )
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Posterior given the observations in `design`.
    pub fn posterior(&self, design: &Design) -> Result<Self> {
        if design.n_coef() != self.dim() {
            return invalid(format!(
                "prior has {} coefficients, design has {}",
                self.dim(),
                design.n_coef()
            ));
        }
        let (x, y) = to_nalgebra(design);
        let prec_n = &self.precision + x.transpose() * &x;
        let chol = prec_n.clone().cholesky().ok_or_else(|| {
            Error::Computation("posterior precision is not positive definite".to_string())
        })?;
        let rhs = &self.precision * &self.mean + x.transpose() * &y;
        let mean_n = chol.solve(&rhs);

        let quad0 = self.mean.dot(&(&self.precision * &self.mean));
        let quad_n = mean_n.dot(&(&prec_n * &mean_n));
        let shape_n = self.shape + design.n_obs() as f64 / 2.0;
        let rate_n = self.rate + 0.5 * (y.dot(&y) + quad0 - quad_n);
        if !(rate_n > 0.0) {
            return Err(Error::Computation(format!("non-positive posterior rate {rate_n}")));
        }
        Ok(Self {
            mean: mean_n,
            precision: prec_n,
            shape: shape_n,
            rate: rate_n,
        })
    }

    /// Posterior mean of `σ²` (defined for shape > 1).
    pub fn sigma2_mean(&self) -> Option<f64> {
        (self.shape > 1.0).then(|| self.rate / (self.shape - 1.0))
    }

    fn covariance_unscaled(&self) -> Result<DMatrix<f64>> {
        self.precision
            .clone()
            .try_inverse()
            .ok_or_else(|| Error::Computation("precision matrix is singular".to_string()))
    }

    /// Marginal Student-t distribution of coefficient `j`.
    pub fn coefficient_marginal(&self, j: usize) -> Result<StudentsT> {
        if j >= self.dim() {
            return invalid(format!("coefficient index {j} out of range"));
        }
        let cov = self.covariance_unscaled()?;
        let scale = (self.rate / self.shape * cov[(j, j)]).sqrt();
        StudentsT::new(self.mean[j], scale, 2.0 * self.shape)
            .map_err(|e| Error::Computation(e.to_string()))
    }

    /// Equal-tailed credible interval for coefficient `j`.
    pub fn credible_interval(&self, j: usize, level: f64) -> Result<(f64, f64)> {
        check_level(level)?;
        let t = self.coefficient_marginal(j)?;
        let tail = (1.0 - level) / 2.0;
        Ok((t.inverse_cdf(tail), t.inverse_cdf(1.0 - tail)))
    }

    /// Independent draws from the joint distribution.
    ///
    /// Returns an `(n, p + 1)` array whose columns are `β_0..β_{p-1}, σ`.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Result<Array2<f64>> {
        let p = self.dim();
        let cov = self.covariance_unscaled()?;
        let chol = cov.cholesky().ok_or_else(|| {
            Error::Computation("covariance is not positive definite".to_string())
        })?;
        let l = chol.l();
        let gamma =
            Gamma::new(self.shape, self.rate).map_err(|e| Error::Computation(e.to_string()))?;
        let std_norm = Normal::standard();

        let mut out = Array2::zeros((n, p + 1));
        for mut row in out.rows_mut() {
            let sigma2 = 1.0 / gamma.sample(rng);
            let z = DVector::from_fn(p, |_, _| std_norm.sample(rng));
            let beta = &self.mean + (&l * z) * sigma2.sqrt();
            for j in 0..p {
                row[j] = beta[j];
            }
            row[p] = sigma2.sqrt();
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ols::OlsFit;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Axis};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn beta_binomial_update() {
        let prior = BetaBinomial::new(1.0, 1.0).unwrap();
        let post = prior.update(7, 10).unwrap();
        assert_eq!(
            post,
            BetaBinomial {
                alpha: 8.0,
                beta: 4.0
            }
        );
        assert_abs_diff_eq!(post.mean(), 8.0 / 12.0, epsilon = 1e-12);
        assert_abs_diff_eq!(post.variance(), 32.0 / (144.0 * 13.0), epsilon = 1e-12);
        let (lo, hi) = post.credible_interval(0.95).unwrap();
        assert!(lo < post.mean() && post.mean() < hi);
        assert!(lo > 0.0 && hi < 1.0);
        assert!(prior.update(11, 10).is_err());
        assert!(BetaBinomial::new(0.0, 1.0).is_err());
    }

    #[test]
    fn normal_known_variance_update() {
        let prior = NormalKnownVariance::new(0.0, 1.0, 1.0).unwrap();
        let post = prior.update(&[2.0, 2.0, 2.0]).unwrap();
        // precision 1 + 3 = 4, mean = (0 + 3*2)/4
        assert_abs_diff_eq!(post.variance, 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(post.mean, 1.5, epsilon = 1e-12);
        let (lo, hi) = post.credible_interval(0.95).unwrap();
        assert_abs_diff_eq!(hi - post.mean, 1.959964 * 0.5, epsilon = 1e-5);
        assert_abs_diff_eq!(post.mean - lo, hi - post.mean, epsilon = 1e-12);
        assert_eq!(prior.update(&[]).unwrap(), prior);
    }

    fn line_design() -> Design {
        let n = 40;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { 1.0 } else { i as f64 / 4.0 });
        let y = Array1::from_shape_fn(n, |i| {
            1.0 + 0.5 * (i as f64 / 4.0) + ((i * 7) % 5) as f64 * 0.1 - 0.2
        });
        Design::new(x, y, vec!["(Intercept)".into(), "x".into()]).unwrap()
    }

    #[test]
    fn vague_prior_posterior_matches_ols() {
        let d = line_design();
        let post = NormalInverseGamma::weakly_informative(2, 1e8).unwrap().posterior(&d).unwrap();
        let ols = OlsFit::fit(&d).unwrap();
        for j in 0..2 {
            assert_abs_diff_eq!(post.mean[j], ols.coefficients[j], epsilon = 1e-5);
        }
        assert_abs_diff_eq!(post.shape, 0.01 + 20.0, epsilon = 1e-12);
        let ci = post.credible_interval(1, 0.95).unwrap();
        assert!(ci.0 < 0.5 && 0.5 < ci.1, "{ci:?}");
    }

    #[test]
    fn direct_draws_match_posterior_moments() {
        let d = line_design();
        let post = NormalInverseGamma::weakly_informative(2, 100.0).unwrap().posterior(&d).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let draws = post.sample(20_000, &mut rng).unwrap();
        assert_eq!(draws.shape(), &[20_000, 3]);
        let means = draws.mean_axis(Axis(0)).unwrap();
        let marginal = post.coefficient_marginal(1).unwrap();
        let sd = marginal.scale() * (marginal.freedom() / (marginal.freedom() - 2.0)).sqrt();
        assert_abs_diff_eq!(means[1], post.mean[1], epsilon = 4.0 * sd / (20_000f64).sqrt() + 1e-9);
        let sigma2_mean = draws.column(2).mapv(|s| s * s).mean().unwrap();
        let expected = post.sigma2_mean().unwrap();
        assert!((sigma2_mean - expected).abs() / expected < 0.05);
    }

    #[test]
    fn posterior_rejects_dimension_mismatch() {
        let d = line_design();
        assert!(NormalInverseGamma::weakly_informative(3, 1.0).unwrap().posterior(&d).is_err());
        assert!(NormalInverseGamma::weakly_informative(2, -1.0).is_err());
    }
}
