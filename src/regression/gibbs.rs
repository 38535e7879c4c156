//! Gibbs sampler for Bayesian linear regression under a semi-conjugate prior.

use super::{
    ChainRng, LinearRegressionResults, SemiConjugatePrior, Sufficient, initial_states, param_names,
    run_chains,
};
use crate::config::SamplerKind;
use crate::data::Design;
use crate::error::{Error, Result, invalid};
use mini_mcmc::distributions::Conditional;
use rand::Rng;
use statrs::distribution::{Gamma, Normal};

/// A Gibbs sampler for Bayesian linear regression.
///
/// Every coefficient is drawn from its normal full conditional and `σ²` from its
/// inverse-gamma full conditional; the stored state carries `σ` rather than `σ²`.
///
/// # Example
/// ```rust
/// # use ndarray::{Array1, Array2};
/// use bayes_mc::data::Design;
/// use bayes_mc::regression::{GibbsLinear, SemiConjugatePrior};
///
/// let n = 50;
/// let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { 1.0 } else { i as f64 / 10.0 });
/// let y = Array1::from_shape_fn(n, |i| {
///     1.0 + 2.0 * (i as f64 / 10.0) + if i % 2 == 0 { 0.1 } else { -0.1 }
/// });
/// let design = Design::new(x, y, vec!["(Intercept)".into(), "x".into()]).unwrap();
///
/// let model = GibbsLinear::new(design, SemiConjugatePrior::default(), 2, 42).unwrap();
/// let results = model.run(200, 500).expect("MCMC failed");
/// println!("Posterior means: {:?}", results.posterior_means);
/// ```
pub struct GibbsLinear {
    design: Design,
    prior: SemiConjugatePrior,
    n_chains: usize,
    seed: u64,
}

impl GibbsLinear {
    /// # Arguments
    /// * `design` - Design matrix and response. Include a column of ones for an intercept.
    /// * `prior` - Semi-conjugate prior on the coefficients and noise variance.
    /// * `n_chains` - Number of independent chains (≥ 1).
    /// * `seed` - Seed for the starting points and every chain's random stream.
    pub fn new(
        design: Design,
        prior: SemiConjugatePrior,
        n_chains: usize,
        seed: u64,
    ) -> Result<Self> {
        if n_chains == 0 {
            return invalid("n_chains must be at least 1");
        }
        Ok(Self {
            design,
            prior,
            n_chains,
            seed,
        })
    }

    /// Discard `burn_in` sweeps per chain, then keep `samples` sweeps.
    pub fn run(self, burn_in: usize, samples: usize) -> Result<LinearRegressionResults> {
        let init = initial_states(&self.design, self.n_chains, self.seed);
        let cond = LinearConditional::new(&self.design, self.prior, ChainRng::new(self.seed))?;
        run_chains(
            cond,
            init,
            self.seed,
            burn_in,
            samples,
            param_names(&self.design),
            SamplerKind::Gibbs,
        )
    }
}

/// Full conditionals of the linear regression posterior.
///
/// For coefficient `j`, with `r = Xᵀy - XᵀXβ + (XᵀX)_jj β_j`:
/// \[
///   \beta_j \mid \cdot \sim
///   \mathcal{N}\left(\frac{\mu_0/\tau_0^2 + r/\sigma^2}{\lambda}, \lambda^{-1}\right),
///   \quad \lambda = 1/\tau_0^2 + (X^\top X)_{jj}/\sigma^2
/// \]
/// and for the noise
/// \[
///   \sigma^2 \mid \beta \sim \mathrm{IG}(a_0 + n/2,\ b_0 + \mathrm{SSR}(\beta)/2).
/// \]
/// The shape `a_0 + n/2` never changes, so `1/σ²` is drawn as `Gamma(a_0 + n/2, 1) / rate`.
#[derive(Clone)]
pub(crate) struct LinearConditional {
    suff: Sufficient,
    prior: SemiConjugatePrior,
    precision_unit: Gamma,
    rng: ChainRng,
}

impl LinearConditional {
    pub fn new(design: &Design, prior: SemiConjugatePrior, rng: ChainRng) -> Result<Self> {
        let suff = Sufficient::new(design);
        let shape = prior.sigma_shape + suff.n as f64 / 2.0;
        let precision_unit = Gamma::new(shape, 1.0)
            .map_err(|e| Error::Validation(format!("noise conditional shape {shape}: {e}")))?;
        Ok(Self {
            suff,
            prior,
            precision_unit,
            rng,
        })
    }

    pub fn beta_conditional(&self, j: usize, given: &[f64]) -> (f64, f64) {
        let p = self.suff.p;
        let sigma2 = given[p] * given[p];
        let beta = &given[..p];
        let xtx_jj = self.suff.xtx[(j, j)];
        let partial = self.suff.xty[j] - self.suff.xtx_beta(j, beta) + xtx_jj * beta[j];

        let prior_prec = 1.0 / self.prior.beta_variance;
        let precision = prior_prec + xtx_jj / sigma2;
        let mean = (prior_prec * self.prior.beta_mean + partial / sigma2) / precision;
        (mean, 1.0 / precision)
    }

    pub fn sigma2_conditional(&self, given: &[f64]) -> (f64, f64) {
        let p = self.suff.p;
        let shape = self.prior.sigma_shape + self.suff.n as f64 / 2.0;
        let rate = self.prior.sigma_rate + self.suff.ssr(&given[..p]) / 2.0;
        (shape, rate)
    }
}

impl Conditional<f64> for LinearConditional {
    /// Sample coordinate `i` of `[β_0, …, β_{p-1}, σ]` from its full conditional.
    fn sample(&mut self, i: usize, given: &[f64]) -> f64 {
        let p = self.suff.p;
        if i < p {
            let (mean, var) = self.beta_conditional(i, given);
            let eps: f64 = self.rng.sample(Normal::standard());
            mean + eps * var.sqrt()
        } else {
            let (_, rate) = self.sigma2_conditional(given);
            let g: f64 = self.rng.sample(&self.precision_unit);
            (rate / g).sqrt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    fn design() -> Design {
        let n = 60;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                1.0
            } else {
                (i as f64 - 30.0) / 10.0
            }
        });
        let y = Array1::from_shape_fn(n, |i| {
            let xi = (i as f64 - 30.0) / 10.0;
            -1.0 + 0.8 * xi + [0.4, -0.2, 0.1, -0.3, 0.0][i % 5]
        });
        Design::new(x, y, vec!["(Intercept)".into(), "x".into()]).unwrap()
    }

    #[test]
    fn beta_conditional_matches_hand_computation() {
        let d = design();
        let prior = SemiConjugatePrior::new(0.0, 4.0, 1.0, 1.0).unwrap();
        let cond = LinearConditional::new(&d, prior, ChainRng::new(0)).unwrap();
        let given = [0.5, 0.2, 2.0];
        let (mean, var) = cond.beta_conditional(1, &given);

        // partial residuals with β_0 held at 0.5
        let x1 = d.x.column(1);
        let sxx: f64 = x1.iter().map(|v| v * v).sum();
        let sxr: f64 = x1.iter().zip(d.y.iter()).map(|(x, y)| x * (y - 0.5)).sum();
        let precision = 0.25 + sxx / 4.0;
        assert_abs_diff_eq!(var, 1.0 / precision, epsilon = 1e-12);
        assert_abs_diff_eq!(mean, (sxr / 4.0) / precision, epsilon = 1e-10);
    }

    #[test]
    fn sigma_conditional_uses_ssr() {
        let d = design();
        let prior = SemiConjugatePrior::new(0.0, 4.0, 2.0, 3.0).unwrap();
        let cond = LinearConditional::new(&d, prior, ChainRng::new(0)).unwrap();
        let (shape, rate) = cond.sigma2_conditional(&[0.0, 0.0, 1.0]);
        assert_abs_diff_eq!(shape, 2.0 + 30.0);
        assert_abs_diff_eq!(rate, 3.0 + d.y.dot(&d.y) / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn sigma_draws_follow_the_inverse_gamma() {
        let d = design();
        let prior = SemiConjugatePrior::new(0.0, 4.0, 2.0, 3.0).unwrap();
        let mut cond = LinearConditional::new(&d, prior, ChainRng::new(5)).unwrap();
        let given = [-1.0, 0.8, 1.0];
        let (shape, rate) = cond.sigma2_conditional(&given);
        let draws: Vec<f64> = (0..4000).map(|_| cond.sample(2, &given)).collect();
        assert!(draws.iter().all(|s| s.is_finite() && *s > 0.0));
        // E[1/σ²] = shape / rate
        let mean_precision = draws.iter().map(|s| 1.0 / (s * s)).sum::<f64>() / 4000.0;
        assert_abs_diff_eq!(mean_precision, shape / rate, epsilon = 0.03 * shape / rate);
    }

    #[test]
    fn rejects_zero_chains() {
        assert!(GibbsLinear::new(design(), SemiConjugatePrior::default(), 0, 1).is_err());
    }
}
