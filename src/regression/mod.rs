//! MCMC samplers for the normal linear regression model.
//!
//! # Model
//! - Likelihood: \( y_i \mid \beta, \sigma \sim \mathcal{N}(x_i^\top \beta, \sigma^2) \)
//! - Prior: \( \beta_j \sim \mathcal{N}(\mu_0, \tau_0^2) \) independently,
//!   \( \sigma^2 \sim \mathrm{IG}(a_0, b_0) \)
//!
//! The prior is semi-conjugate: every full conditional has closed form, so [`GibbsLinear`]
//! draws each coordinate exactly. [`MetropolisLinear`] targets the same posterior with
//! random-walk proposals and an accept/reject step per coordinate.
//!
//! Both samplers keep the state `[β_0, …, β_{p-1}, σ]` and hand it to
//! [`mini_mcmc::gibbs::GibbsSampler`], which sweeps the coordinates in order for every chain.
//!
//! # Examples
//! See `demos/linear_regression.rs` for a complete run with diagnostics.

pub use gibbs::GibbsLinear;
pub use metropolis::MetropolisLinear;

mod gibbs;
mod metropolis;

use crate::config::{FitConfig, MIN_SAMPLES, PriorConfig, SamplerKind};
use crate::data::Design;
use crate::diagnostics::{ConvergenceReport, Thresholds, acceptance_rate};
use crate::draws::{PosteriorDraws, SummaryTable};
use crate::error::{Error, Result, invalid};
use crate::ols::OlsFit;
use mini_mcmc::{
    core::ChainRunner, distributions::Conditional, gibbs::GibbsSampler, stats::RunStats,
};
use ndarray::{Array1, Array2, Array3, s};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use statrs::distribution::Normal;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

/// Name of the noise standard deviation in the sampler output.
pub const SIGMA: &str = "sigma";

/// Semi-conjugate prior `β_j ~ N(beta_mean, beta_variance)`, `σ² ~ IG(sigma_shape, sigma_rate)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemiConjugatePrior {
    pub beta_mean: f64,
    pub beta_variance: f64,
    pub sigma_shape: f64,
    pub sigma_rate: f64,
}

impl SemiConjugatePrior {
    pub fn new(
        beta_mean: f64,
        beta_variance: f64,
        sigma_shape: f64,
        sigma_rate: f64,
    ) -> Result<Self> {
        if !beta_mean.is_finite() {
            return invalid("prior mean must be finite");
        }
        if !(beta_variance > 0.0 && sigma_shape > 0.0 && sigma_rate > 0.0) {
            return invalid("prior variance, shape and rate must be positive");
        }
        Ok(Self {
            beta_mean,
            beta_variance,
            sigma_shape,
            sigma_rate,
        })
    }
}

impl Default for SemiConjugatePrior {
    fn default() -> Self {
        let p = PriorConfig::default();
        Self {
            beta_mean: p.beta_mean,
            beta_variance: p.beta_variance,
            sigma_shape: p.sigma_shape,
            sigma_rate: p.sigma_rate,
        }
    }
}

impl TryFrom<PriorConfig> for SemiConjugatePrior {
    type Error = Error;

    fn try_from(p: PriorConfig) -> Result<Self> {
        Self::new(p.beta_mean, p.beta_variance, p.sigma_shape, p.sigma_rate)
    }
}

/// Sufficient statistics `XᵀX`, `Xᵀy`, `yᵀy` shared by both samplers.
///
/// With these every coordinate update costs `O(p)` instead of `O(n·p)`.
#[derive(Debug, Clone)]
pub(crate) struct Sufficient {
    pub xtx: Array2<f64>,
    pub xty: Array1<f64>,
    pub yty: f64,
    pub n: usize,
    pub p: usize,
}

impl Sufficient {
    pub fn new(design: &Design) -> Self {
        let xt = design.x.t();
        Self {
            xtx: xt.dot(&design.x),
            xty: xt.dot(&design.y),
            yty: design.y.dot(&design.y),
            n: design.n_obs(),
            p: design.n_coef(),
        }
    }

    /// `(XᵀX β)_j`
    pub fn xtx_beta(&self, j: usize, beta: &[f64]) -> f64 {
        self.xtx.row(j).iter().zip(beta).map(|(a, b)| a * b).sum()
    }

    /// Residual sum of squares `‖y - Xβ‖²`.
    pub fn ssr(&self, beta: &[f64]) -> f64 {
        let mut quad = 0.0;
        let mut cross = 0.0;
        for j in 0..self.p {
            quad += beta[j] * self.xtx_beta(j, beta);
            cross += beta[j] * self.xty[j];
        }
        // Rounding can push a perfect fit slightly negative.
        (self.yty - 2.0 * cross + quad).max(0.0)
    }
}

/// A ChaCha8 generator whose clones draw from fresh streams of the same seed.
///
/// The chain runner clones the conditional once per chain, so every chain gets its own
/// stream and the whole run stays reproducible from a single seed.
pub(crate) struct ChainRng {
    seed: u64,
    next_stream: Arc<AtomicU64>,
    rng: ChaCha8Rng,
}

impl ChainRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            next_stream: Arc::new(AtomicU64::new(1)),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Clone for ChainRng {
    fn clone(&self) -> Self {
        let stream = self.next_stream.fetch_add(1, Ordering::Relaxed);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(stream);
        Self {
            seed: self.seed,
            next_stream: Arc::clone(&self.next_stream),
            rng,
        }
    }
}

impl RngCore for ChainRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

/// Coefficient names followed by [`SIGMA`].
pub(crate) fn param_names(design: &Design) -> Vec<String> {
    let mut names = design.names.clone();
    names.push(SIGMA.to_string());
    names
}

/// Overdispersed starting points: the OLS estimate jittered by two standard errors, or
/// standard normal draws around zero when OLS is unavailable.
pub(crate) fn initial_states(design: &Design, n_chains: usize, seed: u64) -> Vec<Vec<f64>> {
    use rand::Rng;
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(0x5eed));
    let z = Normal::standard();
    let p = design.n_coef();
    let ols = OlsFit::fit(design).ok();
    (0..n_chains)
        .map(|_| {
            let mut state = Vec::with_capacity(p + 1);
            match &ols {
                Some(fit) => {
                    for j in 0..p {
                        let step = 2.0 * fit.std_errors[j] * rng.sample(z);
                        state.push(fit.coefficients[j] + step);
                    }
                    let sigma = fit.sigma.max(1e-3) * (0.5 * rng.sample(z)).exp();
                    state.push(sigma);
                }
                None => {
                    state.extend((0..p).map(|_| rng.sample(z)));
                    state.push(1.0);
                }
            }
            state
        })
        .collect()
}

/// Drive `cond` with the mini-mcmc Gibbs runner and package the output.
pub(crate) fn run_chains<C>(
    cond: C,
    init: Vec<Vec<f64>>,
    seed: u64,
    burn_in: usize,
    samples: usize,
    names: Vec<String>,
    sampler: SamplerKind,
) -> Result<LinearRegressionResults>
where
    C: Conditional<f64> + Clone + Send + Sync + 'static,
{
    // The runner's split R-hat needs at least two draws per chain.
    if samples < MIN_SAMPLES {
        return invalid(format!("samples must be at least {MIN_SAMPLES}"));
    }
    if init.is_empty() {
        return invalid("at least one chain is required");
    }
    let n_chains = init.len();
    tracing::info!(
        %sampler,
        chains = n_chains,
        burn_in,
        samples,
        params = names.len(),
        "running MCMC"
    );

    let mut runner = GibbsSampler::new(cond, init).set_seed(seed);
    let (all_samples, run_stats) = runner
        .run_progress(samples, burn_in)
        .map_err(|e| Error::Sampler(e.to_string()))?;

    let acceptance_rates = (sampler == SamplerKind::Metropolis).then(|| {
        (0..names.len())
            .map(|j| {
                let rates: Vec<f64> = (0..n_chains)
                    .filter_map(|c| acceptance_rate(&all_samples.slice(s![c, .., j]).to_vec()))
                    .collect();
                rates.iter().sum::<f64>() / rates.len().max(1) as f64
            })
            .collect::<Vec<f64>>()
    });
    if let Some(rates) = &acceptance_rates {
        for (name, rate) in names.iter().zip(rates) {
            tracing::debug!(param = %name, rate, "acceptance rate");
        }
    }

    let draws = PosteriorDraws::new(all_samples, names)?;
    Ok(LinearRegressionResults::new(sampler, draws, acceptance_rates, run_stats))
}

/// Posterior draws and summaries from a linear regression run.
pub struct LinearRegressionResults {
    /// Scheme that produced the draws.
    pub sampler: SamplerKind,

    /// Draws of `[β_0, …, β_{p-1}, σ]`, shape `[n_chains, n_samples, p + 1]`.
    pub draws: PosteriorDraws,

    /// Posterior means in the order of `draws.names()`.
    pub posterior_means: Vec<f64>,

    /// Posterior standard deviations in the order of `draws.names()`.
    pub posterior_sds: Vec<f64>,

    /// Per-parameter share of moves that were accepted (Metropolis only).
    pub acceptance_rates: Option<Vec<f64>>,

    /// Runtime statistics reported by the chain runner.
    pub run_stats: RunStats,
}

impl LinearRegressionResults {
    fn new(
        sampler: SamplerKind,
        draws: PosteriorDraws,
        acceptance_rates: Option<Vec<f64>>,
        run_stats: RunStats,
    ) -> Self {
        let (posterior_means, posterior_sds) = moments(draws.array());
        Self {
            sampler,
            draws,
            posterior_means,
            posterior_sds,
            acceptance_rates,
            run_stats,
        }
    }

    /// Keep every `k`-th draw of every chain.
    pub fn thinned(self, k: usize) -> Result<Self> {
        if k == 1 {
            return Ok(self);
        }
        let draws = self.draws.thin(k)?;
        let (posterior_means, posterior_sds) = moments(draws.array());
        Ok(Self {
            draws,
            posterior_means,
            posterior_sds,
            ..self
        })
    }

    /// Pooled draws of parameter `param_idx`.
    pub fn get_posterior_samples(&self, param_idx: usize) -> Option<Vec<f64>> {
        (param_idx < self.draws.n_params()).then(|| self.draws.pooled(param_idx))
    }

    pub fn convergence(&self, thresholds: Thresholds) -> ConvergenceReport {
        ConvergenceReport::from_draws(&self.draws, thresholds)
    }

    /// Print a summary of the MCMC results
    pub fn summary(&self, level: f64) -> Result<()> {
        let table = self.draws.summarize(level)?;
        println!(
            "{} sampler: {} chains x {} draws",
            self.sampler,
            self.draws.n_chains(),
            self.draws.n_draws()
        );
        print!("{}", SummaryTable(&table));
        if let Some(rates) = &self.acceptance_rates {
            println!();
            println!("{:<14} {:>10}", "Parameter", "Accept");
            for (name, rate) in self.draws.names().iter().zip(rates) {
                println!("{:<14} {:>10.3}", name, rate);
            }
        }
        Ok(())
    }
}

fn moments(draws: &Array3<f64>) -> (Vec<f64>, Vec<f64>) {
    let p = draws.shape()[2];
    let pooled = draws.to_shape((draws.shape()[0] * draws.shape()[1], p));
    match pooled {
        Ok(pooled) => {
            let means = (0..p).map(|j| pooled.column(j).mean().unwrap_or(f64::NAN)).collect();
            let sds = (0..p).map(|j| pooled.column(j).std(1.0)).collect();
            (means, sds)
        }
        Err(_) => (vec![f64::NAN; p], vec![f64::NAN; p]),
    }
}

/// Run the sampler named in `config` on `design`.
pub fn fit(design: &Design, config: &FitConfig) -> Result<LinearRegressionResults> {
    config.validate()?;
    let prior = SemiConjugatePrior::try_from(config.prior)?;
    let results = match config.sampler {
        SamplerKind::Gibbs => {
            GibbsLinear::new(design.clone(), prior, config.chains, config.seed)?
                .run(config.burn_in, config.samples)?
        }
        SamplerKind::Metropolis => {
            MetropolisLinear::new(design.clone(), prior, config.chains, config.seed)?
                .with_proposal_sd(config.proposal_sd.beta, config.proposal_sd.log_sigma)?
                .run(config.burn_in, config.samples)?
        }
    };
    let results = results.thinned(config.thin)?;
    tracing::info!(
        sampler = %config.sampler,
        kept = results.draws.n_draws(),
        "sampling complete"
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::Rng;

    #[test]
    fn sufficient_ssr_matches_direct() {
        let x = array![[1.0, 0.5], [1.0, -1.0], [1.0, 2.0], [1.0, 0.0]];
        let y = array![1.0, -2.0, 4.0, 0.5];
        let d = Design::new(x.clone(), y.clone(), vec!["a".into(), "b".into()]).unwrap();
        let suff = Sufficient::new(&d);
        let beta = [0.3, 1.7];
        let direct: f64 = (0..4)
            .map(|i| (y[i] - x[(i, 0)] * beta[0] - x[(i, 1)] * beta[1]).powi(2))
            .sum();
        assert_abs_diff_eq!(suff.ssr(&beta), direct, epsilon = 1e-10);
    }

    #[test]
    fn chain_rng_clones_are_distinct_and_reproducible() {
        let base = ChainRng::new(9);
        let mut a = base.clone();
        let mut b = base.clone();
        let xa: u64 = a.r#gen();
        let xb: u64 = b.r#gen();
        assert_ne!(xa, xb);

        let base2 = ChainRng::new(9);
        let mut a2 = base2.clone();
        assert_eq!(xa, a2.r#gen::<u64>());
    }

    #[test]
    fn prior_validation() {
        assert!(SemiConjugatePrior::new(0.0, 0.0, 1.0, 1.0).is_err());
        assert!(SemiConjugatePrior::new(f64::NAN, 1.0, 1.0, 1.0).is_err());
        assert!(SemiConjugatePrior::try_from(PriorConfig::default()).is_ok());
    }

    fn line_design() -> Design {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| if j == 0 { 1.0 } else { i as f64 });
        let y = Array1::from_shape_fn(30, |i| {
            2.0 + 0.5 * i as f64 + if i % 2 == 0 { 0.3 } else { -0.3 }
        });
        Design::new(x, y, vec!["(Intercept)".into(), "x".into()]).unwrap()
    }

    #[test]
    fn single_draw_runs_are_rejected() {
        let d = line_design();
        let cfg = FitConfig {
            chains: 2,
            burn_in: 10,
            samples: 1,
            ..FitConfig::default()
        };
        assert!(matches!(fit(&d, &cfg), Err(Error::Validation(_))));

        let gibbs = GibbsLinear::new(d.clone(), SemiConjugatePrior::default(), 2, 1).unwrap();
        assert!(matches!(gibbs.run(10, 1), Err(Error::Validation(_))));
        let mh = MetropolisLinear::new(d, SemiConjugatePrior::default(), 2, 1).unwrap();
        assert!(matches!(mh.run(10, 1), Err(Error::Validation(_))));
    }

    #[test]
    fn initial_states_are_overdispersed_and_positive() {
        let d = line_design();
        let init = initial_states(&d, 4, 1);
        assert_eq!(init.len(), 4);
        assert!(init.iter().all(|s| s.len() == 3 && s[2] > 0.0));
        assert_ne!(init[0], init[1]);
        assert_eq!(init, initial_states(&d, 4, 1));
    }
}
