//! Convergence diagnostics for MCMC output.
//!
//! Every function takes the draws of a single parameter as one vector per chain. Chains of
//! unequal length are trimmed from the back to the length of the shortest chain.
//!
//! R-hat and effective sample size follow the Stan reference implementation
//! (`compute_potential_scale_reduction.hpp`, `compute_effective_sample_size.hpp`, v2.24).

use crate::draws::PosteriorDraws;
use crate::error::{Error, Result, invalid};
use arima::acf;
use serde::Serialize;

fn mean(arr: &[f64]) -> Result<f64> {
    if arr.is_empty() {
        return invalid("can't take mean of empty array");
    }
    Ok(arr.iter().sum::<f64>() / arr.len() as f64)
}

/// Sample variance with Bessel's correction.
fn sample_variance(arr: &[f64]) -> Result<f64> {
    if arr.len() < 2 {
        return invalid("sample variance needs at least two values");
    }
    let xbar = mean(arr)?;
    Ok(arr.iter().map(|x| (x - xbar).powi(2)).sum::<f64>() / (arr.len() as f64 - 1.0))
}

/// Autocovariances at every lag, divisor `n`.
fn autocovariance(chain: &[f64]) -> Result<Vec<f64>> {
    acf::acf(chain, None, true).map_err(|e| Error::Computation(format!("acf failed: {e:?}")))
}

fn trim_to_shortest(chains: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let num_draws = chains
        .iter()
        .map(Vec::len)
        .min()
        .ok_or_else(|| Error::Validation("no chains given".to_string()))?;
    Ok(chains.iter().map(|c| c[..num_draws].to_vec()).collect())
}

/// Sample autocorrelation of one chain at lags `0..=max_lag`.
///
/// Lags beyond the chain length are dropped.
pub fn autocorrelation(chain: &[f64], max_lag: usize) -> Result<Vec<f64>> {
    if chain.len() < 2 {
        return invalid("autocorrelation needs at least two draws");
    }
    let acov = autocovariance(chain)?;
    let var = acov[0];
    if !(var > 0.0) {
        return invalid("autocorrelation of a constant chain is undefined");
    }
    Ok(acov.iter().take(max_lag + 1).map(|c| c / var).collect())
}

/// Pairs `(θ_t, θ_{t+lag})` for a lag scatter plot.
pub fn lag_pairs(chain: &[f64], lag: usize) -> Vec<(f64, f64)> {
    chain.iter().zip(chain.iter().skip(lag)).map(|(a, b)| (*a, *b)).collect()
}

/// Fraction of transitions in which the chain moved.
///
/// For a Metropolis chain this is the empirical acceptance rate.
pub fn acceptance_rate(chain: &[f64]) -> Option<f64> {
    if chain.len() < 2 {
        return None;
    }
    let moved = chain.windows(2).filter(|w| w[0] != w[1]).count();
    Some(moved as f64 / (chain.len() - 1) as f64)
}

/// Split each chain into two halves. When the number of draws is odd the middle draw is dropped.
pub fn split_chains(chains: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let trimmed = trim_to_shortest(chains)?;
    let num_draws = trimmed[0].len();
    if num_draws < 2 {
        return invalid("need at least two draws per chain to split");
    }
    let half = num_draws / 2;
    let offset = num_draws % 2;
    let mut split = Vec::with_capacity(2 * trimmed.len());
    for chain in trimmed {
        split.push(chain[..half].to_vec());
        split.push(chain[(half + offset)..].to_vec());
    }
    Ok(split)
}

/// Potential scale reduction factor (R-hat) without splitting.
pub fn potential_scale_reduction_factor(chains: &[Vec<f64>]) -> Result<f64> {
    let chains = trim_to_shortest(chains)?;
    if chains.len() < 2 {
        return invalid("R-hat needs at least two chains");
    }
    let n = chains[0].len();
    let mut chain_mean = Vec::with_capacity(chains.len());
    let mut chain_var = Vec::with_capacity(chains.len());
    for chain in &chains {
        chain_mean.push(mean(chain)?);
        chain_var.push(sample_variance(chain)?);
    }

    let n = n as f64;
    let var_between = n * sample_variance(&chain_mean)?;
    let var_within = mean(&chain_var)?;
    if !(var_within > 0.0) {
        return Err(Error::Computation("R-hat undefined for constant chains".to_string()));
    }
    Ok(((var_between / var_within + n - 1.0) / n).sqrt())
}

/// Split R-hat: R-hat computed on the two halves of every chain.
pub fn split_potential_scale_reduction_factor(chains: &[Vec<f64>]) -> Result<f64> {
    potential_scale_reduction_factor(&split_chains(chains)?)
}

/// Effective sample size via Geyer's initial positive and initial monotone sequences.
///
/// The result is capped at `N·log10(N)` for `N` total draws. Fewer than four draws per chain,
/// non-finite draws, or all-identical draws are errors.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> Result<f64> {
    let chains = trim_to_shortest(chains)?;
    let num_chains = chains.len();
    let num_draws = chains[0].len();
    if num_draws < 4 {
        return invalid("must have at least 4 draws to compute ESS");
    }
    if chains.iter().flatten().any(|v| !v.is_finite()) {
        return invalid("all draws must be finite to compute ESS");
    }
    let first = chains[0][0];
    if chains.iter().flatten().all(|v| (v - first).abs() < 1e-10) {
        return invalid(format!("no ESS when every draw is constant (value={first})"));
    }

    let mut chain_acov = Vec::with_capacity(num_chains);
    let mut chain_mean = Vec::with_capacity(num_chains);
    let mut chain_var = Vec::with_capacity(num_chains);
    for chain in &chains {
        let acov = autocovariance(chain)?;
        chain_mean.push(mean(chain)?);
        chain_var.push(acov[0] * num_draws as f64 / (num_draws as f64 - 1.0));
        chain_acov.push(acov);
    }

    let mean_var = mean(&chain_var)?;
    let mut var_plus = mean_var * (num_draws as f64 - 1.0) / num_draws as f64;
    if num_chains > 1 {
        var_plus += sample_variance(&chain_mean)?;
    }
    let rho_at = |lag: usize| -> Result<f64> {
        let acov_s: Vec<f64> = chain_acov.iter().map(|a| a[lag]).collect();
        Ok(1.0 - (mean_var - mean(&acov_s)?) / var_plus)
    };

    let mut rho_hat_s = vec![0.0; num_draws];
    let mut rho_hat_even = 1.0;
    rho_hat_s[0] = rho_hat_even;
    let mut rho_hat_odd = rho_at(1)?;
    rho_hat_s[1] = rho_hat_odd;

    // Geyer's initial positive sequence. The last pair of autocorrelations is left out as a
    // bias term for antithetic chains.
    let mut s = 1;
    while s < num_draws - 4 && rho_hat_even + rho_hat_odd > 0.0 {
        rho_hat_even = rho_at(s + 1)?;
        rho_hat_odd = rho_at(s + 2)?;
        if rho_hat_even + rho_hat_odd >= 0.0 {
            rho_hat_s[s + 1] = rho_hat_even;
            rho_hat_s[s + 2] = rho_hat_odd;
        }
        s += 2;
    }
    let max_s = s;
    if rho_hat_even > 0.0 {
        rho_hat_s[max_s + 1] = rho_hat_even;
    }

    // Initial monotone sequence.
    let mut s = 1;
    while max_s >= 3 && s <= max_s - 3 {
        if rho_hat_s[s + 1] + rho_hat_s[s + 2] > rho_hat_s[s - 1] + rho_hat_s[s] {
            rho_hat_s[s + 1] = (rho_hat_s[s - 1] + rho_hat_s[s]) / 2.0;
            rho_hat_s[s + 2] = rho_hat_s[s + 1];
        }
        s += 2;
    }

    let num_total_draws = num_chains as f64 * num_draws as f64;
    let tau_hat = -1.0 + 2.0 * rho_hat_s.iter().take(max_s).sum::<f64>() + rho_hat_s[max_s + 1];
    Ok((num_total_draws / tau_hat).min(num_total_draws * num_total_draws.log10()))
}

/// ESS computed on the two halves of every chain.
pub fn split_effective_sample_size(chains: &[Vec<f64>]) -> Result<f64> {
    effective_sample_size(&split_chains(chains)?)
}

/// Monte Carlo standard error of the posterior mean: `sd / sqrt(ESS)`.
pub fn mcse(chains: &[Vec<f64>]) -> Result<f64> {
    let ess = effective_sample_size(chains)?;
    let pooled: Vec<f64> = trim_to_shortest(chains)?.into_iter().flatten().collect();
    Ok((sample_variance(&pooled)? / ess).sqrt())
}

/// Gates applied by [`ConvergenceReport`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    /// Fail when split R-hat exceeds this.
    pub max_rhat: f64,
    /// Fail when split ESS falls below this.
    pub min_ess: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_rhat: 1.1,
            min_ess: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamConvergence {
    pub name: String,
    pub rhat: Option<f64>,
    pub ess: Option<f64>,
    pub passed: bool,
}

/// Split R-hat and split ESS for every parameter of a run, checked against [`Thresholds`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvergenceReport {
    pub thresholds: Thresholds,
    pub params: Vec<ParamConvergence>,
}

impl ConvergenceReport {
    pub fn from_draws(draws: &PosteriorDraws, thresholds: Thresholds) -> Self {
        let params = draws
            .names()
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let chains = draws.chains(j);
                let rhat = split_potential_scale_reduction_factor(&chains).ok();
                let ess = split_effective_sample_size(&chains).ok();
                // Missing diagnostics (a single short chain, say) do not count as failures.
                let rhat_ok = rhat.is_none_or(|r| r <= thresholds.max_rhat);
                let ess_ok = ess.is_none_or(|e| e >= thresholds.min_ess);
                if !rhat_ok {
                    tracing::warn!(
                        param = %name,
                        rhat = rhat.unwrap_or(f64::NAN),
                        max = thresholds.max_rhat,
                        "R-hat above threshold"
                    );
                }
                if !ess_ok {
                    tracing::warn!(
                        param = %name,
                        ess = ess.unwrap_or(f64::NAN),
                        min = thresholds.min_ess,
                        "effective sample size below threshold"
                    );
                }
                ParamConvergence {
                    name: name.clone(),
                    rhat,
                    ess,
                    passed: rhat_ok && ess_ok,
                }
            })
            .collect();
        Self { thresholds, params }
    }

    pub fn passed(&self) -> bool {
        self.params.iter().all(|p| p.passed)
    }

    pub fn max_rhat(&self) -> Option<f64> {
        self.params.iter().filter_map(|p| p.rhat).reduce(f64::max)
    }

    pub fn min_ess(&self) -> Option<f64> {
        self.params.iter().filter_map(|p| p.ess).reduce(f64::min)
    }
}

impl std::fmt::Display for ConvergenceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_opt = |v: Option<f64>, prec: usize| {
            v.map_or("-".to_string(), |v| format!("{v:.prec$}"))
        };
        writeln!(f, "{:<14} {:>8} {:>10} {:>6}", "Parameter", "Rhat", "ESS", "ok")?;
        for p in &self.params {
            writeln!(
                f,
                "{:<14} {:>8} {:>10} {:>6}",
                p.name,
                fmt_opt(p.rhat, 4),
                fmt_opt(p.ess, 1),
                if p.passed { "yes" } else { "NO" }
            )?;
        }
        Ok(())
    }
}
