//! Run configuration for the samplers and the `fit` command.
//!
//! Every field has a default so a config file only needs to name what it changes:
//!
//! ```json
//! { "sampler": "metropolis", "chains": 4, "samples": 2000, "prior": { "beta_variance": 25.0 } }
//! ```

use crate::error::{Result, invalid};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

/// Fewest post-burn-in iterations a chain may run; split R-hat halves each chain.
pub const MIN_SAMPLES: usize = 2;

/// Fewest draws per chain left after thinning.
pub const MIN_KEPT_DRAWS: usize = 4;

/// Which MCMC scheme to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SamplerKind {
    /// Full-conditional Gibbs updates.
    #[default]
    Gibbs,
    /// Random-walk Metropolis-within-Gibbs.
    Metropolis,
}

impl fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerKind::Gibbs => write!(f, "gibbs"),
            SamplerKind::Metropolis => write!(f, "metropolis"),
        }
    }
}

impl FromStr for SamplerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gibbs" => Ok(SamplerKind::Gibbs),
            "metropolis" | "mh" => Ok(SamplerKind::Metropolis),
            other => Err(format!("unknown sampler '{other}' (expected gibbs or metropolis)")),
        }
    }
}

/// Semi-conjugate prior: `β_j ~ N(beta_mean, beta_variance)` and
/// `σ² ~ IG(sigma_shape, sigma_rate)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    pub beta_mean: f64,
    pub beta_variance: f64,
    pub sigma_shape: f64,
    pub sigma_rate: f64,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            beta_mean: 0.0,
            beta_variance: 100.0,
            sigma_shape: 0.01,
            sigma_rate: 0.01,
        }
    }
}

/// Random-walk proposal scales for the Metropolis sampler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    /// Standard deviation of the normal step for each coefficient.
    pub beta: f64,
    /// Standard deviation of the normal step on `log σ`.
    pub log_sigma: f64,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            beta: 0.1,
            log_sigma: 0.1,
        }
    }
}

/// Full configuration of a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    pub sampler: SamplerKind,
    pub chains: usize,
    pub burn_in: usize,
    pub samples: usize,
    /// Keep every `thin`-th draw after burn-in.
    pub thin: usize,
    pub seed: u64,
    pub prior: PriorConfig,
    pub proposal_sd: ProposalConfig,
    /// Number of replicated datasets for posterior predictive checks.
    pub ppc_replicates: usize,
    pub credible_level: f64,
    pub rhat_threshold: f64,
    pub min_ess: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            sampler: SamplerKind::Gibbs,
            chains: 4,
            burn_in: 1000,
            samples: 2000,
            thin: 1,
            seed: 42,
            prior: PriorConfig::default(),
            proposal_sd: ProposalConfig::default(),
            ppc_replicates: 500,
            credible_level: 0.95,
            rhat_threshold: 1.1,
            min_ess: 100.0,
        }
    }
}

impl FitConfig {
    /// Load a config from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: FitConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check that every field is usable by the samplers.
    pub fn validate(&self) -> Result<()> {
        if self.chains == 0 {
            return invalid("chains must be at least 1");
        }
        if self.samples < MIN_SAMPLES {
            return invalid(format!("samples must be at least {MIN_SAMPLES}"));
        }
        if self.thin == 0 {
            return invalid("thin must be at least 1");
        }
        if self.samples / self.thin < MIN_KEPT_DRAWS {
            return invalid(format!(
                "thin={} keeps {} of {} samples, need at least {MIN_KEPT_DRAWS} per chain",
                self.thin,
                self.samples / self.thin,
                self.samples
            ));
        }
        let p = &self.prior;
        if !(p.beta_variance > 0.0 && p.sigma_shape > 0.0 && p.sigma_rate > 0.0) {
            return invalid("prior variance, shape and rate must be positive");
        }
        if !p.beta_mean.is_finite() {
            return invalid("prior mean must be finite");
        }
        if !(self.proposal_sd.beta > 0.0 && self.proposal_sd.log_sigma > 0.0) {
            return invalid("proposal standard deviations must be positive");
        }
        crate::error::check_level(self.credible_level)?;
        if self.ppc_replicates < 2 {
            return invalid("ppc_replicates must be at least 2");
        }
        if self.rhat_threshold.is_nan() || self.rhat_threshold <= 1.0 {
            return invalid("rhat_threshold must exceed 1");
        }
        if self.min_ess.is_nan() || self.min_ess < 0.0 {
            return invalid("min_ess must be non-negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FitConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = FitConfig::from_json_str(
            r#"{ "sampler": "metropolis", "chains": 2, "prior": { "beta_variance": 25.0 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.sampler, SamplerKind::Metropolis);
        assert_eq!(cfg.chains, 2);
        assert_eq!(cfg.prior.beta_variance, 25.0);
        assert_eq!(cfg.prior.sigma_shape, PriorConfig::default().sigma_shape);
        assert_eq!(cfg.samples, FitConfig::default().samples);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(FitConfig::from_json_str(r#"{ "chains": 0 }"#).is_err());
        assert!(FitConfig::from_json_str(r#"{ "thin": 0 }"#).is_err());
        assert!(FitConfig::from_json_str(r#"{ "samples": 3, "thin": 5 }"#).is_err());
        assert!(FitConfig::from_json_str(r#"{ "credible_level": 1.0 }"#).is_err());
        assert!(FitConfig::from_json_str(r#"{ "prior": { "sigma_rate": -1.0 } }"#).is_err());
        assert!(FitConfig::from_json_str(r#"{ "sampler": "nuts" }"#).is_err());
    }

    #[test]
    fn rejects_runs_too_short_to_diagnose() {
        assert!(FitConfig::from_json_str(r#"{ "samples": 1 }"#).is_err());
        assert!(FitConfig::from_json_str(r#"{ "samples": 2, "thin": 2 }"#).is_err());
        assert!(FitConfig::from_json_str(r#"{ "samples": 8, "thin": 2 }"#).is_ok());
        assert!(FitConfig::from_json_str(r#"{ "ppc_replicates": 1 }"#).is_err());
    }

    #[test]
    fn nan_thresholds_are_rejected() {
        let cfg = FitConfig {
            rhat_threshold: f64::NAN,
            ..FitConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(crate::Error::Validation(_))));
        let cfg = FitConfig {
            min_ess: f64::NAN,
            ..FitConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(crate::Error::Validation(_))));
    }

    #[test]
    fn sampler_kind_parses() {
        assert_eq!("MH".parse::<SamplerKind>().unwrap(), SamplerKind::Metropolis);
        assert_eq!("gibbs".parse::<SamplerKind>().unwrap(), SamplerKind::Gibbs);
        assert!("hmc".parse::<SamplerKind>().is_err());
    }
}
