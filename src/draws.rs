//! Chain-major storage for posterior draws and their per-parameter summaries.

use crate::diagnostics::{split_effective_sample_size, split_potential_scale_reduction_factor};
use crate::eda::{quantile, sorted};
use crate::error::{Error, Result, check_level, invalid};
use crate::regression::SIGMA;
use ndarray::{Array3, Axis, s};
use serde::Serialize;
use std::{fmt, io::Write};

/// Posterior draws with dimensions `[chain, iteration, parameter]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorDraws {
    draws: Array3<f64>,
    names: Vec<String>,
}

impl PosteriorDraws {
    pub fn new(draws: Array3<f64>, names: Vec<String>) -> Result<Self> {
        if draws.shape()[2] != names.len() {
            return invalid(format!(
                "{} parameter names for {} parameters",
                names.len(),
                draws.shape()[2]
            ));
        }
        if draws.shape()[0] == 0 || draws.shape()[1] == 0 {
            return invalid("posterior draws are empty");
        }
        Ok(Self { draws, names })
    }

    pub fn n_chains(&self) -> usize {
        self.draws.shape()[0]
    }

    pub fn n_draws(&self) -> usize {
        self.draws.shape()[1]
    }

    pub fn n_params(&self) -> usize {
        self.draws.shape()[2]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn array(&self) -> &Array3<f64> {
        &self.draws
    }

    pub fn param_index(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::Validation(format!("no parameter named '{name}'")))
    }

    /// Number of regression coefficients when the draws are laid out as
    /// `[β_0, …, β_{p-1}, σ]`.
    pub fn n_coef(&self) -> Result<usize> {
        match self.names.last() {
            Some(last) if last == SIGMA && self.n_params() > 1 => Ok(self.n_params() - 1),
            _ => invalid(format!("expected draws of [coefficients..., {SIGMA}]")),
        }
    }

    /// Trace of parameter `param` in one chain.
    pub fn chain(&self, param: usize, chain: usize) -> Vec<f64> {
        self.draws.slice(s![chain, .., param]).to_vec()
    }

    /// One vector per chain for parameter `param`.
    pub fn chains(&self, param: usize) -> Vec<Vec<f64>> {
        (0..self.n_chains()).map(|c| self.chain(param, c)).collect()
    }

    /// All chains of parameter `param` concatenated.
    pub fn pooled(&self, param: usize) -> Vec<f64> {
        self.draws.slice(s![.., .., param]).iter().copied().collect()
    }

    /// Keep every `k`-th iteration.
    pub fn thin(&self, k: usize) -> Result<Self> {
        if k == 0 {
            return invalid("thinning interval must be at least 1");
        }
        let draws = self.draws.slice(s![.., ..;k, ..]).to_owned();
        Self::new(draws, self.names.clone())
    }

    /// Pooled draw vectors, one per (chain, iteration), in chain-major order.
    pub fn coefficient_rows(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        self.draws
            .axis_iter(Axis(0))
            .flat_map(|chain| chain.axis_iter(Axis(0)).map(|row| row.to_vec()).collect::<Vec<_>>())
    }

    /// Posterior summary of every parameter with an equal-tailed interval at `level`.
    pub fn summarize(&self, level: f64) -> Result<Vec<ParamSummary>> {
        check_level(level)?;
        let tail = (1.0 - level) / 2.0;
        Ok((0..self.n_params())
            .map(|j| {
                let pooled = sorted(&self.pooled(j));
                let n = pooled.len() as f64;
                let mean = pooled.iter().sum::<f64>() / n;
                let sd = if pooled.len() > 1 {
                    (pooled.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
                } else {
                    f64::NAN
                };
                let chains = self.chains(j);
                let ess = split_effective_sample_size(&chains).ok();
                ParamSummary {
                    name: self.names[j].clone(),
                    mean,
                    sd,
                    lower: quantile(&pooled, tail),
                    median: quantile(&pooled, 0.5),
                    upper: quantile(&pooled, 1.0 - tail),
                    rhat: split_potential_scale_reduction_factor(&chains).ok(),
                    ess,
                    mcse: ess.map(|e| sd / e.sqrt()),
                }
            })
            .collect())
    }

    /// Write one CSV row per draw: `chain,iteration,<parameters...>`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["chain".to_string(), "iteration".to_string()];
        header.extend(self.names.iter().cloned());
        wtr.write_record(&header)?;
        for (c, chain) in self.draws.axis_iter(Axis(0)).enumerate() {
            for (i, row) in chain.axis_iter(Axis(0)).enumerate() {
                let mut record = vec![c.to_string(), i.to_string()];
                record.extend(row.iter().map(|v| v.to_string()));
                wtr.write_record(&record)?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Summary of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub lower: f64,
    pub median: f64,
    pub upper: f64,
    pub rhat: Option<f64>,
    pub ess: Option<f64>,
    /// `sd / sqrt(ess)`
    pub mcse: Option<f64>,
}

/// Table view over a slice of summaries.
pub struct SummaryTable<'a>(pub &'a [ParamSummary]);

impl fmt::Display for SummaryTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<f64>, prec: usize| {
            v.map_or("-".to_string(), |v| format!("{v:.prec$}"))
        };
        writeln!(
            f,
            "{:<14} {:>10} {:>10} {:>10} {:>10} {:>10} {:>8} {:>9} {:>9}",
            "Parameter", "Mean", "SD", "Lower", "Median", "Upper", "Rhat", "ESS", "MCSE"
        )?;
        writeln!(f, "{}", "-".repeat(98))?;
        for p in self.0 {
            writeln!(
                f,
                "{:<14} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>8} {:>9} {:>9}",
                p.name,
                p.mean,
                p.sd,
                p.lower,
                p.median,
                p.upper,
                opt(p.rhat, 3),
                opt(p.ess, 0),
                opt(p.mcse, 4)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn toy() -> PosteriorDraws {
        // 2 chains, 4 iterations, 2 parameters
        let draws =
            Array3::from_shape_fn((2, 4, 2), |(c, i, p)| (c * 10 + i) as f64 + 100.0 * p as f64);
        PosteriorDraws::new(draws, vec!["a".into(), "b".into()]).unwrap()
    }

    #[test]
    fn accessors() {
        let d = toy();
        assert_eq!((d.n_chains(), d.n_draws(), d.n_params()), (2, 4, 2));
        assert_eq!(d.chain(0, 1), vec![10.0, 11.0, 12.0, 13.0]);
        assert_eq!(d.pooled(1)[..4], [100.0, 101.0, 102.0, 103.0]);
        assert_eq!(d.pooled(1).len(), 8);
        assert_eq!(d.param_index("b").unwrap(), 1);
        assert!(d.param_index("c").is_err());
        assert_eq!(d.coefficient_rows().count(), 8);
        assert_eq!(d.coefficient_rows().nth(5).unwrap(), vec![11.0, 111.0]);
        assert!(d.n_coef().is_err());
        let names = vec!["a".into(), "b".into(), SIGMA.into()];
        let reg = PosteriorDraws::new(Array3::zeros((1, 2, 3)), names);
        assert_eq!(reg.unwrap().n_coef().unwrap(), 2);
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(PosteriorDraws::new(Array3::zeros((2, 3, 2)), vec!["a".into()]).is_err());
        assert!(PosteriorDraws::new(Array3::zeros((0, 3, 1)), vec!["a".into()]).is_err());
    }

    #[test]
    fn thinning() {
        let d = toy().thin(2).unwrap();
        assert_eq!(d.n_draws(), 2);
        assert_eq!(d.chain(0, 1), vec![10.0, 12.0]);
        assert!(toy().thin(0).is_err());
    }

    #[test]
    fn summary_values() {
        let s = toy().summarize(0.5).unwrap();
        assert_eq!(s.len(), 2);
        assert_abs_diff_eq!(s[0].mean, 6.5);
        assert_abs_diff_eq!(s[0].median, 6.5);
        assert!(s[0].lower < s[0].median && s[0].median < s[0].upper);
        // chains sit in different places, so R-hat is far from one
        assert!(s[0].rhat.unwrap() > 2.0);
        assert!(toy().summarize(0.0).is_err());
        let table = SummaryTable(&s).to_string();
        assert!(table.contains("Rhat") && table.lines().count() == 4);
    }

    #[test]
    fn mcse_uses_the_reported_ess() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(3);
        let draws = Array3::from_shape_fn((2, 200, 1), |_| rng.r#gen::<f64>());
        let d = PosteriorDraws::new(draws, vec!["a".into()]).unwrap();
        let s = &d.summarize(0.9).unwrap()[0];
        let ess = s.ess.unwrap();
        assert_abs_diff_eq!(s.mcse.unwrap(), s.sd / ess.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn csv_layout() {
        let mut buf = Vec::new();
        toy().write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("chain,iteration,a,b"));
        assert_eq!(lines.next(), Some("0,0,0,100"));
        assert_eq!(text.lines().count(), 9);
    }
}
