//! bayes-mc CLI

use anyhow::{Context, Result, bail};
use bayes_mc::config::{FitConfig, SamplerKind};
use bayes_mc::conjugate::NormalInverseGamma;
use bayes_mc::data::{Dataset, Design};
use bayes_mc::diagnostics::{Thresholds, autocorrelation};
use bayes_mc::ols::OlsFit;
use bayes_mc::ppc::{self, TestStatistic};
use bayes_mc::{eda, plot, query, regression};
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "bayes-mc")]
#[command(about = "bayes-mc - Monte Carlo methods for Bayesian linear regression")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

/// Data source and model formula shared by the modelling commands.
#[derive(Args)]
struct ModelArgs {
    /// Input CSV with a header row
    #[arg(short, long)]
    input: PathBuf,

    /// Response column
    #[arg(short, long)]
    response: String,

    /// Predictor columns, comma separated
    #[arg(short, long, value_delimiter = ',', required = true)]
    predictors: Vec<String>,

    /// Fit without an intercept column
    #[arg(long)]
    no_intercept: bool,
}

impl ModelArgs {
    fn load(&self) -> Result<Design> {
        let ds = Dataset::from_csv_path(&self.input)
            .with_context(|| format!("reading {}", self.input.display()))?;
        let predictors: Vec<&str> = self.predictors.iter().map(String::as_str).collect();
        Ok(ds.design(&self.response, &predictors, !self.no_intercept)?)
    }
}

/// Sampler settings; each flag overrides the config file.
#[derive(Args)]
struct SamplerArgs {
    /// JSON run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// gibbs or metropolis
    #[arg(long)]
    sampler: Option<SamplerKind>,

    #[arg(long)]
    chains: Option<usize>,

    /// Draws kept per chain after burn-in
    #[arg(long)]
    samples: Option<usize>,

    #[arg(long)]
    burn_in: Option<usize>,

    #[arg(long)]
    thin: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,
}

impl SamplerArgs {
    fn resolve(&self) -> Result<FitConfig> {
        let mut cfg = match &self.config {
            Some(path) => FitConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => FitConfig::default(),
        };
        if let Some(s) = self.sampler {
            cfg.sampler = s;
        }
        if let Some(c) = self.chains {
            cfg.chains = c;
        }
        if let Some(n) = self.samples {
            cfg.samples = n;
        }
        if let Some(b) = self.burn_in {
            cfg.burn_in = b;
        }
        if let Some(t) = self.thin {
            cfg.thin = t;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Column summaries, correlations, histograms and Q-Q plots
    Eda {
        /// Input CSV with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for plots
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(long, default_value = "20")]
        bins: usize,
    },

    /// Ordinary least squares fit
    Ols {
        #[command(flatten)]
        model: ModelArgs,

        /// Confidence level for coefficient intervals
        #[arg(long, default_value = "0.95")]
        level: f64,
    },

    /// Closed-form normal-inverse-gamma posterior with a Monte Carlo check
    Conjugate {
        #[command(flatten)]
        model: ModelArgs,

        /// Prior variance of each coefficient (prior precision is σ⁻² / variance)
        #[arg(long, default_value = "100")]
        prior_variance: f64,

        /// Monte Carlo draws from the posterior
        #[arg(long, default_value = "4000")]
        draws: usize,

        #[arg(long, default_value = "0.95")]
        level: f64,

        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Run MCMC and write draws, summaries and diagnostic plots
    Fit {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        sampler: SamplerArgs,

        /// Output directory for draws.csv, summary.json and plots
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Posterior of the mean response and predictive distribution at a covariate point
    Predict {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        sampler: SamplerArgs,

        /// Predictor values in the order of --predictors
        #[arg(long, value_delimiter = ',', required = true, allow_negative_numbers = true)]
        at: Vec<f64>,

        /// Report P(y_new > threshold)
        #[arg(long, allow_negative_numbers = true)]
        threshold: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Eda { input, out, bins } => cmd_eda(&input, out.as_deref(), bins),
        Commands::Ols { model, level } => cmd_ols(&model, level),
        Commands::Conjugate {
            model,
            prior_variance,
            draws,
            level,
            seed,
        } => cmd_conjugate(&model, prior_variance, draws, level, seed),
        Commands::Fit {
            model,
            sampler,
            out,
        } => cmd_fit(&model, &sampler, out.as_deref()),
        Commands::Predict {
            model,
            sampler,
            at,
            threshold,
        } => cmd_predict(&model, &sampler, &at, threshold),
    }
}

/// Parameter names like `(Intercept)` made safe for file names.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    stem.trim_matches('_').to_string()
}

fn cmd_eda(input: &Path, out: Option<&Path>, bins: usize) -> Result<()> {
    let ds = Dataset::from_csv_path(input).with_context(|| format!("reading {}", input.display()))?;
    let summaries = eda::summarize(&ds);

    println!(
        "{:<14} {:>6} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "Column", "n", "Mean", "SD", "Min", "Q1", "Median", "Q3", "Max"
    );
    for s in &summaries {
        println!(
            "{:<14} {:>6} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
            s.name, s.n, s.mean, s.sd, s.min, s.q1, s.median, s.q3, s.max
        );
    }

    let corr = eda::correlation_matrix(&ds);
    println!();
    print!("{:<14}", "");
    for name in ds.names() {
        print!(" {:>10}", name);
    }
    println!();
    for (i, name) in ds.names().iter().enumerate() {
        print!("{:<14}", name);
        for j in 0..ds.n_columns() {
            print!(" {:>10.3}", corr[(i, j)]);
        }
        println!();
    }

    if let Some(dir) = out {
        fs::create_dir_all(dir)?;
        for name in ds.names() {
            let values = ds.column(name)?.to_vec();
            let stem = file_stem(name);
            let hist = eda::histogram(&values, bins)?;
            plot::histogram_plot(dir.join(format!("hist_{stem}.svg")), &hist, name)?;
            plot::qq_plot(dir.join(format!("qq_{stem}.svg")), &eda::normal_qq(&values))?;
        }
        tracing::info!(dir = %dir.display(), "wrote EDA plots");
    }
    Ok(())
}

fn cmd_ols(model: &ModelArgs, level: f64) -> Result<()> {
    let design = model.load()?;
    let fit = OlsFit::fit(&design)?;
    println!("{fit}");
    println!();
    println!("{:<14} {:>12} {:>12}", "", "lower", "upper");
    for (name, (lo, hi)) in fit.names.iter().zip(fit.confidence_intervals(level)?) {
        println!("{:<14} {:>12.5} {:>12.5}", name, lo, hi);
    }
    Ok(())
}

fn cmd_conjugate(
    model: &ModelArgs,
    prior_variance: f64,
    n_draws: usize,
    level: f64,
    seed: u64,
) -> Result<()> {
    let design = model.load()?;
    let prior = NormalInverseGamma::weakly_informative(design.n_coef(), prior_variance)?;
    let post = prior.posterior(&design)?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let draws = post.sample(n_draws, &mut rng)?;

    println!(
        "{:<14} {:>10} {:>10} {:>10} | {:>10} {:>10} {:>10}",
        "Parameter", "Mean", "Lower", "Upper", "MC mean", "MC lower", "MC upper"
    );
    for (j, name) in design.names.iter().enumerate() {
        let (lo, hi) = post.credible_interval(j, level)?;
        let col = draws.column(j).to_vec();
        let mc = query::summarize_samples(&col, level)?;
        println!(
            "{:<14} {:>10.4} {:>10.4} {:>10.4} | {:>10.4} {:>10.4} {:>10.4}",
            name, post.mean[j], lo, hi, mc.mean, mc.lower, mc.upper
        );
    }
    let sigma2: Vec<f64> = draws.column(design.n_coef()).iter().map(|s| s * s).collect();
    let mc_sigma2 = sigma2.iter().sum::<f64>() / sigma2.len().max(1) as f64;
    match post.sigma2_mean() {
        Some(m) => println!("E[sigma^2 | y] = {m:.4} (Monte Carlo {mc_sigma2:.4})"),
        None => println!("E[sigma^2 | y] undefined (Monte Carlo {mc_sigma2:.4})"),
    }
    Ok(())
}

fn cmd_fit(model: &ModelArgs, sampler: &SamplerArgs, out: Option<&Path>) -> Result<()> {
    let design = model.load()?;
    let cfg = sampler.resolve()?;
    let results = regression::fit(&design, &cfg)?;

    results.summary(cfg.credible_level)?;
    let thresholds = Thresholds {
        max_rhat: cfg.rhat_threshold,
        min_ess: cfg.min_ess,
    };
    let report = results.convergence(thresholds);
    println!();
    print!("{report}");
    if !report.passed() {
        println!("WARNING: convergence checks failed; consider more samples or a longer burn-in.");
    }

    let y = design.y.to_vec();
    let y_rep =
        ppc::simulate_replicates(design.x.view(), &results.draws, cfg.ppc_replicates, cfg.seed)?;
    let checks = TestStatistic::DEFAULTS
        .iter()
        .map(|stat| ppc::check(&y, &y_rep, *stat))
        .collect::<bayes_mc::Result<Vec<_>>>()?;
    let coverage = ppc::interval_coverage(&y, &y_rep, cfg.credible_level)?;
    println!();
    println!("{:<10} {:>10} {:>10} {:>8}", "Statistic", "Observed", "p-value", "");
    for c in &checks {
        let flag = if c.is_extreme(0.05) { "*" } else { "" };
        println!(
            "{:<10} {:>10.4} {:>10.3} {:>8}",
            c.statistic.to_string(),
            c.observed,
            c.p_value,
            flag
        );
    }
    println!("Predictive interval coverage at {:.0}%: {:.3}", cfg.credible_level * 100.0, coverage);

    let Some(dir) = out else {
        return Ok(());
    };
    fs::create_dir_all(dir)?;
    results.draws.write_csv(BufWriter::new(File::create(dir.join("draws.csv"))?))?;

    let summary = serde_json::json!({
        "config": cfg,
        "parameters": results.draws.summarize(cfg.credible_level)?,
        "acceptance_rates": results.acceptance_rates,
        "convergence": report,
        "ppc": checks.iter().map(|c| serde_json::json!({
            "statistic": c.statistic.to_string(),
            "observed": c.observed,
            "p_value": c.p_value,
        })).collect::<Vec<_>>(),
        "interval_coverage": coverage,
    });
    fs::write(dir.join("summary.json"), serde_json::to_string_pretty(&summary)?)?;

    let max_lag = (results.draws.n_draws() / 2).min(40);
    for (j, name) in results.draws.names().iter().enumerate() {
        let stem = file_stem(name);
        let first = results.draws.chain(j, 0);
        plot::trace_plot(dir.join(format!("trace_{stem}.svg")), &results.draws, j)?;
        if first.len() > 1 {
            plot::lag_plot(dir.join(format!("lag_{stem}.svg")), &first, 1)?;
        } else {
            tracing::warn!(param = %name, draws = first.len(), "skipping lag plot");
        }
        match autocorrelation(&first, max_lag) {
            Ok(acf) => plot::acf_plot(dir.join(format!("acf_{stem}.svg")), &acf)?,
            Err(e) => tracing::warn!(param = %name, error = %e, "skipping ACF plot"),
        }
    }
    for c in &checks {
        plot::ppc_plot(dir.join(format!("ppc_{}.svg", c.statistic)), c)?;
    }
    let z = ppc::standardized_residuals(&y, &y_rep)?;
    plot::qq_plot(dir.join("qq_residuals.svg"), &eda::normal_qq(&z))?;

    println!();
    println!("Wrote draws, summary and plots to {}", dir.display());
    Ok(())
}

fn cmd_predict(
    model: &ModelArgs,
    sampler: &SamplerArgs,
    at: &[f64],
    threshold: Option<f64>,
) -> Result<()> {
    let design = model.load()?;
    if at.len() != model.predictors.len() {
        bail!("--at has {} values for {} predictors", at.len(), model.predictors.len());
    }
    let mut x_row = Vec::with_capacity(design.n_coef());
    if design.has_intercept() {
        x_row.push(1.0);
    }
    x_row.extend_from_slice(at);

    let cfg = sampler.resolve()?;
    let results = regression::fit(&design, &cfg)?;
    let level = cfg.credible_level;

    let mu = query::expected_response(&results.draws, &x_row)?;
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed.wrapping_add(1));
    let y_new = query::predictive_draws(&results.draws, &x_row, &mut rng)?;

    let mu_s = query::summarize_samples(&mu, level)?;
    let y_s = query::summarize_samples(&y_new, level)?;
    println!("{:<16} {:>10} {:>10} {:>10} {:>10}", "", "Mean", "SD", "Lower", "Upper");
    for (label, s) in [("E[y | x]", &mu_s), ("y_new", &y_s)] {
        println!(
            "{:<16} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
            label, s.mean, s.sd, s.lower, s.upper
        );
    }
    if let Some(t) = threshold {
        println!("P(y_new > {t}) = {:.4}", query::prob_greater(&y_new, t)?);
    }

    tracing::info!(draws = mu.len(), "prediction from pooled draws");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_stems_are_path_safe() {
        assert_eq!(file_stem("(Intercept)"), "Intercept");
        assert_eq!(file_stem("sigma"), "sigma");
        assert_eq!(file_stem("log dose"), "log_dose");
    }

    #[test]
    fn cli_parses_fit_overrides() {
        let cli = Cli::try_parse_from([
            "bayes-mc",
            "fit",
            "-i",
            "d.csv",
            "-r",
            "y",
            "-p",
            "a,b",
            "--sampler",
            "mh",
            "--chains",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Fit { model, sampler, .. } => {
                assert_eq!(model.predictors, vec!["a", "b"]);
                let cfg = sampler.resolve().unwrap();
                assert_eq!(cfg.sampler, SamplerKind::Metropolis);
                assert_eq!(cfg.chains, 2);
            }
            _ => panic!("expected fit"),
        }
    }
}
