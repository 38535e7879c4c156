//! Bayesian linear regression on simulated data with both samplers.
//!
//! The example:
//! 1. Generates data from `y = 1 + 2 x1 - 0.5 x2 + ε`, `ε ~ N(0, 0.8²)`
//! 2. Fits the model by OLS and with the Gibbs and Metropolis samplers
//! 3. Reports posterior summaries, convergence diagnostics and acceptance rates
//! 4. Runs posterior predictive checks on the Gibbs draws

use bayes_mc::config::{FitConfig, ProposalConfig, SamplerKind};
use bayes_mc::data::Design;
use bayes_mc::diagnostics::Thresholds;
use bayes_mc::ols::OlsFit;
use bayes_mc::ppc::{self, TestStatistic};
use bayes_mc::regression;
use ndarray::{Array1, Array2, array};
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    let n = 500;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
    let x = Array2::from_shape_fn((n, 3), |(_, j)| {
        if j == 0 {
            1.0
        } else {
            rng.sample(Normal::standard())
        }
    });
    let true_beta = array![1.0, 2.0, -0.5];
    let noise = Array1::from_shape_fn(n, |_| 0.8 * rng.sample(Normal::standard()));
    let y = x.dot(&true_beta) + noise;
    let design = Design::new(x, y, vec!["(Intercept)".into(), "x1".into(), "x2".into()])?;

    println!("OLS fit:");
    println!("{}\n", OlsFit::fit(&design)?);

    let gibbs_cfg = FitConfig {
        burn_in: 500,
        samples: 1000,
        ..FitConfig::default()
    };
    let gibbs = regression::fit(&design, &gibbs_cfg)?;
    gibbs.summary(0.95)?;
    println!("\n{}", gibbs.convergence(Thresholds::default()));
    println!("{}", gibbs.run_stats);

    let mh_cfg = FitConfig {
        sampler: SamplerKind::Metropolis,
        burn_in: 2000,
        samples: 4000,
        proposal_sd: ProposalConfig {
            beta: 0.04,
            log_sigma: 0.06,
        },
        ..FitConfig::default()
    };
    let mh = regression::fit(&design, &mh_cfg)?;
    println!();
    mh.summary(0.95)?;
    println!("\n{}", mh.convergence(Thresholds::default()));

    println!("True values: {:?}, sigma = 0.8", true_beta.to_vec());

    let y_obs = design.y.to_vec();
    let y_rep = ppc::simulate_replicates(design.x.view(), &gibbs.draws, 500, 1)?;
    println!("\nPosterior predictive p-values:");
    for stat in TestStatistic::DEFAULTS {
        let res = ppc::check(&y_obs, &y_rep, stat)?;
        println!("  {:<10} {:.3}", stat.to_string(), res.p_value);
    }
    Ok(())
}
