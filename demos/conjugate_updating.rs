//! Closed-form Bayesian updating for three conjugate families.
//!
//! 1. Beta-Binomial: sequential updates of a success probability
//! 2. Normal mean with known variance
//! 3. Normal-inverse-gamma regression posterior, checked against Monte Carlo draws

use bayes_mc::conjugate::{BetaBinomial, NormalInverseGamma, NormalKnownVariance};
use bayes_mc::data::Dataset;
use bayes_mc::query;
use rand::SeedableRng;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // Uniform prior, then three batches of trials.
    let mut coin = BetaBinomial::new(1.0, 1.0)?;
    for (successes, trials) in [(3, 10), (7, 10), (12, 20)] {
        coin = coin.update(successes, trials)?;
        let (lo, hi) = coin.credible_interval(0.95)?;
        println!(
            "after {successes}/{trials}: Beta({}, {}) mean {:.3}, 95% CI [{lo:.3}, {hi:.3}]",
            coin.alpha,
            coin.beta,
            coin.mean()
        );
    }

    let prior = NormalKnownVariance::new(0.0, 10.0, 4.0)?;
    let post = prior.update(&[2.1, 1.7, 3.0, 2.4, 2.8])?;
    let (lo, hi) = post.credible_interval(0.95)?;
    println!(
        "\nnormal mean: posterior N({:.3}, {:.3}), 95% CI [{lo:.3}, {hi:.3}]",
        post.mean, post.variance
    );

    // R's `cars` (first fifteen rows): stopping distance against speed.
    let csv = "speed,dist\n4,2\n4,10\n7,4\n7,22\n8,16\n9,10\n10,18\n10,26\n10,34\n\
               11,17\n11,28\n12,14\n12,20\n12,24\n12,28\n";
    let design = Dataset::from_reader(csv.as_bytes())?.design("dist", &["speed"], true)?;
    let nig = NormalInverseGamma::weakly_informative(2, 1000.0)?.posterior(&design)?;
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(1);
    let draws = nig.sample(20_000, &mut rng)?;

    println!("\n{:<14} {:>22} {:>22}", "", "exact 95% CI", "Monte Carlo 95% CI");
    for (j, name) in design.names.iter().enumerate() {
        let (lo, hi) = nig.credible_interval(j, 0.95)?;
        let (mlo, mhi) = query::credible_interval(&draws.column(j).to_vec(), 0.95)?;
        println!("{name:<14} [{lo:>9.3}, {hi:>9.3}] [{mlo:>9.3}, {mhi:>9.3}]");
    }
    if let Some(s2) = nig.sigma2_mean() {
        println!("E[sigma^2 | y] = {s2:.3}");
    }
    Ok(())
}
