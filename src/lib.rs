//! # Monte Carlo Methods for Bayesian Linear Regression
//!
//! This crate covers the full workflow of a Bayesian regression analysis on a small tabular
//! dataset, from exploratory summaries to posterior predictive checks.
//!
//! ## Features
//!
//! - **Data and exploration:** CSV loading into a [`data::Dataset`], design matrices with an
//!   optional intercept, column summaries, correlations, histograms and Q-Q points ([`eda`]).
//! - **Frequentist baseline:** ordinary least squares with standard errors, t-tests and
//!   confidence intervals ([`ols`]).
//! - **Conjugate analysis:** Beta-Binomial, Normal with known variance and the
//!   Normal-Inverse-Gamma regression posterior in closed form ([`conjugate`]).
//! - **MCMC:**
//!   - [`regression::GibbsLinear`] draws every coordinate from its full conditional.
//!   - [`regression::MetropolisLinear`] uses random-walk proposals with a per-coordinate
//!     accept/reject step.
//!   - Both run several chains through [`mini_mcmc`] and return [`draws::PosteriorDraws`].
//! - **Diagnostics:** autocorrelation, split R-hat, effective sample size and Monte Carlo
//!   standard errors ([`diagnostics`]).
//! - **Checking and inference:** posterior predictive checks ([`ppc`]), probability
//!   statements, credible and HPD intervals and predictions ([`query`]), SVG plots ([`plot`]).
//!
//! ## Mathematical Background
//!
//! The model is `y = Xβ + ε` with `ε ~ N(0, σ²I)`. Under the semi-conjugate prior
//! `β_j ~ N(μ₀, τ₀²)`, `σ² ~ IG(a₀, b₀)` each full conditional is normal or inverse-gamma,
//! which is what the Gibbs sampler exploits. See:
//!
//! - Gelman, A. et al. (2013). *Bayesian Data Analysis*, 3rd ed., chapters 11 and 14.
//! - Vehtari, A., Gelman, A., Simpson, D., Carpenter, B., & Bürkner, P.-C. (2021).
//!   Rank-normalization, folding, and localization: An improved R-hat for assessing
//!   convergence of MCMC. *Bayesian Analysis*, 16(2).
//!
//! ## Usage Example
//!
//! ```rust
//! use bayes_mc::config::FitConfig;
//! use bayes_mc::data::Dataset;
//! use bayes_mc::regression;
//!
//! let csv = "x,y\n1,2.1\n2,3.9\n3,6.2\n4,7.8\n5,10.1\n6,12.2\n";
//! let ds = Dataset::from_reader(csv.as_bytes()).unwrap();
//! let design = ds.design("y", &["x"], true).unwrap();
//!
//! let config = FitConfig { chains: 2, burn_in: 200, samples: 400, ..FitConfig::default() };
//! let results = regression::fit(&design, &config).unwrap();
//! assert_eq!(results.draws.names(), &["(Intercept)", "x", "sigma"]);
//! ```
//!
//! The `demos` directory in the repository contains runnable examples, and the `bayes-mc`
//! binary wraps the same workflow behind a command-line interface.
//! ## License
//! This crate is dual-licensed under the MIT OR Apache-2.0 licenses.
//! See [LICENSE-MIT](LICENSE-MIT) and [LICENSE-APACHE](LICENSE-APACHE) for details.

pub mod config;
pub mod conjugate;
pub mod data;
pub mod diagnostics;
pub mod draws;
pub mod eda;
pub mod error;
pub mod ols;
pub mod plot;
pub mod ppc;
pub mod query;
pub mod regression;

pub use error::{Error, Result};
