//! Frequentist least-squares fit of a [`Design`].
//!
//! Solves the normal equations `(XᵀX) β = Xᵀy` through a Cholesky factorisation of `XᵀX`
//! and reports the usual coefficient table: standard errors, t statistics and two-sided
//! p-values against Student-t with `n - p` degrees of freedom.

use crate::data::Design;
use crate::error::{Error, Result, check_level};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::fmt;

/// Convert an ndarray design into nalgebra matrices.
pub(crate) fn to_nalgebra(design: &Design) -> (DMatrix<f64>, DVector<f64>) {
    let x = DMatrix::from_fn(design.n_obs(), design.n_coef(), |i, j| design.x[(i, j)]);
    let y = DVector::from_iterator(design.n_obs(), design.y.iter().copied());
    (x, y)
}

#[derive(Debug, Clone, Serialize)]
pub struct OlsFit {
    pub names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub t_values: Vec<f64>,
    pub p_values: Vec<f64>,
    /// Residual standard error.
    pub sigma: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub df_residual: usize,
    pub residuals: Vec<f64>,
    pub fitted: Vec<f64>,
    /// `(XᵀX)⁻¹`, `p × p`.
    #[serde(skip)]
    pub xtx_inv: DMatrix<f64>,
}

impl OlsFit {
    pub fn fit(design: &Design) -> Result<Self> {
        let n = design.n_obs();
        let p = design.n_coef();
        let (x, y) = to_nalgebra(design);

        let xtx = x.transpose() * &x;
        let xty = x.transpose() * &y;
        let chol = xtx.cholesky().ok_or_else(|| {
            Error::Computation("XᵀX is not positive definite (collinear predictors?)".to_string())
        })?;
        let diag = chol.l_dirty().diagonal();
        let (dmin, dmax) = diag.iter().fold((f64::INFINITY, 0.0f64), |(lo, hi), d| {
            (lo.min(d.abs()), hi.max(d.abs()))
        });
        if dmin <= dmax * 1e-7 {
            return Err(Error::Computation("design matrix is rank deficient".to_string()));
        }
        let beta = chol.solve(&xty);
        let xtx_inv = chol.inverse();

        let fitted = &x * &beta;
        let residuals = &y - &fitted;
        let ssr = residuals.norm_squared();
        let df_residual = n - p;
        let sigma2 = ssr / df_residual as f64;

        // R² is measured against the mean only when the model carries an intercept.
        let (tss, df_total) = if design.has_intercept() {
            let ybar = y.mean();
            (y.iter().map(|v| (v - ybar).powi(2)).sum::<f64>(), n - 1)
        } else {
            (y.norm_squared(), n)
        };
        let r_squared = 1.0 - ssr / tss;
        let adj_r_squared = 1.0 - (1.0 - r_squared) * df_total as f64 / df_residual as f64;

        let t_dist = StudentsT::new(0.0, 1.0, df_residual as f64)
            .map_err(|e| Error::Computation(e.to_string()))?;
        let std_errors: Vec<f64> = (0..p).map(|j| (sigma2 * xtx_inv[(j, j)]).sqrt()).collect();
        let t_values: Vec<f64> = beta.iter().zip(&std_errors).map(|(b, se)| b / se).collect();
        let p_values: Vec<f64> =
            t_values.iter().map(|t| 2.0 * (1.0 - t_dist.cdf(t.abs()))).collect();

        tracing::debug!(n, p, sigma = sigma2.sqrt(), r_squared, "ols fit");

        Ok(Self {
            names: design.names.clone(),
            coefficients: beta.iter().copied().collect(),
            std_errors,
            t_values,
            p_values,
            sigma: sigma2.sqrt(),
            r_squared,
            adj_r_squared,
            df_residual,
            residuals: residuals.iter().copied().collect(),
            fitted: fitted.iter().copied().collect(),
            xtx_inv,
        })
    }

    /// t-based confidence interval `(lower, upper)` for every coefficient.
    pub fn confidence_intervals(&self, level: f64) -> Result<Vec<(f64, f64)>> {
        check_level(level)?;
        let t_dist = StudentsT::new(0.0, 1.0, self.df_residual as f64)
            .map_err(|e| Error::Computation(e.to_string()))?;
        let q = t_dist.inverse_cdf(0.5 + level / 2.0);
        Ok(self
            .coefficients
            .iter()
            .zip(&self.std_errors)
            .map(|(b, se)| (b - q * se, b + q * se))
            .collect())
    }

    /// Point prediction for a full design row (including the intercept entry, if any).
    pub fn predict(&self, x_row: &[f64]) -> Result<f64> {
        if x_row.len() != self.coefficients.len() {
            return Err(Error::Validation(format!(
                "expected {} values, got {}",
                self.coefficients.len(),
                x_row.len()
            )));
        }
        Ok(x_row.iter().zip(&self.coefficients).map(|(x, b)| x * b).sum())
    }
}

impl fmt::Display for OlsFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<14} {:>12} {:>12} {:>9} {:>10}",
            "", "Estimate", "Std. Error", "t value", "Pr(>|t|)"
        )?;
        for j in 0..self.coefficients.len() {
            writeln!(
                f,
                "{:<14} {:>12.5} {:>12.5} {:>9.3} {:>10.4}",
                self.names[j],
                self.coefficients[j],
                self.std_errors[j],
                self.t_values[j],
                self.p_values[j]
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Residual standard error: {:.4} on {} degrees of freedom",
            self.sigma, self.df_residual
        )?;
        write!(
            f,
            "Multiple R-squared: {:.4},\tAdjusted R-squared: {:.4}",
            self.r_squared, self.adj_r_squared
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Dataset;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn cars() -> Design {
        // First ten rows of R's `cars` (speed, dist).
        let values = array![
            [4.0, 2.0],
            [4.0, 10.0],
            [7.0, 4.0],
            [7.0, 22.0],
            [8.0, 16.0],
            [9.0, 10.0],
            [10.0, 18.0],
            [10.0, 26.0],
            [10.0, 34.0],
            [11.0, 17.0]
        ];
        Dataset::new(vec!["speed".into(), "dist".into()], values)
            .unwrap()
            .design("dist", &["speed"], true)
            .unwrap()
    }

    #[test]
    fn exact_line_is_recovered() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let d = Design::new(x, y, vec!["(Intercept)".into(), "x".into()]).unwrap();
        let fit = OlsFit::fit(&d).unwrap();
        assert_abs_diff_eq!(fit.coefficients[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.coefficients[1], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.r_squared, 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.predict(&[1.0, 10.0]).unwrap(), 21.0, epsilon = 1e-9);
        assert!(fit.predict(&[1.0]).is_err());
    }

    #[test]
    fn matches_closed_form_simple_regression() {
        let d = cars();
        let fit = OlsFit::fit(&d).unwrap();
        let x: Vec<f64> = d.x.column(1).to_vec();
        let y: Vec<f64> = d.y.to_vec();
        let n = x.len() as f64;
        let xbar = x.iter().sum::<f64>() / n;
        let ybar = y.iter().sum::<f64>() / n;
        let sxy: f64 = x.iter().zip(&y).map(|(a, b)| (a - xbar) * (b - ybar)).sum();
        let sxx: f64 = x.iter().map(|a| (a - xbar).powi(2)).sum();
        let slope = sxy / sxx;
        assert_abs_diff_eq!(fit.coefficients[1], slope, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.coefficients[0], ybar - slope * xbar, epsilon = 1e-9);
        assert_abs_diff_eq!(fit.std_errors[1], fit.sigma / sxx.sqrt(), epsilon = 1e-9);
        assert_abs_diff_eq!(fit.residuals.iter().sum::<f64>(), 0.0, epsilon = 1e-9);
        assert_eq!(fit.df_residual, 8);
        assert!(fit.p_values.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn confidence_interval_contains_estimate() {
        let fit = OlsFit::fit(&cars()).unwrap();
        let ci90 = fit.confidence_intervals(0.90).unwrap();
        let ci99 = fit.confidence_intervals(0.99).unwrap();
        for j in 0..2 {
            assert!(ci90[j].0 < fit.coefficients[j] && fit.coefficients[j] < ci90[j].1);
            assert!(ci99[j].0 < ci90[j].0 && ci90[j].1 < ci99[j].1);
        }
        assert!(fit.confidence_intervals(1.5).is_err());
        assert!(fit.to_string().contains("speed"));
    }

    #[test]
    fn collinear_design_fails() {
        let x = array![[1.0, 1.0, 2.0], [1.0, 2.0, 4.0], [1.0, 3.0, 6.0], [1.0, 4.0, 8.0]];
        let y = array![1.0, 2.0, 3.0, 5.0];
        let d = Design::new(x, y, vec!["(Intercept)".into(), "a".into(), "b".into()]).unwrap();
        assert!(matches!(OlsFit::fit(&d), Err(Error::Computation(_))));
    }
}
