//! Exploratory summaries of the case dataset: five-number summaries, correlations,
//! histograms and normal Q-Q points.

use crate::data::Dataset;
use crate::error::{Result, invalid};
use ndarray::Array2;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

/// Linear-interpolation quantile of an ascending slice (Hyndman and Fan type 7).
///
/// Returns NaN for an empty slice. `q` is clamped to `[0, 1]`.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Sorted copy with NaNs dropped.
pub(crate) fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| !x.is_nan()).collect();
    v.sort_by(f64::total_cmp);
    v
}

/// Mean and Bessel-corrected standard deviation.
pub(crate) fn mean_sd(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub n: usize,
    pub mean: f64,
    pub sd: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl ColumnSummary {
    pub fn from_values(name: &str, values: &[f64]) -> Self {
        let s = sorted(values);
        let (mean, sd) = mean_sd(&s);
        Self {
            name: name.to_string(),
            n: s.len(),
            mean,
            sd,
            min: s.first().copied().unwrap_or(f64::NAN),
            q1: quantile(&s, 0.25),
            median: quantile(&s, 0.5),
            q3: quantile(&s, 0.75),
            max: s.last().copied().unwrap_or(f64::NAN),
        }
    }
}

/// One summary per column, in column order.
pub fn summarize(ds: &Dataset) -> Vec<ColumnSummary> {
    ds.names()
        .iter()
        .zip(ds.values().columns())
        .map(|(name, col)| ColumnSummary::from_values(name, &col.to_vec()))
        .collect()
}

/// Pearson correlation between every pair of columns.
pub fn correlation_matrix(ds: &Dataset) -> Array2<f64> {
    let values = ds.values();
    let n = values.nrows() as f64;
    let p = values.ncols();
    let means: Vec<f64> = values.columns().into_iter().map(|c| c.sum() / n).collect();
    let mut cov = Array2::<f64>::zeros((p, p));
    for row in values.rows() {
        for a in 0..p {
            let da = row[a] - means[a];
            for b in a..p {
                cov[(a, b)] += da * (row[b] - means[b]);
            }
        }
    }
    let mut corr = Array2::<f64>::zeros((p, p));
    for a in 0..p {
        for b in a..p {
            let r = cov[(a, b)] / (cov[(a, a)] * cov[(b, b)]).sqrt();
            corr[(a, b)] = r;
            corr[(b, a)] = r;
        }
    }
    corr
}

/// Equal-width histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` ascending edges.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn bin_width(&self) -> f64 {
        self.edges[1] - self.edges[0]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Bin `values` into `bins` equal-width bins spanning their range. The last bin is closed.
pub fn histogram(values: &[f64], bins: usize) -> Result<Histogram> {
    if bins == 0 {
        return invalid("histogram needs at least one bin");
    }
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return invalid("histogram of empty input");
    }
    let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == min {
        max = min + 1.0;
    }
    let width = (max - min) / bins as f64;
    let edges: Vec<f64> = (0..=bins).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0; bins];
    for v in finite {
        let k = (((v - min) / width) as usize).min(bins - 1);
        counts[k] += 1;
    }
    Ok(Histogram { edges, counts })
}

/// Points `(theoretical, sample)` for a normal Q-Q plot.
pub fn normal_qq(values: &[f64]) -> Vec<(f64, f64)> {
    let s = sorted(values);
    let n = s.len();
    let a = if n <= 10 { 3.0 / 8.0 } else { 0.5 };
    let std_norm = Normal::standard();
    s.into_iter()
        .enumerate()
        .map(|(i, v)| {
            let p = (i as f64 + 1.0 - a) / (n as f64 + 1.0 - 2.0 * a);
            (std_norm.inverse_cdf(p), v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn quantile_matches_type7() {
        // R: quantile(c(1, 2, 4, 7, 11), c(.1, .25, .5, .9))
        let s = [1.0, 2.0, 4.0, 7.0, 11.0];
        assert_abs_diff_eq!(quantile(&s, 0.1), 1.4, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&s, 0.25), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&s, 0.5), 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&s, 0.9), 9.4, epsilon = 1e-12);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn column_summary() {
        let s = ColumnSummary::from_values("x", &[3.0, 1.0, 2.0, 5.0, 4.0]);
        assert_eq!(s.n, 5);
        assert_abs_diff_eq!(s.mean, 3.0);
        assert_abs_diff_eq!(s.sd, 2.5f64.sqrt(), epsilon = 1e-12);
        assert_eq!((s.min, s.median, s.max), (1.0, 3.0, 5.0));
        assert_eq!((s.q1, s.q3), (2.0, 4.0));
    }

    #[test]
    fn correlation_of_linear_columns() {
        let values = ndarray::array![
            [1.0, 2.0, 5.0],
            [2.0, 4.0, 3.0],
            [3.0, 6.0, 1.0],
            [4.0, 8.0, 2.0]
        ];
        let ds = Dataset::new(vec!["a".into(), "b".into(), "c".into()], values).unwrap();
        let r = correlation_matrix(&ds);
        assert_abs_diff_eq!(r[(0, 0)], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r[(0, 1)], 1.0, epsilon = 1e-12);
        assert!(r[(0, 2)] < 0.0);
        assert_abs_diff_eq!(r[(0, 2)], r[(2, 0)]);
    }

    #[test]
    fn constant_column_has_undefined_correlation() {
        let values = ndarray::array![
            [1.0, 4.0, 2.0],
            [2.0, 4.0, 1.0],
            [3.0, 4.0, 5.0],
            [4.0, 4.0, 3.0]
        ];
        let ds = Dataset::new(vec!["a".into(), "flat".into(), "c".into()], values).unwrap();
        let r = correlation_matrix(&ds);
        for k in 0..3 {
            assert!(r[(1, k)].is_nan(), "row entry {k}");
            assert!(r[(k, 1)].is_nan(), "column entry {k}");
        }
        assert_abs_diff_eq!(r[(0, 0)], 1.0, epsilon = 1e-12);
        assert!(r[(0, 2)].is_finite());
    }

    #[test]
    fn histogram_counts_everything() {
        let h = histogram(&[0.0, 0.1, 0.5, 0.9, 1.0], 2).unwrap();
        assert_eq!(h.edges, vec![0.0, 0.5, 1.0]);
        assert_eq!(h.counts, vec![2, 3]);
        assert_eq!(h.total(), 5);
        assert!(histogram(&[], 3).is_err());
        assert!(histogram(&[1.0], 0).is_err());
        // constant input still gets a usable range
        assert_eq!(histogram(&[2.0, 2.0], 4).unwrap().total(), 2);
    }

    #[test]
    fn qq_is_symmetric_for_symmetric_data() {
        let pts = normal_qq(&[-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(pts.len(), 5);
        assert_abs_diff_eq!(pts[2].0, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pts[0].0, -pts[4].0, epsilon = 1e-9);
        assert!(pts.windows(2).all(|w| w[0].0 < w[1].0));
    }

    proptest! {
        #[test]
        fn quantiles_are_monotone(
            mut xs in prop::collection::vec(-1e3f64..1e3, 1..50),
            a in 0.0f64..1.0,
            b in 0.0f64..1.0,
        ) {
            xs.sort_by(f64::total_cmp);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(quantile(&xs, lo) <= quantile(&xs, hi) + 1e-9);
            prop_assert!(quantile(&xs, lo) >= xs[0] - 1e-9);
            prop_assert!(quantile(&xs, hi) <= xs[xs.len() - 1] + 1e-9);
        }
    }
}
