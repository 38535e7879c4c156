//! SVG diagnostic plots.

use crate::diagnostics::lag_pairs;
use crate::draws::PosteriorDraws;
use crate::eda::{Histogram, histogram, quantile, sorted};
use crate::error::{Error, Result, invalid};
use crate::ppc::PpcResult;
use plotters::prelude::*;
use statrs::distribution::{ContinuousCDF, Normal};
use std::ops::Range;
use std::path::Path;

type PlotResult = std::result::Result<(), Box<dyn std::error::Error>>;

const SIZE: (u32, u32) = (800, 500);
const FILL: RGBColor = RGBColor(70, 130, 180);

fn finish(path: &Path, res: PlotResult) -> Result<()> {
    res.map_err(|e| Error::Plot(format!("{}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), "wrote plot");
    Ok(())
}

/// Range covering `values` with 5% padding on each side.
fn padded(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return -1.0..1.0;
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 0.5 };
    (lo - pad)..(hi + pad)
}

/// Trace of one parameter, one line per chain.
pub fn trace_plot(path: impl AsRef<Path>, draws: &PosteriorDraws, param: usize) -> Result<()> {
    let path = path.as_ref();
    if param >= draws.n_params() {
        return invalid(format!("parameter index {param} out of range"));
    }
    finish(path, draw_trace(path, draws, param))
}

fn draw_trace(path: &Path, draws: &PosteriorDraws, param: usize) -> PlotResult {
    let chains = draws.chains(param);
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Trace: {}", draws.names()[param]), ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            0f64..draws.n_draws() as f64,
            padded(chains.iter().flatten().copied()),
        )?;
    chart.configure_mesh().x_desc("Iteration").draw()?;

    for (c, chain) in chains.iter().enumerate() {
        let color = Palette99::pick(c);
        chart
            .draw_series(LineSeries::new(
                chain.iter().enumerate().map(|(i, v)| (i as f64, *v)),
                color.stroke_width(1),
            ))?
            .label(format!("chain {}", c + 1))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], Palette99::pick(c)));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// Scatter of `(θ_t, θ_{t+lag})`.
pub fn lag_plot(path: impl AsRef<Path>, chain: &[f64], lag: usize) -> Result<()> {
    let path = path.as_ref();
    let pairs = lag_pairs(chain, lag);
    if pairs.is_empty() {
        return invalid(format!("chain of {} draws has no pairs at lag {lag}", chain.len()));
    }
    finish(path, draw_lag(path, &pairs, lag))
}

fn draw_lag(path: &Path, pairs: &[(f64, f64)], lag: usize) -> PlotResult {
    let range = padded(pairs.iter().flat_map(|(a, b)| [*a, *b]));
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Lag-{lag} scatter"), ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(range.clone(), range)?;
    chart
        .configure_mesh()
        .x_desc("θ(t)")
        .y_desc(format!("θ(t+{lag})"))
        .draw()?;
    chart.draw_series(pairs.iter().map(|p| Circle::new(*p, 2, FILL.mix(0.5).filled())))?;
    root.present()?;
    Ok(())
}

/// Bar chart of autocorrelations starting at lag 0.
pub fn acf_plot(path: impl AsRef<Path>, acf: &[f64]) -> Result<()> {
    let path = path.as_ref();
    if acf.is_empty() {
        return invalid("no autocorrelations to plot");
    }
    finish(path, draw_acf(path, acf))
}

fn draw_acf(path: &Path, acf: &[f64]) -> PlotResult {
    let lo = acf.iter().copied().fold(0.0, f64::min).min(-0.1);
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Autocorrelation", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(-0.5f64..acf.len() as f64 - 0.5, (lo - 0.05)..1.05)?;
    chart.configure_mesh().x_desc("Lag").y_desc("ACF").draw()?;
    chart.draw_series(acf.iter().enumerate().map(|(k, r)| {
        Rectangle::new([(k as f64 - 0.3, 0.0), (k as f64 + 0.3, *r)], FILL.filled())
    }))?;
    chart.draw_series(LineSeries::new(vec![(-0.5, 0.0), (acf.len() as f64 - 0.5, 0.0)], &BLACK))?;
    root.present()?;
    Ok(())
}

pub fn histogram_plot(path: impl AsRef<Path>, hist: &Histogram, title: &str) -> Result<()> {
    let path = path.as_ref();
    finish(path, draw_histogram(path, hist, title, None))
}

fn draw_histogram(path: &Path, hist: &Histogram, title: &str, marker: Option<f64>) -> PlotResult {
    let x_range = padded(hist.edges.iter().copied().chain(marker));
    let y_max = hist.counts.iter().copied().max().unwrap_or(0) as f64 * 1.1 + 1.0;
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, 0f64..y_max)?;
    chart.configure_mesh().y_desc("Count").draw()?;
    chart.draw_series(hist.counts.iter().enumerate().map(|(k, count)| {
        Rectangle::new(
            [(hist.edges[k], 0.0), (hist.edges[k + 1], *count as f64)],
            FILL.mix(0.7).filled(),
        )
    }))?;
    if let Some(x) = marker {
        chart.draw_series(LineSeries::new(vec![(x, 0.0), (x, y_max)], RED.stroke_width(2)))?;
    }
    root.present()?;
    Ok(())
}

/// Normal Q-Q plot of `(theoretical, sample)` points with a line through the quartiles.
pub fn qq_plot(path: impl AsRef<Path>, points: &[(f64, f64)]) -> Result<()> {
    let path = path.as_ref();
    if points.len() < 2 {
        return invalid("Q-Q plot needs at least two points");
    }
    finish(path, draw_qq(path, points))
}

fn draw_qq(path: &Path, points: &[(f64, f64)]) -> PlotResult {
    let samples = sorted(&points.iter().map(|p| p.1).collect::<Vec<_>>());
    let q1 = quantile(&samples, 0.25);
    let q3 = quantile(&samples, 0.75);
    let z = Normal::standard().inverse_cdf(0.75);
    let slope = (q3 - q1) / (2.0 * z);
    let intercept = q1 + z * slope;

    let x_range = padded(points.iter().map(|p| p.0));
    let y_range = padded(points.iter().map(|p| p.1));
    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Normal Q-Q", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range.clone(), y_range)?;
    chart
        .configure_mesh()
        .x_desc("Theoretical quantiles")
        .y_desc("Sample quantiles")
        .draw()?;
    chart.draw_series(points.iter().map(|p| Circle::new(*p, 3, FILL.filled())))?;
    chart.draw_series(LineSeries::new(
        [x_range.start, x_range.end].map(|x| (x, intercept + slope * x)),
        RED.stroke_width(1),
    ))?;
    root.present()?;
    Ok(())
}

/// Histogram of the replicated statistic with the observed value marked.
pub fn ppc_plot(path: impl AsRef<Path>, result: &PpcResult) -> Result<()> {
    let path = path.as_ref();
    let hist = histogram(&result.replicated, 30)?;
    let title = format!("PPC {}: p = {:.3}", result.statistic, result.p_value);
    finish(path, draw_histogram(path, &hist, &title, Some(result.observed)))
}
