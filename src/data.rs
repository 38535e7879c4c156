//! Case dataset loading and regression design matrices.

use crate::error::{Error, Result, invalid};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::{collections::HashSet, io::Read, path::Path};

/// Name given to the constant column of a design with an intercept.
pub const INTERCEPT: &str = "(Intercept)";

/// A table of named numeric columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    names: Vec<String>,
    /// Shape `(n_rows, n_columns)`.
    values: Array2<f64>,
}

impl Dataset {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if names.len() != values.ncols() {
            return invalid(format!(
                "{} column names for {} columns",
                names.len(),
                values.ncols()
            ));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return invalid(format!("duplicate column name '{name}'"));
            }
        }
        Ok(Self { names, values })
    }

    /// Read a CSV file with a header row and numeric cells.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let ds = Self::from_reader(file)?;
        tracing::debug!(
            path = %path.as_ref().display(),
            rows = ds.n_rows(),
            columns = ds.n_columns(),
            "dataset loaded"
        );
        Ok(ds)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(false)
            .from_reader(reader);
        let names: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if names.is_empty() || names.iter().all(String::is_empty) {
            return invalid("CSV input has no header");
        }
        let p = names.len();

        let mut flat = Vec::new();
        let mut n_rows = 0;
        for (row, record) in rdr.records().enumerate() {
            let record = record.map_err(|e| match e.kind() {
                csv::ErrorKind::UnequalLengths { .. } => {
                    Error::Validation(format!("row {} does not have {p} fields", row + 1))
                }
                _ => Error::Csv(e),
            })?;
            for (col, cell) in record.iter().enumerate() {
                let v: f64 = cell.parse().map_err(|_| {
                    Error::Validation(format!(
                        "row {}, column '{}': '{}' is not a number",
                        row + 1,
                        names[col],
                        cell
                    ))
                })?;
                flat.push(v);
            }
            n_rows += 1;
        }
        if n_rows == 0 {
            return invalid("CSV input has no data rows");
        }
        let values = Array2::from_shape_vec((n_rows, p), flat)?;
        Self::new(names, values)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.values.ncols()
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| Error::Validation(format!("no column named '{name}'")))
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let j = self.index_of(name)?;
        Ok(self.values.column(j))
    }

    /// Build the design for regressing `response` on `predictors`.
    pub fn design(&self, response: &str, predictors: &[&str], intercept: bool) -> Result<Design> {
        let y = self.column(response)?.to_owned();
        let mut idx = Vec::with_capacity(predictors.len());
        for p in predictors {
            if *p == response {
                return invalid(format!("'{p}' is both response and predictor"));
            }
            idx.push(self.index_of(p)?);
        }

        let n = self.n_rows();
        let offset = usize::from(intercept);
        let k = idx.len() + offset;
        if k == 0 {
            return invalid("design has no columns");
        }
        let x = Array2::from_shape_fn((n, k), |(i, j)| {
            if intercept && j == 0 {
                1.0
            } else {
                self.values[(i, idx[j - offset])]
            }
        });
        let mut names = Vec::with_capacity(k);
        if intercept {
            names.push(INTERCEPT.to_string());
        }
        names.extend(predictors.iter().map(|p| p.to_string()));
        Design::new(x, y, names)
    }
}

/// Response vector and design matrix of a linear model.
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    /// Design matrix `(n_observations, n_coefficients)`.
    pub x: Array2<f64>,
    /// Response `(n_observations,)`.
    pub y: Array1<f64>,
    /// One name per column of `x`.
    pub names: Vec<String>,
}

/// Centring and scaling applied by [`Design::standardized`].
#[derive(Debug, Clone, PartialEq)]
pub struct Scaling {
    pub means: Vec<f64>,
    pub sds: Vec<f64>,
}

impl Design {
    pub fn new(x: Array2<f64>, y: Array1<f64>, names: Vec<String>) -> Result<Self> {
        if x.nrows() != y.len() {
            return invalid(format!("x has {} rows but y has {} entries", x.nrows(), y.len()));
        }
        if names.len() != x.ncols() {
            return invalid(format!("{} names for {} design columns", names.len(), x.ncols()));
        }
        if x.nrows() <= x.ncols() {
            return invalid(format!(
                "need more observations ({}) than coefficients ({})",
                x.nrows(),
                x.ncols()
            ));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return invalid("design contains non-finite values");
        }
        Ok(Self { x, y, names })
    }

    pub fn n_obs(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_coef(&self) -> usize {
        self.x.ncols()
    }

    pub fn has_intercept(&self) -> bool {
        self.names.first().is_some_and(|n| n == INTERCEPT)
    }

    /// Centre and scale every non-intercept column to mean 0, sd 1.
    ///
    /// The intercept column, if any, is left alone and reported with mean 0, sd 1.
    pub fn standardized(&self) -> Result<(Design, Scaling)> {
        let n = self.n_obs() as f64;
        let mut x = self.x.clone();
        let mut means = Vec::with_capacity(self.n_coef());
        let mut sds = Vec::with_capacity(self.n_coef());
        for (j, mut col) in x.axis_iter_mut(Axis(1)).enumerate() {
            if j == 0 && self.has_intercept() {
                means.push(0.0);
                sds.push(1.0);
                continue;
            }
            let m = col.sum() / n;
            let sd = (col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
            if sd <= 0.0 || !sd.is_finite() {
                return invalid(format!("column '{}' has zero variance", self.names[j]));
            }
            col.mapv_inplace(|v| (v - m) / sd);
            means.push(m);
            sds.push(sd);
        }
        let design = Design {
            x,
            y: self.y.clone(),
            names: self.names.clone(),
        };
        Ok((design, Scaling { means, sds }))
    }
}
