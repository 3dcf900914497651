//! # Return Data and Statistics
//!
//! $$
//! \hat\mu = P\,\bar r,\qquad
//! \hat\Sigma = \frac{P}{T-1}\sum_{t=1}^{T}(r_t-\bar r)(r_t-\bar r)^\top
//! $$
//!
//! Time-indexed return matrices and their annualized first and second moments.

use chrono::NaiveDate;
use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::s;
use ndarray_stats::CorrelationExt;
use tracing::debug;

use super::universe::AssetUniverse;
use crate::error::EngineError;
use crate::error::Result;
use crate::error::insufficient;
use crate::error::invalid;

/// `T x N` matrix of periodic returns, one row per date, one column per asset.
#[derive(Clone, Debug)]
pub struct ReturnSeries {
  universe: AssetUniverse,
  dates: Vec<NaiveDate>,
  returns: Array2<f64>,
}

impl ReturnSeries {
  pub fn new(universe: AssetUniverse, dates: Vec<NaiveDate>, returns: Array2<f64>) -> Result<Self> {
    if returns.ncols() != universe.len() {
      return Err(invalid(format!(
        "return matrix has {} columns for {} assets",
        returns.ncols(),
        universe.len()
      )));
    }
    if returns.nrows() != dates.len() {
      return Err(invalid(format!(
        "return matrix has {} rows for {} dates",
        returns.nrows(),
        dates.len()
      )));
    }
    if dates.windows(2).any(|d| d[0] >= d[1]) {
      return Err(invalid("dates must be strictly increasing"));
    }
    if returns.iter().any(|r| !r.is_finite()) {
      return Err(invalid("return matrix contains non-finite values"));
    }

    Ok(Self {
      universe,
      dates,
      returns,
    })
  }

  /// Simple returns `p_t / p_{t-1} - 1` from a price matrix; the first date is dropped.
  pub fn from_prices(universe: AssetUniverse, dates: Vec<NaiveDate>, prices: &Array2<f64>) -> Result<Self> {
    if prices.nrows() != dates.len() {
      return Err(invalid(format!(
        "price matrix has {} rows for {} dates",
        prices.nrows(),
        dates.len()
      )));
    }
    if prices.nrows() < 2 {
      return Err(insufficient("need at least two prices to form a return"));
    }
    if prices.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
      return Err(invalid("prices must be finite and strictly positive"));
    }

    let prev = prices.slice(s![..-1, ..]);
    let next = prices.slice(s![1.., ..]);
    let returns = &next / &prev - 1.0;

    Self::new(universe, dates[1..].to_vec(), returns)
  }

  pub fn universe(&self) -> &AssetUniverse {
    &self.universe
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn returns(&self) -> ArrayView2<'_, f64> {
    self.returns.view()
  }

  /// Number of periods `T`.
  pub fn len(&self) -> usize {
    self.returns.nrows()
  }

  pub fn is_empty(&self) -> bool {
    self.returns.nrows() == 0
  }

  /// Number of assets `N`.
  pub fn n_assets(&self) -> usize {
    self.returns.ncols()
  }

  /// Rows `start..end`.
  pub fn rows(&self, start: usize, end: usize) -> Result<ArrayView2<'_, f64>> {
    if start > end || end > self.len() {
      return Err(invalid(format!(
        "row range {start}..{end} outside series of length {}",
        self.len()
      )));
    }
    Ok(self.returns.slice(s![start..end, ..]))
  }

  /// Realized portfolio return per period for fixed `weights`.
  pub fn portfolio_returns(&self, weights: &[f64]) -> Result<Vec<f64>> {
    portfolio_returns(self.returns.view(), weights)
  }
}

pub(crate) fn portfolio_returns(returns: ArrayView2<'_, f64>, weights: &[f64]) -> Result<Vec<f64>> {
  if weights.len() != returns.ncols() {
    return Err(invalid(format!(
      "{} weights for {} assets",
      weights.len(),
      returns.ncols()
    )));
  }
  let w = Array1::from_vec(weights.to_vec());
  Ok(returns.dot(&w).to_vec())
}

/// Annualized mean vector and covariance matrix of a return window.
#[derive(Clone, Debug)]
pub struct ReturnStatistics {
  pub mean: DVector<f64>,
  pub covariance: DMatrix<f64>,
  /// Number of periods the estimate is based on.
  pub observations: usize,
}

impl ReturnStatistics {
  /// Sample estimate; requires `T >= 2` and `T > N` so the covariance is non-singular.
  pub fn estimate(returns: ArrayView2<'_, f64>, periods_per_year: usize) -> Result<Self> {
    let (t, n) = returns.dim();
    if t <= n {
      return Err(insufficient(format!(
        "{t} observations for {n} assets leaves the sample covariance singular"
      )));
    }
    Self::estimate_unchecked(returns, periods_per_year)
  }

  /// Estimate allowing `T <= N`, followed by diagonal loading of strength `ridge`.
  pub fn estimate_regularized(returns: ArrayView2<'_, f64>, periods_per_year: usize, ridge: f64) -> Result<Self> {
    if !(ridge > 0.0 && ridge.is_finite()) {
      return Err(invalid(format!("ridge must be positive, got {ridge}")));
    }
    Ok(Self::estimate_unchecked(returns, periods_per_year)?.regularized(ridge))
  }

  fn estimate_unchecked(returns: ArrayView2<'_, f64>, periods_per_year: usize) -> Result<Self> {
    let (t, n) = returns.dim();
    if t < 2 {
      return Err(insufficient(format!(
        "covariance needs at least 2 observations, got {t}"
      )));
    }
    if n == 0 {
      return Err(invalid("return window has no assets"));
    }
    if periods_per_year == 0 {
      return Err(invalid("periods_per_year must be positive"));
    }

    let scale = periods_per_year as f64;
    let mean = returns
      .mean_axis(Axis(0))
      .ok_or_else(|| insufficient("empty return window"))?;
    let cov = returns
      .t()
      .cov(1.0)
      .map_err(|e| EngineError::InsufficientData(e.to_string()))?;

    let mean = DVector::from_iterator(n, mean.iter().map(|m| m * scale));
    let covariance = DMatrix::from_fn(n, n, |i, j| 0.5 * (cov[[i, j]] + cov[[j, i]]) * scale);

    debug!(observations = t, assets = n, "estimated return statistics");

    Ok(Self {
      mean,
      covariance,
      observations: t,
    })
  }

  pub fn n_assets(&self) -> usize {
    self.mean.len()
  }

  /// Diagonal loading `Σ + ridge · mean(diag Σ) · I`.
  pub fn regularized(mut self, ridge: f64) -> Self {
    let n = self.covariance.nrows();
    if n == 0 || ridge <= 0.0 {
      return self;
    }
    let avg_var = self.covariance.diagonal().mean();
    let load = if avg_var > 0.0 { ridge * avg_var } else { ridge };
    for i in 0..n {
      self.covariance[(i, i)] += load;
    }
    self
  }

  /// Correlation matrix implied by the covariance; zero-variance assets get zero correlation.
  pub fn correlation(&self) -> DMatrix<f64> {
    correlation_from_covariance(&self.covariance)
  }

  /// Annualized volatility per asset.
  pub fn volatilities(&self) -> DVector<f64> {
    self.covariance.diagonal().map(|v| v.max(0.0).sqrt())
  }
}

pub fn correlation_from_covariance(cov: &DMatrix<f64>) -> DMatrix<f64> {
  let n = cov.nrows();
  let sd: Vec<f64> = (0..n).map(|i| cov[(i, i)].max(0.0).sqrt()).collect();
  DMatrix::from_fn(n, n, |i, j| {
    if i == j {
      1.0
    } else {
      let denom = sd[i] * sd[j];
      if denom > 1e-15 {
        (cov[(i, j)] / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use approx::assert_relative_eq;
  use ndarray::array;

  use super::*;

  fn dates(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..n).map(|i| start + chrono::Days::new(i as u64)).collect()
  }

  #[test]
  fn annualizes_mean_and_sample_covariance() {
    let r = array![[0.01, 0.02], [0.03, -0.01], [-0.02, 0.00], [0.00, 0.03]];
    let stats = ReturnStatistics::estimate(r.view(), 252).unwrap();

    assert_relative_eq!(stats.mean[0], 0.005 * 252.0, epsilon = 1e-12);
    assert_relative_eq!(stats.mean[1], 0.01 * 252.0, epsilon = 1e-12);

    // var_0 = sum((x - 0.005)^2) / 3
    let var0 = (0.005f64.powi(2) + 0.025f64.powi(2) + 0.025f64.powi(2) + 0.005f64.powi(2)) / 3.0;
    assert_relative_eq!(stats.covariance[(0, 0)], var0 * 252.0, epsilon = 1e-12);
    assert_eq!(stats.covariance[(0, 1)], stats.covariance[(1, 0)]);
    assert_eq!(stats.observations, 4);
  }

  #[test]
  fn short_or_singular_windows_are_rejected() {
    let one = array![[0.01, 0.02]];
    assert!(matches!(
      ReturnStatistics::estimate(one.view(), 252),
      Err(EngineError::InsufficientData(_))
    ));

    let square = array![[0.01, 0.02], [0.02, 0.01]];
    assert!(matches!(
      ReturnStatistics::estimate(square.view(), 252),
      Err(EngineError::InsufficientData(_))
    ));

    let reg = ReturnStatistics::estimate_regularized(square.view(), 252, 0.1).unwrap();
    assert!(reg.covariance.clone().cholesky().is_some());
  }

  #[test]
  fn from_prices_drops_first_date() {
    let universe = AssetUniverse::new(["A", "B"]).unwrap();
    let prices = array![[100.0, 50.0], [110.0, 50.0], [99.0, 55.0]];
    let series = ReturnSeries::from_prices(universe, dates(3), &prices).unwrap();

    assert_eq!(series.len(), 2);
    assert_eq!(series.dates()[0], dates(3)[1]);
    assert_abs_diff_eq!(series.returns()[[0, 0]], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(series.returns()[[1, 0]], -0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(series.returns()[[1, 1]], 0.1, epsilon = 1e-12);
  }

  #[test]
  fn series_validates_shape_and_order() {
    let universe = AssetUniverse::new(["A", "B"]).unwrap();
    let r = array![[0.01, 0.02], [0.03, -0.01]];
    assert!(ReturnSeries::new(universe.clone(), dates(3), r.clone()).is_err());

    let mut d = dates(2);
    d.reverse();
    assert!(ReturnSeries::new(universe.clone(), d, r.clone()).is_err());

    let series = ReturnSeries::new(universe, dates(2), r).unwrap();
    let port = series.portfolio_returns(&[0.5, 0.5]).unwrap();
    assert_abs_diff_eq!(port[0], 0.015, epsilon = 1e-12);
    assert_abs_diff_eq!(port[1], 0.01, epsilon = 1e-12);
    assert!(series.portfolio_returns(&[1.0]).is_err());
    assert!(series.rows(1, 3).is_err());
  }

  #[test]
  fn correlation_has_unit_diagonal() {
    let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.006, 0.006, 0.09]);
    let corr = correlation_from_covariance(&cov);
    assert_eq!(corr[(0, 0)], 1.0);
    assert_relative_eq!(corr[(0, 1)], 0.1, epsilon = 1e-12);
  }
}
