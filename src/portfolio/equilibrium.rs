//! # Market Equilibrium
//!
//! $$
//! \Pi = \lambda\,\Sigma\,w_m
//! $$
//!
//! Reverse optimization of expected returns from market-capitalization weights.

use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::error::Result;
use crate::error::invalid;

const WEIGHT_SUM_TOL: f64 = 1e-6;

/// Long-only market weights summing to one.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketWeights(DVector<f64>);

impl MarketWeights {
  pub fn new(weights: Vec<f64>) -> Result<Self> {
    if weights.is_empty() {
      return Err(invalid("market weights are empty"));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
      return Err(invalid("market weights must be finite and non-negative"));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOL {
      return Err(invalid(format!("market weights sum to {sum}, expected 1")));
    }
    Ok(Self(DVector::from_vec(weights)))
  }

  /// Weights proportional to market capitalizations.
  pub fn from_caps(caps: &[f64]) -> Result<Self> {
    if caps.iter().any(|c| !c.is_finite() || *c < 0.0) {
      return Err(invalid("market caps must be finite and non-negative"));
    }
    let total: f64 = caps.iter().sum();
    if total <= 0.0 {
      return Err(invalid("market caps sum to zero"));
    }
    Self::new(caps.iter().map(|c| c / total).collect())
  }

  pub fn equal(n: usize) -> Result<Self> {
    if n == 0 {
      return Err(invalid("market weights are empty"));
    }
    Ok(Self(DVector::from_element(n, 1.0 / n as f64)))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn as_vector(&self) -> &DVector<f64> {
    &self.0
  }
}

/// Equilibrium excess returns `λ Σ w_m`.
pub fn implied_returns(
  risk_aversion: f64,
  covariance: &DMatrix<f64>,
  market_weights: &MarketWeights,
) -> Result<DVector<f64>> {
  let n = market_weights.len();
  if covariance.nrows() != n || covariance.ncols() != n {
    return Err(invalid(format!(
      "covariance is {}x{} for {n} market weights",
      covariance.nrows(),
      covariance.ncols()
    )));
  }
  if !risk_aversion.is_finite() {
    return Err(invalid("risk aversion must be finite"));
  }
  Ok(covariance * market_weights.as_vector() * risk_aversion)
}
