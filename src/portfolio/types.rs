//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbf{w}^\top R-r_f}{\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}}
//! $$
//!
//! Shared enums and result containers for portfolio construction.

use std::fmt;
use std::str::FromStr;

use nalgebra::DMatrix;
use nalgebra::DVector;
use serde::Deserialize;
use serde::Serialize;

use crate::error::EngineError;
use crate::error::Result;
use crate::error::invalid;

/// How expected returns are formed before the max-Sharpe solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationModel {
  /// Historical mean returns.
  MeanVariance,
  /// Black-Litterman posterior returns.
  BlackLitterman,
  /// `1/N` in every asset, no optimization.
  EqualWeight,
}

impl AllocationModel {
  pub const ALL: [AllocationModel; 3] = [Self::MeanVariance, Self::BlackLitterman, Self::EqualWeight];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::MeanVariance => "mean_variance",
      Self::BlackLitterman => "black_litterman",
      Self::EqualWeight => "equal_weight",
    }
  }
}

impl fmt::Display for AllocationModel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AllocationModel {
  type Err = EngineError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "mv" | "mean-variance" | "mean_variance" | "markowitz" => Ok(Self::MeanVariance),
      "bl" | "black-litterman" | "black_litterman" => Ok(Self::BlackLitterman),
      "ew" | "equal-weight" | "equal_weight" => Ok(Self::EqualWeight),
      other => Err(invalid(format!("unknown allocation model {other:?}"))),
    }
  }
}

/// Fully invested allocation with its model moments.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioWeights {
  /// One weight per asset, in universe order.
  pub weights: Vec<f64>,
  /// `w'R` under the returns the weights were optimized for.
  pub expected_return: f64,
  /// `sqrt(w'Σw)`.
  pub volatility: f64,
  /// `(expected_return - r_f) / volatility`, zero for a riskless portfolio.
  pub sharpe: f64,
}

impl PortfolioWeights {
  /// Attach moments to `weights` under `(mu, cov)`.
  pub fn evaluate(weights: Vec<f64>, mu: &DVector<f64>, cov: &DMatrix<f64>, risk_free: f64) -> Result<Self> {
    let n = weights.len();
    if mu.len() != n || cov.nrows() != n || cov.ncols() != n {
      return Err(invalid(format!(
        "{n} weights for returns of length {} and a {}x{} covariance",
        mu.len(),
        cov.nrows(),
        cov.ncols()
      )));
    }
    let w = DVector::from_column_slice(&weights);
    let expected_return = w.dot(mu);
    let volatility = w.dot(&(cov * &w)).max(0.0).sqrt();
    let sharpe = if volatility > 0.0 {
      (expected_return - risk_free) / volatility
    } else {
      0.0
    };

    Ok(Self {
      weights,
      expected_return,
      volatility,
      sharpe,
    })
  }

  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  pub fn total(&self) -> f64 {
    self.weights.iter().sum()
  }
}
