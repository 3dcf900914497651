//! # Configuration
//!
//! $$
//! \Pi = \lambda \Sigma w_m,\qquad \Omega_{kk} = \frac{1-c_k}{c_k}
//! $$
//!
//! Plain-scalar settings consumed by the engines. Every field has a default
//! and the whole tree can be loaded from TOML.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::error::EngineError;
use crate::error::Result;

/// Estimation and optimization parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
  /// Annual risk-free rate.
  pub risk_free_rate: f64,
  /// Risk-aversion coefficient used for reverse optimization.
  pub risk_aversion: f64,
  /// Prior uncertainty scaling.
  pub tau: f64,
  /// Lower bound applied to every weight.
  pub min_weight: f64,
  /// Upper bound applied to every weight.
  pub max_weight: f64,
  /// Confidence level for VaR/CVaR.
  pub var_confidence: f64,
  /// Sampling frequency of the return series.
  pub periods_per_year: usize,
  /// Diagonal loading applied to the covariance estimate (0 disables).
  pub covariance_ridge: f64,
}

impl Default for RiskConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.03,
      risk_aversion: 2.5,
      tau: 0.05,
      min_weight: 0.0,
      max_weight: 1.0,
      var_confidence: 0.95,
      periods_per_year: 252,
      covariance_ridge: 0.0,
    }
  }
}

/// How the backtester turns investor views into expected returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ViewBlending {
  /// Full Black-Litterman posterior on the trained covariance.
  #[default]
  Posterior,
  /// `historical_weight * mean + (1 - historical_weight) * view`, per viewed asset.
  FixedMix { historical_weight: f64 },
}

/// Rolling-window backtest parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
  /// Training window length in periods.
  pub window_size: usize,
  /// Periods between rebalances (length of each test window).
  pub rebalance_frequency: usize,
  /// Keep a trailing test window shorter than `rebalance_frequency`.
  pub include_partial: bool,
  /// Evaluate windows on the rayon pool.
  pub parallel: bool,
  pub view_blending: ViewBlending,
}

impl Default for BacktestConfig {
  fn default() -> Self {
    Self {
      window_size: 252,
      rebalance_frequency: 63,
      include_partial: false,
      parallel: false,
      view_blending: ViewBlending::Posterior,
    }
  }
}

/// Iteration budget and tolerance of the constrained solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
  pub max_iters: u64,
  /// Convergence tolerance on the objective.
  pub ftol: f64,
}

impl Default for SolverConfig {
  fn default() -> Self {
    Self {
      max_iters: 5000,
      ftol: 1e-9,
    }
  }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub risk: RiskConfig,
  pub backtest: BacktestConfig,
  pub solver: SolverConfig,
}

impl EngineConfig {
  /// Parse and validate a TOML document.
  pub fn from_toml_str(s: &str) -> Result<Self> {
    let config: Self = toml::from_str(s)?;
    config.validate()?;
    Ok(config)
  }

  /// Load and validate a TOML file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let config = Self::from_toml_str(&content)?;
    info!(path = %path.display(), "loaded engine configuration");
    Ok(config)
  }

  pub fn to_toml_string(&self) -> Result<String> {
    toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))
  }

  /// Check parameter ranges that do not depend on the asset count.
  pub fn validate(&self) -> Result<()> {
    let r = &self.risk;
    if !(r.tau > 0.0 && r.tau.is_finite()) {
      return Err(EngineError::Config(format!("tau must be positive, got {}", r.tau)));
    }
    if !(r.risk_aversion > 0.0 && r.risk_aversion.is_finite()) {
      return Err(EngineError::Config(format!(
        "risk_aversion must be positive, got {}",
        r.risk_aversion
      )));
    }
    if r.min_weight > r.max_weight {
      return Err(EngineError::Config(format!(
        "min_weight {} exceeds max_weight {}",
        r.min_weight, r.max_weight
      )));
    }
    if !(r.var_confidence > 0.0 && r.var_confidence < 1.0) {
      return Err(EngineError::Config(format!(
        "var_confidence must lie in (0, 1), got {}",
        r.var_confidence
      )));
    }
    if r.periods_per_year == 0 {
      return Err(EngineError::Config("periods_per_year must be positive".into()));
    }
    if r.covariance_ridge < 0.0 {
      return Err(EngineError::Config(format!(
        "covariance_ridge must be non-negative, got {}",
        r.covariance_ridge
      )));
    }

    let b = &self.backtest;
    if b.window_size == 0 || b.rebalance_frequency == 0 {
      return Err(EngineError::Config(
        "window_size and rebalance_frequency must be positive".into(),
      ));
    }
    if let ViewBlending::FixedMix { historical_weight } = b.view_blending {
      if !(0.0..=1.0).contains(&historical_weight) {
        return Err(EngineError::Config(format!(
          "historical_weight must lie in [0, 1], got {historical_weight}"
        )));
      }
    }

    if self.solver.max_iters == 0 || !(self.solver.ftol > 0.0) {
      return Err(EngineError::Config(
        "solver needs a positive iteration budget and tolerance".into(),
      ));
    }

    Ok(())
  }

  /// Check that the weight bounds admit a fully invested portfolio of `n` assets.
  pub fn validate_bounds(&self, n: usize) -> Result<()> {
    check_bounds(self.risk.min_weight, self.risk.max_weight, n)
  }
}

pub(crate) fn check_bounds(min_weight: f64, max_weight: f64, n: usize) -> Result<()> {
  let n_f = n as f64;
  if n == 0 || min_weight > max_weight || n_f * min_weight > 1.0 + 1e-12 || n_f * max_weight < 1.0 - 1e-12
  {
    return Err(EngineError::InvalidInput(format!(
      "weight bounds [{min_weight}, {max_weight}] cannot sum to 1 across {n} assets"
    )));
  }
  Ok(())
}
