//! # Errors
//!
//! Failure kinds surfaced by the estimation, optimization and backtesting
//! engines. Nothing in the crate substitutes a default for a failed step.

use thiserror::Error;

/// Error type shared by every engine component.
#[derive(Error, Debug)]
pub enum EngineError {
  /// Shape mismatch, out-of-range parameter or malformed view.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// Series too short for the requested statistic or window.
  #[error("insufficient data: {0}")]
  InsufficientData(String),

  /// Singular or ill-conditioned linear algebra.
  #[error("numerical error: {0}")]
  Numerical(String),

  /// Solver did not converge within its iteration budget.
  #[error("optimization error: {0}")]
  Optimization(String),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("TOML parsing error: {0}")]
  Toml(#[from] toml::de::Error),

  #[error("JSON serialization error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

pub(crate) fn invalid(msg: impl Into<String>) -> EngineError {
  EngineError::InvalidInput(msg.into())
}

pub(crate) fn insufficient(msg: impl Into<String>) -> EngineError {
  EngineError::InsufficientData(msg.into())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages_carry_kind_prefix() {
    assert_eq!(
      invalid("confidence 1.2 outside (0, 1)").to_string(),
      "invalid input: confidence 1.2 outside (0, 1)"
    );
    assert_eq!(
      insufficient("need at least 2 observations").to_string(),
      "insufficient data: need at least 2 observations"
    );
    assert_eq!(
      EngineError::Optimization("no convergence".into()).to_string(),
      "optimization error: no convergence"
    );
  }
}
