//! # Random Frontier
//!
//! $$
//! w = \frac{u}{\mathbf 1^\top u},\quad u_i \sim \mathcal U(0,1)
//! $$
//!
//! Long-only random portfolios for plotting the feasible risk/return cloud.
//! Each call owns its generator, so equal seeds give equal clouds.

use nalgebra::DMatrix;
use nalgebra::DVector;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use super::types::PortfolioWeights;
use crate::error::Result;
use crate::error::invalid;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrontierPoint {
  pub expected_return: f64,
  pub volatility: f64,
  pub sharpe: f64,
  pub weights: Vec<f64>,
}

impl From<PortfolioWeights> for FrontierPoint {
  fn from(p: PortfolioWeights) -> Self {
    Self {
      expected_return: p.expected_return,
      volatility: p.volatility,
      sharpe: p.sharpe,
      weights: p.weights,
    }
  }
}

/// Draw `count` random long-only portfolios from a generator seeded with `seed`.
pub fn sample_portfolios(
  mu: &DVector<f64>,
  cov: &DMatrix<f64>,
  risk_free: f64,
  count: usize,
  seed: u64,
) -> Result<Vec<FrontierPoint>> {
  let n = mu.len();
  if n == 0 {
    return Err(invalid("no assets to sample"));
  }

  let mut rng = StdRng::seed_from_u64(seed);
  let mut points = Vec::with_capacity(count);
  while points.len() < count {
    let raw: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
      continue;
    }
    let weights = raw.iter().map(|u| u / total).collect();
    points.push(PortfolioWeights::evaluate(weights, mu, cov, risk_free)?.into());
  }

  Ok(points)
}

/// Point with the highest Sharpe ratio in a sampled cloud.
pub fn best_sharpe(points: &[FrontierPoint]) -> Option<&FrontierPoint> {
  points.iter().max_by(|a, b| a.sharpe.total_cmp(&b.sharpe))
}
