//! # Portfolio Optimizers
//!
//! $$
//! \max_{\mathbf{w}}\ \frac{\mathbf{w}^\top R-r_f}{\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}}
//! \quad\text{s.t.}\quad \sum_i w_i=1,\ \ w_{\min}\le w_i\le w_{\max}
//! $$
//!
//! Maximum-Sharpe allocation started from `1/N`, and the equal-weight baseline.

use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

use super::solver::ConstrainedSolver;
use super::solver::ProjectedGradient;
use super::solver::SharpeObjective;
use super::solver::WeightBounds;
use super::types::PortfolioWeights;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::error::Result;
use crate::error::invalid;

/// Tolerance on the budget and box constraints of a returned allocation.
pub const WEIGHT_TOL: f64 = 1e-6;

/// Max-Sharpe optimizer over a swappable [`ConstrainedSolver`].
#[derive(Clone, Debug)]
pub struct PortfolioOptimizer<S: ConstrainedSolver = ProjectedGradient> {
  risk_free: f64,
  bounds: WeightBounds,
  solver: S,
}

impl PortfolioOptimizer<ProjectedGradient> {
  pub fn new(risk_free: f64, bounds: WeightBounds) -> Self {
    Self::with_solver(risk_free, bounds, ProjectedGradient::default())
  }

  pub fn from_config(config: &EngineConfig) -> Self {
    Self::with_solver(
      config.risk.risk_free_rate,
      WeightBounds::new(config.risk.min_weight, config.risk.max_weight),
      ProjectedGradient::from(&config.solver),
    )
  }
}

impl<S: ConstrainedSolver> PortfolioOptimizer<S> {
  pub fn with_solver(risk_free: f64, bounds: WeightBounds, solver: S) -> Self {
    Self {
      risk_free,
      bounds,
      solver,
    }
  }

  pub fn risk_free(&self) -> f64 {
    self.risk_free
  }

  pub fn bounds(&self) -> WeightBounds {
    self.bounds
  }

  pub fn solver(&self) -> &S {
    &self.solver
  }

  /// Maximum-Sharpe weights for expected returns `mu` and covariance `cov`.
  ///
  /// A solver that exhausts its iteration budget surfaces as
  /// [`EngineError::Optimization`]; the starting point is never returned in
  /// its place.
  pub fn max_sharpe(&self, mu: &DVector<f64>, cov: &DMatrix<f64>) -> Result<PortfolioWeights> {
    let n = mu.len();
    if n == 0 {
      return Err(invalid("no assets to allocate"));
    }
    if cov.nrows() != n || cov.ncols() != n {
      return Err(invalid(format!(
        "covariance is {}x{} for {n} expected returns",
        cov.nrows(),
        cov.ncols()
      )));
    }
    if mu.iter().chain(cov.iter()).any(|x| !x.is_finite()) {
      return Err(invalid("expected returns and covariance must be finite"));
    }
    self.bounds.check(n)?;

    if n == 1 {
      return PortfolioWeights::evaluate(vec![1.0], mu, cov, self.risk_free);
    }

    let objective = SharpeObjective::new(mu, cov, self.risk_free);
    let initial = vec![1.0 / n as f64; n];
    let solution = self.solver.solve(&objective, &self.bounds, &initial)?;

    if !self.bounds.contains(&solution.weights, WEIGHT_TOL) {
      return Err(EngineError::Optimization(format!(
        "{} returned weights outside the feasible set",
        self.solver.name()
      )));
    }

    debug!(
      solver = self.solver.name(),
      iterations = solution.iterations,
      sharpe = solution.objective,
      "max-sharpe solve finished"
    );

    PortfolioWeights::evaluate(solution.weights, mu, cov, self.risk_free)
  }
}

/// `1/N` weights.
pub fn equal_weights(n: usize) -> Vec<f64> {
  vec![1.0 / n as f64; n]
}

/// Equal-weight baseline evaluated under `(mu, cov)`.
pub fn equal_weight_portfolio(mu: &DVector<f64>, cov: &DMatrix<f64>, risk_free: f64) -> Result<PortfolioWeights> {
  if mu.is_empty() {
    return Err(invalid("no assets to allocate"));
  }
  PortfolioWeights::evaluate(equal_weights(mu.len()), mu, cov, risk_free)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::portfolio::solver::NelderMeadSolver;

  fn problem() -> (DVector<f64>, DMatrix<f64>) {
    let mu = DVector::from_vec(vec![0.08, 0.10, 0.12]);
    let cov = DMatrix::from_row_slice(
      3,
      3,
      &[0.04, 0.01, 0.0, 0.01, 0.09, 0.02, 0.0, 0.02, 0.16],
    );
    (mu, cov)
  }

  #[test]
  fn unconstrained_long_only_hits_tangency() {
    let (mu, cov) = problem();
    let opt = PortfolioOptimizer::new(0.02, WeightBounds::default());
    let p = opt.max_sharpe(&mu, &cov).unwrap();

    assert_abs_diff_eq!(p.total(), 1.0, epsilon = WEIGHT_TOL);
    assert_abs_diff_eq!(p.weights[0], 0.5358712, epsilon = 1e-4);
    assert_abs_diff_eq!(p.weights[1], 0.2459736, epsilon = 1e-4);
    assert_abs_diff_eq!(p.weights[2], 0.2181552, epsilon = 1e-4);
    assert_abs_diff_eq!(p.sharpe, 0.4300308, epsilon = 1e-6);
  }

  #[test]
  fn upper_bound_binds() {
    let (mu, cov) = problem();
    let opt = PortfolioOptimizer::new(0.02, WeightBounds::new(0.1, 0.5));
    let p = opt.max_sharpe(&mu, &cov).unwrap();

    assert!(WeightBounds::new(0.1, 0.5).contains(&p.weights, WEIGHT_TOL));
    assert_abs_diff_eq!(p.weights[0], 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(p.weights[1], 0.27097, epsilon = 1e-3);
  }

  #[test]
  fn swapping_backend_keeps_the_answer() {
    let (mu, cov) = problem();
    let pg = PortfolioOptimizer::new(0.02, WeightBounds::default())
      .max_sharpe(&mu, &cov)
      .unwrap();
    let nm = PortfolioOptimizer::with_solver(0.02, WeightBounds::default(), NelderMeadSolver::default())
      .max_sharpe(&mu, &cov)
      .unwrap();

    assert_abs_diff_eq!(nm.sharpe, pg.sharpe, epsilon = 1e-5);
  }

  #[test]
  fn infeasible_bounds_and_shapes_are_rejected() {
    let (mu, cov) = problem();
    let tight = PortfolioOptimizer::new(0.02, WeightBounds::new(0.0, 0.2));
    assert!(matches!(tight.max_sharpe(&mu, &cov), Err(EngineError::InvalidInput(_))));

    let opt = PortfolioOptimizer::new(0.02, WeightBounds::default());
    let short = DVector::from_vec(vec![0.1, 0.2]);
    assert!(matches!(opt.max_sharpe(&short, &cov), Err(EngineError::InvalidInput(_))));
  }

  #[test]
  fn riskless_universe_is_an_optimization_error() {
    let mu = DVector::from_vec(vec![0.05, 0.06]);
    let cov = DMatrix::zeros(2, 2);
    let opt = PortfolioOptimizer::new(0.0, WeightBounds::default());
    assert!(matches!(opt.max_sharpe(&mu, &cov), Err(EngineError::Optimization(_))));
  }

  #[test]
  fn single_asset_takes_everything() {
    let mu = DVector::from_vec(vec![0.07]);
    let cov = DMatrix::from_element(1, 1, 0.04);
    let p = PortfolioOptimizer::new(0.02, WeightBounds::default())
      .max_sharpe(&mu, &cov)
      .unwrap();
    assert_eq!(p.weights, vec![1.0]);
    assert_abs_diff_eq!(p.sharpe, 0.25, epsilon = 1e-12);
  }

  #[test]
  fn equal_weight_baseline() {
    let (mu, cov) = problem();
    let p = equal_weight_portfolio(&mu, &cov, 0.02).unwrap();
    assert_abs_diff_eq!(p.expected_return, 0.1, epsilon = 1e-12);
    assert!(p.weights.iter().all(|w| (*w - 1.0 / 3.0).abs() < 1e-15));
  }
}
