//! # Constrained Solvers
//!
//! $$
//! \max_{w}\ f(w)\quad\text{s.t.}\quad \mathbf 1^\top w = 1,\ \ l \le w_i \le u
//! $$
//!
//! Backends behind [`ConstrainedSolver`] share the feasible set
//! [`WeightBounds`] and its Euclidean projection, so the rest of the pipeline
//! does not depend on which one runs.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::solver::neldermead::NelderMead;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

use crate::config::SolverConfig;
use crate::config::check_bounds;
use crate::error::EngineError;
use crate::error::Result;

/// Portfolio variance below which the ratio objective is treated as undefined.
const VARIANCE_FLOOR: f64 = 1e-20;

/// Fully invested weights with per-asset box bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightBounds {
  pub min: f64,
  pub max: f64,
}

impl Default for WeightBounds {
  fn default() -> Self {
    Self { min: 0.0, max: 1.0 }
  }
}

impl WeightBounds {
  pub fn new(min: f64, max: f64) -> Self {
    Self { min, max }
  }

  /// Whether `n` assets can be fully invested inside the bounds.
  pub fn check(&self, n: usize) -> Result<()> {
    check_bounds(self.min, self.max, n)
  }

  pub fn contains(&self, w: &[f64], tol: f64) -> bool {
    let sum: f64 = w.iter().sum();
    (sum - 1.0).abs() <= tol && w.iter().all(|&x| x >= self.min - tol && x <= self.max + tol)
  }

  /// Euclidean projection onto `{w : sum(w) = 1, min <= w_i <= max}`.
  ///
  /// The projection is `clamp(v_i - t)` for the shift `t` that restores the
  /// budget, found by bisection since the clamped sum is monotone in `t`.
  pub fn project(&self, v: &[f64]) -> Vec<f64> {
    let lo_v = v.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi_v = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut a = lo_v - self.max;
    let mut b = hi_v - self.min;

    for _ in 0..200 {
      let t = 0.5 * (a + b);
      let s: f64 = v.iter().map(|&x| (x - t).clamp(self.min, self.max)).sum();
      if s > 1.0 {
        a = t;
      } else {
        b = t;
      }
      if b - a <= 1e-16 * (1.0 + a.abs()) {
        break;
      }
    }

    let t = 0.5 * (a + b);
    v.iter().map(|&x| (x - t).clamp(self.min, self.max)).collect()
  }
}

/// Smooth objective to maximize. `None` marks points where it is undefined.
pub trait Objective: Sync {
  fn value(&self, w: &[f64]) -> Option<f64>;
  fn gradient(&self, w: &[f64]) -> Option<Vec<f64>>;
}

/// Sharpe ratio `(w'R - r_f) / sqrt(w'Σw)`.
pub struct SharpeObjective<'a> {
  mu: &'a DVector<f64>,
  cov: &'a DMatrix<f64>,
  risk_free: f64,
}

impl<'a> SharpeObjective<'a> {
  pub fn new(mu: &'a DVector<f64>, cov: &'a DMatrix<f64>, risk_free: f64) -> Self {
    Self { mu, cov, risk_free }
  }

  fn moments(&self, w: &[f64]) -> Option<(f64, DVector<f64>, f64)> {
    let w = DVector::from_column_slice(w);
    let sigma_w = self.cov * &w;
    let var = w.dot(&sigma_w);
    if !var.is_finite() || var <= VARIANCE_FLOOR {
      return None;
    }
    Some((w.dot(self.mu) - self.risk_free, sigma_w, var.sqrt()))
  }
}

impl Objective for SharpeObjective<'_> {
  fn value(&self, w: &[f64]) -> Option<f64> {
    self.moments(w).map(|(excess, _, sd)| excess / sd)
  }

  fn gradient(&self, w: &[f64]) -> Option<Vec<f64>> {
    let (excess, sigma_w, sd) = self.moments(w)?;
    let sd3 = sd * sd * sd;
    Some(
      self
        .mu
        .iter()
        .zip(sigma_w.iter())
        .map(|(&m, &s)| m / sd - excess * s / sd3)
        .collect(),
    )
  }
}

/// Local optimum returned by a solver.
#[derive(Clone, Debug)]
pub struct Solution {
  pub weights: Vec<f64>,
  pub objective: f64,
  pub iterations: u64,
}

/// `solve(objective, bounds, initial_guess) -> weights` over the fully invested box.
pub trait ConstrainedSolver: Sync {
  fn name(&self) -> &str;

  fn solve(&self, objective: &dyn Objective, bounds: &WeightBounds, initial: &[f64]) -> Result<Solution>;
}

/// Projected gradient ascent with Armijo backtracking.
#[derive(Clone, Debug)]
pub struct ProjectedGradient {
  pub max_iters: u64,
  /// Relative tolerance on successive objective values.
  pub ftol: f64,
  /// Largest weight change still counted as converged.
  pub xtol: f64,
}

impl Default for ProjectedGradient {
  fn default() -> Self {
    Self::from(&SolverConfig::default())
  }
}

impl From<&SolverConfig> for ProjectedGradient {
  fn from(cfg: &SolverConfig) -> Self {
    Self {
      max_iters: cfg.max_iters,
      ftol: cfg.ftol,
      xtol: 1e-6,
    }
  }
}

impl ConstrainedSolver for ProjectedGradient {
  fn name(&self) -> &str {
    "projected-gradient"
  }

  fn solve(&self, objective: &dyn Objective, bounds: &WeightBounds, initial: &[f64]) -> Result<Solution> {
    bounds.check(initial.len())?;

    let mut w = bounds.project(initial);
    let mut f = objective.value(&w).ok_or_else(|| {
      EngineError::Optimization("objective is undefined at the initial guess".into())
    })?;
    let mut step = 1.0_f64;

    for iter in 0..self.max_iters {
      let g = objective.gradient(&w).ok_or_else(|| {
        EngineError::Optimization(format!("gradient undefined at iteration {iter}"))
      })?;

      step = (step * 2.0).min(1e6);
      let (candidate, f_candidate) = loop {
        let trial: Vec<f64> = w.iter().zip(&g).map(|(wi, gi)| wi + step * gi).collect();
        let candidate = bounds.project(&trial);
        // Zero-volatility candidates are rejected like any other failed step.
        if let Some(fc) = objective.value(&candidate) {
          let ascent: f64 = g.iter().zip(candidate.iter().zip(&w)).map(|(gi, (c, x))| gi * (c - x)).sum();
          if fc >= f + 1e-4 * ascent {
            break (candidate, fc);
          }
        }
        step *= 0.5;
        if step < 1e-14 {
          debug!(iter, objective = f, "no ascent direction left");
          return Ok(Solution {
            weights: w,
            objective: f,
            iterations: iter,
          });
        }
      };

      let df = (f_candidate - f).abs();
      let dx = candidate
        .iter()
        .zip(&w)
        .map(|(c, x)| (c - x).abs())
        .fold(0.0, f64::max);
      w = candidate;
      f = f_candidate;

      if df <= self.ftol * (1.0 + f.abs()) && dx <= self.xtol {
        debug!(iterations = iter + 1, objective = f, "projected gradient converged");
        return Ok(Solution {
          weights: w,
          objective: f,
          iterations: iter + 1,
        });
      }
    }

    Err(EngineError::Optimization(format!(
      "projected gradient did not converge within {} iterations",
      self.max_iters
    )))
  }
}

/// Derivative-free backend: Nelder-Mead on unconstrained parameters mapped
/// through the feasible-set projection.
#[derive(Clone, Debug)]
pub struct NelderMeadSolver {
  pub max_iters: u64,
  /// Standard deviation of simplex costs at which the search stops.
  pub sd_tolerance: f64,
}

impl Default for NelderMeadSolver {
  fn default() -> Self {
    Self::from(&SolverConfig::default())
  }
}

impl From<&SolverConfig> for NelderMeadSolver {
  fn from(cfg: &SolverConfig) -> Self {
    Self {
      max_iters: cfg.max_iters,
      sd_tolerance: cfg.ftol,
    }
  }
}

struct ProjectedCost<'a> {
  objective: &'a dyn Objective,
  bounds: WeightBounds,
}

impl CostFunction for ProjectedCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let w = self.bounds.project(x);
    Ok(match self.objective.value(&w) {
      Some(v) => -v,
      None => 1e10,
    })
  }
}

impl ConstrainedSolver for NelderMeadSolver {
  fn name(&self) -> &str {
    "nelder-mead"
  }

  fn solve(&self, objective: &dyn Objective, bounds: &WeightBounds, initial: &[f64]) -> Result<Solution> {
    let n = initial.len();
    bounds.check(n)?;

    let x0 = bounds.project(initial);
    if objective.value(&x0).is_none() {
      return Err(EngineError::Optimization(
        "objective is undefined at the initial guess".into(),
      ));
    }

    let edge = (bounds.max - bounds.min).min(1.0) * 0.1;
    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(x0.clone());
    for i in 0..n {
      let mut point = x0.clone();
      point[i] += edge;
      simplex.push(point);
    }

    let solver = NelderMead::new(simplex)
      .with_sd_tolerance(self.sd_tolerance)
      .map_err(|e| EngineError::Optimization(e.to_string()))?;
    let cost = ProjectedCost {
      objective,
      bounds: *bounds,
    };
    let res = Executor::new(cost, solver)
      .configure(|state| state.max_iters(self.max_iters))
      .run()
      .map_err(|e| EngineError::Optimization(e.to_string()))?;

    let iterations = res.state.get_iter();
    if matches!(
      res.state.get_termination_reason(),
      Some(TerminationReason::MaxItersReached)
    ) {
      return Err(EngineError::Optimization(format!(
        "nelder-mead did not converge within {} iterations",
        self.max_iters
      )));
    }

    let best = res
      .state
      .best_param
      .ok_or_else(|| EngineError::Optimization("nelder-mead returned no parameters".into()))?;
    let weights = bounds.project(&best);
    let value = objective.value(&weights).ok_or_else(|| {
      EngineError::Optimization("objective is undefined at the reported optimum".into())
    })?;

    debug!(iterations, objective = value, "nelder-mead converged");
    Ok(Solution {
      weights,
      objective: value,
      iterations,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn problem() -> (DVector<f64>, DMatrix<f64>) {
    let mu = DVector::from_vec(vec![0.08, 0.10, 0.12]);
    let cov = DMatrix::from_row_slice(
      3,
      3,
      &[0.04, 0.01, 0.0, 0.01, 0.09, 0.02, 0.0, 0.02, 0.16],
    );
    (mu, cov)
  }

  fn tangency(mu: &DVector<f64>, cov: &DMatrix<f64>, rf: f64) -> Vec<f64> {
    let excess = mu.map(|m| m - rf);
    let raw = cov.clone().try_inverse().unwrap() * excess;
    let total = raw.sum();
    raw.iter().map(|x| x / total).collect()
  }

  #[test]
  fn projection_lands_in_feasible_set() {
    let bounds = WeightBounds::new(0.0, 1.0);
    let w = bounds.project(&[0.9, 0.5, -0.3]);
    assert!(bounds.contains(&w, 1e-12));
    assert_abs_diff_eq!(w[0], 0.7, epsilon = 1e-12);
    assert_abs_diff_eq!(w[1], 0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(w[2], 0.0, epsilon = 1e-12);

    let capped = WeightBounds::new(0.1, 0.4);
    let w = capped.project(&[5.0, 0.0, 0.0]);
    assert!(capped.contains(&w, 1e-12));
    assert_abs_diff_eq!(w[0], 0.4, epsilon = 1e-12);

    let feasible = [0.2, 0.3, 0.5];
    let w = bounds.project(&feasible);
    for (a, b) in w.iter().zip(feasible) {
      assert_abs_diff_eq!(*a, b, epsilon = 1e-12);
    }
  }

  #[test]
  fn sharpe_gradient_matches_finite_differences() {
    let (mu, cov) = problem();
    let obj = SharpeObjective::new(&mu, &cov, 0.02);
    let w = [0.5, 0.3, 0.2];
    let g = obj.gradient(&w).unwrap();
    let h = 1e-6;
    for i in 0..3 {
      let mut up = w;
      let mut dn = w;
      up[i] += h;
      dn[i] -= h;
      let fd = (obj.value(&up).unwrap() - obj.value(&dn).unwrap()) / (2.0 * h);
      assert_abs_diff_eq!(g[i], fd, epsilon = 1e-6);
    }
  }

  #[test]
  fn zero_variance_is_undefined_not_a_panic() {
    let mu = DVector::from_vec(vec![0.05, 0.05]);
    let cov = DMatrix::zeros(2, 2);
    let obj = SharpeObjective::new(&mu, &cov, 0.0);
    assert!(obj.value(&[0.5, 0.5]).is_none());
    assert!(obj.gradient(&[0.5, 0.5]).is_none());

    let res = ProjectedGradient::default().solve(&obj, &WeightBounds::default(), &[0.5, 0.5]);
    assert!(matches!(res, Err(EngineError::Optimization(_))));
  }

  #[test]
  fn projected_gradient_finds_tangency_portfolio() {
    let (mu, cov) = problem();
    let obj = SharpeObjective::new(&mu, &cov, 0.02);
    let sol = ProjectedGradient::default()
      .solve(&obj, &WeightBounds::default(), &[1.0 / 3.0; 3])
      .unwrap();

    for (w, t) in sol.weights.iter().zip(tangency(&mu, &cov, 0.02)) {
      assert_abs_diff_eq!(*w, t, epsilon = 1e-4);
    }
  }

  #[test]
  fn nelder_mead_agrees_with_projected_gradient() {
    let (mu, cov) = problem();
    let obj = SharpeObjective::new(&mu, &cov, 0.02);
    let pg = ProjectedGradient::default()
      .solve(&obj, &WeightBounds::default(), &[1.0 / 3.0; 3])
      .unwrap();
    let nm = NelderMeadSolver::default()
      .solve(&obj, &WeightBounds::default(), &[1.0 / 3.0; 3])
      .unwrap();

    assert!(WeightBounds::default().contains(&nm.weights, 1e-9));
    for (a, b) in nm.weights.iter().zip(&pg.weights) {
      assert_abs_diff_eq!(*a, *b, epsilon = 1e-3);
    }
  }

  #[test]
  fn exhausted_budget_is_an_error() {
    let (mu, cov) = problem();
    let obj = SharpeObjective::new(&mu, &cov, 0.02);
    let solver = ProjectedGradient {
      max_iters: 1,
      ftol: 1e-15,
      xtol: 1e-15,
    };
    let res = solver.solve(&obj, &WeightBounds::default(), &[1.0 / 3.0; 3]);
    assert!(matches!(res, Err(EngineError::Optimization(_))));
  }
}
