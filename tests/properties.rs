//! Property-based checks of the allocation, blending and drawdown invariants.

use litterman_rs::backtest::plan_windows;
use litterman_rs::portfolio::BlackLitterman;
use litterman_rs::portfolio::PortfolioOptimizer;
use litterman_rs::portfolio::ViewSet;
use litterman_rs::portfolio::WeightBounds;
use litterman_rs::risk::RiskMetrics;
use nalgebra::DMatrix;
use nalgebra::DVector;
use proptest::prelude::*;

/// Expected returns plus a well-conditioned covariance `A'A / n + 0.01 I`.
fn problem_strategy() -> impl Strategy<Value = (DVector<f64>, DMatrix<f64>)> {
  (2usize..=6).prop_flat_map(|n| {
    (
      prop::collection::vec(-0.05f64..0.25, n),
      prop::collection::vec(-0.3f64..0.3, n * n),
    )
      .prop_map(move |(mu, a)| {
        let a = DMatrix::from_row_slice(n, n, &a);
        let cov = a.transpose() * &a / n as f64 + DMatrix::identity(n, n) * 0.01;
        (DVector::from_vec(mu), cov)
      })
  })
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  /// Whatever the optimizer returns is fully invested and inside the box.
  #[test]
  fn weights_are_feasible(
    (mu, cov) in problem_strategy(),
    lo_frac in 0.0f64..1.0,
    hi_frac in 0.0f64..1.0,
    rf in 0.0f64..0.05,
  ) {
    let n = mu.len() as f64;
    let min = lo_frac / n;
    let max = 1.0 / n + hi_frac * (1.0 - 1.0 / n);
    let bounds = WeightBounds::new(min, max);
    let opt = PortfolioOptimizer::new(rf, bounds);

    let p = opt
      .max_sharpe(&mu, &cov)
      .map_err(|e| TestCaseError::fail(e.to_string()))?;
    let total: f64 = p.weights.iter().sum();
    prop_assert!((total - 1.0).abs() <= 1e-6, "weights sum to {}", total);
    for w in &p.weights {
      prop_assert!(*w >= min - 1e-6 && *w <= max + 1e-6, "{} outside [{}, {}]", w, min, max);
    }
  }

  /// The projection always lands in the feasible set.
  #[test]
  fn projection_is_feasible(v in prop::collection::vec(-5.0f64..5.0, 1..10)) {
    let bounds = WeightBounds::default();
    let w = bounds.project(&v);
    prop_assert!(bounds.contains(&w, 1e-9));
  }

  /// No views leaves the prior untouched.
  #[test]
  fn empty_view_set_returns_prior((mu, cov) in problem_strategy(), tau in 0.01f64..1.0) {
    let bl = BlackLitterman::new(tau).unwrap();
    let post = bl.posterior(&mu, &cov, &ViewSet::empty(mu.len())).unwrap();
    prop_assert_eq!(post, mu);
  }

  /// Drawdown is never positive, and zero for non-negative returns.
  #[test]
  fn max_drawdown_is_non_positive(r in prop::collection::vec(-0.5f64..0.5, 1..300)) {
    let m = RiskMetrics::default();
    prop_assert!(m.max_drawdown(&r).unwrap() <= 0.0);

    let gains: Vec<f64> = r.iter().map(|x| x.abs()).collect();
    prop_assert_eq!(m.max_drawdown(&gains).unwrap(), 0.0);
  }

  /// Full-window count follows `floor((T - W) / F)`.
  #[test]
  fn window_count_matches_floor(t in 20usize..2000, w in 1usize..500, f in 1usize..200) {
    prop_assume!(w < t);
    let windows = plan_windows(t, w, f, false).unwrap();
    prop_assert_eq!(windows.len(), (t - w) / f);
  }
}
