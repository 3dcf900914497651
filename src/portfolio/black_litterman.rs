//! # Black-Litterman
//!
//! $$
//! \mathbb E[R] = \left[(\tau\Sigma)^{-1} + P^\top\Omega^{-1}P\right]^{-1}
//! \left[(\tau\Sigma)^{-1}\Pi + P^\top\Omega^{-1}Q\right]
//! $$
//!
//! Bayesian update of equilibrium returns with absolute single-asset views.
//! View confidence `c` maps to uncertainty `Ω_kk = (1 - c) / c`.

use impl_new_derive::ImplNew;
use nalgebra::DMatrix;
use nalgebra::DVector;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use super::universe::AssetUniverse;
use crate::error::EngineError;
use crate::error::Result;
use crate::error::invalid;

/// Confidences above this are clamped so `Ω` stays invertible.
pub const MAX_CONFIDENCE: f64 = 1.0 - 1e-9;

/// Smallest accepted ratio between Cholesky pivots of `τΣ` (condition number ~1e14).
const MIN_PIVOT_RATIO: f64 = 1e-7;

/// Absolute view on one asset's annual return.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ImplNew)]
pub struct InvestorView {
  pub asset: String,
  /// Expected annual return.
  pub expected_return: f64,
  /// Subjective certainty in `(0, 1)`.
  pub confidence: f64,
}

/// `Ω_kk = (1 - c) / c`; `c` must lie strictly inside `(0, 1)`.
pub fn view_uncertainty(confidence: f64) -> Result<f64> {
  if !(confidence > 0.0 && confidence < 1.0) {
    return Err(invalid(format!(
      "view confidence must lie strictly in (0, 1), got {confidence}"
    )));
  }
  let c = if confidence > MAX_CONFIDENCE {
    warn!(confidence, "clamping view confidence below 1");
    MAX_CONFIDENCE
  } else {
    confidence
  };
  Ok((1.0 - c) / c)
}

/// Pick matrix `P` (`K x N`), targets `Q` and diagonal of `Ω` for a set of views.
#[derive(Clone, Debug)]
pub struct ViewSet {
  pick: DMatrix<f64>,
  targets: DVector<f64>,
  uncertainty: DVector<f64>,
}

impl ViewSet {
  /// Map views onto universe positions; one view per asset at most.
  pub fn build(universe: &AssetUniverse, views: &[InvestorView]) -> Result<Self> {
    let n = universe.len();
    let k = views.len();
    let mut pick = DMatrix::zeros(k, n);
    let mut targets = DVector::zeros(k);
    let mut uncertainty = DVector::zeros(k);
    let mut seen = vec![false; n];

    for (row, view) in views.iter().enumerate() {
      let col = universe.require(&view.asset)?;
      if seen[col] {
        return Err(invalid(format!("more than one view on asset {:?}", view.asset)));
      }
      if !view.expected_return.is_finite() {
        return Err(invalid(format!(
          "view on {:?} has a non-finite expected return",
          view.asset
        )));
      }
      seen[col] = true;
      pick[(row, col)] = 1.0;
      targets[row] = view.expected_return;
      uncertainty[row] = view_uncertainty(view.confidence)?;
    }

    Ok(Self {
      pick,
      targets,
      uncertainty,
    })
  }

  /// A view set with no views over `n` assets.
  pub fn empty(n: usize) -> Self {
    Self {
      pick: DMatrix::zeros(0, n),
      targets: DVector::zeros(0),
      uncertainty: DVector::zeros(0),
    }
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  pub fn n_assets(&self) -> usize {
    self.pick.ncols()
  }

  pub fn pick(&self) -> &DMatrix<f64> {
    &self.pick
  }

  pub fn targets(&self) -> &DVector<f64> {
    &self.targets
  }

  pub fn omega(&self) -> DMatrix<f64> {
    DMatrix::from_diagonal(&self.uncertainty)
  }

  /// Iterate `(asset index, target)` pairs.
  pub fn targets_by_asset(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
    (0..self.len()).filter_map(move |row| {
      self
        .pick
        .row(row)
        .iter()
        .position(|&p| p != 0.0)
        .map(|col| (col, self.targets[row]))
    })
  }
}

/// Prior, posterior and posterior covariance of one Black-Litterman update.
#[derive(Clone, Debug)]
pub struct BlackLittermanResult {
  pub prior: DVector<f64>,
  pub posterior: DVector<f64>,
  /// `Σ + M^{-1}` with `M = (τΣ)^{-1} + P^T Ω^{-1} P`.
  pub posterior_covariance: DMatrix<f64>,
}

/// Prior versus posterior expected return of one asset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReturnComparison {
  pub asset: String,
  pub prior_return: f64,
  pub posterior_return: f64,
  pub shift: f64,
}

impl BlackLittermanResult {
  pub fn comparison(&self, universe: &AssetUniverse) -> Vec<ReturnComparison> {
    universe
      .iter()
      .zip(self.prior.iter().zip(self.posterior.iter()))
      .map(|(asset, (&prior, &posterior))| ReturnComparison {
        asset: asset.to_string(),
        prior_return: prior,
        posterior_return: posterior,
        shift: posterior - prior,
      })
      .collect()
  }
}

/// Aggregator holding the prior uncertainty scale `τ`.
#[derive(Clone, Copy, Debug)]
pub struct BlackLitterman {
  tau: f64,
}

impl BlackLitterman {
  pub fn new(tau: f64) -> Result<Self> {
    if !(tau > 0.0 && tau.is_finite()) {
      return Err(invalid(format!("tau must be positive, got {tau}")));
    }
    Ok(Self { tau })
  }

  pub fn tau(&self) -> f64 {
    self.tau
  }

  /// Posterior expected returns. With no views this is `implied` unchanged.
  pub fn posterior(
    &self,
    implied: &DVector<f64>,
    covariance: &DMatrix<f64>,
    views: &ViewSet,
  ) -> Result<DVector<f64>> {
    self.check_shapes(implied, covariance, views)?;
    if views.is_empty() {
      return Ok(implied.clone());
    }
    let (m_chol, rhs) = self.system(implied, covariance, views)?;
    finite(m_chol.solve(&rhs))
  }

  /// Posterior returns together with the posterior covariance.
  pub fn estimate(
    &self,
    implied: &DVector<f64>,
    covariance: &DMatrix<f64>,
    views: &ViewSet,
  ) -> Result<BlackLittermanResult> {
    self.check_shapes(implied, covariance, views)?;
    let (m_chol, rhs) = self.system(implied, covariance, views)?;

    let posterior = if views.is_empty() {
      implied.clone()
    } else {
      finite(m_chol.solve(&rhs))?
    };
    let posterior_covariance = covariance + m_chol.inverse();

    Ok(BlackLittermanResult {
      prior: implied.clone(),
      posterior,
      posterior_covariance,
    })
  }

  fn check_shapes(
    &self,
    implied: &DVector<f64>,
    covariance: &DMatrix<f64>,
    views: &ViewSet,
  ) -> Result<()> {
    let n = implied.len();
    if n == 0 {
      return Err(invalid("implied returns are empty"));
    }
    if covariance.nrows() != n || covariance.ncols() != n {
      return Err(invalid(format!(
        "covariance is {}x{} for {n} implied returns",
        covariance.nrows(),
        covariance.ncols()
      )));
    }
    if views.n_assets() != n {
      return Err(invalid(format!(
        "views span {} assets, implied returns {n}",
        views.n_assets()
      )));
    }
    Ok(())
  }

  /// Cholesky factor of `M` and the right-hand side `(τΣ)^{-1}Π + P^T Ω^{-1} Q`.
  fn system(
    &self,
    implied: &DVector<f64>,
    covariance: &DMatrix<f64>,
    views: &ViewSet,
  ) -> Result<(nalgebra::Cholesky<f64, nalgebra::Dyn>, DVector<f64>)> {
    let tau_cov = covariance * self.tau;
    let chol = tau_cov.cholesky().ok_or_else(|| {
      EngineError::Numerical("τΣ is not positive definite and cannot be inverted".into())
    })?;
    let diag = chol.l_dirty().diagonal();
    if diag.min() / diag.max() < MIN_PIVOT_RATIO {
      return Err(EngineError::Numerical(
        "τΣ is too ill-conditioned to invert".into(),
      ));
    }
    let prior_precision = chol.inverse();

    let omega_inv = views.uncertainty.map(|u| 1.0 / u);
    let p = &views.pick;
    let pt = p.transpose();
    let weighted_pt = &pt * DMatrix::from_diagonal(&omega_inv);

    let m = &prior_precision + &weighted_pt * p;
    let rhs = &prior_precision * implied + &weighted_pt * &views.targets;

    let m_chol = m.cholesky().ok_or_else(|| {
      EngineError::Numerical("posterior precision matrix is not positive definite".into())
    })?;

    debug!(views = views.len(), tau = self.tau, "black-litterman system assembled");
    Ok((m_chol, rhs))
  }
}

fn finite(v: DVector<f64>) -> Result<DVector<f64>> {
  if v.iter().all(|x| x.is_finite()) {
    Ok(v)
  } else {
    Err(EngineError::Numerical(
      "posterior returns are not finite".into(),
    ))
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;
  use crate::portfolio::equilibrium::MarketWeights;
  use crate::portfolio::equilibrium::implied_returns;

  fn universe() -> AssetUniverse {
    AssetUniverse::new(["A", "B", "C"]).unwrap()
  }

  fn scenario() -> (DMatrix<f64>, DVector<f64>) {
    let cov = DMatrix::<f64>::identity(3, 3) * 0.04;
    let pi = implied_returns(2.5, &cov, &MarketWeights::equal(3).unwrap()).unwrap();
    (cov, pi)
  }

  fn single_view(confidence: f64) -> ViewSet {
    ViewSet::build(
      &universe(),
      &[InvestorView::new("A".to_string(), 0.12, confidence)],
    )
    .unwrap()
  }

  #[test]
  fn no_views_returns_prior_exactly() {
    let cov = DMatrix::from_row_slice(
      3,
      3,
      &[0.04, 0.01, 0.0, 0.01, 0.09, 0.02, 0.0, 0.02, 0.16],
    );
    let pi = DVector::from_vec(vec![0.05, 0.07, 0.02]);
    let bl = BlackLitterman::new(0.05).unwrap();

    let post = bl.posterior(&pi, &cov, &ViewSet::empty(3)).unwrap();
    assert_eq!(post, pi);

    let full = bl.estimate(&pi, &cov, &ViewSet::empty(3)).unwrap();
    assert_eq!(full.posterior, pi);
    assert_relative_eq!(full.posterior_covariance, &cov * 1.05, epsilon = 1e-12);
  }

  #[test]
  fn single_view_matches_closed_form() {
    let (cov, pi) = scenario();
    let bl = BlackLitterman::new(0.05).unwrap();
    let post = bl.posterior(&pi, &cov, &single_view(0.6)).unwrap();

    // Diagonal Σ decouples the assets: precision-weighted average on asset A.
    let prior_precision = 1.0 / (0.05 * 0.04);
    let view_precision = 0.6 / (1.0 - 0.6);
    let expected = (prior_precision * pi[0] + view_precision * 0.12) / (prior_precision + view_precision);

    assert_relative_eq!(post[0], expected, epsilon = 1e-12);
    assert!(post[0] > pi[0] && post[0] < 0.12);
    assert_relative_eq!(post[1], pi[1], epsilon = 1e-12);
    assert_relative_eq!(post[2], pi[2], epsilon = 1e-12);
  }

  #[test]
  fn posterior_approaches_view_as_confidence_grows() {
    let (cov, pi) = scenario();
    let bl = BlackLitterman::new(0.05).unwrap();
    let mut last_gap = (pi[0] - 0.12).abs();

    for c in [0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 0.99, 0.999] {
      let post = bl.posterior(&pi, &cov, &single_view(c)).unwrap();
      let gap = (post[0] - 0.12).abs();
      assert!(gap < last_gap, "confidence {c}: gap {gap} not below {last_gap}");
      last_gap = gap;
    }
  }

  #[test]
  fn correlated_views_match_direct_inversion() {
    let cov = DMatrix::from_row_slice(
      3,
      3,
      &[0.04, 0.01, 0.0, 0.01, 0.09, 0.02, 0.0, 0.02, 0.16],
    );
    let pi = DVector::from_vec(vec![0.04, 0.06, 0.08]);
    let views = ViewSet::build(
      &universe(),
      &[
        InvestorView::new("A".to_string(), 0.10, 0.6),
        InvestorView::new("C".to_string(), 0.05, 0.3),
      ],
    )
    .unwrap();
    let bl = BlackLitterman::new(0.05).unwrap();
    let post = bl.posterior(&pi, &cov, &views).unwrap();

    let a = (&cov * 0.05).try_inverse().unwrap();
    let omega_inv = views.omega().try_inverse().unwrap();
    let p = views.pick();
    let m = &a + p.transpose() * &omega_inv * p;
    let rhs = &a * &pi + p.transpose() * &omega_inv * views.targets();
    let expected = m.try_inverse().unwrap() * rhs;

    assert_relative_eq!(post, expected, epsilon = 1e-10);
  }

  #[test]
  fn confidence_outside_open_interval_is_rejected() {
    for c in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
      let res = ViewSet::build(&universe(), &[InvestorView::new("A".to_string(), 0.1, c)]);
      assert!(matches!(res, Err(EngineError::InvalidInput(_))), "confidence {c}");
    }
    assert_relative_eq!(view_uncertainty(0.6).unwrap(), 0.4 / 0.6);
    assert!(view_uncertainty(1.0 - 1e-12).unwrap() > 0.0);
  }

  #[test]
  fn malformed_view_sets_are_rejected() {
    let u = universe();
    assert!(ViewSet::build(&u, &[InvestorView::new("Z".to_string(), 0.1, 0.5)]).is_err());
    assert!(
      ViewSet::build(
        &u,
        &[
          InvestorView::new("A".to_string(), 0.1, 0.5),
          InvestorView::new("A".to_string(), 0.2, 0.5),
        ],
      )
      .is_err()
    );
  }

  #[test]
  fn singular_covariance_is_a_numerical_error() {
    let cov = DMatrix::from_row_slice(2, 2, &[0.04, 0.04, 0.04, 0.04]);
    let pi = DVector::from_vec(vec![0.05, 0.05]);
    let u = AssetUniverse::new(["A", "B"]).unwrap();
    let views = ViewSet::build(&u, &[InvestorView::new("A".to_string(), 0.1, 0.5)]).unwrap();
    let bl = BlackLitterman::new(0.05).unwrap();

    assert!(matches!(
      bl.posterior(&pi, &cov, &views),
      Err(EngineError::Numerical(_))
    ));
  }

  #[test]
  fn view_targets_follow_universe_positions() {
    let views = ViewSet::build(
      &universe(),
      &[
        InvestorView::new("C".to_string(), 0.15, 0.65),
        InvestorView::new("A".to_string(), 0.12, 0.6),
      ],
    )
    .unwrap();
    let pairs: Vec<_> = views.targets_by_asset().collect();
    assert_eq!(pairs, vec![(2, 0.15), (0, 0.12)]);
  }
}
