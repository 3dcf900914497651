//! # Risk Metrics
//!
//! $$
//! S=\frac{\overline{r-r_f}}{\sigma(r-r_f)}\sqrt{P},\qquad
//! \mathrm{MDD}=\min_t \frac{V_t-\max_{s\le t}V_s}{\max_{s\le t}V_s},\qquad
//! \mathrm{VaR}_c=\bar r-\Phi^{-1}(c)\,\sigma
//! $$
//!
//! Pure statistics over a realized return series. Nothing here mutates its input.

use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;
use statrs::statistics::Statistics;

use crate::config::RiskConfig;
use crate::error::EngineError;
use crate::error::Result;
use crate::error::insufficient;
use crate::error::invalid;

/// Spread at or below which a standard deviation counts as zero, relative to `max(1, |mean|)`.
const ZERO_SPREAD: f64 = 1e-14;

/// Risk and performance statistics for periodic returns.
///
/// With `annualize` set, returns are read as periodic (e.g. daily), the
/// risk-free rate is spread over `periods_per_year` and ratios are scaled to
/// annual units. Without it every quantity stays in per-period units and the
/// risk-free rate is subtracted as given.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskMetrics {
  pub risk_free_rate: f64,
  pub periods_per_year: usize,
  pub annualize: bool,
}

impl Default for RiskMetrics {
  fn default() -> Self {
    Self::from(&RiskConfig::default())
  }
}

impl From<&RiskConfig> for RiskMetrics {
  fn from(cfg: &RiskConfig) -> Self {
    Self {
      risk_free_rate: cfg.risk_free_rate,
      periods_per_year: cfg.periods_per_year,
      annualize: true,
    }
  }
}

impl RiskMetrics {
  pub fn new(risk_free_rate: f64, periods_per_year: usize) -> Self {
    Self {
      risk_free_rate,
      periods_per_year,
      annualize: true,
    }
  }

  /// Same settings, per-period units.
  pub fn periodic(self) -> Self {
    Self {
      annualize: false,
      ..self
    }
  }

  fn periods(&self) -> f64 {
    self.periods_per_year.max(1) as f64
  }

  /// Risk-free rate for one period.
  pub fn period_risk_free(&self) -> f64 {
    if self.annualize {
      self.risk_free_rate / self.periods()
    } else {
      self.risk_free_rate
    }
  }

  fn ratio_scale(&self) -> f64 {
    if self.annualize { self.periods().sqrt() } else { 1.0 }
  }

  pub fn mean(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    Ok(returns.iter().mean())
  }

  pub fn median(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    Ok(quantile_sorted(&sorted(returns), 0.5))
  }

  /// Population standard deviation, scaled by `sqrt(P)` when annualizing.
  pub fn volatility(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    Ok(returns.iter().population_std_dev() * self.ratio_scale())
  }

  /// Population variance, scaled by `P` when annualizing.
  pub fn variance(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    let scale = if self.annualize { self.periods() } else { 1.0 };
    Ok(returns.iter().population_variance() * scale)
  }

  /// Mean excess return over its standard deviation; `0` when the deviation is zero.
  pub fn sharpe_ratio(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    let rf = self.period_risk_free();
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let mean = excess.iter().mean();
    let sd = excess.iter().population_std_dev();
    if is_zero_spread(sd, mean) {
      return Ok(0.0);
    }
    Ok(mean / sd * self.ratio_scale())
  }

  /// Mean excess return over the deviation of negative excess returns.
  ///
  /// `+∞` when no excess return is negative. When the downside deviation is
  /// zero (a single loss, or identical losses) the ratio is `+∞` for a
  /// positive mean excess return and `0` otherwise.
  pub fn sortino_ratio(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    let rf = self.period_risk_free();
    let excess: Vec<f64> = returns.iter().map(|r| r - rf).collect();
    let downside: Vec<f64> = excess.iter().copied().filter(|e| *e < 0.0).collect();
    if downside.is_empty() {
      return Ok(f64::INFINITY);
    }
    let mean = excess.iter().mean();
    let sd = downside.iter().population_std_dev();
    if is_zero_spread(sd, downside.iter().mean()) {
      return Ok(if mean > 0.0 { f64::INFINITY } else { 0.0 });
    }
    Ok(mean / sd * self.ratio_scale())
  }

  /// Largest peak-to-trough loss of the compounded value path starting at `1`. Always `<= 0`.
  pub fn max_drawdown(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    Ok(max_drawdown(returns))
  }

  /// `V_T^{P/T} - 1` for the compounded value `V_T`.
  pub fn cagr(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    let final_value = compounded(returns);
    if final_value <= 0.0 {
      return Ok(-1.0);
    }
    Ok(final_value.powf(self.periods() / returns.len() as f64) - 1.0)
  }

  /// `CAGR / |MDD|`; `+∞` without drawdown.
  pub fn calmar_ratio(&self, returns: &[f64]) -> Result<f64> {
    let mdd = self.max_drawdown(returns)?;
    if mdd == 0.0 {
      return Ok(f64::INFINITY);
    }
    Ok(self.cagr(returns)? / mdd.abs())
  }

  /// Parametric value-at-risk `mean - Φ⁻¹(c)·σ`, a lower-tail return threshold.
  pub fn value_at_risk(&self, returns: &[f64], confidence: f64) -> Result<f64> {
    check(returns)?;
    let z = normal_quantile(confidence)?;
    Ok(returns.iter().mean() - z * returns.iter().population_std_dev())
  }

  /// Mean of returns at or below the parametric VaR; the VaR itself if none are.
  pub fn conditional_value_at_risk(&self, returns: &[f64], confidence: f64) -> Result<f64> {
    let var = self.value_at_risk(returns, confidence)?;
    Ok(tail_mean(returns, var))
  }

  /// Empirical `(1 - c)` quantile with linear interpolation.
  pub fn historical_var(&self, returns: &[f64], confidence: f64) -> Result<f64> {
    check(returns)?;
    check_confidence(confidence)?;
    Ok(quantile_sorted(&sorted(returns), 1.0 - confidence))
  }

  /// Mean of returns at or below the historical VaR.
  pub fn historical_cvar(&self, returns: &[f64], confidence: f64) -> Result<f64> {
    let var = self.historical_var(returns, confidence)?;
    Ok(tail_mean(returns, var))
  }

  /// Standard deviation of active returns against `benchmark`.
  pub fn tracking_error(&self, returns: &[f64], benchmark: &[f64]) -> Result<f64> {
    let active = active_returns(returns, benchmark)?;
    Ok(active.iter().population_std_dev())
  }

  /// Mean active return over tracking error; `0` when tracking error is zero.
  pub fn information_ratio(&self, returns: &[f64], benchmark: &[f64]) -> Result<f64> {
    let active = active_returns(returns, benchmark)?;
    let mean = active.iter().mean();
    let te = active.iter().population_std_dev();
    if is_zero_spread(te, mean) {
      return Ok(0.0);
    }
    Ok(mean / te)
  }

  /// `Cov(R, R_m) / Var(R_m)`; `0` when the market does not move.
  pub fn beta(&self, returns: &[f64], market: &[f64]) -> Result<f64> {
    check(returns)?;
    check_aligned(returns, market)?;
    let market_sd = market.iter().population_std_dev();
    if is_zero_spread(market_sd, market.iter().mean()) {
      return Ok(0.0);
    }
    let cov = returns.iter().population_covariance(market.iter());
    Ok(cov / (market_sd * market_sd))
  }

  /// Jensen's alpha `mean(R) - [r_f + β(mean(R_m) - r_f)]`, annualized by `P` when annualizing.
  pub fn alpha(&self, returns: &[f64], market: &[f64]) -> Result<f64> {
    let beta = self.beta(returns, market)?;
    let rf = self.period_risk_free();
    let alpha = returns.iter().mean() - (rf + beta * (market.iter().mean() - rf));
    Ok(if self.annualize { alpha * self.periods() } else { alpha })
  }

  /// Biased sample skewness; `0` for a constant series.
  pub fn skewness(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    let (m2, m3, _) = central_moments(returns);
    if is_zero_spread(m2.sqrt(), returns.iter().mean()) {
      return Ok(0.0);
    }
    Ok(m3 / m2.powf(1.5))
  }

  /// Biased excess kurtosis; `0` for a constant series.
  pub fn kurtosis(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    let (m2, _, m4) = central_moments(returns);
    if is_zero_spread(m2.sqrt(), returns.iter().mean()) {
      return Ok(0.0);
    }
    Ok(m4 / (m2 * m2) - 3.0)
  }

  /// Share of strictly positive returns.
  pub fn win_rate(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    Ok(returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64)
  }

  /// Sum of gains over the absolute sum of losses.
  ///
  /// `+∞` when there are gains but no losses, `0` when there are neither.
  pub fn profit_factor(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    let gains: f64 = returns.iter().filter(|r| **r > 0.0).sum();
    let losses: f64 = returns.iter().filter(|r| **r < 0.0).sum();
    if losses == 0.0 {
      return Ok(if gains > 0.0 { f64::INFINITY } else { 0.0 });
    }
    Ok(gains / losses.abs())
  }

  /// Average gain over absolute average loss; `+∞` without losses.
  pub fn payoff_ratio(&self, returns: &[f64]) -> Result<f64> {
    check(returns)?;
    let gains: Vec<f64> = returns.iter().copied().filter(|r| *r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if losses.is_empty() {
      return Ok(f64::INFINITY);
    }
    let avg_gain = if gains.is_empty() { 0.0 } else { gains.iter().mean() };
    Ok(avg_gain / losses.iter().mean().abs())
  }
}

pub(crate) fn check(returns: &[f64]) -> Result<()> {
  if returns.is_empty() {
    return Err(insufficient("return series is empty"));
  }
  if returns.iter().any(|r| !r.is_finite()) {
    return Err(invalid("return series contains non-finite values"));
  }
  Ok(())
}

fn check_aligned(returns: &[f64], other: &[f64]) -> Result<()> {
  if returns.len() != other.len() {
    return Err(invalid(format!(
      "series lengths differ: {} vs {}",
      returns.len(),
      other.len()
    )));
  }
  check(other)
}

fn check_confidence(confidence: f64) -> Result<()> {
  if !(confidence > 0.0 && confidence < 1.0) {
    return Err(invalid(format!("confidence {confidence} outside (0, 1)")));
  }
  Ok(())
}

fn active_returns(returns: &[f64], benchmark: &[f64]) -> Result<Vec<f64>> {
  check(returns)?;
  check_aligned(returns, benchmark)?;
  Ok(returns.iter().zip(benchmark).map(|(r, b)| r - b).collect())
}

fn is_zero_spread(sd: f64, mean: f64) -> bool {
  sd <= ZERO_SPREAD * mean.abs().max(1.0)
}

fn normal_quantile(confidence: f64) -> Result<f64> {
  check_confidence(confidence)?;
  let normal = Normal::new(0.0, 1.0).map_err(|e| EngineError::Numerical(e.to_string()))?;
  Ok(normal.inverse_cdf(confidence))
}

fn tail_mean(returns: &[f64], threshold: f64) -> f64 {
  let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= threshold).collect();
  if tail.is_empty() {
    threshold
  } else {
    tail.iter().mean()
  }
}

/// Biased (divide-by-`n`) central moments `(m2, m3, m4)`; skewness is
/// `m3 / m2^{3/2}` and excess kurtosis `m4 / m2^2 - 3`.
fn central_moments(returns: &[f64]) -> (f64, f64, f64) {
  let mean = returns.iter().mean();
  let n = returns.len() as f64;
  let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
  for &r in returns {
    let d = r - mean;
    let d2 = d * d;
    m2 += d2;
    m3 += d2 * d;
    m4 += d2 * d2;
  }
  (m2 / n, m3 / n, m4 / n)
}

fn compounded(returns: &[f64]) -> f64 {
  returns.iter().fold(1.0, |v, r| v * (1.0 + r))
}

pub(crate) fn max_drawdown(returns: &[f64]) -> f64 {
  let mut value = 1.0_f64;
  let mut peak = 1.0_f64;
  let mut worst = 0.0_f64;
  for r in returns {
    value *= 1.0 + r;
    peak = peak.max(value);
    if peak > 0.0 {
      worst = worst.min((value - peak) / peak);
    }
  }
  worst
}

fn sorted(returns: &[f64]) -> Vec<f64> {
  let mut xs = returns.to_vec();
  xs.sort_by(f64::total_cmp);
  xs
}

fn quantile_sorted(sorted: &[f64], u: f64) -> f64 {
  if sorted.len() == 1 {
    return sorted[0];
  }
  let pos = u.clamp(0.0, 1.0) * (sorted.len() as f64 - 1.0);
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  let w = pos - lo as f64;
  sorted[lo] * (1.0 - w) + sorted[hi] * w
}
