//! # Risk Report
//!
//! $$
//! \text{report}: \text{metric name} \mapsto \mathbb R
//! $$
//!
//! Named scalar metrics for one return series, built in a single pass and
//! immutable afterwards.

use std::collections::BTreeMap;

use serde::Serialize;

use super::metrics::RiskMetrics;
use crate::error::Result;

pub const MEAN_RETURN: &str = "mean_return";
pub const MEDIAN_RETURN: &str = "median_return";
pub const VOLATILITY_DAILY: &str = "volatility_daily";
pub const VOLATILITY_ANNUAL: &str = "volatility_annual";
pub const VARIANCE: &str = "variance";
pub const SHARPE_RATIO: &str = "sharpe_ratio";
pub const SORTINO_RATIO: &str = "sortino_ratio";
pub const CALMAR_RATIO: &str = "calmar_ratio";
pub const MAX_DRAWDOWN: &str = "max_drawdown";
pub const CAGR: &str = "cagr";
pub const RECOVERY_FACTOR: &str = "recovery_factor";
pub const VALUE_AT_RISK: &str = "value_at_risk";
pub const CONDITIONAL_VALUE_AT_RISK: &str = "conditional_value_at_risk";
pub const SKEWNESS: &str = "skewness";
pub const KURTOSIS: &str = "kurtosis";
pub const WIN_RATE: &str = "win_rate";
pub const PROFIT_FACTOR: &str = "profit_factor";
pub const PAYOFF_RATIO: &str = "payoff_ratio";
pub const INFORMATION_RATIO: &str = "information_ratio";
pub const TRACKING_ERROR: &str = "tracking_error";
pub const BETA: &str = "beta";
pub const ALPHA: &str = "alpha";

/// Mapping from metric name to value.
///
/// Serializes as a flat JSON object; infinite sentinels become `null`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RiskReport {
  metrics: BTreeMap<String, f64>,
}

impl RiskReport {
  /// Full set of metrics for `returns`, plus relative metrics when a
  /// benchmark or market series is supplied.
  pub fn comprehensive(
    metrics: &RiskMetrics,
    returns: &[f64],
    confidence: f64,
    benchmark: Option<&[f64]>,
    market: Option<&[f64]>,
  ) -> Result<Self> {
    let daily = metrics.periodic();
    let mut report = Self::default();

    report.insert(MEAN_RETURN, metrics.mean(returns)?);
    report.insert(MEDIAN_RETURN, metrics.median(returns)?);
    report.insert(VOLATILITY_DAILY, daily.volatility(returns)?);
    report.insert(VOLATILITY_ANNUAL, metrics.volatility(returns)?);
    report.insert(VARIANCE, metrics.variance(returns)?);

    report.insert(SHARPE_RATIO, metrics.sharpe_ratio(returns)?);
    report.insert(SORTINO_RATIO, metrics.sortino_ratio(returns)?);
    report.insert(CALMAR_RATIO, metrics.calmar_ratio(returns)?);

    let mdd = metrics.max_drawdown(returns)?;
    let cagr = metrics.cagr(returns)?;
    report.insert(MAX_DRAWDOWN, mdd);
    report.insert(CAGR, cagr);
    report.insert(
      RECOVERY_FACTOR,
      if mdd == 0.0 { f64::INFINITY } else { cagr / mdd.abs() },
    );

    report.insert(VALUE_AT_RISK, metrics.value_at_risk(returns, confidence)?);
    report.insert(
      CONDITIONAL_VALUE_AT_RISK,
      metrics.conditional_value_at_risk(returns, confidence)?,
    );

    report.insert(SKEWNESS, metrics.skewness(returns)?);
    report.insert(KURTOSIS, metrics.kurtosis(returns)?);

    report.insert(WIN_RATE, metrics.win_rate(returns)?);
    report.insert(PROFIT_FACTOR, metrics.profit_factor(returns)?);
    report.insert(PAYOFF_RATIO, metrics.payoff_ratio(returns)?);

    if let Some(benchmark) = benchmark {
      report.insert(INFORMATION_RATIO, metrics.information_ratio(returns, benchmark)?);
      report.insert(TRACKING_ERROR, metrics.tracking_error(returns, benchmark)?);
    }

    if let Some(market) = market {
      report.insert(BETA, metrics.beta(returns, market)?);
      report.insert(ALPHA, metrics.alpha(returns, market)?);
    }

    Ok(report)
  }

  pub(crate) fn insert(&mut self, name: &str, value: f64) {
    self.metrics.insert(name.to_string(), value);
  }

  pub fn get(&self, name: &str) -> Option<f64> {
    self.metrics.get(name).copied()
  }

  pub fn len(&self) -> usize {
    self.metrics.len()
  }

  pub fn is_empty(&self) -> bool {
    self.metrics.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self.metrics.iter().map(|(k, v)| (k.as_str(), *v))
  }

  pub fn as_map(&self) -> &BTreeMap<String, f64> {
    &self.metrics
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}
