//! # Rolling Backtest
//!
//! $$
//! r^{\text{oos}}_k = P\sum_i w^{(k)}_i\,\bar r_{i,\text{test}_k}
//! $$
//!
//! Re-fit on each training span, allocate per model, score on the following
//! test span. One annualized return per model and rebalance period.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use nalgebra::DVector;
use ndarray::Axis;
use rayon::prelude::*;
use serde::Serialize;
use statrs::statistics::Statistics;

use super::events::BacktestEvent;
use super::events::BacktestObserver;
use super::events::BacktestPhase;
use super::events::TracingObserver;
use super::window::BacktestWindow;
use super::window::plan_windows;
use crate::config::EngineConfig;
use crate::config::ViewBlending;
use crate::error::EngineError;
use crate::error::Result;
use crate::error::invalid;
use crate::portfolio::AllocationModel;
use crate::portfolio::InvestorView;
use crate::portfolio::MarketWeights;
use crate::portfolio::PortfolioEngine;
use crate::portfolio::ReturnSeries;
use crate::portfolio::ReturnStatistics;
use crate::portfolio::ViewSet;
use crate::portfolio::optimizers::equal_weights;
use crate::portfolio::solver::ConstrainedSolver;
use crate::portfolio::solver::ProjectedGradient;
use crate::risk::RiskMetrics;

/// Performance of one model against the equal-weight baseline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelativePerformance {
  pub information_ratio: f64,
  pub active_return: f64,
  pub tracking_error: f64,
}

/// Summary of a model's out-of-sample period returns.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelSummary {
  pub mean: f64,
  pub std_dev: f64,
  /// Fraction of periods with a positive return.
  pub win_rate: f64,
  pub best: f64,
  pub worst: f64,
  /// Sharpe ratio of the period returns read as daily rates.
  pub sharpe: f64,
  /// Absent for the baseline itself.
  pub versus_equal_weight: Option<RelativePerformance>,
}

/// Out-of-sample results keyed by model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BacktestReport {
  /// Last test date of each period.
  pub dates: Vec<NaiveDate>,
  pub windows: Vec<BacktestWindow>,
  /// One annualized return per period.
  pub returns: BTreeMap<AllocationModel, Vec<f64>>,
  /// Weights held during each period.
  pub weights: BTreeMap<AllocationModel, Vec<Vec<f64>>>,
  /// Empty when the series leaves no test period.
  pub summaries: BTreeMap<AllocationModel, ModelSummary>,
}

impl BacktestReport {
  pub fn periods(&self) -> usize {
    self.dates.len()
  }

  pub fn returns_for(&self, model: AllocationModel) -> &[f64] {
    self.returns.get(&model).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn summary(&self, model: AllocationModel) -> Option<&ModelSummary> {
    self.summaries.get(&model)
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}

struct WindowOutcome {
  end_date: NaiveDate,
  allocations: Vec<(AllocationModel, f64, Vec<f64>)>,
}

/// Walk-forward evaluation of the mean-variance, Black-Litterman and
/// equal-weight allocations.
#[derive(Clone, Debug)]
pub struct RollingBacktester<S: ConstrainedSolver = ProjectedGradient> {
  engine: PortfolioEngine<S>,
  market: Option<MarketWeights>,
}

impl RollingBacktester<ProjectedGradient> {
  pub fn new(config: EngineConfig) -> Result<Self> {
    Ok(Self::with_engine(PortfolioEngine::new(config)?))
  }
}

impl<S: ConstrainedSolver> RollingBacktester<S> {
  pub fn with_engine(engine: PortfolioEngine<S>) -> Self {
    Self { engine, market: None }
  }

  /// Market weights for the equilibrium prior; equal weights otherwise.
  pub fn with_market_weights(mut self, market: MarketWeights) -> Self {
    self.market = Some(market);
    self
  }

  pub fn engine(&self) -> &PortfolioEngine<S> {
    &self.engine
  }

  /// Run with progress forwarded to `tracing`.
  pub fn run(&self, series: &ReturnSeries, views: &[InvestorView]) -> Result<BacktestReport> {
    self.run_with_observer(series, views, &TracingObserver)
  }

  pub fn run_with_observer(
    &self,
    series: &ReturnSeries,
    views: &[InvestorView],
    observer: &dyn BacktestObserver,
  ) -> Result<BacktestReport> {
    let cfg = &self.engine.config().backtest;
    let windows = plan_windows(
      series.len(),
      cfg.window_size,
      cfg.rebalance_frequency,
      cfg.include_partial,
    )?;
    let views = ViewSet::build(series.universe(), views)?;
    let market = match &self.market {
      Some(m) if m.len() != series.n_assets() => {
        return Err(invalid(format!(
          "{} market weights for {} assets",
          m.len(),
          series.n_assets()
        )));
      }
      Some(m) => m.clone(),
      None => MarketWeights::equal(series.n_assets())?,
    };

    observer.on_event(&BacktestEvent::Started {
      periods: windows.len(),
      window_size: cfg.window_size,
      rebalance_frequency: cfg.rebalance_frequency,
    });

    let outcomes = if cfg.parallel {
      windows
        .par_iter()
        .map(|w| self.evaluate_window(series, w, &views, &market, observer))
        .collect::<Result<Vec<_>>>()?
    } else {
      let mut outcomes = Vec::with_capacity(windows.len());
      for w in &windows {
        outcomes.push(self.evaluate_window(series, w, &views, &market, observer)?);
      }
      outcomes
    };

    observer.on_event(&BacktestEvent::Phase {
      window: windows.len(),
      phase: BacktestPhase::Done,
    });

    let report = self.assemble(windows, outcomes)?;
    observer.on_event(&BacktestEvent::Finished {
      periods: report.periods(),
    });
    Ok(report)
  }

  fn evaluate_window(
    &self,
    series: &ReturnSeries,
    window: &BacktestWindow,
    views: &ViewSet,
    market: &MarketWeights,
    observer: &dyn BacktestObserver,
  ) -> Result<WindowOutcome> {
    let mut phase = BacktestPhase::Init.next(true);
    let enter = |phase: BacktestPhase| {
      observer.on_event(&BacktestEvent::Phase {
        window: window.index,
        phase,
      })
    };

    enter(phase);
    let train = series.rows(window.train.start, window.train.end)?;
    let stats = self.engine.statistics(train)?;
    let blended = self.blend(&stats, market, views)?;

    phase = phase.next(true);
    enter(phase);
    let mv = self.engine.optimize(&stats.mean, &stats)?;
    let bl = self.engine.optimize(&blended, &stats)?;
    let ew = equal_weights(series.n_assets());

    phase = phase.next(true);
    enter(phase);
    let test = series.rows(window.test.start, window.test.end)?;
    let test_mean = test
      .mean_axis(Axis(0))
      .ok_or_else(|| EngineError::InsufficientData(format!("window {} has an empty test span", window.index)))?;
    let ppy = self.engine.config().risk.periods_per_year as f64;
    let realized = |w: &[f64]| w.iter().zip(test_mean.iter()).map(|(wi, mi)| wi * mi).sum::<f64>() * ppy;

    let allocations = vec![
      (AllocationModel::MeanVariance, realized(mv.weights.as_slice()), mv.weights),
      (AllocationModel::BlackLitterman, realized(bl.weights.as_slice()), bl.weights),
      (AllocationModel::EqualWeight, realized(ew.as_slice()), ew),
    ];
    let end_date = series.dates()[window.test.end - 1];

    observer.on_event(&BacktestEvent::WindowCompleted {
      window: window.index,
      end_date,
      returns: allocations.iter().map(|(m, r, _)| (*m, *r)).collect(),
    });
    enter(phase.next(true));

    Ok(WindowOutcome {
      end_date,
      allocations,
    })
  }

  /// Expected returns for the Black-Litterman model on one training span.
  fn blend(&self, stats: &ReturnStatistics, market: &MarketWeights, views: &ViewSet) -> Result<DVector<f64>> {
    match self.engine.config().backtest.view_blending {
      ViewBlending::Posterior => self.engine.posterior_returns(stats, market, views),
      ViewBlending::FixedMix { historical_weight } => {
        let mut mu = stats.mean.clone();
        for (i, q) in views.targets_by_asset() {
          mu[i] = historical_weight * mu[i] + (1.0 - historical_weight) * q;
        }
        Ok(mu)
      }
    }
  }

  fn assemble(&self, windows: Vec<BacktestWindow>, outcomes: Vec<WindowOutcome>) -> Result<BacktestReport> {
    let mut dates = Vec::with_capacity(outcomes.len());
    let mut returns: BTreeMap<AllocationModel, Vec<f64>> = BTreeMap::new();
    let mut weights: BTreeMap<AllocationModel, Vec<Vec<f64>>> = BTreeMap::new();

    for outcome in outcomes {
      dates.push(outcome.end_date);
      for (model, r, w) in outcome.allocations {
        returns.entry(model).or_default().push(r);
        weights.entry(model).or_default().push(w);
      }
    }

    let mut summaries = BTreeMap::new();
    if let Some(baseline) = returns.get(&AllocationModel::EqualWeight) {
      let metrics = self.engine.metrics();
      for (model, series) in &returns {
        let versus = (*model != AllocationModel::EqualWeight).then_some(baseline.as_slice());
        summaries.insert(*model, summarize(metrics, series, versus)?);
      }
    }

    Ok(BacktestReport {
      dates,
      windows,
      returns,
      weights,
      summaries,
    })
  }
}

fn summarize(metrics: &RiskMetrics, returns: &[f64], baseline: Option<&[f64]>) -> Result<ModelSummary> {
  let periodic = metrics.periodic();
  let ppy = metrics.periods_per_year.max(1) as f64;
  let as_daily: Vec<f64> = returns.iter().map(|r| r / ppy).collect();

  let versus_equal_weight = match baseline {
    Some(base) => Some(RelativePerformance {
      information_ratio: periodic.information_ratio(returns, base)?,
      active_return: returns.iter().mean() - base.iter().mean(),
      tracking_error: periodic.tracking_error(returns, base)?,
    }),
    None => None,
  };

  Ok(ModelSummary {
    mean: periodic.mean(returns)?,
    std_dev: periodic.volatility(returns)?,
    win_rate: periodic.win_rate(returns)?,
    best: returns.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    worst: returns.iter().copied().fold(f64::INFINITY, f64::min),
    sharpe: metrics.sharpe_ratio(&as_daily)?,
    versus_equal_weight,
  })
}
