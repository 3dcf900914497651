//! # Portfolio Engine
//!
//! $$
//! (\hat\mu,\hat\Sigma,w_m,\{v_k\}) \mapsto \{\mathbf w^\*_{\text{MV}},\ \mathbf w^\*_{\text{BL}},\ \mathbf w_{1/N}\}
//! $$
//!
//! High-level orchestration: statistics, equilibrium prior, view blending,
//! optimization and evaluation behind one configured entry point.

use nalgebra::DVector;
use ndarray::ArrayView2;
use serde::Serialize;
use tracing::info;

use super::black_litterman::BlackLitterman;
use super::black_litterman::BlackLittermanResult;
use super::black_litterman::InvestorView;
use super::black_litterman::ReturnComparison;
use super::black_litterman::ViewSet;
use super::data::ReturnSeries;
use super::data::ReturnStatistics;
use super::data::portfolio_returns;
use super::equilibrium::MarketWeights;
use super::equilibrium::implied_returns;
use super::optimizers::PortfolioOptimizer;
use super::optimizers::equal_weights;
use super::solver::ConstrainedSolver;
use super::solver::ProjectedGradient;
use super::types::AllocationModel;
use super::types::PortfolioWeights;
use super::universe::AssetUniverse;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::risk::RiskMetrics;
use crate::risk::RiskReport;

/// Model moments of an allocation plus tail statistics of its realized history.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioEvaluation {
  pub expected_return: f64,
  pub volatility: f64,
  pub sharpe: f64,
  /// Empirical lower-tail quantile of realized period returns.
  pub historical_var: f64,
  pub historical_cvar: f64,
  pub max_drawdown: f64,
  pub confidence: f64,
}

/// One model's allocation and its evaluation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelAllocation {
  pub model: AllocationModel,
  pub portfolio: PortfolioWeights,
  pub evaluation: PortfolioEvaluation,
}

/// Mean-variance, Black-Litterman and equal-weight allocations side by side.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelComparison {
  pub assets: Vec<String>,
  pub allocations: Vec<ModelAllocation>,
  /// Prior versus posterior return per asset.
  pub return_shifts: Vec<ReturnComparison>,
}

impl ModelComparison {
  pub fn get(&self, model: AllocationModel) -> Option<&ModelAllocation> {
    self.allocations.iter().find(|a| a.model == model)
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}

/// Single entry point for estimation, blending and allocation.
#[derive(Clone, Debug)]
pub struct PortfolioEngine<S: ConstrainedSolver = ProjectedGradient> {
  config: EngineConfig,
  optimizer: PortfolioOptimizer<S>,
  aggregator: BlackLitterman,
  metrics: RiskMetrics,
}

impl PortfolioEngine<ProjectedGradient> {
  /// Validate `config` and build an engine on the default solver.
  pub fn new(config: EngineConfig) -> Result<Self> {
    config.validate()?;
    let optimizer = PortfolioOptimizer::from_config(&config);
    Self::with_optimizer(config, optimizer)
  }
}

impl<S: ConstrainedSolver> PortfolioEngine<S> {
  pub fn with_optimizer(config: EngineConfig, optimizer: PortfolioOptimizer<S>) -> Result<Self> {
    config.validate()?;
    let aggregator = BlackLitterman::new(config.risk.tau)?;
    let metrics = RiskMetrics::from(&config.risk);
    Ok(Self {
      config,
      optimizer,
      aggregator,
      metrics,
    })
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn optimizer(&self) -> &PortfolioOptimizer<S> {
    &self.optimizer
  }

  pub fn metrics(&self) -> &RiskMetrics {
    &self.metrics
  }

  /// Annualized moments of `returns`, diagonally loaded when a ridge is configured.
  pub fn statistics(&self, returns: ArrayView2<'_, f64>) -> Result<ReturnStatistics> {
    let ppy = self.config.risk.periods_per_year;
    let ridge = self.config.risk.covariance_ridge;
    if ridge > 0.0 {
      ReturnStatistics::estimate_regularized(returns, ppy, ridge)
    } else {
      ReturnStatistics::estimate(returns, ppy)
    }
  }

  /// Equilibrium prior `λ Σ w_m`.
  pub fn implied_returns(&self, stats: &ReturnStatistics, market: &MarketWeights) -> Result<DVector<f64>> {
    implied_returns(self.config.risk.risk_aversion, &stats.covariance, market)
  }

  /// Posterior update of the equilibrium prior by `views`.
  pub fn black_litterman(
    &self,
    universe: &AssetUniverse,
    stats: &ReturnStatistics,
    market: &MarketWeights,
    views: &[InvestorView],
  ) -> Result<BlackLittermanResult> {
    let prior = self.implied_returns(stats, market)?;
    let views = ViewSet::build(universe, views)?;
    self.aggregator.estimate(&prior, &stats.covariance, &views)
  }

  /// Posterior expected returns only, for views already mapped onto the universe.
  pub fn posterior_returns(
    &self,
    stats: &ReturnStatistics,
    market: &MarketWeights,
    views: &ViewSet,
  ) -> Result<DVector<f64>> {
    let prior = self.implied_returns(stats, market)?;
    self.aggregator.posterior(&prior, &stats.covariance, views)
  }

  /// Max-Sharpe allocation for `(mu, stats.covariance)`.
  pub fn optimize(&self, mu: &DVector<f64>, stats: &ReturnStatistics) -> Result<PortfolioWeights> {
    self.optimizer.max_sharpe(mu, &stats.covariance)
  }

  /// Attach tail statistics from `history` to an allocation.
  pub fn evaluate(&self, portfolio: &PortfolioWeights, history: ArrayView2<'_, f64>) -> Result<PortfolioEvaluation> {
    let realized = portfolio_returns(history, &portfolio.weights)?;
    let confidence = self.config.risk.var_confidence;

    Ok(PortfolioEvaluation {
      expected_return: portfolio.expected_return,
      volatility: portfolio.volatility,
      sharpe: portfolio.sharpe,
      historical_var: self.metrics.historical_var(&realized, confidence)?,
      historical_cvar: self.metrics.historical_cvar(&realized, confidence)?,
      max_drawdown: self.metrics.max_drawdown(&realized)?,
      confidence,
    })
  }

  /// Mean-variance on the historical mean, Black-Litterman on the posterior
  /// and the equal-weight baseline, all evaluated on the full history.
  pub fn compare_models(
    &self,
    series: &ReturnSeries,
    market: &MarketWeights,
    views: &[InvestorView],
  ) -> Result<ModelComparison> {
    let history = series.returns();
    let stats = self.statistics(history)?;
    let rf = self.config.risk.risk_free_rate;

    let mv = self.optimize(&stats.mean, &stats)?;
    let bl = self.black_litterman(series.universe(), &stats, market, views)?;
    let blw = self.optimize(&bl.posterior, &stats)?;
    let ew = PortfolioWeights::evaluate(
      equal_weights(series.n_assets()),
      &bl.posterior,
      &stats.covariance,
      rf,
    )?;

    let mut allocations = Vec::with_capacity(3);
    for (model, portfolio) in [
      (AllocationModel::MeanVariance, mv),
      (AllocationModel::BlackLitterman, blw),
      (AllocationModel::EqualWeight, ew),
    ] {
      let evaluation = self.evaluate(&portfolio, history)?;
      info!(
        model = model.as_str(),
        sharpe = evaluation.sharpe,
        volatility = evaluation.volatility,
        "model allocated"
      );
      allocations.push(ModelAllocation {
        model,
        portfolio,
        evaluation,
      });
    }

    Ok(ModelComparison {
      assets: series.universe().ids().to_vec(),
      allocations,
      return_shifts: bl.comparison(series.universe()),
    })
  }

  /// Comprehensive report for a realized return series.
  pub fn risk_report(&self, returns: &[f64], benchmark: Option<&[f64]>, market: Option<&[f64]>) -> Result<RiskReport> {
    RiskReport::comprehensive(
      &self.metrics,
      returns,
      self.config.risk.var_confidence,
      benchmark,
      market,
    )
  }
}
