use std::env;

use anyhow::Context;
use anyhow::Result;
use chrono::Days;
use chrono::NaiveDate;
use litterman_rs::EngineConfig;
use litterman_rs::backtest::RollingBacktester;
use litterman_rs::portfolio::AllocationModel;
use litterman_rs::portfolio::AssetUniverse;
use litterman_rs::portfolio::InvestorView;
use litterman_rs::portfolio::MarketWeights;
use litterman_rs::portfolio::PortfolioEngine;
use litterman_rs::portfolio::ReturnSeries;
use litterman_rs::portfolio::frontier::best_sharpe;
use litterman_rs::portfolio::frontier::sample_portfolios;
use ndarray::Array2;
use prettytable::Table;
use prettytable::row;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TICKERS: [&str; 5] = ["AAPL", "MSFT", "GOOGL", "AMZN", "NVDA"];
const DAYS: usize = 756;
const SEED: u64 = 2024;

/// Geometric random-walk prices with one common market factor.
fn synthetic_prices(days: usize, seed: u64) -> Result<Array2<f64>> {
  let drift = [0.00045, 0.00050, 0.00040, 0.00042, 0.00080];
  let vol = [0.014, 0.012, 0.015, 0.017, 0.025];
  let beta = [1.0, 0.9, 1.05, 1.15, 1.5];

  let mut rng = StdRng::seed_from_u64(seed);
  let market = Normal::new(0.0, 0.009)?;
  let noise = Normal::new(0.0, 1.0)?;

  let mut prices = Array2::zeros((days + 1, TICKERS.len()));
  prices.row_mut(0).fill(100.0);
  for t in 1..=days {
    let m = market.sample(&mut rng);
    for j in 0..TICKERS.len() {
      let r = drift[j] + beta[j] * m + vol[j] * noise.sample(&mut rng);
      prices[[t, j]] = prices[[t - 1, j]] * (1.0 + r);
    }
  }
  Ok(prices)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_target(false)
    .init();

  let config = match env::args().nth(1) {
    Some(path) => EngineConfig::load(&path).with_context(|| format!("loading {path}"))?,
    None => EngineConfig::default(),
  };

  let universe = AssetUniverse::new(TICKERS)?;
  let start = NaiveDate::from_ymd_opt(2021, 1, 4).context("invalid start date")?;
  let dates: Vec<NaiveDate> = (0..=DAYS as u64).map(|d| start + Days::new(d)).collect();
  let prices = synthetic_prices(DAYS, SEED)?;
  let series = ReturnSeries::from_prices(universe.clone(), dates, &prices)?;
  info!(periods = series.len(), assets = series.n_assets(), "synthetic history ready");

  let views = vec![
    InvestorView::new("AAPL".to_string(), 0.12, 0.6),
    InvestorView::new("NVDA".to_string(), 0.25, 0.4),
  ];
  let market = MarketWeights::from_caps(&[3.4, 3.1, 2.1, 1.9, 2.9])?;

  let engine = PortfolioEngine::new(config.clone())?;
  let comparison = engine.compare_models(&series, &market, &views)?;

  let mut weights = Table::new();
  weights.add_row(row!["Asset", "Mean-Variance", "Black-Litterman", "Equal-Weight"]);
  for (i, asset) in universe.iter().enumerate() {
    let w = |m: AllocationModel| {
      comparison
        .get(m)
        .map(|a| format!("{:.2}%", 100.0 * a.portfolio.weights[i]))
        .unwrap_or_default()
    };
    weights.add_row(row![
      asset,
      w(AllocationModel::MeanVariance),
      w(AllocationModel::BlackLitterman),
      w(AllocationModel::EqualWeight)
    ]);
  }
  weights.printstd();

  let mut moments = Table::new();
  moments.add_row(row!["Model", "E[R]", "Vol", "Sharpe", "VaR", "CVaR", "MDD"]);
  for alloc in &comparison.allocations {
    let e = &alloc.evaluation;
    moments.add_row(row![
      alloc.model,
      format!("{:.2}%", 100.0 * e.expected_return),
      format!("{:.2}%", 100.0 * e.volatility),
      format!("{:.3}", e.sharpe),
      format!("{:.2}%", 100.0 * e.historical_var),
      format!("{:.2}%", 100.0 * e.historical_cvar),
      format!("{:.2}%", 100.0 * e.max_drawdown)
    ]);
  }
  moments.printstd();

  if let Some(bl) = comparison.get(AllocationModel::BlackLitterman) {
    let realized = series.portfolio_returns(&bl.portfolio.weights)?;
    let baseline = series.portfolio_returns(&vec![1.0 / TICKERS.len() as f64; TICKERS.len()])?;
    let report = engine.risk_report(&realized, Some(baseline.as_slice()), Some(baseline.as_slice()))?;
    let mut risk = Table::new();
    risk.add_row(row!["Metric", "Black-Litterman"]);
    for (name, value) in report.iter() {
      risk.add_row(row![name, format!("{value:.4}")]);
    }
    risk.printstd();
  }

  let stats = engine.statistics(series.returns())?;
  let cloud = sample_portfolios(&stats.mean, &stats.covariance, config.risk.risk_free_rate, 2000, SEED)?;
  if let Some(best) = best_sharpe(&cloud) {
    info!(sharpe = best.sharpe, volatility = best.volatility, "best sampled portfolio");
  }

  let backtester = RollingBacktester::with_engine(engine).with_market_weights(market);
  let backtest = backtester.run(&series, &views)?;

  let mut summary = Table::new();
  summary.add_row(row!["Model", "Mean", "Std", "Win", "Best", "Worst", "Sharpe", "IR vs EW"]);
  for (model, s) in &backtest.summaries {
    let ir = s
      .versus_equal_weight
      .as_ref()
      .map(|r| format!("{:.3}", r.information_ratio))
      .unwrap_or_else(|| "-".to_string());
    summary.add_row(row![
      model,
      format!("{:.2}%", 100.0 * s.mean),
      format!("{:.2}%", 100.0 * s.std_dev),
      format!("{:.0}%", 100.0 * s.win_rate),
      format!("{:.2}%", 100.0 * s.best),
      format!("{:.2}%", 100.0 * s.worst),
      format!("{:.3}", s.sharpe),
      ir
    ]);
  }
  summary.printstd();
  info!(periods = backtest.periods(), "done");

  Ok(())
}
