use std::hint::black_box;

use chrono::Days;
use chrono::NaiveDate;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use litterman_rs::EngineConfig;
use litterman_rs::backtest::RollingBacktester;
use litterman_rs::portfolio::AssetUniverse;
use litterman_rs::portfolio::BlackLitterman;
use litterman_rs::portfolio::InvestorView;
use litterman_rs::portfolio::MarketWeights;
use litterman_rs::portfolio::NelderMeadSolver;
use litterman_rs::portfolio::PortfolioOptimizer;
use litterman_rs::portfolio::ReturnSeries;
use litterman_rs::portfolio::ReturnStatistics;
use litterman_rs::portfolio::ViewSet;
use litterman_rs::portfolio::WeightBounds;
use litterman_rs::portfolio::implied_returns;
use litterman_rs::risk::RiskMetrics;
use litterman_rs::risk::RiskReport;
use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;

fn series(t: usize, n: usize) -> ReturnSeries {
  let ids: Vec<String> = (0..n).map(|i| format!("A{i}")).collect();
  let universe = AssetUniverse::new(ids).unwrap();
  let mut rng = StdRng::seed_from_u64(17);
  let market = Normal::new(0.0004, 0.008).unwrap();
  let noise = Normal::new(0.0, 0.012).unwrap();
  let mut returns = Array2::zeros((t, n));
  for i in 0..t {
    let m = market.sample(&mut rng);
    for j in 0..n {
      returns[[i, j]] = m + 0.00002 * j as f64 + noise.sample(&mut rng);
    }
  }
  let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
  let dates = (0..t as u64).map(|d| start + Days::new(d)).collect();
  ReturnSeries::new(universe, dates, returns).unwrap()
}

fn bench_optimizer(c: &mut Criterion) {
  let mut group = c.benchmark_group("max_sharpe");

  for &n in &[5usize, 20, 50] {
    let data = series(504, n);
    let stats = ReturnStatistics::estimate(data.returns(), 252).unwrap();

    group.bench_with_input(BenchmarkId::new("projected_gradient", n), &n, |b, _| {
      let opt = PortfolioOptimizer::new(0.03, WeightBounds::default());
      b.iter(|| black_box(opt.max_sharpe(&stats.mean, &stats.covariance).unwrap()));
    });

    if n <= 20 {
      group.bench_with_input(BenchmarkId::new("nelder_mead", n), &n, |b, _| {
        let opt = PortfolioOptimizer::with_solver(0.03, WeightBounds::default(), NelderMeadSolver::default());
        b.iter(|| black_box(opt.max_sharpe(&stats.mean, &stats.covariance).unwrap()));
      });
    }
  }

  group.finish();
}

fn bench_posterior(c: &mut Criterion) {
  let data = series(504, 30);
  let stats = ReturnStatistics::estimate(data.returns(), 252).unwrap();
  let prior = implied_returns(2.5, &stats.covariance, &MarketWeights::equal(30).unwrap()).unwrap();
  let views: Vec<InvestorView> = (0..10)
    .map(|i| InvestorView::new(format!("A{}", 3 * i), 0.08 + 0.01 * i as f64, 0.5))
    .collect();
  let views = ViewSet::build(data.universe(), &views).unwrap();
  let bl = BlackLitterman::new(0.05).unwrap();

  c.bench_function("black_litterman_posterior_30x10", |b| {
    b.iter(|| black_box(bl.estimate(&prior, &stats.covariance, &views).unwrap()))
  });
}

fn bench_risk_report(c: &mut Criterion) {
  let data = series(2520, 1);
  let r: Vec<f64> = data.returns().column(0).to_vec();
  let metrics = RiskMetrics::default();

  c.bench_function("risk_report_10y", |b| {
    b.iter(|| black_box(RiskReport::comprehensive(&metrics, &r, 0.95, None, None).unwrap()))
  });
}

fn bench_backtest(c: &mut Criterion) {
  let data = series(1260, 8);
  let views = vec![InvestorView::new("A0".to_string(), 0.12, 0.6)];
  let mut group = c.benchmark_group("rolling_backtest");
  group.sample_size(10);

  for parallel in [false, true] {
    let mut config = EngineConfig::default();
    config.backtest.parallel = parallel;
    let bt = RollingBacktester::new(config).unwrap();
    let label = if parallel { "parallel" } else { "sequential" };
    group.bench_function(label, |b| {
      b.iter(|| black_box(bt.run_with_observer(&data, &views, &()).unwrap()))
    });
  }

  group.finish();
}

criterion_group!(
  benches,
  bench_optimizer,
  bench_posterior,
  bench_risk_report,
  bench_backtest
);
criterion_main!(benches);
