//! # Portfolio
//!
//! $$
//! \mathbb E[R]=\left[(\tau\Sigma)^{-1}+P^\top\Omega^{-1}P\right]^{-1}\left[(\tau\Sigma)^{-1}\Pi+P^\top\Omega^{-1}Q\right]
//! $$
//!
pub mod black_litterman;
pub mod data;
pub mod engine;
pub mod equilibrium;
pub mod frontier;
pub mod optimizers;
pub mod solver;
pub mod types;
pub mod universe;

pub use black_litterman::BlackLitterman;
pub use black_litterman::BlackLittermanResult;
pub use black_litterman::InvestorView;
pub use black_litterman::ViewSet;
pub use data::ReturnSeries;
pub use data::ReturnStatistics;
pub use engine::ModelComparison;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEvaluation;
pub use equilibrium::MarketWeights;
pub use equilibrium::implied_returns;
pub use optimizers::PortfolioOptimizer;
pub use solver::ConstrainedSolver;
pub use solver::NelderMeadSolver;
pub use solver::ProjectedGradient;
pub use solver::WeightBounds;
pub use types::AllocationModel;
pub use types::PortfolioWeights;
pub use universe::AssetUniverse;
