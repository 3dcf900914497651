//! # litterman-rs
//!
//! $$
//! \Pi=\lambda\Sigma w_m \;\longrightarrow\; \mathbb E[R\mid Q] \;\longrightarrow\; \mathbf w^\* \;\longrightarrow\; r^{\text{oos}}_{1..K}
//! $$
//!
//! Quantitative core for view-aware portfolio construction:
//!
//! - [`portfolio`]: return statistics, the equilibrium prior, Black-Litterman
//!   blending and the constrained maximum-Sharpe optimizer.
//! - [`risk`]: performance and tail-risk metrics over realized returns.
//! - [`backtest`]: walk-forward re-estimation and out-of-sample scoring.
//!
//! Every fallible operation returns [`error::Result`]; settings live in
//! [`config::EngineConfig`].

pub mod backtest;
pub mod config;
pub mod error;
pub mod portfolio;
pub mod risk;

pub use config::EngineConfig;
pub use error::EngineError;
pub use error::Result;
