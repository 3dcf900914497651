//! # Risk
//!
//! $$
//! r_1,\dots,r_T \mapsto \{S,\ \text{Sortino},\ \text{Calmar},\ \mathrm{MDD},\ \mathrm{VaR},\ \mathrm{CVaR},\ \dots\}
//! $$
//!
pub mod metrics;
pub mod report;

pub use metrics::RiskMetrics;
pub use report::RiskReport;
