//! # Backtest
//!
//! $$
//! K=\left\lfloor\frac{T-W}{F}\right\rfloor
//! $$
//!
pub mod events;
pub mod rolling;
pub mod window;

pub use events::BacktestEvent;
pub use events::BacktestObserver;
pub use events::BacktestPhase;
pub use events::EventLog;
pub use events::TracingObserver;
pub use rolling::BacktestReport;
pub use rolling::ModelSummary;
pub use rolling::RollingBacktester;
pub use window::BacktestWindow;
pub use window::plan_windows;
