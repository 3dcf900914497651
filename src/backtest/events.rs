//! # Backtest Events
//!
//! $$
//! \text{INIT}\to(\text{TRAIN}\to\text{OPTIMIZE}\to\text{TEST}\to\text{ADVANCE})^\*\to\text{DONE}
//! $$
//!
//! Progress of a backtest as structured events for optional consumers.

use std::sync::Mutex;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::portfolio::AllocationModel;

/// State of the rolling backtest loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestPhase {
  Init,
  Train,
  Optimize,
  Test,
  Advance,
  Done,
}

impl BacktestPhase {
  /// Successor state; `more_windows` decides between looping and finishing.
  pub fn next(self, more_windows: bool) -> Self {
    match self {
      Self::Init | Self::Advance if more_windows => Self::Train,
      Self::Init | Self::Advance => Self::Done,
      Self::Train => Self::Optimize,
      Self::Optimize => Self::Test,
      Self::Test => Self::Advance,
      Self::Done => Self::Done,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BacktestEvent {
  Started {
    periods: usize,
    window_size: usize,
    rebalance_frequency: usize,
  },
  Phase {
    window: usize,
    phase: BacktestPhase,
  },
  WindowCompleted {
    window: usize,
    end_date: NaiveDate,
    returns: Vec<(AllocationModel, f64)>,
  },
  Finished {
    periods: usize,
  },
}

/// Consumer of backtest events. Windows may be evaluated on several threads.
pub trait BacktestObserver: Sync {
  fn on_event(&self, event: &BacktestEvent);
}

impl BacktestObserver for () {
  fn on_event(&self, _event: &BacktestEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl BacktestObserver for TracingObserver {
  fn on_event(&self, event: &BacktestEvent) {
    match event {
      BacktestEvent::Started {
        periods,
        window_size,
        rebalance_frequency,
      } => info!(periods, window_size, rebalance_frequency, "backtest started"),
      BacktestEvent::Phase { window, phase } => debug!(window, ?phase, "backtest phase"),
      BacktestEvent::WindowCompleted {
        window,
        end_date,
        returns,
      } => debug!(window, %end_date, ?returns, "window completed"),
      BacktestEvent::Finished { periods } => info!(periods, "backtest finished"),
    }
  }
}

/// Keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct EventLog {
  events: Mutex<Vec<BacktestEvent>>,
}

impl EventLog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<BacktestEvent> {
    match self.events.lock() {
      Ok(events) => events.clone(),
      Err(poisoned) => poisoned.into_inner().clone(),
    }
  }
}

impl BacktestObserver for EventLog {
  fn on_event(&self, event: &BacktestEvent) {
    match self.events.lock() {
      Ok(mut events) => events.push(event.clone()),
      Err(poisoned) => poisoned.into_inner().push(event.clone()),
    }
  }
}
