//! # Backtest Windows
//!
//! $$
//! \text{train}_k=[kF,\ kF+W),\qquad \text{test}_k=[kF+W,\ \min(kF+W+F,\ T))
//! $$
//!
//! Deterministic plan of disjoint, contiguous train/test spans.

use std::ops::Range;

use impl_new_derive::ImplNew;
use serde::Serialize;

use crate::error::Result;
use crate::error::insufficient;
use crate::error::invalid;

/// Training and testing spans (half-open row ranges) of one rebalance period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ImplNew)]
pub struct BacktestWindow {
  pub index: usize,
  pub train: Range<usize>,
  pub test: Range<usize>,
}

impl BacktestWindow {
  pub fn train_len(&self) -> usize {
    self.train.len()
  }

  pub fn test_len(&self) -> usize {
    self.test.len()
  }

  /// Whether the test span is shorter than the rebalance frequency.
  pub fn is_partial(&self, rebalance_frequency: usize) -> bool {
    self.test.len() < rebalance_frequency
  }
}

/// Windows for a series of `len` periods.
///
/// Only full test spans are produced unless `include_partial` is set, in
/// which case a trailing shorter span is appended when the series does not
/// divide evenly. Fails with insufficient data when `window_size >= len`.
pub fn plan_windows(
  len: usize,
  window_size: usize,
  rebalance_frequency: usize,
  include_partial: bool,
) -> Result<Vec<BacktestWindow>> {
  if window_size == 0 {
    return Err(invalid("window size must be positive"));
  }
  if rebalance_frequency == 0 {
    return Err(invalid("rebalance frequency must be positive"));
  }
  if window_size >= len {
    return Err(insufficient(format!(
      "training window of {window_size} periods needs a longer series than {len}"
    )));
  }

  let mut windows = Vec::with_capacity((len - window_size) / rebalance_frequency + 1);
  let mut cursor = window_size;
  while cursor < len {
    let end = cursor + rebalance_frequency;
    if end > len && !include_partial {
      break;
    }
    windows.push(BacktestWindow::new(
      windows.len(),
      cursor - window_size..cursor,
      cursor..end.min(len),
    ));
    cursor += rebalance_frequency;
  }

  Ok(windows)
}
