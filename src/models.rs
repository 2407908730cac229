use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of price columns every bar contributes to an observation row
/// ahead of its pre-computed features: open, high, low, close, volume.
pub const BASE_FEATURE_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub features: Vec<f64>,
}

impl Bar {
    /// Appends this bar's observation row to `out`.
    pub fn write_feature_row(&self, out: &mut Vec<f64>) {
        out.extend_from_slice(&[self.open, self.high, self.low, self.close, self.volume]);
        out.extend_from_slice(&self.features);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Explicit,
    TimeExit,
    EndOfData,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::Explicit => "explicit",
            ExitReason::TimeExit => "time_exit",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

/// A closed position. Produced exactly once per position and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub entry_step_index: usize,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_step_index: usize,
    pub exit_reason: ExitReason,
    pub pnl: f64,
}

impl TradeRecord {
    pub fn bars_held(&self) -> usize {
        self.exit_step_index.saturating_sub(self.entry_step_index)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub step_index: usize,
    /// Realized equity only.
    pub equity: f64,
    pub unrealized_pnl: f64,
    pub mark_to_market: f64,
}
