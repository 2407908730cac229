use crate::models::{EquityPoint, ExitReason, TradeRecord};
use serde::Serialize;
use statrs::statistics::Statistics;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodePerformance {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub net_profit: f64,
    pub starting_equity: f64,
    pub final_equity: f64,
    /// Per-step Sharpe of mark-to-market equity changes, not annualised.
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub avg_trade_pnl: f64,
    pub median_trade_pnl: f64,
    pub avg_bars_held: f64,
    pub stop_loss_exits: usize,
    pub take_profit_exits: usize,
    pub explicit_exits: usize,
    pub time_exits: usize,
    pub end_of_data_exits: usize,
}

struct DrawdownInfo {
    max_drawdown: f64,
    max_drawdown_percent: f64,
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate_performance(
        trades: &[TradeRecord],
        starting_equity: f64,
        equity_curve: &[EquityPoint],
    ) -> EpisodePerformance {
        let trade_pnls: Vec<f64> = trades.iter().map(|trade| trade.pnl).collect();
        let winning_trades = trade_pnls.iter().filter(|pnl| **pnl > 0.0).count();
        let losing_trades = trade_pnls.iter().filter(|pnl| **pnl < 0.0).count();
        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            winning_trades as f64 / total_trades as f64
        } else {
            0.0
        };

        let net_profit: f64 = trade_pnls.iter().sum();
        let best_trade = trade_pnls
            .iter()
            .copied()
            .fold(None, |best: Option<f64>, pnl| Some(best.map_or(pnl, |b| b.max(pnl))))
            .unwrap_or(0.0);
        let worst_trade = trade_pnls
            .iter()
            .copied()
            .fold(None, |worst: Option<f64>, pnl| Some(worst.map_or(pnl, |w| w.min(pnl))))
            .unwrap_or(0.0);

        let bars_held: Vec<f64> = trades.iter().map(|trade| trade.bars_held() as f64).collect();
        let count_exits =
            |reason: ExitReason| trades.iter().filter(|trade| trade.exit_reason == reason).count();

        let drawdown_info = Self::calculate_max_drawdown(starting_equity, equity_curve);

        EpisodePerformance {
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            net_profit,
            starting_equity,
            final_equity: starting_equity + net_profit,
            sharpe_ratio: Self::calculate_sharpe_ratio(starting_equity, equity_curve),
            max_drawdown: drawdown_info.max_drawdown,
            max_drawdown_percent: drawdown_info.max_drawdown_percent,
            best_trade,
            worst_trade,
            avg_trade_pnl: Self::average(&trade_pnls),
            median_trade_pnl: Self::median(&trade_pnls),
            avg_bars_held: Self::average(&bars_held),
            stop_loss_exits: count_exits(ExitReason::StopLoss),
            take_profit_exits: count_exits(ExitReason::TakeProfit),
            explicit_exits: count_exits(ExitReason::Explicit),
            time_exits: count_exits(ExitReason::TimeExit),
            end_of_data_exits: count_exits(ExitReason::EndOfData),
        }
    }

    fn average(values: &[f64]) -> f64 {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            0.0
        } else {
            finite.mean()
        }
    }

    fn median(values: &[f64]) -> f64 {
        let mut filtered: Vec<f64> = values
            .iter()
            .copied()
            .filter(|value| value.is_finite())
            .collect();

        if filtered.is_empty() {
            return 0.0;
        }

        filtered.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let mid = filtered.len() / 2;

        if filtered.len() % 2 == 0 {
            (filtered[mid - 1] + filtered[mid]) / 2.0
        } else {
            filtered[mid]
        }
    }

    /// Equity may start at 1.0 or at zero, so changes are taken in absolute
    /// terms rather than as percentages.
    pub fn calculate_sharpe_ratio(starting_equity: f64, equity_curve: &[EquityPoint]) -> f64 {
        if equity_curve.len() < 2 {
            return 0.0;
        }

        let values: Vec<f64> = std::iter::once(starting_equity)
            .chain(equity_curve.iter().map(|point| point.mark_to_market))
            .collect();
        let changes: Vec<f64> = values.windows(2).map(|pair| pair[1] - pair[0]).collect();

        let mean_change = changes.iter().mean();
        let std_dev = changes.iter().std_dev();

        if !std_dev.is_finite() || std_dev == 0.0 {
            return 0.0;
        }

        mean_change / std_dev
    }

    fn calculate_max_drawdown(starting_equity: f64, equity_curve: &[EquityPoint]) -> DrawdownInfo {
        let mut max_drawdown = 0.0;
        let mut max_drawdown_percent = 0.0;
        let mut peak_value = starting_equity;

        for point in equity_curve {
            let value = point.mark_to_market;
            if value > peak_value {
                peak_value = value;
                continue;
            }

            let drawdown = peak_value - value;
            let drawdown_percent = if peak_value > 0.0 {
                (drawdown / peak_value) * 100.0
            } else {
                0.0
            };

            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
            if drawdown_percent > max_drawdown_percent {
                max_drawdown_percent = drawdown_percent;
            }
        }

        DrawdownInfo {
            max_drawdown,
            max_drawdown_percent,
        }
    }
}
