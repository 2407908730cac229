use crate::models::{Bar, Direction, ExitReason, TradeRecord};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_step_index: usize,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
}

impl Position {
    /// Fills at the bar's open. Distances are in price units and must be positive.
    pub fn open(
        direction: Direction,
        bar: &Bar,
        step_index: usize,
        stop_loss_distance: f64,
        take_profit_distance: f64,
    ) -> Self {
        let entry_price = bar.open;
        let sign = direction.sign();
        Self {
            direction,
            entry_price,
            entry_time: bar.timestamp,
            entry_step_index: step_index,
            stop_loss_price: entry_price - sign * stop_loss_distance,
            take_profit_price: entry_price + sign * take_profit_distance,
        }
    }

    pub fn pnl_at(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.direction.sign()
    }

    pub fn bars_held(&self, step_index: usize) -> usize {
        step_index.saturating_sub(self.entry_step_index)
    }

    /// Threshold exit for this bar's range, filled at the threshold itself.
    /// When the range crosses both thresholds the stop-loss wins.
    pub fn threshold_exit(&self, bar: &Bar) -> Option<(ExitReason, f64)> {
        let (stop_hit, target_hit) = match self.direction {
            Direction::Long => (
                bar.low <= self.stop_loss_price,
                bar.high >= self.take_profit_price,
            ),
            Direction::Short => (
                bar.high >= self.stop_loss_price,
                bar.low <= self.take_profit_price,
            ),
        };

        if stop_hit {
            Some((ExitReason::StopLoss, self.stop_loss_price))
        } else if target_hit {
            Some((ExitReason::TakeProfit, self.take_profit_price))
        } else {
            None
        }
    }

    pub fn close(
        self,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        exit_step_index: usize,
        exit_reason: ExitReason,
    ) -> TradeRecord {
        TradeRecord {
            direction: self.direction,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            entry_step_index: self.entry_step_index,
            exit_time,
            exit_price,
            exit_step_index,
            exit_reason,
            pnl: self.pnl_at(exit_price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price_series::test_support::hourly_bars;

    #[test]
    fn test_thresholds_mirror_by_direction() {
        let bar = &hourly_bars(&[(100.0, 100.0, 100.0, 100.0)])[0];
        let long = Position::open(Direction::Long, bar, 3, 2.0, 5.0);
        assert_eq!(long.stop_loss_price, 98.0);
        assert_eq!(long.take_profit_price, 105.0);

        let short = Position::open(Direction::Short, bar, 3, 2.0, 5.0);
        assert_eq!(short.stop_loss_price, 102.0);
        assert_eq!(short.take_profit_price, 95.0);
    }

    #[test]
    fn test_pnl_sign_follows_direction() {
        let bar = &hourly_bars(&[(100.0, 100.0, 100.0, 100.0)])[0];
        let long = Position::open(Direction::Long, bar, 0, 1.0, 1.0);
        assert!((long.pnl_at(103.5) - 3.5).abs() < 1e-9);

        let short = Position::open(Direction::Short, bar, 0, 1.0, 1.0);
        assert!((short.pnl_at(103.5) + 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_stop_loss_wins_when_both_thresholds_cross() {
        let bars = hourly_bars(&[(100.0, 100.0, 100.0, 100.0), (100.0, 110.0, 90.0, 100.0)]);
        let long = Position::open(Direction::Long, &bars[0], 0, 3.0, 4.0);
        assert_eq!(
            long.threshold_exit(&bars[1]),
            Some((ExitReason::StopLoss, 97.0))
        );

        let short = Position::open(Direction::Short, &bars[0], 0, 3.0, 4.0);
        assert_eq!(
            short.threshold_exit(&bars[1]),
            Some((ExitReason::StopLoss, 103.0))
        );
    }

    #[test]
    fn test_take_profit_and_no_exit() {
        let bars = hourly_bars(&[
            (100.0, 100.0, 100.0, 100.0),
            (101.0, 104.0, 99.5, 103.0),
            (100.0, 101.0, 99.5, 100.5),
            (100.0, 101.0, 99.0, 100.5),
        ]);
        let long = Position::open(Direction::Long, &bars[0], 0, 1.0, 4.0);
        assert_eq!(
            long.threshold_exit(&bars[1]),
            Some((ExitReason::TakeProfit, 104.0))
        );
        assert_eq!(long.threshold_exit(&bars[2]), None);
        // touching the stop counts as a cross
        assert_eq!(
            long.threshold_exit(&bars[3]),
            Some((ExitReason::StopLoss, 99.0))
        );
    }
}
