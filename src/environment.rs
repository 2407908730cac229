use crate::action::{Action, ActionSpace};
use crate::config::EnvironmentConfig;
use crate::errors::{EnvError, EnvResult};
use crate::ledger::AccountLedger;
use crate::models::{Bar, EquityPoint, ExitReason, TradeRecord};
use crate::observation::{Observation, ObservationWindow};
use crate::position::Position;
use crate::price_series::PriceSeries;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnvState {
    /// Constructed, waiting for the first `reset()`.
    Idle,
    Flat,
    InPosition,
    /// Terminal; only `reset()` is accepted.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EpisodeCursor {
    current_step_index: usize,
    terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    /// The trade closed on this step, if any.
    pub last_trade_info: Option<TradeRecord>,
    /// Realized equity.
    pub equity: f64,
    pub unrealized_pnl: f64,
    pub step_index: usize,
    pub timestamp: DateTime<Utc>,
    /// The action after normalisation, which may differ from the one requested.
    pub applied_action: Action,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f64,
    pub done: bool,
    pub info: StepInfo,
}

/// Single-instrument, single-position trading simulator.
///
/// An action chosen while observing bar `t` is filled against bar `t + 1`:
/// entries and explicit exits at its open, stop-loss and take-profit exits at
/// the threshold price when its range crosses them. A position still open on
/// the last bar is closed at that bar's close. An open that would fill on the
/// last bar is applied as Hold, since it could only be closed at once.
#[derive(Debug, Clone)]
pub struct MarketSimulationEnvironment {
    config: EnvironmentConfig,
    window: ObservationWindow,
    action_space: ActionSpace,
    position: Option<Position>,
    ledger: AccountLedger,
    cursor: Option<EpisodeCursor>,
    last_trade_info: Option<TradeRecord>,
    equity_curve: Vec<EquityPoint>,
}

impl MarketSimulationEnvironment {
    pub fn new(series: PriceSeries, config: EnvironmentConfig) -> EnvResult<Self> {
        config.validate()?;
        let window = ObservationWindow::new(series, config.window_size)?;
        let action_space =
            ActionSpace::new(config.stop_loss_pips.len(), config.take_profit_pips.len());
        let ledger = AccountLedger::new(config.starting_equity);

        Ok(Self {
            config,
            window,
            action_space,
            position: None,
            ledger,
            cursor: None,
            last_trade_info: None,
            equity_curve: Vec::new(),
        })
    }

    pub fn reset(&mut self) -> EnvResult<Observation> {
        let start = self.window.first_step_index();
        let observation = self.window.observe(start)?;

        self.position = None;
        self.ledger.reset();
        self.last_trade_info = None;
        self.equity_curve.clear();
        self.cursor = Some(EpisodeCursor {
            current_step_index: start,
            terminal: false,
        });

        debug!(
            "Reset {} environment at step {} ({} bars)",
            self.window.series().symbol(),
            start,
            self.window.series().len()
        );
        Ok(observation)
    }

    pub fn step_discrete(&mut self, action_index: usize) -> EnvResult<StepResult> {
        let action = self.action_space.decode(action_index);
        self.step(action)
    }

    pub fn step(&mut self, action: Action) -> EnvResult<StepResult> {
        let cursor = match self.cursor {
            None => {
                return Err(EnvError::invalid_state(
                    "step() called before reset()",
                ))
            }
            Some(cursor) if cursor.terminal => {
                return Err(EnvError::invalid_state(
                    "step() called on a finished episode; call reset() first",
                ))
            }
            Some(cursor) => cursor,
        };

        let series = self.window.series().clone();
        let step_index = cursor.current_step_index + 1;
        let last_index = series.last_index();
        let bar = &series.bars()[step_index];

        self.last_trade_info = None;
        let applied_action = self.normalize_action(action, step_index >= last_index);

        let mut closed = match applied_action {
            Action::Hold => None,
            Action::Open {
                direction,
                sl_index,
                tp_index,
            } => {
                let position = Position::open(
                    direction,
                    bar,
                    step_index,
                    self.config.stop_loss_distance(sl_index),
                    self.config.take_profit_distance(tp_index),
                );
                debug!(
                    "Opened {} at {} (sl {}, tp {}) on step {}",
                    direction.as_str(),
                    position.entry_price,
                    position.stop_loss_price,
                    position.take_profit_price,
                    step_index
                );
                self.position = Some(position);
                None
            }
            Action::CloseExplicit => {
                self.close_position(bar.open, bar, step_index, ExitReason::Explicit)
            }
        };

        if closed.is_none() {
            closed = self.evaluate_exits(bar, step_index, last_index);
        }

        let mut reward = 0.0;
        if let Some(trade) = closed {
            reward = trade.pnl * self.config.reward_scale;
            self.ledger.record_trade(trade.clone());
            self.last_trade_info = Some(trade);
        }

        let equity = self.ledger.snapshot_equity();
        let ruined = self
            .config
            .ruin_equity
            .map_or(false, |threshold| equity <= threshold);
        let terminal = step_index >= last_index || ruined;
        self.cursor = Some(EpisodeCursor {
            current_step_index: step_index,
            terminal,
        });

        let unrealized_pnl = self.unrealized_pnl_at(bar.close);
        self.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            step_index,
            equity,
            unrealized_pnl,
            mark_to_market: self.ledger.mark_to_market(unrealized_pnl),
        });

        if terminal {
            info!(
                "Episode finished at step {} for {}: equity {:.6}, {} trade{}{}",
                step_index,
                series.symbol(),
                equity,
                self.ledger.trade_history().len(),
                if self.ledger.trade_history().len() == 1 { "" } else { "s" },
                if ruined { " (ruin threshold reached)" } else { "" }
            );
        }

        Ok(StepResult {
            observation: self.window.observe(step_index)?,
            reward,
            done: terminal,
            info: StepInfo {
                last_trade_info: self.last_trade_info.clone(),
                equity,
                unrealized_pnl,
                step_index,
                timestamp: bar.timestamp,
                applied_action,
            },
        })
    }

    /// Opens while in a position or on the final bar and closes while flat
    /// become Hold; option indices past the configured sets are clamped.
    fn normalize_action(&self, action: Action, final_bar: bool) -> Action {
        match action {
            Action::Open { .. } if self.position.is_some() || final_bar => Action::Hold,
            Action::Open {
                direction,
                sl_index,
                tp_index,
            } => {
                let (sl_index, tp_index) = self.action_space.clamp(sl_index, tp_index);
                Action::Open {
                    direction,
                    sl_index,
                    tp_index,
                }
            }
            Action::CloseExplicit if self.position.is_none() => Action::Hold,
            other => other,
        }
    }

    /// Threshold, holding-time and end-of-data exits, in that order.
    fn evaluate_exits(
        &mut self,
        bar: &Bar,
        step_index: usize,
        last_index: usize,
    ) -> Option<TradeRecord> {
        let position = self.position.as_ref()?;

        if let Some((reason, price)) = position.threshold_exit(bar) {
            return self.close_position(price, bar, step_index, reason);
        }

        if let Some(max_bars) = self.config.max_holding_bars {
            if position.bars_held(step_index) >= max_bars {
                return self.close_position(bar.close, bar, step_index, ExitReason::TimeExit);
            }
        }

        if step_index >= last_index {
            return self.close_position(bar.close, bar, step_index, ExitReason::EndOfData);
        }

        None
    }

    fn close_position(
        &mut self,
        price: f64,
        bar: &Bar,
        step_index: usize,
        reason: ExitReason,
    ) -> Option<TradeRecord> {
        let position = self.position.take()?;
        let trade = position.close(price, bar.timestamp, step_index, reason);
        debug!(
            "Closed {} at {} ({}) on step {}: pnl {}",
            trade.direction.as_str(),
            trade.exit_price,
            reason.as_str(),
            step_index,
            trade.pnl
        );
        Some(trade)
    }

    fn unrealized_pnl_at(&self, price: f64) -> f64 {
        self.position
            .as_ref()
            .map_or(0.0, |position| position.pnl_at(price))
    }

    pub fn state(&self) -> EnvState {
        match self.cursor {
            None => EnvState::Idle,
            Some(cursor) if cursor.terminal => EnvState::Done,
            Some(_) if self.position.is_some() => EnvState::InPosition,
            Some(_) => EnvState::Flat,
        }
    }

    pub fn observe(&self, step_index: usize) -> EnvResult<Observation> {
        self.window.observe(step_index)
    }

    pub fn current_step_index(&self) -> Option<usize> {
        self.cursor.map(|cursor| cursor.current_step_index)
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn equity(&self) -> f64 {
        self.ledger.snapshot_equity()
    }

    pub fn last_trade_info(&self) -> Option<&TradeRecord> {
        self.last_trade_info.as_ref()
    }

    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    pub fn trade_history(&self) -> &[TradeRecord] {
        self.ledger.trade_history()
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn action_space(&self) -> ActionSpace {
        self.action_space
    }

    pub fn observation_shape(&self) -> (usize, usize) {
        self.window.shape()
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn series(&self) -> &PriceSeries {
        self.window.series()
    }
}
