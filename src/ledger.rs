use crate::models::TradeRecord;

/// Realized account state for one episode.
#[derive(Debug, Clone)]
pub struct AccountLedger {
    starting_equity: f64,
    equity: f64,
    trade_history: Vec<TradeRecord>,
}

impl AccountLedger {
    pub fn new(starting_equity: f64) -> Self {
        Self {
            starting_equity,
            equity: starting_equity,
            trade_history: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.equity = self.starting_equity;
        self.trade_history.clear();
    }

    /// The only path that changes equity.
    pub fn record_trade(&mut self, trade: TradeRecord) {
        self.equity += trade.pnl;
        self.trade_history.push(trade);
    }

    pub fn snapshot_equity(&self) -> f64 {
        self.equity
    }

    pub fn mark_to_market(&self, unrealized_pnl: f64) -> f64 {
        self.equity + unrealized_pnl
    }

    pub fn starting_equity(&self) -> f64 {
        self.starting_equity
    }

    pub fn realized_pnl(&self) -> f64 {
        self.trade_history.iter().map(|trade| trade.pnl).sum()
    }

    pub fn trade_history(&self) -> &[TradeRecord] {
        &self.trade_history
    }

    pub fn last_trade(&self) -> Option<&TradeRecord> {
        self.trade_history.last()
    }
}
