pub mod backtest;
pub mod inspect;
pub mod snapshot;
