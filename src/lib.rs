pub mod action;
pub mod commands;
pub mod config;
pub mod data_loader;
pub mod environment;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod observation;
pub mod performance;
pub mod policy;
pub mod position;
pub mod price_series;
pub mod report;
pub mod vec_env;

pub use action::{Action, ActionSpace};
pub use config::{EnvironmentConfig, Instrument, InstrumentConfig};
pub use environment::{EnvState, MarketSimulationEnvironment, StepInfo, StepResult};
pub use errors::{EnvError, EnvResult};
pub use observation::Observation;
pub use price_series::PriceSeries;
pub use vec_env::VecEnvironment;
