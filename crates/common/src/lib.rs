pub mod backtest;
mod config;
mod error;
mod exchange;
pub mod symbols;
mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use exchange::ExchangeData;
pub use types::*;
