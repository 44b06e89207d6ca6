//! Pricewatch CLI: scan shop pages and inspect prices from a terminal.

pub mod config;
pub mod money_arg;
pub mod output;
pub mod prompt;

pub use config::{load_settings, resolve_settings_path};
pub use money_arg::parse_money;
