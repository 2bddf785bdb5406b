//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod signal;
pub mod trailing;
pub mod position;
pub mod ledger;
pub mod execution;
pub mod strategy;
pub mod preset;
pub mod symbol_data;
pub mod backtest;
pub mod metrics;
pub mod universe;
pub mod config_validation;
pub mod error;
