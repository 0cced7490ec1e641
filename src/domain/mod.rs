//! Core domain types and logic.

pub mod error;
pub mod price;
pub mod splitter;
pub mod signal;
pub mod allocation;
pub mod portfolio;
pub mod execution;
pub mod risk;
pub mod objective;
pub mod backtest;
pub mod params;
pub mod strategy;
pub mod search;
pub mod optimizer;
pub mod walk_forward;
pub mod aggregate;
pub mod config_validation;
