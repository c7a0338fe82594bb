//! wxedge Library
//!
//! Forecast-vs-market signal and risk engine for weather outcome markets:
//! distribution modeling, edge detection, fractional Kelly sizing, risk limits,
//! slippage-aware paper execution and an append-only resolution ledger.

pub mod clob;
pub mod config;
pub mod distribution;
pub mod error;
pub mod oracle;
pub mod paper_trading;
pub mod persistence;
pub mod polymarket;
pub mod resolver;
pub mod risk;
pub mod strategy;
pub mod types;

pub use error::{EngineError, HaltReason, Result};
