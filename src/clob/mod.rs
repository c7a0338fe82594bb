//! Central limit order book snapshots
//!
//! The engine never places orders; it only reads resting liquidity to price
//! paper fills.

pub mod types;

pub use types::*;
