//! Prediction-market pricing helpers: edge, sizing, settlement labels.

pub mod edge_engine;
pub mod kelly;
pub mod labeling;
pub mod market_state;

pub use edge_engine::{estimate_edge, EdgeQuote};
pub use kelly::{compute_fractional_kelly, KellyQuote};
pub use labeling::{label_from_resolution, realized_pnl, ResolvedLabel};
pub use market_state::{Confidence, ResolvedOutcome, Side};
