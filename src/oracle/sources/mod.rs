//! Provider implementations

mod snapshot;

pub use snapshot::{MarketSnapshot, ObservationRecord, OutcomeSnapshot, StaticSource};
