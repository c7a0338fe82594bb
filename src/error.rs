//! Engine error taxonomy
//!
//! Every decision point returns one of these (or a tagged decision enum) so that
//! callers can tell a per-instrument skip from a batch-wide stop.

use thiserror::Error;

/// Why trading was halted for the rest of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    KillSwitch,
    DailyLossLimit,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::KillSwitch => write!(f, "KILL_SWITCH"),
            HaltReason::DailyLossLimit => write!(f, "DAILY_LOSS_LIMIT"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Insufficient data for {instrument}: {detail}")]
    InsufficientData { instrument: String, detail: String },

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Trading halted: {0}")]
    Halted(HaltReason),

    #[error("Position full on {instrument}: existing ${existing:.2}, cap ${cap:.2}")]
    PositionFull {
        instrument: String,
        existing: f64,
        cap: f64,
    },

    #[error(
        "Bankroll exceeded on {instrument}: committed ${committed:.2} + ${requested:.2} > ${available:.2}"
    )]
    BankrollExceeded {
        instrument: String,
        committed: f64,
        requested: f64,
        available: f64,
    },

    #[error("Excessive slippage on {instrument}: vwap {vwap:.4} vs best {best:.4} (slippage {slippage:.4})")]
    ExcessiveSlippage {
        instrument: String,
        vwap: f64,
        best: f64,
        slippage: f64,
    },

    #[error("Insufficient depth on {instrument}: filled ${filled:.2} of ${requested:.2}")]
    InsufficientDepth {
        instrument: String,
        filled: f64,
        requested: f64,
    },

    #[error("Ledger write failed: {0}")]
    LedgerWriteFailed(String),

    #[error("Resolution unavailable for trade {trade_id}: {detail}")]
    ResolutionUnavailable { trade_id: String, detail: String },

    #[error("Trade {0} is already resolved")]
    AlreadyResolved(String),

    #[error("Unknown trade {0}")]
    UnknownTrade(String),

    #[error("Invalid trade transition for {trade_id}: {from} -> {to}")]
    InvalidTransition {
        trade_id: String,
        from: String,
        to: String,
    },

    #[error("Provider {provider} failed after {attempts} attempt(s): {detail}")]
    ProviderFailed {
        provider: String,
        attempts: u32,
        detail: String,
    },
}

impl EngineError {
    pub fn insufficient(instrument: impl Into<String>, detail: impl Into<String>) -> Self {
        EngineError::InsufficientData {
            instrument: instrument.into(),
            detail: detail.into(),
        }
    }

    /// Batch-wide errors stop the remaining candidates of a cycle.
    pub fn is_batch_wide(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigurationInvalid(_) | EngineError::Halted(_)
        )
    }

    /// Short stable code used in skip records and CSV rows.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            EngineError::ConfigurationInvalid(_) => "CONFIGURATION_INVALID",
            EngineError::Halted(_) => "HALTED",
            EngineError::PositionFull { .. } => "POSITION_FULL",
            EngineError::BankrollExceeded { .. } => "BANKROLL_EXCEEDED",
            EngineError::ExcessiveSlippage { .. } => "EXCESSIVE_SLIPPAGE",
            EngineError::InsufficientDepth { .. } => "INSUFFICIENT_DEPTH",
            EngineError::LedgerWriteFailed(_) => "LEDGER_WRITE_FAILED",
            EngineError::ResolutionUnavailable { .. } => "RESOLUTION_UNAVAILABLE",
            EngineError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            EngineError::UnknownTrade(_) => "UNKNOWN_TRADE",
            EngineError::InvalidTransition { .. } => "INVALID_TRANSITION",
            EngineError::ProviderFailed { .. } => "PROVIDER_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_config_and_halt_are_batch_wide() {
        assert!(EngineError::Halted(HaltReason::KillSwitch).is_batch_wide());
        assert!(EngineError::ConfigurationInvalid("x".into()).is_batch_wide());
        assert!(!EngineError::insufficient("m1", "no forecast").is_batch_wide());
        assert!(!EngineError::PositionFull {
            instrument: "m1".into(),
            existing: 10.0,
            cap: 10.0
        }
        .is_batch_wide());
    }
}
