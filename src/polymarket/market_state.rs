use serde::{Deserialize, Serialize};
use std::fmt;

/// Final state of a bucket's YES token at settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedOutcome {
    Yes,
    No,
    Invalid,
}

impl ResolvedOutcome {
    /// Map a venue settlement price for the YES token onto an outcome.
    /// Anything that is not a clean 0 or 1 is treated as a void settlement.
    pub fn from_settlement_price(yes_price: f64) -> Self {
        if !yes_price.is_finite() {
            return Self::Invalid;
        }
        if (yes_price - 1.0).abs() < 1e-6 {
            Self::Yes
        } else if yes_price.abs() < 1e-6 {
            Self::No
        } else {
            Self::Invalid
        }
    }
}

/// Side of a bucket a position is held on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn from_text(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            _ => None,
        }
    }

    /// Express a YES-framed probability or price from this side's point of view.
    pub fn frame(&self, yes_value: f64) -> f64 {
        match self {
            Side::Yes => yes_value,
            Side::No => 1.0 - yes_value,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Coarse conviction tier attached to a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn from_edge(abs_edge: f64) -> Self {
        if abs_edge >= 0.20 {
            Confidence::High
        } else if abs_edge >= 0.15 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}
