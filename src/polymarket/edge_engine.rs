use super::kelly::{compute_fractional_kelly, KellyQuote};
use super::market_state::{Confidence, Side};

#[derive(Debug, Clone, Copy)]
pub struct EdgeQuote {
    /// Modeled YES probability
    pub p_model: f64,
    /// Executable YES price
    pub p_market: f64,
    /// p_model - p_market
    pub edge: f64,
    pub side: Side,
    pub qualifies: bool,
}

impl EdgeQuote {
    pub fn abs_edge(&self) -> f64 {
        self.edge.abs()
    }

    pub fn confidence(&self) -> Confidence {
        Confidence::from_edge(self.abs_edge())
    }

    /// Size the side this quote points at.
    pub fn size(&self, multiplier: f64, bankroll: f64) -> KellyQuote {
        compute_fractional_kelly(
            self.side.frame(self.p_model),
            self.side.frame(self.p_market),
            multiplier,
            bankroll,
        )
    }
}

/// Absorbs f64 representation error in `p_model - p_market` only.
const EDGE_EPSILON: f64 = 1e-12;

/// Compare modeled and market YES probabilities.
/// A bucket qualifies when |edge| reaches `min_edge` (inclusive).
pub fn estimate_edge(p_model: f64, p_market: f64, min_edge: f64) -> EdgeQuote {
    let edge = p_model - p_market;
    let side = if edge >= 0.0 { Side::Yes } else { Side::No };
    // 0.30 - 0.20 evaluates to 0.09999999999999998
    let qualifies = edge.is_finite() && edge != 0.0 && edge.abs() >= min_edge - EDGE_EPSILON;

    EdgeQuote {
        p_model,
        p_market,
        edge,
        side,
        qualifies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_inclusive() {
        assert!(estimate_edge(0.80, 0.70, 0.10).qualifies);
        assert!(!estimate_edge(0.79, 0.70, 0.10).qualifies);
        assert!(estimate_edge(0.30, 0.20, 0.10).qualifies);
    }

    #[test]
    fn edge_just_below_threshold_does_not_qualify() {
        assert!(!estimate_edge(0.80 - 1e-7, 0.70, 0.10).qualifies);
        assert!(!estimate_edge(0.70, 0.80 - 1e-9, 0.10).qualifies);
    }

    #[test]
    fn negative_edge_buys_no() {
        let q = estimate_edge(0.20, 0.45, 0.10);
        assert_eq!(q.side, Side::No);
        assert!((q.edge + 0.25).abs() < 1e-12);
        let k = q.size(0.25, 500.0);
        // NO at 0.55 with modeled 0.80
        assert!((k.price - 0.55).abs() < 1e-12);
        assert!((k.notional - 69.44).abs() < 0.01);
        assert_eq!(q.confidence(), Confidence::High);
    }
}
