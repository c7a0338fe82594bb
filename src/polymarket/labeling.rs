use super::market_state::{ResolvedOutcome, Side};
use crate::types::TradeStatus;

/// Outcome of a held side once its bucket settles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLabel {
    pub status: TradeStatus,
    /// Per-share payout for the held side
    pub payout: f64,
}

/// Label a position from the bucket's YES settlement.
/// A void settlement refunds at the entry price.
pub fn label_from_resolution(side: Side, resolved: ResolvedOutcome, entry_price: f64) -> ResolvedLabel {
    let won = match resolved {
        ResolvedOutcome::Yes => side == Side::Yes,
        ResolvedOutcome::No => side == Side::No,
        ResolvedOutcome::Invalid => {
            return ResolvedLabel {
                status: TradeStatus::Void,
                payout: entry_price,
            }
        }
    };
    if won {
        ResolvedLabel {
            status: TradeStatus::ResolvedWin,
            payout: 1.0,
        }
    } else {
        ResolvedLabel {
            status: TradeStatus::ResolvedLoss,
            payout: 0.0,
        }
    }
}

/// Realized P&L for a position bought at `entry_price` with `notional` USDC:
/// shares = notional / entry, pnl = (payout - entry) x shares.
pub fn realized_pnl(payout: f64, entry_price: f64, notional: f64) -> f64 {
    if entry_price <= 0.0 || !entry_price.is_finite() {
        return 0.0;
    }
    (payout - entry_price) * notional / entry_price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_side_wins_when_yes_settles_zero() {
        let label = label_from_resolution(Side::No, ResolvedOutcome::No, 0.40);
        assert_eq!(label.status, TradeStatus::ResolvedWin);
        assert_eq!(label.payout, 1.0);
    }

    #[test]
    fn pnl_scales_with_shares() {
        // $60 at 0.60 buys 100 shares; winning pays $100
        assert!((realized_pnl(1.0, 0.60, 60.0) - 40.0).abs() < 1e-9);
        assert!((realized_pnl(0.0, 0.60, 60.0) + 60.0).abs() < 1e-9);
        let void = label_from_resolution(Side::Yes, ResolvedOutcome::Invalid, 0.60);
        assert_eq!(void.status, TradeStatus::Void);
        assert_eq!(realized_pnl(void.payout, 0.60, 60.0), 0.0);
    }
}
