#[derive(Debug, Clone, Copy)]
pub struct KellyQuote {
    /// Win probability for the side taken
    pub p_side: f64,
    /// Price paid per share for the side taken
    pub price: f64,
    pub f_raw: f64,
    /// Full Kelly clamped to [0, 1]
    pub f_kelly: f64,
    /// Kelly after the conservative multiplier
    pub f_applied: f64,
    /// f_applied x bankroll
    pub notional: f64,
}

/// Binary-contract Kelly: a share costs `price` and pays 1, so
/// f* = (p - m) / (1 - m).
pub fn compute_fractional_kelly(p_side: f64, price: f64, multiplier: f64, bankroll: f64) -> KellyQuote {
    let f_raw = if !p_side.is_finite() || !price.is_finite() || price >= 1.0 {
        0.0
    } else {
        (p_side - price) / (1.0 - price)
    };
    let f_kelly = f_raw.clamp(0.0, 1.0);
    let f_applied = f_kelly * multiplier.clamp(0.0, 1.0);
    let notional = if bankroll.is_finite() && bankroll > 0.0 {
        f_applied * bankroll
    } else {
        0.0
    };

    KellyQuote {
        p_side,
        price,
        f_raw,
        f_kelly,
        f_applied,
        notional,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kelly_zero_when_negative_edge() {
        let q = compute_fractional_kelly(0.45, 0.50, 0.25, 500.0);
        assert!(q.f_raw < 0.0);
        assert_eq!(q.f_applied, 0.0);
        assert_eq!(q.notional, 0.0);
    }

    #[test]
    fn quarter_kelly_sizes_worked_example() {
        let q = compute_fractional_kelly(0.80, 0.55, 0.25, 500.0);
        assert!((q.f_kelly - 0.5556).abs() < 1e-4);
        assert!((q.f_applied - 0.1389).abs() < 1e-4);
        assert!((q.notional - 69.44).abs() < 0.01);
    }

    #[test]
    fn price_at_one_sizes_nothing() {
        let q = compute_fractional_kelly(0.99, 1.0, 0.25, 500.0);
        assert_eq!(q.f_kelly, 0.0);
        let q = compute_fractional_kelly(f64::NAN, 0.5, 0.25, 500.0);
        assert_eq!(q.notional, 0.0);
    }
}
