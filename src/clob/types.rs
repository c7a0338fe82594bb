//! CLOB Types - order book snapshot used by paper execution

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::polymarket::Side;

/// Order book level (size in shares)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

impl BookLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    /// Dollar notional resting at this level
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }

    fn is_valid(&self) -> bool {
        self.price.is_finite() && self.size.is_finite() && self.price > 0.0 && self.size > 0.0
    }
}

/// Order book for the YES token of one bucket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub token_id: String,
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    #[serde(default)]
    pub timestamp: i64,
}

impl OrderBook {
    pub fn new(token_id: impl Into<String>, bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> Self {
        let mut book = Self {
            token_id: token_id.into(),
            bids,
            asks,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        book.normalize_levels();
        book
    }

    /// Normalize raw book levels from snapshots:
    /// - keep only finite positive price/size
    /// - sort bids descending (best first)
    /// - sort asks ascending (best first)
    pub fn normalize_levels(&mut self) {
        self.bids.retain(BookLevel::is_valid);
        self.asks.retain(BookLevel::is_valid);

        self.bids
            .sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(Ordering::Equal));
        self.asks
            .sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));
    }

    /// Lowest valid YES offer
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks
            .iter()
            .filter(|level| level.is_valid())
            .min_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal))
    }

    /// Levels a buyer of `side` would lift, best first.
    ///
    /// Buying NO is the mirror of hitting YES bids: a YES bid at `p` for `n` shares
    /// is a NO offer at `1 - p` for the same `n` shares.
    pub fn buy_ladder(&self, side: Side) -> Vec<BookLevel> {
        let mut ladder: Vec<BookLevel> = match side {
            Side::Yes => self.asks.iter().copied().filter(BookLevel::is_valid).collect(),
            Side::No => self
                .bids
                .iter()
                .filter(|level| level.is_valid() && level.price < 1.0)
                .map(|level| BookLevel::new(1.0 - level.price, level.size))
                .collect(),
        };
        ladder.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));
        ladder
    }
}
