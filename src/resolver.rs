//! Trade resolution
//!
//! Settles filled trades once their event date has passed. A trade that carries
//! a venue event reference settles only on venue data; everything else settles
//! on the observed value. Missing data leaves the trade open for a later pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::oracle::{
    with_retry, ObservationSource, ProviderRateLimiter, RetryPolicy, SettlementSource,
};
use crate::persistence::LedgerStore;
use crate::polymarket::{label_from_resolution, realized_pnl, ResolvedOutcome};
use crate::types::{Resolution, ResolutionSource, Trade, TradeStatus};

/// Counts from one resolution pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub resolved: usize,
    pub wins: usize,
    pub losses: usize,
    pub voids: usize,
    /// Event date not yet passed
    pub skipped_future: usize,
    /// Source had no answer (or failed); trade stays open
    pub unavailable: usize,
    pub total_pnl: f64,
}

impl ResolutionSummary {
    fn record(&mut self, resolution: &Resolution) {
        self.resolved += 1;
        self.total_pnl += resolution.realized_pnl;
        match resolution.status {
            TradeStatus::ResolvedWin => self.wins += 1,
            TradeStatus::ResolvedLoss => self.losses += 1,
            _ => self.voids += 1,
        }
    }
}

pub struct Resolver<'a> {
    settlements: &'a dyn SettlementSource,
    observations: &'a dyn ObservationSource,
    retry: RetryPolicy,
    throttle: Option<&'a ProviderRateLimiter>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        settlements: &'a dyn SettlementSource,
        observations: &'a dyn ObservationSource,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            settlements,
            observations,
            retry,
            throttle: None,
        }
    }

    /// Share a per-provider rate limiter with the rest of the engine.
    pub fn with_throttle(mut self, throttle: Option<&'a ProviderRateLimiter>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Work out the resolution for one trade without writing it.
    pub async fn determine(&self, trade: &Trade, now: DateTime<Utc>) -> Result<Resolution> {
        if trade.status.is_resolved() || trade.resolution.is_some() {
            return Err(EngineError::AlreadyResolved(trade.id.clone()));
        }
        if trade.status != TradeStatus::Filled {
            return Err(EngineError::InvalidTransition {
                trade_id: trade.id.clone(),
                from: trade.status.to_string(),
                to: "resolved".to_string(),
            });
        }
        let ctx = &trade.context;
        if ctx.event_date >= now.date_naive() {
            return Err(EngineError::ResolutionUnavailable {
                trade_id: trade.id.clone(),
                detail: format!("event date {} has not passed", ctx.event_date),
            });
        }

        let unavailable = |detail: String| EngineError::ResolutionUnavailable {
            trade_id: trade.id.clone(),
            detail,
        };

        let (outcome, source, observed_value) = match &ctx.venue_event_ref {
            Some(event_ref) => {
                let settlement = with_retry(&self.retry, self.throttle, self.settlements.name(), || {
                    self.settlements.settlement(event_ref)
                })
                .await?
                .ok_or_else(|| unavailable(format!("venue event {event_ref} not settled")))?;
                let yes_price = settlement.get(&trade.instrument_id).copied().ok_or_else(|| {
                    unavailable(format!(
                        "no settlement price for {} in {event_ref}",
                        trade.instrument_id
                    ))
                })?;
                (
                    ResolvedOutcome::from_settlement_price(yes_price),
                    ResolutionSource::Venue,
                    None,
                )
            }
            None => {
                let value = with_retry(&self.retry, self.throttle, self.observations.name(), || {
                    self.observations
                        .observed(&ctx.location, ctx.event_date, ctx.metric)
                })
                .await?
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    unavailable(format!(
                        "no {} observation for {} on {}",
                        ctx.metric, ctx.location, ctx.event_date
                    ))
                })?;
                let outcome = if ctx.outcome.contains(value) {
                    ResolvedOutcome::Yes
                } else {
                    ResolvedOutcome::No
                };
                (outcome, ResolutionSource::Observation, Some(value))
            }
        };

        let entry = trade.entry_price();
        let label = label_from_resolution(trade.side, outcome, entry);
        Ok(Resolution {
            status: label.status,
            payout: label.payout,
            realized_pnl: realized_pnl(label.payout, entry, trade.committed_notional()),
            source,
            observed_value,
            resolved_at: now,
        })
    }

    /// Resolve and record one trade by id.
    pub async fn resolve_trade<L: LedgerStore + ?Sized>(
        &self,
        ledger: &mut L,
        trade_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Trade> {
        let trade = ledger
            .trade(trade_id)
            .ok_or_else(|| EngineError::UnknownTrade(trade_id.to_string()))?;
        let resolution = self.determine(&trade, now).await?;
        let updated = ledger.record_resolution(trade_id, &resolution)?;
        info!(
            trade_id,
            instrument = %updated.instrument_id,
            status = %resolution.status,
            source = %resolution.source,
            pnl = resolution.realized_pnl,
            "Trade resolved"
        );
        Ok(updated)
    }

    /// Resolve every filled trade whose event date has passed.
    ///
    /// Unavailable data and provider failures leave the trade open; ledger
    /// failures abort the pass.
    pub async fn resolve_due<L: LedgerStore + ?Sized>(
        &self,
        ledger: &mut L,
        now: DateTime<Utc>,
    ) -> Result<ResolutionSummary> {
        let today = now.date_naive();
        let mut summary = ResolutionSummary::default();

        let open: Vec<Trade> = ledger
            .trades()
            .into_iter()
            .filter(|t| t.status == TradeStatus::Filled)
            .collect();

        for trade in open {
            if trade.context.event_date >= today {
                summary.skipped_future += 1;
                continue;
            }
            match self.resolve_trade(ledger, &trade.id, now).await {
                Ok(updated) => {
                    if let Some(resolution) = &updated.resolution {
                        summary.record(resolution);
                    }
                }
                Err(err @ EngineError::LedgerWriteFailed(_)) => return Err(err),
                Err(EngineError::AlreadyResolved(_)) => {}
                Err(err) => {
                    warn!(trade_id = %trade.id, reason = err.code(), error = %err, "Resolution deferred");
                    summary.unavailable += 1;
                }
            }
        }

        info!(
            resolved = summary.resolved,
            wins = summary.wins,
            losses = summary.losses,
            voids = summary.voids,
            skipped_future = summary.skipped_future,
            unavailable = summary.unavailable,
            pnl = summary.total_pnl,
            "Resolution pass complete"
        );
        Ok(summary)
    }
}
