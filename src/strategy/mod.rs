//! Trading Engine - one cycle of forecast-vs-market trading
//!
//! A cycle runs three passes against the ledger it owns:
//! 1. Resolve trades whose event date has passed, so realized P&L is current
//! 2. Scan: model each event, detect edge per bucket, size with fractional Kelly
//! 3. Execute: risk-check each candidate, log the intent, paper-fill, record
//!
//! Cycle methods take `&mut self`, so two cycles can never interleave on the
//! same ledger. The risk view is rebuilt from a ledger snapshot at the start of
//! every execute pass.

pub mod report;

pub use report::{Candidate, CycleReport, ExecuteReport, ScanReport, SkipRecord, SkipStage};

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::future::join_all;
use std::cmp::Ordering;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::distribution::build_distribution;
use crate::error::{EngineError, Result};
use crate::oracle::{
    with_retry, ForecastProvider, MarketDataProvider, ObservationSource, ProviderRateLimiter,
    SettlementSource,
};
use crate::paper_trading::{FillOutcome, PaperExecutor};
use crate::persistence::LedgerStore;
use crate::polymarket::estimate_edge;
use crate::resolver::{ResolutionSummary, Resolver};
use crate::risk::{RiskDecision, RiskLimiter, RiskState};
use crate::types::{
    DailySnapshot, Forecast, MarketEvent, Signal, Trade, TradeContext, TradeStatus,
};

/// External collaborators for a full cycle
pub struct Providers<'a> {
    pub markets: &'a dyn MarketDataProvider,
    pub forecasts: &'a dyn ForecastProvider,
    pub settlements: &'a dyn SettlementSource,
    pub observations: &'a dyn ObservationSource,
}

pub struct TradingEngine<L: LedgerStore> {
    config: EngineConfig,
    ledger: L,
    limiter: RiskLimiter,
    executor: PaperExecutor,
    throttle: Option<ProviderRateLimiter>,
}

impl<L: LedgerStore> TradingEngine<L> {
    /// Build an engine; rejects out-of-range configuration.
    pub fn new(config: EngineConfig, ledger: L) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            limiter: RiskLimiter::new(config.risk.clone()),
            executor: PaperExecutor::new(config.executor.clone()),
            throttle: ProviderRateLimiter::new(
                config.rate_limit.requests_per_second,
                config.rate_limit.burst,
            ),
            config,
            ledger,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Risk view derived from the current ledger contents
    pub fn risk_state(&self, today: NaiveDate) -> RiskState {
        RiskState::from_trades(&self.ledger.trades(), &self.config.risk, today)
    }

    /// Resolve, scan, execute.
    pub async fn run_cycle(&mut self, providers: &Providers<'_>, now: DateTime<Utc>) -> Result<CycleReport> {
        let today = now.date_naive();
        info!(%today, "Cycle started");

        let resolution = self
            .resolve(providers.settlements, providers.observations, now)
            .await?;
        let scan = self.scan(providers.markets, providers.forecasts, now).await?;
        let execution = self.execute(&scan.candidates, now)?;

        info!(
            resolved = resolution.resolved,
            signals = scan.candidates.len(),
            filled = execution.filled.len(),
            cancelled = execution.cancelled.len(),
            skips = scan.skips.len() + execution.skips.len(),
            "Cycle complete"
        );

        Ok(CycleReport {
            resolution,
            scan,
            execution,
        })
    }

    /// Settle every due trade.
    pub async fn resolve(
        &mut self,
        settlements: &dyn SettlementSource,
        observations: &dyn ObservationSource,
        now: DateTime<Utc>,
    ) -> Result<ResolutionSummary> {
        let resolver = Resolver::new(settlements, observations, self.config.retry.clone())
            .with_throttle(self.throttle.as_ref());
        resolver.resolve_due(&mut self.ledger, now).await
    }

    // ─────────────────────────────────────────────────────────────────
    // Scan
    // ─────────────────────────────────────────────────────────────────

    /// Model every eligible event and return sized, ordered candidates.
    /// Read-only against the ledger.
    pub async fn scan(
        &self,
        markets: &dyn MarketDataProvider,
        forecasts: &dyn ForecastProvider,
        now: DateTime<Utc>,
    ) -> Result<ScanReport> {
        let today = now.date_naive();
        let policy = &self.config.retry;
        let throttle = self.throttle.as_ref();
        let events = with_retry(policy, throttle, markets.name(), || markets.events()).await?;

        let mut report = ScanReport {
            events_seen: events.len(),
            ..Default::default()
        };

        let eligible: Vec<MarketEvent> = events
            .into_iter()
            .filter(|event| match self.screen_event(event, today) {
                Ok(()) => true,
                Err(err) => {
                    debug!(event = %event.event_id, reason = err.code(), error = %err, "Event skipped");
                    report
                        .skips
                        .push(SkipRecord::new(SkipStage::Scan, &event.event_id, None, &err));
                    false
                }
            })
            .collect();

        let fetched = join_all(eligible.iter().map(|event| {
            with_retry(policy, throttle, forecasts.name(), move || {
                forecasts.forecast(&event.location, event.event_date)
            })
        }))
        .await;

        let state = self.risk_state(today);
        let bankroll = state.current_bankroll(&self.config.risk);

        for (event, forecast) in eligible.iter().zip(fetched) {
            let forecast = match forecast.and_then(|f| self.check_forecast(event, f, now)) {
                Ok(forecast) => forecast,
                Err(err) => {
                    warn!(event = %event.event_id, reason = err.code(), error = %err, "Forecast unusable");
                    report
                        .skips
                        .push(SkipRecord::new(SkipStage::Scan, &event.event_id, None, &err));
                    continue;
                }
            };
            self.scan_event(event, &forecast, today, bankroll, &mut report);
        }

        report.candidates.sort_by(|a, b| {
            a.signal
                .horizon_days
                .cmp(&b.signal.horizon_days)
                .then_with(|| {
                    b.signal
                        .edge
                        .abs()
                        .partial_cmp(&a.signal.edge.abs())
                        .unwrap_or(Ordering::Equal)
                })
        });

        info!(
            events = report.events_seen,
            modeled = report.events_modeled,
            buckets = report.buckets_evaluated,
            signals = report.candidates.len(),
            budget_scaled = report.budget_scaled,
            skips = report.skips.len(),
            "Scan complete"
        );
        Ok(report)
    }

    fn screen_event(&self, event: &MarketEvent, today: NaiveDate) -> Result<()> {
        let horizon = event.horizon_days(today);
        if horizon < 0 {
            return Err(EngineError::insufficient(
                &event.event_id,
                format!("event date {} already past", event.event_date),
            ));
        }
        if horizon > self.config.distribution.max_horizon_days {
            return Err(EngineError::insufficient(
                &event.event_id,
                format!(
                    "horizon {horizon}d beyond {}d",
                    self.config.distribution.max_horizon_days
                ),
            ));
        }
        let volume = event.total_volume();
        if volume < self.config.scan.min_volume {
            return Err(EngineError::insufficient(
                &event.event_id,
                format!(
                    "volume ${volume:.2} below ${:.2}",
                    self.config.scan.min_volume
                ),
            ));
        }
        Ok(())
    }

    fn check_forecast(
        &self,
        event: &MarketEvent,
        forecast: Option<Forecast>,
        now: DateTime<Utc>,
    ) -> Result<Forecast> {
        let forecast = forecast.ok_or_else(|| {
            EngineError::insufficient(
                &event.event_id,
                format!("no forecast for {} on {}", event.location, event.event_date),
            )
        })?;
        let age = forecast.age_hours(now);
        if age > self.config.scan.max_forecast_age_hours {
            return Err(EngineError::insufficient(
                &event.event_id,
                format!(
                    "forecast is {age:.1}h old (max {:.1}h)",
                    self.config.scan.max_forecast_age_hours
                ),
            ));
        }
        Ok(forecast)
    }

    fn scan_event(
        &self,
        event: &MarketEvent,
        forecast: &Forecast,
        today: NaiveDate,
        bankroll: f64,
        report: &mut ScanReport,
    ) {
        let horizon = event.horizon_days(today);
        let distribution =
            match build_distribution(event, forecast, horizon, &self.config.distribution) {
                Ok(distribution) => distribution,
                Err(err) => {
                    warn!(event = %event.event_id, reason = err.code(), error = %err, "Distribution failed");
                    report
                        .skips
                        .push(SkipRecord::new(SkipStage::Scan, &event.event_id, None, &err));
                    return;
                }
            };
        report.events_modeled += 1;

        let mut signals: Vec<Candidate> = Vec::new();
        for bucket in &event.buckets {
            report.buckets_evaluated += 1;
            let Some(p_model) = distribution.get(&bucket.instrument_id) else {
                continue;
            };
            let Some(p_market) = bucket.executable_price() else {
                let err = EngineError::insufficient(&bucket.instrument_id, "no executable price");
                report.skips.push(SkipRecord::new(
                    SkipStage::Scan,
                    &event.event_id,
                    Some(&bucket.instrument_id),
                    &err,
                ));
                continue;
            };

            let quote = estimate_edge(p_model, p_market, self.config.min_edge_threshold);
            if !quote.qualifies {
                continue;
            }
            let kelly = quote.size(self.config.kelly_multiplier, bankroll);
            if kelly.notional <= 0.0 {
                let err = EngineError::insufficient(
                    &bucket.instrument_id,
                    format!("zero Kelly size at price {:.4}", kelly.price),
                );
                report.skips.push(
                    SkipRecord::new(
                        SkipStage::Scan,
                        &event.event_id,
                        Some(&bucket.instrument_id),
                        &err,
                    )
                    .with_inputs(quote.edge, 0.0),
                );
                continue;
            }

            debug!(
                instrument = %bucket.instrument_id,
                p_model,
                p_market,
                edge = quote.edge,
                side = %quote.side,
                kelly = kelly.f_kelly,
                notional = kelly.notional,
                "Signal"
            );

            signals.push(Candidate {
                signal: Signal {
                    event_id: event.event_id.clone(),
                    instrument_id: bucket.instrument_id.clone(),
                    bucket_label: bucket.label.clone(),
                    modeled_probability: p_model,
                    market_price: p_market,
                    edge: quote.edge,
                    side: quote.side,
                    kelly_fraction: kelly.f_kelly,
                    applied_fraction: kelly.f_applied,
                    recommended_notional: kelly.notional,
                    horizon_days: horizon,
                    confidence: quote.confidence(),
                },
                context: TradeContext {
                    venue_event_ref: event.venue_event_ref.clone(),
                    location: event.location.clone(),
                    metric: event.metric,
                    outcome: bucket.outcome,
                    event_date: event.event_date,
                },
                book: bucket.book.clone(),
            });
        }

        signals.sort_by(|a, b| {
            b.signal
                .edge
                .abs()
                .partial_cmp(&a.signal.edge.abs())
                .unwrap_or(Ordering::Equal)
        });
        let limit = self.config.scan.max_buckets_per_event;
        if signals.len() > limit {
            report.dropped_by_bucket_limit += signals.len() - limit;
            signals.truncate(limit);
        }

        // Buckets of one event are mutually exclusive; together they get one cap.
        let total: f64 = signals.iter().map(|c| c.signal.recommended_notional).sum();
        let cap = self.config.risk.position_cap();
        if total > cap {
            let scale = cap / total;
            debug!(event = %event.event_id, total, cap, scale, "Scaling event budget");
            for candidate in &mut signals {
                candidate.signal.recommended_notional *= scale;
                candidate.signal.applied_fraction *= scale;
            }
            report.budget_scaled += 1;
        }
        report.candidates.extend(signals);
    }

    // ─────────────────────────────────────────────────────────────────
    // Execute
    // ─────────────────────────────────────────────────────────────────

    /// Risk-check, log and paper-fill candidates in order.
    ///
    /// Per-candidate rejections are recorded and skipped; a halt stops the
    /// remaining candidates; a ledger failure aborts the pass.
    pub fn execute(&mut self, candidates: &[Candidate], now: DateTime<Utc>) -> Result<ExecuteReport> {
        let today = now.date_naive();
        let mut state = self.risk_state(today);
        let mut report = ExecuteReport::default();

        for (i, candidate) in candidates.iter().enumerate() {
            let signal = &candidate.signal;
            let recommended = signal.recommended_notional;
            let group = candidate.context.correlation_key();

            let notional = match self
                .limiter
                .evaluate(&state, &signal.instrument_id, &group, recommended)
            {
                RiskDecision::Admitted { notional, capped } => {
                    if capped {
                        report.capped += 1;
                    }
                    notional
                }
                RiskDecision::Rejected(err) => {
                    if let EngineError::Halted(reason) = &err {
                        report.halted = Some(*reason);
                    }
                    let affected = if err.is_batch_wide() {
                        &candidates[i..]
                    } else {
                        &candidates[i..=i]
                    };
                    for skipped in affected {
                        report.skips.push(
                            SkipRecord::new(
                                SkipStage::Risk,
                                &skipped.signal.event_id,
                                Some(&skipped.signal.instrument_id),
                                &err,
                            )
                            .with_inputs(skipped.signal.edge, skipped.signal.recommended_notional),
                        );
                    }
                    if err.is_batch_wide() {
                        break;
                    }
                    continue;
                }
            };

            let trade = Trade::intent(signal, notional, candidate.context.clone(), now);
            if let Err(err) = self.ledger.append_intent(&trade) {
                error!(instrument = %trade.instrument_id, error = %err, "Failed to log intent");
                return Err(err);
            }
            state.record_admission(&trade.instrument_id, &group, notional);
            info!(
                trade_id = %trade.id,
                instrument = %trade.instrument_id,
                side = %trade.side,
                edge = signal.edge,
                notional,
                confidence = %signal.confidence,
                "Intent logged"
            );

            match self.executor.fill(&trade, &candidate.book, now)? {
                FillOutcome::Filled(fill) => {
                    let filled = self.ledger.mark_filled(&trade.id, &fill).map_err(|write_err| {
                        error!(trade_id = %trade.id, error = %write_err, "Failed to record fill");
                        write_err
                    })?;
                    state.record_fill(&trade.instrument_id, &group, notional, fill.notional);
                    report.filled.push(filled);
                }
                FillOutcome::Rejected(err) => {
                    let cancelled = self
                        .ledger
                        .mark_cancelled(&trade.id, err.code())
                        .map_err(|write_err| {
                            error!(trade_id = %trade.id, error = %write_err, "Failed to record cancel");
                            write_err
                        })?;
                    state.release(&trade.instrument_id, &group, notional);
                    report.skips.push(
                        SkipRecord::new(
                            SkipStage::Execution,
                            &signal.event_id,
                            Some(&signal.instrument_id),
                            &err,
                        )
                        .with_inputs(signal.edge, notional),
                    );
                    report.cancelled.push(cancelled);
                }
            }
        }

        if report.halted.is_none() {
            report.halted = self.limiter.halt_reason(&state);
        }
        report.snapshot = self.write_daily_snapshot(today)?;
        Ok(report)
    }

    /// Write today's snapshot if none exists yet; returns it when written.
    pub fn write_daily_snapshot(&mut self, today: NaiveDate) -> Result<Option<DailySnapshot>> {
        let trades = self.ledger.trades();
        let snapshot = daily_snapshot(&trades, &self.config, today);
        if self.ledger.write_snapshot(&snapshot)? {
            info!(
                date = %today,
                cash = snapshot.cash,
                at_risk = snapshot.at_risk,
                pnl = snapshot.realized_pnl,
                "Daily snapshot written"
            );
            Ok(Some(snapshot))
        } else {
            Ok(None)
        }
    }
}

/// End-of-day rollup derived from the ledger
pub fn daily_snapshot(trades: &[Trade], config: &EngineConfig, date: NaiveDate) -> DailySnapshot {
    let state = RiskState::from_trades(trades, &config.risk, date);
    let trade_count = trades
        .iter()
        .filter(|t| t.created_at.date_naive() == date && t.status != TradeStatus::Cancelled)
        .count();

    DailySnapshot {
        snapshot_date: date,
        cash: state.bankroll - state.committed,
        at_risk: state.committed,
        realized_pnl: state.realized_today,
        trade_count: trade_count as u32,
        open_positions: state.positions().len() as u32,
    }
}
