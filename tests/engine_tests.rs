//! End-to-end cycle tests against in-memory and CSV ledgers

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use wxedge::clob::{BookLevel, OrderBook};
    use wxedge::config::EngineConfig;
    use wxedge::oracle::sources::StaticSource;
    use wxedge::oracle::RetryPolicy;
    use wxedge::persistence::{CsvLedger, LedgerReport, LedgerStore, MemoryLedger};
    use wxedge::polymarket::Side;
    use wxedge::strategy::{Providers, TradingEngine};
    use wxedge::types::{BucketOutcome, Forecast, MarketEvent, Metric, OutcomeBucket, TradeStatus};
    use wxedge::{EngineError, HaltReason};

    const NO_BUCKET: &str = "tok-84";
    const YES_BUCKET: &str = "tok-82";

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, d).unwrap()
    }

    fn at(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, d, 12, 0, 0).unwrap()
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.risk.position_cap_pct = 0.25;
        config.risk.daily_loss_limit_pct = 0.10;
        config.retry = RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 1,
            request_timeout_ms: 1_000,
        };
        config
    }

    fn bucket(id: &str, outcome: BucketOutcome, ask: f64, book: OrderBook) -> OutcomeBucket {
        OutcomeBucket {
            instrument_id: id.to_string(),
            label: id.to_string(),
            outcome,
            yes_bid: None,
            yes_ask: Some(ask),
            last_price: None,
            volume: 1_000.0,
            book,
        }
    }

    /// NYC high around a forecast of 82°F. With σ = 3 the 82-84 bucket is
    /// underpriced at 0.10 (YES) and the 84+ bucket overpriced at 0.60 (NO).
    fn event(id: &str, event_date: NaiveDate, no_bid_size: f64) -> MarketEvent {
        let ladder = |price: f64| OrderBook::new("", vec![], vec![BookLevel::new(price, 1_000.0)]);
        MarketEvent {
            event_id: id.to_string(),
            venue_event_ref: None,
            question: "Highest temperature in NYC".to_string(),
            location: "NYC".to_string(),
            event_date,
            metric: Metric::TemperatureHigh,
            buckets: vec![
                bucket(&format!("{id}-78"), BucketOutcome::below(78.0), 0.09, ladder(0.09)),
                bucket(&format!("{id}-80"), BucketOutcome::between(78.0, 80.0), 0.16, ladder(0.16)),
                bucket(&format!("{id}-82a"), BucketOutcome::between(80.0, 82.0), 0.25, ladder(0.25)),
                bucket(
                    &format!("{id}-{YES_BUCKET}"),
                    BucketOutcome::between(82.0, 84.0),
                    0.10,
                    ladder(0.10),
                ),
                bucket(
                    &format!("{id}-{NO_BUCKET}"),
                    BucketOutcome::above(84.0),
                    0.60,
                    OrderBook::new(
                        "",
                        vec![BookLevel::new(0.60, no_bid_size)],
                        vec![BookLevel::new(0.61, 1_000.0)],
                    ),
                ),
            ],
        }
    }

    fn forecast(event_date: NaiveDate, retrieved_at: DateTime<Utc>) -> Forecast {
        Forecast {
            location: "NYC".to_string(),
            forecast_date: event_date,
            retrieved_at,
            temperature_high: Some(82.0),
            temperature_low: None,
            precip_probability: None,
            narrative: String::new(),
        }
    }

    fn market(event_date: NaiveDate, now: DateTime<Utc>) -> StaticSource {
        StaticSource::default()
            .with_event(event("nyc", event_date, 500.0))
            .with_forecast(forecast(event_date, now - Duration::hours(1)))
    }

    /// Rain/no-rain event at even odds against a 90% rain forecast.
    fn rain_event(id: &str, location: &str, outcomes: &[bool]) -> MarketEvent {
        let book = || {
            OrderBook::new(
                "",
                vec![BookLevel::new(0.50, 1_000.0)],
                vec![BookLevel::new(0.50, 1_000.0)],
            )
        };
        MarketEvent {
            event_id: id.to_string(),
            venue_event_ref: None,
            question: format!("Will it rain in {location}?"),
            location: location.to_string(),
            event_date: date(4),
            metric: Metric::Precipitation,
            buckets: outcomes
                .iter()
                .map(|&positive| {
                    let name = if positive { "yes" } else { "no" };
                    bucket(
                        &format!("{id}-{name}"),
                        BucketOutcome::Boolean { positive },
                        0.50,
                        book(),
                    )
                })
                .collect(),
        }
    }

    fn rain_forecast(location: &str) -> Forecast {
        Forecast {
            location: location.to_string(),
            forecast_date: date(4),
            retrieved_at: at(3) - Duration::hours(1),
            temperature_high: None,
            temperature_low: None,
            precip_probability: Some(0.9),
            narrative: String::new(),
        }
    }

    fn providers(source: &StaticSource) -> Providers<'_> {
        Providers {
            markets: source,
            forecasts: source,
            settlements: source,
            observations: source,
        }
    }

    fn no_id() -> String {
        format!("nyc-{NO_BUCKET}")
    }

    fn yes_id() -> String {
        format!("nyc-{YES_BUCKET}")
    }

    // ============================================================================
    // Full cycle
    // ============================================================================

    #[tokio::test]
    async fn test_cycle_sizes_and_fills_both_sides() {
        let mut engine = TradingEngine::new(config(), MemoryLedger::new()).unwrap();
        let source = market(date(4), at(3));

        let report = engine.run_cycle(&providers(&source), at(3)).await.unwrap();

        assert_eq!(report.scan.events_modeled, 1);
        assert_eq!(report.scan.candidates.len(), 2);
        // Larger |edge| first
        assert_eq!(report.scan.candidates[0].signal.instrument_id, no_id());
        assert_eq!(report.scan.candidates[0].signal.side, Side::No);
        assert_eq!(report.scan.candidates[1].signal.side, Side::Yes);

        assert_eq!(report.execution.filled.len(), 2);
        let no = &report.execution.filled[0];
        assert_eq!(no.status, TradeStatus::Filled);
        assert!((no.committed_notional() - 72.40).abs() < 0.05);
        assert!((no.entry_price() - 0.40).abs() < 1e-9);
        let yes = &report.execution.filled[1];
        assert!((yes.committed_notional() - 20.49).abs() < 0.05);
        assert!((yes.entry_price() - 0.10).abs() < 1e-9);

        assert!(report.execution.halted.is_none());
        assert!(report.execution.snapshot.is_some());
        assert_eq!(engine.ledger().trades().len(), 2);
    }

    #[tokio::test]
    async fn test_repeat_cycles_double_down_up_to_cap() {
        let mut engine = TradingEngine::new(config(), MemoryLedger::new()).unwrap();
        let source = market(date(4), at(3));

        engine.run_cycle(&providers(&source), at(3)).await.unwrap();
        let second = engine.run_cycle(&providers(&source), at(3)).await.unwrap();
        // Both buckets share one NYC high-temperature group: 125 - 92.89 is left
        let topped_up = second
            .execution
            .filled
            .iter()
            .find(|t| t.instrument_id == no_id())
            .unwrap();
        assert!((topped_up.committed_notional() - 32.11).abs() < 0.05);
        assert_eq!(second.execution.capped, 1);
        assert_eq!(second.execution.filled.len(), 1);
        assert!(second
            .execution
            .skips
            .iter()
            .any(|s| s.instrument_id.as_deref() == Some(yes_id().as_str()) && s.reason == "POSITION_FULL"));

        let third = engine.run_cycle(&providers(&source), at(3)).await.unwrap();
        assert!(third
            .execution
            .filled
            .iter()
            .all(|t| t.instrument_id != no_id()));
        assert!(third
            .execution
            .skips
            .iter()
            .any(|s| s.reason == "POSITION_FULL"));

        let state = engine.risk_state(date(3));
        let group = engine.ledger().trades()[0].context.correlation_key();
        assert!((state.group_exposure(&group) - 125.0).abs() < 1e-6);
        assert!(state.exposure(&no_id()) <= 125.0 + 1e-6);
        assert!(state.exposure(&yes_id()) > 0.0);
    }

    #[tokio::test]
    async fn test_rain_and_no_rain_split_one_budget() {
        let mut engine = TradingEngine::new(config(), MemoryLedger::new()).unwrap();
        let source = StaticSource::default()
            .with_event(rain_event("chi", "Chicago", &[true, false]))
            .with_forecast(rain_forecast("Chicago"));

        let first = engine.run_cycle(&providers(&source), at(3)).await.unwrap();

        // Each side alone sizes to $100; together they are scaled to the $125 cap
        assert_eq!(first.scan.budget_scaled, 1);
        assert_eq!(first.scan.candidates.len(), 2);
        for candidate in &first.scan.candidates {
            assert!((candidate.signal.recommended_notional - 62.5).abs() < 1e-6);
            assert!((candidate.signal.applied_fraction - 0.125).abs() < 1e-9);
        }
        assert_eq!(first.execution.filled.len(), 2);
        let sides: Vec<Side> = first.execution.filled.iter().map(|t| t.side).collect();
        assert!(sides.contains(&Side::Yes) && sides.contains(&Side::No));
        let committed: f64 = first
            .execution
            .filled
            .iter()
            .map(|t| t.committed_notional())
            .sum();
        assert!((committed - 125.0).abs() < 1e-6);

        let second = engine.run_cycle(&providers(&source), at(3)).await.unwrap();
        assert!(second.execution.filled.is_empty());
        assert_eq!(second.execution.skips.len(), 2);
        assert!(second
            .execution
            .skips
            .iter()
            .all(|s| s.reason == "POSITION_FULL"));
        assert!((engine.risk_state(date(3)).committed - 125.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_committed_never_exceeds_ceiling_across_cycles() {
        let mut config = config();
        config.risk.position_cap_pct = 0.5;
        let mut engine = TradingEngine::new(config, MemoryLedger::new()).unwrap();
        let cities = ["NYC", "Chicago", "Los Angeles", "Seattle"];
        let source = cities.iter().fold(StaticSource::default(), |source, city| {
            source
                .with_event(rain_event(&city.to_lowercase(), city, &[true]))
                .with_forecast(rain_forecast(city))
        });

        let mut exceeded = 0;
        for cycle in 0..4 {
            let report = engine.run_cycle(&providers(&source), at(3)).await.unwrap();
            exceeded += report
                .execution
                .skips
                .iter()
                .filter(|s| s.reason == "BANKROLL_EXCEEDED")
                .count();
            let committed = engine.risk_state(date(3)).committed;
            assert!(committed <= 500.0 + 1e-6, "cycle {cycle}: committed {committed}");
            if cycle == 0 {
                assert_eq!(report.execution.filled.len(), 4);
                assert!((committed - 400.0).abs() < 1e-6);
            }
        }

        assert!(exceeded > 0);
        assert!((engine.risk_state(date(3)).committed - 500.0).abs() < 1e-6);
    }

    // ============================================================================
    // Halts
    // ============================================================================

    #[tokio::test]
    async fn test_kill_switch_halts_every_candidate() {
        let mut config = config();
        config.risk.kill_switch = true;
        let mut engine = TradingEngine::new(config, MemoryLedger::new()).unwrap();
        let source = market(date(4), at(3));

        let report = engine.run_cycle(&providers(&source), at(3)).await.unwrap();

        assert!(report.execution.filled.is_empty());
        assert_eq!(report.execution.halted, Some(HaltReason::KillSwitch));
        assert_eq!(report.execution.skips.len(), report.scan.candidates.len());
        assert!(report.execution.skips.iter().all(|s| s.reason == "HALTED"));
        assert!(engine.ledger().trades().is_empty());
    }

    #[tokio::test]
    async fn test_losses_resolved_before_scan_trip_daily_limit() {
        let mut engine = TradingEngine::new(config(), MemoryLedger::new()).unwrap();
        engine
            .run_cycle(&providers(&market(date(4), at(3))), at(3))
            .await
            .unwrap();

        // 85°F: the NO on 84+ and the YES on 82-84 both lose
        let next_day = StaticSource::default()
            .with_event(event("nyc", date(6), 500.0))
            .with_forecast(forecast(date(6), at(5) - Duration::hours(1)))
            .with_observation("NYC", date(4), Metric::TemperatureHigh, 85.0);
        let report = engine.run_cycle(&providers(&next_day), at(5)).await.unwrap();

        assert_eq!(report.resolution.resolved, 2);
        assert_eq!(report.resolution.losses, 2);
        assert!(report.resolution.total_pnl < -90.0);
        assert!(!report.scan.candidates.is_empty());
        assert!(report.execution.filled.is_empty());
        assert_eq!(report.execution.halted, Some(HaltReason::DailyLossLimit));

        let state = engine.risk_state(date(5));
        assert!((state.day_start_bankroll - 500.0).abs() < 1e-9);
        assert!(state.realized_today < -50.0);
    }

    // ============================================================================
    // Execution and ledger
    // ============================================================================

    #[tokio::test]
    async fn test_thin_book_cancels_and_releases_exposure() {
        let mut engine = TradingEngine::new(config(), MemoryLedger::new()).unwrap();
        let source = StaticSource::default()
            .with_event(event("nyc", date(4), 10.0))
            .with_forecast(forecast(date(4), at(3) - Duration::hours(1)));

        let report = engine.run_cycle(&providers(&source), at(3)).await.unwrap();

        assert_eq!(report.execution.cancelled.len(), 1);
        assert_eq!(report.execution.cancelled[0].instrument_id, no_id());
        assert_eq!(report.execution.cancelled[0].status, TradeStatus::Cancelled);
        assert!(report
            .execution
            .skips
            .iter()
            .any(|s| s.reason == "INSUFFICIENT_DEPTH"));
        assert_eq!(report.execution.filled.len(), 1);

        let state = engine.risk_state(date(3));
        assert_eq!(state.exposure(&no_id()), 0.0);
    }

    #[tokio::test]
    async fn test_ledger_failure_aborts_cycle() {
        let mut ledger = MemoryLedger::new();
        ledger.set_fail_writes(true);
        let mut engine = TradingEngine::new(config(), ledger).unwrap();
        let source = market(date(4), at(3));

        let result = engine.run_cycle(&providers(&source), at(3)).await;

        assert!(matches!(result, Err(EngineError::LedgerWriteFailed(_))));
        assert!(engine.ledger().trades().is_empty());
    }

    #[tokio::test]
    async fn test_csv_journal_logs_intent_before_fill() {
        let dir = std::env::temp_dir().join(format!("wxedge_engine_{}", uuid::Uuid::new_v4()));
        let source = market(date(4), at(3));
        {
            let ledger = CsvLedger::open(&dir).unwrap();
            let mut engine = TradingEngine::new(config(), ledger).unwrap();
            engine.run_cycle(&providers(&source), at(3)).await.unwrap();
        }

        let journal = std::fs::read_to_string(dir.join("ledger").join("journal.csv")).unwrap();
        let kinds: Vec<&str> = journal
            .lines()
            .skip(1)
            .filter_map(|line| line.split(',').nth(1))
            .collect();
        assert_eq!(kinds, vec!["intent", "fill", "intent", "fill"]);

        let reopened = CsvLedger::open(&dir).unwrap();
        let trades = reopened.trades();
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.status == TradeStatus::Filled));
        assert_eq!(reopened.snapshots().len(), 1);

        let report = LedgerReport::build(&reopened);
        assert_eq!(report.filled, 2);
        assert_eq!(report.open_positions, 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_daily_snapshot_is_written_once() {
        let mut engine = TradingEngine::new(config(), MemoryLedger::new()).unwrap();
        let source = market(date(4), at(3));

        let first = engine.run_cycle(&providers(&source), at(3)).await.unwrap();
        let second = engine
            .run_cycle(&providers(&source), at(3) + Duration::hours(2))
            .await
            .unwrap();

        let snapshot = first.execution.snapshot.unwrap();
        assert_eq!(snapshot.snapshot_date, date(3));
        assert_eq!(snapshot.trade_count, 2);
        assert!(second.execution.snapshot.is_none());
        assert_eq!(engine.ledger().snapshots().len(), 1);
    }

    // ============================================================================
    // Providers
    // ============================================================================

    #[tokio::test]
    async fn test_forecast_retries_recover() {
        let mut engine = TradingEngine::new(config(), MemoryLedger::new()).unwrap();
        let source = market(date(4), at(3)).with_forecast_failures(2);

        let report = engine.run_cycle(&providers(&source), at(3)).await.unwrap();

        assert_eq!(report.scan.events_modeled, 1);
        assert_eq!(report.execution.filled.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_forecast_retries_skip_event() {
        let mut engine = TradingEngine::new(config(), MemoryLedger::new()).unwrap();
        let source = market(date(4), at(3)).with_forecast_failures(5);

        let report = engine.run_cycle(&providers(&source), at(3)).await.unwrap();

        assert_eq!(report.scan.events_modeled, 0);
        assert!(report.scan.candidates.is_empty());
        assert_eq!(report.scan.skips.len(), 1);
        assert_eq!(report.scan.skips[0].reason, "PROVIDER_FAILED");
    }

    #[tokio::test]
    async fn test_stale_and_far_events_are_screened() {
        let engine = TradingEngine::new(config(), MemoryLedger::new()).unwrap();
        let source = StaticSource::default()
            .with_event(event("far", date(20), 500.0))
            .with_event(event("stale", date(4), 500.0))
            .with_forecast(forecast(date(4), at(3) - Duration::hours(30)));

        let report = engine
            .scan(&source, &source, at(3))
            .await
            .unwrap();

        assert_eq!(report.events_seen, 2);
        assert!(report.candidates.is_empty());
        assert_eq!(report.skips.len(), 2);
        assert!(report.skips.iter().all(|s| s.reason == "INSUFFICIENT_DATA"));
    }
}
