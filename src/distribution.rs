//! Distribution builder
//!
//! Turns a point forecast into probability mass over an event's buckets.
//! Temperature metrics discretize a zero-mean Gaussian error whose width steps
//! up with horizon; probability metrics pass the forecast probability through.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::types::{BucketOutcome, Forecast, MarketEvent, Metric};

const SUM_TOLERANCE: f64 = 1e-6;

/// Forecast error schedule by horizon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// σ (°F) for horizon <= near_term_days
    pub sigma_near: f64,
    /// σ (°F) for horizon <= mid_term_days
    pub sigma_mid: f64,
    /// σ (°F) beyond mid_term_days
    pub sigma_far: f64,
    pub near_term_days: i64,
    pub mid_term_days: i64,
    /// Events further out than this are not modeled
    pub max_horizon_days: i64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            sigma_near: 3.0,
            sigma_mid: 4.0,
            sigma_far: 5.0,
            near_term_days: 1,
            mid_term_days: 2,
            max_horizon_days: 7,
        }
    }
}

impl DistributionConfig {
    pub fn sigma_for_horizon(&self, horizon_days: i64) -> f64 {
        if horizon_days <= self.near_term_days {
            self.sigma_near
        } else if horizon_days <= self.mid_term_days {
            self.sigma_mid
        } else {
            self.sigma_far
        }
    }
}

/// Modeled YES probability per bucket instrument, in bucket order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityDistribution {
    pub event_id: String,
    pub probabilities: Vec<(String, f64)>,
    /// σ used for continuous metrics; None for pass-through
    pub sigma: Option<f64>,
}

impl ProbabilityDistribution {
    pub fn get(&self, instrument_id: &str) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|(id, _)| id == instrument_id)
            .map(|(_, p)| *p)
    }
}

/// Standard normal CDF via the Abramowitz-Stegun 26.2.17 approximation
/// (absolute error below 7.5e-8).
pub fn normal_cdf(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    if z < -8.0 {
        return 0.0;
    }
    if z > 8.0 {
        return 1.0;
    }
    if z < 0.0 {
        return 1.0 - normal_cdf(-z);
    }

    const B0: f64 = 0.2316419;
    const B1: f64 = 0.319381530;
    const B2: f64 = -0.356563782;
    const B3: f64 = 1.781477937;
    const B4: f64 = -1.821255978;
    const B5: f64 = 1.330274429;

    let t = 1.0 / (1.0 + B0 * z);
    let poly = t * (B1 + t * (B2 + t * (B3 + t * (B4 + t * B5))));
    let pdf = (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt();
    1.0 - pdf * poly
}

/// P(lower <= X < upper) for X ~ N(mean, sigma); infinite bounds allowed
pub fn interval_probability(mean: f64, sigma: f64, lower: f64, upper: f64) -> f64 {
    let cdf = |x: f64| {
        if x == f64::NEG_INFINITY {
            0.0
        } else if x == f64::INFINITY {
            1.0
        } else {
            normal_cdf((x - mean) / sigma)
        }
    };
    (cdf(upper) - cdf(lower)).max(0.0)
}

/// Build the modeled distribution for `event` from `forecast` at `horizon_days`.
pub fn build_distribution(
    event: &MarketEvent,
    forecast: &Forecast,
    horizon_days: i64,
    config: &DistributionConfig,
) -> Result<ProbabilityDistribution> {
    if event.buckets.is_empty() {
        return Err(EngineError::insufficient(&event.event_id, "event has no buckets"));
    }
    if horizon_days < 0 {
        return Err(EngineError::insufficient(
            &event.event_id,
            format!("negative horizon {horizon_days}"),
        ));
    }

    match event.metric {
        Metric::TemperatureHigh | Metric::TemperatureLow => {
            build_continuous(event, forecast, horizon_days, config)
        }
        Metric::Precipitation => build_pass_through(event, forecast),
        Metric::Snowfall => Err(EngineError::insufficient(
            &event.event_id,
            "no forecast model for snowfall",
        )),
    }
}

fn build_continuous(
    event: &MarketEvent,
    forecast: &Forecast,
    horizon_days: i64,
    config: &DistributionConfig,
) -> Result<ProbabilityDistribution> {
    let mean = forecast
        .value_for(event.metric)
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            EngineError::insufficient(
                &event.event_id,
                format!("forecast has no {} value", event.metric),
            )
        })?;
    let sigma = config.sigma_for_horizon(horizon_days);
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(EngineError::ConfigurationInvalid(format!(
            "sigma for horizon {horizon_days} must be positive, got {sigma}"
        )));
    }

    let mut bounds = Vec::with_capacity(event.buckets.len());
    for bucket in &event.buckets {
        match bucket.outcome {
            BucketOutcome::Range { .. } => {
                let (lo, hi) = (bucket.outcome.lower_bound(), bucket.outcome.upper_bound());
                if lo.is_nan() || hi.is_nan() || lo >= hi {
                    return Err(EngineError::insufficient(
                        &bucket.instrument_id,
                        format!("degenerate bounds [{lo}, {hi})"),
                    ));
                }
                bounds.push((bucket.instrument_id.clone(), lo, hi));
            }
            BucketOutcome::Boolean { .. } => {
                return Err(EngineError::insufficient(
                    &bucket.instrument_id,
                    "boolean bucket on a temperature event",
                ))
            }
        }
    }
    check_non_overlapping(&event.event_id, &bounds)?;

    let mut probabilities: Vec<(String, f64)> = bounds
        .into_iter()
        .map(|(id, lo, hi)| (id, interval_probability(mean, sigma, lo, hi)))
        .collect();

    if probabilities.len() > 1 {
        let total: f64 = probabilities.iter().map(|(_, p)| p).sum();
        if !(total > 0.0) {
            return Err(EngineError::insufficient(
                &event.event_id,
                format!("buckets carry no mass around forecast {mean:.1}"),
            ));
        }
        if (total - 1.0).abs() > SUM_TOLERANCE {
            debug!(event = %event.event_id, total, "Renormalizing bucket mass");
        }
        for (_, p) in probabilities.iter_mut() {
            *p /= total;
        }
    }

    Ok(ProbabilityDistribution {
        event_id: event.event_id.clone(),
        probabilities,
        sigma: Some(sigma),
    })
}

fn check_non_overlapping(event_id: &str, bounds: &[(String, f64, f64)]) -> Result<()> {
    let mut sorted: Vec<&(String, f64, f64)> = bounds.iter().collect();
    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    for pair in sorted.windows(2) {
        if pair[0].2 > pair[1].1 {
            return Err(EngineError::insufficient(
                event_id,
                format!("buckets {} and {} overlap", pair[0].0, pair[1].0),
            ));
        }
    }
    Ok(())
}

fn build_pass_through(event: &MarketEvent, forecast: &Forecast) -> Result<ProbabilityDistribution> {
    let p = forecast
        .value_for(event.metric)
        .ok_or_else(|| {
            EngineError::insufficient(
                &event.event_id,
                format!("forecast has no {} probability", event.metric),
            )
        })?;
    if !(0.0..=1.0).contains(&p) {
        return Err(EngineError::insufficient(
            &event.event_id,
            format!("forecast probability {p} outside [0, 1]"),
        ));
    }

    let mut probabilities = Vec::with_capacity(event.buckets.len());
    let (mut positives, mut negatives) = (0, 0);
    for bucket in &event.buckets {
        match bucket.outcome {
            BucketOutcome::Boolean { positive: true } => {
                positives += 1;
                probabilities.push((bucket.instrument_id.clone(), p));
            }
            BucketOutcome::Boolean { positive: false } => {
                negatives += 1;
                probabilities.push((bucket.instrument_id.clone(), 1.0 - p));
            }
            BucketOutcome::Range { .. } => {
                return Err(EngineError::insufficient(
                    &bucket.instrument_id,
                    "range bucket on a probability event",
                ))
            }
        }
    }
    if positives > 1 || negatives > 1 {
        return Err(EngineError::insufficient(
            &event.event_id,
            "probability event repeats an outcome",
        ));
    }

    Ok(ProbabilityDistribution {
        event_id: event.event_id.clone(),
        probabilities,
        sigma: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clob::OrderBook;
    use crate::types::OutcomeBucket;
    use chrono::{NaiveDate, Utc};

    fn bucket(id: &str, outcome: BucketOutcome) -> OutcomeBucket {
        OutcomeBucket {
            instrument_id: id.to_string(),
            label: id.to_string(),
            outcome,
            yes_bid: None,
            yes_ask: Some(0.5),
            last_price: None,
            volume: 100.0,
            book: OrderBook::default(),
        }
    }

    fn event(metric: Metric, buckets: Vec<OutcomeBucket>) -> MarketEvent {
        MarketEvent {
            event_id: "evt".to_string(),
            venue_event_ref: None,
            question: String::new(),
            location: "NYC".to_string(),
            event_date: NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
            metric,
            buckets,
        }
    }

    fn forecast(high: Option<f64>, pop: Option<f64>) -> Forecast {
        Forecast {
            location: "NYC".to_string(),
            forecast_date: NaiveDate::from_ymd_opt(2026, 7, 4).unwrap(),
            retrieved_at: Utc::now(),
            temperature_high: high,
            temperature_low: None,
            precip_probability: pop,
            narrative: String::new(),
        }
    }

    #[test]
    fn normal_cdf_matches_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.0) - 0.841345).abs() < 1e-5);
        assert!((normal_cdf(-1.96) - 0.024998).abs() < 1e-5);
    }

    #[test]
    fn sigma_steps_with_horizon() {
        let cfg = DistributionConfig::default();
        assert_eq!(cfg.sigma_for_horizon(0), 3.0);
        assert_eq!(cfg.sigma_for_horizon(1), 3.0);
        assert_eq!(cfg.sigma_for_horizon(2), 4.0);
        assert_eq!(cfg.sigma_for_horizon(5), 5.0);
    }

    #[test]
    fn partitioned_buckets_sum_to_one() {
        let evt = event(
            Metric::TemperatureHigh,
            vec![
                bucket("lo", BucketOutcome::below(70.0)),
                bucket("a", BucketOutcome::between(70.0, 72.0)),
                bucket("b", BucketOutcome::between(72.0, 74.0)),
                bucket("c", BucketOutcome::between(74.0, 76.0)),
                bucket("hi", BucketOutcome::above(76.0)),
            ],
        );
        for horizon in 0..=6 {
            let dist = build_distribution(
                &evt,
                &forecast(Some(73.2), None),
                horizon,
                &DistributionConfig::default(),
            )
            .unwrap();
            let sum: f64 = dist.probabilities.iter().map(|(_, p)| p).sum();
            assert!((sum - 1.0).abs() < SUM_TOLERANCE);
            assert!(dist.probabilities.iter().all(|(_, p)| *p >= 0.0));
        }
    }

    #[test]
    fn gapped_buckets_are_renormalized() {
        let evt = event(
            Metric::TemperatureHigh,
            vec![
                bucket("a", BucketOutcome::between(70.0, 72.0)),
                bucket("b", BucketOutcome::between(74.0, 76.0)),
            ],
        );
        let dist = build_distribution(
            &evt,
            &forecast(Some(73.0), None),
            1,
            &DistributionConfig::default(),
        )
        .unwrap();
        let sum: f64 = dist.probabilities.iter().map(|(_, p)| p).sum();
        assert!((sum - 1.0).abs() < SUM_TOLERANCE);
        assert!((dist.get("a").unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn binary_event_keeps_raw_probability() {
        let evt = event(
            Metric::TemperatureHigh,
            vec![bucket("above80", BucketOutcome::above(80.0))],
        );
        let dist = build_distribution(
            &evt,
            &forecast(Some(80.0), None),
            3,
            &DistributionConfig::default(),
        )
        .unwrap();
        assert_eq!(dist.probabilities.len(), 1);
        assert!((dist.get("above80").unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(dist.sigma, Some(5.0));
    }

    #[test]
    fn precipitation_passes_probability_through() {
        let evt = event(
            Metric::Precipitation,
            vec![
                bucket("rain", BucketOutcome::Boolean { positive: true }),
                bucket("dry", BucketOutcome::Boolean { positive: false }),
            ],
        );
        let dist = build_distribution(
            &evt,
            &forecast(None, Some(0.7)),
            1,
            &DistributionConfig::default(),
        )
        .unwrap();
        assert_eq!(dist.get("rain"), Some(0.7));
        assert!((dist.get("dry").unwrap() - 0.3).abs() < 1e-12);
        assert!(dist.sigma.is_none());
    }

    #[test]
    fn missing_or_bad_inputs_are_insufficient_data() {
        let cfg = DistributionConfig::default();
        let temp = event(
            Metric::TemperatureHigh,
            vec![bucket("a", BucketOutcome::above(70.0))],
        );
        let err = build_distribution(&temp, &forecast(None, None), 1, &cfg).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
        let err = build_distribution(&temp, &forecast(Some(70.0), None), -1, &cfg).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));

        let rain = event(
            Metric::Precipitation,
            vec![bucket("rain", BucketOutcome::Boolean { positive: true })],
        );
        let err = build_distribution(&rain, &forecast(None, Some(1.4)), 1, &cfg).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));

        let snow = event(
            Metric::Snowfall,
            vec![bucket("snow", BucketOutcome::Boolean { positive: true })],
        );
        assert!(build_distribution(&snow, &forecast(Some(30.0), Some(0.5)), 1, &cfg).is_err());

        let overlapping = event(
            Metric::TemperatureHigh,
            vec![
                bucket("a", BucketOutcome::between(70.0, 73.0)),
                bucket("b", BucketOutcome::between(72.0, 74.0)),
            ],
        );
        let err =
            build_distribution(&overlapping, &forecast(Some(72.0), None), 1, &cfg).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }
}
