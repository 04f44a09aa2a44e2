#![allow(dead_code)]

use chrono::NaiveDate;
use samquant::domain::error::SamquantError;
use samquant::domain::factor::FactorMetrics;
use samquant::domain::ohlcv::{PricePoint, PriceSeries};
use samquant::ports::data_port::DataProvider;
use std::collections::HashMap;

pub struct MockDataProvider {
    pub prices: HashMap<String, Vec<PricePoint>>,
    pub metrics: HashMap<String, FactorMetrics>,
}

impl MockDataProvider {
    pub fn new() -> Self {
        Self {
            prices: HashMap::new(),
            metrics: HashMap::new(),
        }
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.prices
            .insert(series.ticker().to_string(), series.points().to_vec());
        self
    }

    pub fn with_closes(self, ticker: &str, closes: &[f64]) -> Self {
        self.with_series(PriceSeries::from_closes(ticker, start_date(), closes).unwrap())
    }

    pub fn with_metrics(mut self, ticker: &str, metrics: FactorMetrics) -> Self {
        self.metrics.insert(ticker.to_string(), metrics);
        self
    }
}

impl DataProvider for MockDataProvider {
    fn get_price_series(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, SamquantError> {
        let points: Vec<PricePoint> = self
            .prices
            .get(ticker)
            .ok_or_else(|| SamquantError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: "unknown ticker".to_string(),
            })?
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .cloned()
            .collect();
        if points.is_empty() {
            return Err(SamquantError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: "no bars in range".to_string(),
            });
        }
        PriceSeries::new(ticker, points)
    }

    fn get_financial_metrics(
        &self,
        ticker: &str,
        _period: &str,
    ) -> Result<FactorMetrics, SamquantError> {
        self.metrics
            .get(ticker)
            .cloned()
            .ok_or_else(|| SamquantError::DataUnavailable {
                ticker: ticker.to_string(),
                reason: "no fundamentals".to_string(),
            })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn start_date() -> NaiveDate {
    date(2024, 1, 1)
}

/// Closes compounding at `daily` per bar from `start_price`.
pub fn compounding(count: usize, start_price: f64, daily: f64) -> Vec<f64> {
    (0..count)
        .map(|i| start_price * (1.0 + daily).powi(i as i32))
        .collect()
}

/// Closes oscillating around `level` with a phase offset.
pub fn oscillating(count: usize, level: f64, amplitude: f64, phase: f64) -> Vec<f64> {
    (0..count)
        .map(|i| level + amplitude * ((i as f64) * 0.7 + phase).sin() + 0.02 * i as f64)
        .collect()
}

/// Data config section covering every date the helpers generate.
pub const DATA_SECTION: &str = "[data]\npath = unused\nstart_date = 2024-01-01\nend_date = 2025-12-31\n";
