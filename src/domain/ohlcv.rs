//! Price point and price series representation.

use crate::domain::error::SamquantError;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl PricePoint {
    /// A bar where open, high, low and close are all `close`.
    pub fn flat(date: NaiveDate, close: f64, volume: i64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    fn validate(&self, ticker: &str) -> Result<(), SamquantError> {
        let fields = [self.open, self.high, self.low, self.close];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(SamquantError::invalid(
                format!("{ticker} price on {}", self.date),
                "prices must be finite and non-negative",
            ));
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err(SamquantError::invalid(
                format!("{ticker} price on {}", self.date),
                format!(
                    "high/low do not bracket open/close (o={} h={} l={} c={})",
                    self.open, self.high, self.low, self.close
                ),
            ));
        }
        if self.volume < 0 {
            return Err(SamquantError::invalid(
                format!("{ticker} volume on {}", self.date),
                "volume must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Ordered price history for one instrument.
///
/// Construction validates every bar and the strict ascending date order, so
/// downstream calculators can index without re-checking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    ticker: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, SamquantError> {
        let ticker = ticker.into();
        for point in &points {
            point.validate(&ticker)?;
        }
        if let Some(w) = points.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(SamquantError::invalid(
                format!("{ticker} dates"),
                format!("dates must be strictly ascending ({} then {})", w[0].date, w[1].date),
            ));
        }
        Ok(Self { ticker, points })
    }

    /// Build a series of flat bars from closing prices on consecutive days.
    pub fn from_closes(
        ticker: impl Into<String>,
        start: NaiveDate,
        closes: &[f64],
    ) -> Result<Self, SamquantError> {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint::flat(start + chrono::Duration::days(i as i64), c, 1000))
            .collect();
        Self::new(ticker, points)
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Check that `other` covers exactly the same dates.
    pub fn ensure_aligned(&self, other: &PriceSeries) -> Result<(), SamquantError> {
        if self.len() != other.len() {
            return Err(SamquantError::invalid(
                format!("{}/{}", self.ticker, other.ticker),
                format!("series lengths differ ({} vs {})", self.len(), other.len()),
            ));
        }
        if let Some((a, b)) = self
            .points
            .iter()
            .zip(&other.points)
            .find(|(a, b)| a.date != b.date)
        {
            return Err(SamquantError::invalid(
                format!("{}/{}", self.ticker, other.ticker),
                format!("dates not aligned ({} vs {})", a.date, b.date),
            ));
        }
        Ok(())
    }
}
