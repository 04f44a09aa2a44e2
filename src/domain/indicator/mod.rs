//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//!
//! Calculators never fail: warmup bars are emitted with `valid == false`.
//! Minimum-history enforcement happens in [`crate::domain::analysis`].

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod obv;
pub mod rsi;
pub mod sma;
pub mod stochastic;

pub use adx::calculate_adx;
pub use atr::calculate_atr;
pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use obv::calculate_obv;
pub use rsi::calculate_rsi;
pub use sma::calculate_sma;
pub use stochastic::calculate_stochastic;

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorValue {
    Simple {
        value: f64,
    },
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Stochastic {
        k: f64,
        d: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
    Adx {
        adx: f64,
        plus_di: f64,
        minus_di: f64,
    },
}

impl IndicatorValue {
    pub fn simple(value: f64) -> Self {
        IndicatorValue::Simple { value }
    }

    /// The headline number of the value (the line for MACD, %K for
    /// stochastic, the middle band for Bollinger, ADX for ADX).
    pub fn primary(&self) -> f64 {
        match *self {
            IndicatorValue::Simple { value } => value,
            IndicatorValue::Macd { line, .. } => line,
            IndicatorValue::Stochastic { k, .. } => k,
            IndicatorValue::Bollinger { middle, .. } => middle,
            IndicatorValue::Adx { adx, .. } => adx,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Adx(usize),
    Obv,
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Stochastic {
        k_period: usize,
        d_period: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// The most recent valid point, if any.
    pub fn latest_valid(&self) -> Option<&IndicatorPoint> {
        self.values.iter().rev().find(|p| p.valid)
    }

    /// The last `n` valid values, oldest first.
    pub fn valid_tail(&self, n: usize) -> Vec<IndicatorValue> {
        let mut tail: Vec<IndicatorValue> = self
            .values
            .iter()
            .rev()
            .filter(|p| p.valid)
            .take(n)
            .map(|p| p.value.clone())
            .collect();
        tail.reverse();
        tail
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Obv => write!(f, "OBV"),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Stochastic { k_period, d_period } => {
                write!(f, "STOCHASTIC({},{})", k_period, d_period)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}

/// Flat bars from closing prices on consecutive January days, for tests.
#[cfg(test)]
pub(crate) fn test_bars(prices: &[f64]) -> Vec<crate::domain::ohlcv::PricePoint> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            crate::domain::ohlcv::PricePoint::flat(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                close,
                1000,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display_sma() {
        assert_eq!(IndicatorType::Sma(20).to_string(), "SMA(20)");
    }

    #[test]
    fn indicator_type_display_macd() {
        let macd = IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert_eq!(macd.to_string(), "MACD(12,26,9)");
    }

    #[test]
    fn indicator_type_display_bollinger() {
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 200,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn indicator_type_display_adx() {
        assert_eq!(IndicatorType::Adx(14).to_string(), "ADX(14)");
    }

    #[test]
    fn valid_tail_skips_warmup_and_keeps_order() {
        let bars = test_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = calculate_sma(&bars, 2);
        let tail = series.valid_tail(3);
        let values: Vec<f64> = tail.iter().map(IndicatorValue::primary).collect();
        assert_eq!(values, vec![2.5, 3.5, 4.5]);
        assert_eq!(series.latest_valid().unwrap().value.primary(), 4.5);
    }

    #[test]
    fn primary_value_per_shape() {
        assert_eq!(IndicatorValue::simple(3.0).primary(), 3.0);
        let macd = IndicatorValue::Macd {
            line: 1.5,
            signal: 1.0,
            histogram: 0.5,
        };
        assert_eq!(macd.primary(), 1.5);
    }
}
