//! Stochastic Oscillator indicator.
//!
//! %K = 100 * (C - LL(k)) / (HH(k) - LL(k)), with LL/HH the lowest low and
//! highest high of the last k bars. A zero range gives %K = 50.
//! %D = SMA(d) of %K.
//! Warmup: first (k + d - 2) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PricePoint;

pub const DEFAULT_D_PERIOD: usize = 3;

pub fn calculate_stochastic(
    bars: &[PricePoint],
    k_period: usize,
    d_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Stochastic { k_period, d_period };
    if k_period == 0 || d_period == 0 {
        return IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        };
    }

    let k_values: Vec<Option<f64>> = (0..bars.len())
        .map(|i| {
            if i + 1 < k_period {
                return None;
            }
            let window = &bars[i + 1 - k_period..=i];
            let highest = window.iter().map(|b| b.high).fold(f64::MIN, f64::max);
            let lowest = window.iter().map(|b| b.low).fold(f64::MAX, f64::min);
            let range = highest - lowest;
            Some(if range > 0.0 {
                100.0 * (bars[i].close - lowest) / range
            } else {
                50.0
            })
        })
        .collect();

    let warmup = k_period + d_period - 2;
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let valid = i >= warmup;
            let k = k_values[i].unwrap_or(0.0);
            let d = if valid {
                k_values[i + 1 - d_period..=i]
                    .iter()
                    .map(|v| v.unwrap_or(0.0))
                    .sum::<f64>()
                    / d_period as f64
            } else {
                0.0
            };
            IndicatorPoint {
                date: bar.date,
                valid,
                value: IndicatorValue::Stochastic { k, d },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
