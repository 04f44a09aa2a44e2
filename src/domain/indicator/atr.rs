//! ATR (Average True Range) indicator.
//!
//! True range needs the previous close, so the first bar has none.
//! Seed: mean of the first n true ranges (bars 1..=n).
//! Subsequent: ATR = (prev_ATR * (n-1) + TR) / n (Wilder smoothing).
//! Warmup: first n bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PricePoint;

/// True ranges for bars 1..len; element i belongs to bar i + 1.
pub(crate) fn true_ranges(bars: &[PricePoint]) -> Vec<f64> {
    bars.windows(2)
        .map(|w| w[1].true_range(w[0].close))
        .collect()
}

pub fn calculate_atr(bars: &[PricePoint], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Atr(period),
            values: Vec::new(),
        };
    }

    let tr = true_ranges(bars);
    let mut values = Vec::with_capacity(bars.len());
    let mut atr = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        let valid = i >= period;
        if i == period {
            atr = tr[..period].iter().sum::<f64>() / period as f64;
        } else if i > period {
            atr = (atr * (period - 1) as f64 + tr[i - 1]) / period as f64;
        }
        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value: IndicatorValue::simple(if valid { atr } else { 0.0 }),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}
