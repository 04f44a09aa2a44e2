//! On-balance volume: a running volume total signed by each close-to-close move.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PricePoint;

/// Every bar is valid; the first bar seeds the total with its own volume and
/// unchanged closes leave it where it was.
pub fn calculate_obv(bars: &[PricePoint]) -> IndicatorSeries {
    let mut running = 0.0;
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let volume = bar.volume as f64;
            running += match i.checked_sub(1).map(|prev| bars[prev].close) {
                None => volume,
                Some(prev) if bar.close > prev => volume,
                Some(prev) if bar.close < prev => -volume,
                Some(_) => 0.0,
            };
            IndicatorPoint {
                date: bar.date,
                valid: true,
                value: IndicatorValue::simple(running),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Obv,
        values,
    }
}
