//! ADX (Average Directional Index) indicator.
//!
//! +DM = H[i] - H[i-1] when it exceeds L[i-1] - L[i] and is positive, else 0.
//! -DM = L[i-1] - L[i] when it exceeds H[i] - H[i-1] and is positive, else 0.
//! TR, +DM and -DM are Wilder-smoothed (first value is the n-bar sum, then
//! S = S - S/n + X). +DI = 100 * S(+DM) / S(TR), -DI likewise.
//! DX = 100 * |+DI - -DI| / (+DI + -DI).
//! ADX seed: mean of the first n DX values; then ADX = (prev * (n-1) + DX) / n.
//! Warmup: first (2n - 1) bars are invalid.

use crate::domain::indicator::atr::true_ranges;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PricePoint;

fn directional_movement(prev: &PricePoint, bar: &PricePoint) -> (f64, f64) {
    let up = bar.high - prev.high;
    let down = prev.low - bar.low;
    let plus = if up > down && up > 0.0 { up } else { 0.0 };
    let minus = if down > up && down > 0.0 { down } else { 0.0 };
    (plus, minus)
}

pub fn calculate_adx(bars: &[PricePoint], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries {
            indicator_type: IndicatorType::Adx(period),
            values: Vec::new(),
        };
    }

    let tr = true_ranges(bars);
    let dm: Vec<(f64, f64)> = bars
        .windows(2)
        .map(|w| directional_movement(&w[0], &w[1]))
        .collect();

    let n = period as f64;
    let mut s_tr = 0.0;
    let mut s_plus = 0.0;
    let mut s_minus = 0.0;
    let mut dx_seed = 0.0;
    let mut adx = 0.0;
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let mut point = IndicatorValue::Adx {
            adx: 0.0,
            plus_di: 0.0,
            minus_di: 0.0,
        };
        let mut valid = false;

        if i >= period {
            if i == period {
                s_tr = tr[..period].iter().sum();
                s_plus = dm[..period].iter().map(|d| d.0).sum();
                s_minus = dm[..period].iter().map(|d| d.1).sum();
            } else {
                s_tr = s_tr - s_tr / n + tr[i - 1];
                s_plus = s_plus - s_plus / n + dm[i - 1].0;
                s_minus = s_minus - s_minus / n + dm[i - 1].1;
            }

            let (plus_di, minus_di) = if s_tr > 0.0 {
                (100.0 * s_plus / s_tr, 100.0 * s_minus / s_tr)
            } else {
                (0.0, 0.0)
            };
            let di_sum = plus_di + minus_di;
            let dx = if di_sum > 0.0 {
                100.0 * (plus_di - minus_di).abs() / di_sum
            } else {
                0.0
            };

            if i < 2 * period - 1 {
                dx_seed += dx;
            } else if i == 2 * period - 1 {
                adx = (dx_seed + dx) / n;
                valid = true;
            } else {
                adx = (adx * (n - 1.0) + dx) / n;
                valid = true;
            }

            point = IndicatorValue::Adx {
                adx: if valid { adx } else { 0.0 },
                plus_di,
                minus_di,
            };
        }

        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value: point,
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Adx(period),
        values,
    }
}
