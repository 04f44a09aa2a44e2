//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Warmup: max(fast, slow) - 1 + signal - 1 bars (i.e., slow - 1 + signal - 1 for defaults)

use crate::domain::indicator::ema::ema_values;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PricePoint;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[PricePoint],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };

    if bars.is_empty() || fast == 0 || slow == 0 || signal_period == 0 {
        return IndicatorSeries {
            indicator_type,
            values: Vec::new(),
        };
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ema_fast = ema_values(&closes, fast);
    let ema_slow = ema_values(&closes, slow);

    let macd_warmup = fast.max(slow) - 1;
    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => f - s,
            _ => 0.0,
        })
        .collect();

    let mut signal_line = vec![None; bars.len()];
    if bars.len() > macd_warmup {
        let smoothed = ema_values(&macd_line[macd_warmup..], signal_period);
        for (offset, value) in smoothed.into_iter().enumerate() {
            signal_line[macd_warmup + offset] = value;
        }
    }

    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let line = macd_line[i];
            let signal = signal_line[i].unwrap_or(0.0);
            IndicatorPoint {
                date: bar.date,
                valid: signal_line[i].is_some(),
                value: IndicatorValue::Macd {
                    line,
                    signal,
                    histogram: line - signal,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_bars;

    fn calculate_macd_default(bars: &[PricePoint]) -> IndicatorSeries {
        calculate_macd(bars, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
    }

    fn rising(n: usize) -> Vec<PricePoint> {
        let prices: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        test_bars(&prices)
    }

    #[test]
    fn macd_warmup_default() {
        let series = calculate_macd_default(&rising(40));

        let warmup = DEFAULT_SLOW - 1 + DEFAULT_SIGNAL - 1;
        for i in 0..warmup {
            assert!(!series.values[i].valid, "Index {} should not be valid", i);
        }
        assert!(series.values[warmup].valid, "Index {} should be valid", warmup);
    }

    #[test]
    fn macd_histogram_equals_line_minus_signal() {
        let series = calculate_macd_default(&rising(40));

        for point in series.values.iter().filter(|p| p.valid) {
            if let IndicatorValue::Macd {
                line,
                signal,
                histogram,
            } = point.value
            {
                assert!((histogram - (line - signal)).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn macd_line_above_signal_in_accelerating_uptrend() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let series = calculate_macd_default(&test_bars(&prices));
        match series.latest_valid().unwrap().value {
            IndicatorValue::Macd { line, signal, .. } => {
                assert!(line > 0.0);
                assert!(line > signal);
            }
            ref other => panic!("Expected Macd value, got {:?}", other),
        }
    }

    #[test]
    fn macd_line_is_ema_fast_minus_ema_slow() {
        let bars = test_bars(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]);
        let series = calculate_macd(&bars, 3, 5, 2);

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let ema_fast = ema_values(&closes, 3);
        let ema_slow = ema_values(&closes, 5);

        for i in 4..bars.len() {
            if let IndicatorValue::Macd { line, .. } = series.values[i].value {
                let expected = ema_fast[i].unwrap() - ema_slow[i].unwrap();
                assert!((line - expected).abs() < f64::EPSILON, "mismatch at {}", i);
            }
        }
    }

    #[test]
    fn macd_indicator_type() {
        let series = calculate_macd(&rising(3), 5, 10, 3);
        assert_eq!(
            series.indicator_type,
            IndicatorType::Macd {
                fast: 5,
                slow: 10,
                signal: 3
            }
        );
    }

    #[test]
    fn macd_empty_and_zero_period() {
        assert!(calculate_macd_default(&[]).values.is_empty());
        let bars = rising(3);
        assert!(calculate_macd(&bars, 0, 26, 9).values.is_empty());
        assert!(calculate_macd(&bars, 12, 0, 9).values.is_empty());
        assert!(calculate_macd(&bars, 12, 26, 0).values.is_empty());
    }

    #[test]
    fn macd_custom_parameters() {
        let series = calculate_macd(&rising(20), 5, 10, 3);
        let warmup = 10 - 1 + 3 - 1;
        assert!(!series.values[warmup - 1].valid);
        assert!(series.values[warmup].valid);
    }
}
