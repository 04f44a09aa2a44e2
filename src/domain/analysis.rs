//! Indicator analysis: runs the requested calculators over a price series,
//! classifies each latest reading and aggregates the classifications by
//! majority vote.

use crate::domain::error::SamquantError;
use crate::domain::indicator::{
    self, IndicatorSeries, IndicatorType, IndicatorValue, macd, stochastic,
};
use crate::domain::ohlcv::{PricePoint, PriceSeries};
use crate::domain::signal::Signal;
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_LOOKBACK: usize = 14;
pub const DEFAULT_HISTORY_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Rsi,
    Macd,
    Bollinger,
    Sma,
    Ema,
    Atr,
    Obv,
    Stochastic,
    Adx,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 9] = [
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::Bollinger,
        IndicatorKind::Sma,
        IndicatorKind::Ema,
        IndicatorKind::Atr,
        IndicatorKind::Obv,
        IndicatorKind::Stochastic,
        IndicatorKind::Adx,
    ];
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Bollinger => "bollinger",
            IndicatorKind::Sma => "sma",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Atr => "atr",
            IndicatorKind::Obv => "obv",
            IndicatorKind::Stochastic => "stochastic",
            IndicatorKind::Adx => "adx",
        };
        f.write_str(s)
    }
}

impl FromStr for IndicatorKind {
    type Err = SamquantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndicatorKind::ALL
            .into_iter()
            .find(|k| k.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SamquantError::invalid("indicator", format!("unknown indicator '{s}'")))
    }
}

/// Which indicators to compute and with which parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRequest {
    pub indicators: Vec<IndicatorKind>,
    /// Window for RSI, ATR, OBV trend, Stochastic %K and ADX.
    pub lookback: usize,
    pub sma_period: usize,
    pub ema_period: usize,
    pub bollinger_period: usize,
    pub bollinger_mult_x100: u32,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub stochastic_d: usize,
    /// Number of trailing valid values kept in each result's history.
    pub history_len: usize,
}

impl Default for IndicatorRequest {
    fn default() -> Self {
        Self {
            indicators: IndicatorKind::ALL.to_vec(),
            lookback: DEFAULT_LOOKBACK,
            sma_period: 20,
            ema_period: 20,
            bollinger_period: indicator::bollinger::DEFAULT_PERIOD,
            bollinger_mult_x100: indicator::bollinger::DEFAULT_MULT_X100,
            macd_fast: macd::DEFAULT_FAST,
            macd_slow: macd::DEFAULT_SLOW,
            macd_signal: macd::DEFAULT_SIGNAL,
            stochastic_d: stochastic::DEFAULT_D_PERIOD,
            history_len: DEFAULT_HISTORY_LEN,
        }
    }
}

impl IndicatorRequest {
    pub fn validate(&self) -> Result<(), SamquantError> {
        if self.indicators.is_empty() {
            return Err(SamquantError::invalid("indicators", "no indicators requested"));
        }
        if self.lookback < 2 {
            return Err(SamquantError::invalid("lookback", "must be at least 2"));
        }
        let periods = [
            ("sma_period", self.sma_period),
            ("ema_period", self.ema_period),
            ("bollinger_period", self.bollinger_period),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("stochastic_d", self.stochastic_d),
            ("history_len", self.history_len),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, p)| *p == 0) {
            return Err(SamquantError::invalid(*name, "must be positive"));
        }
        if self.macd_fast >= self.macd_slow {
            return Err(SamquantError::invalid(
                "macd_fast",
                format!("fast period {} must be below slow period {}", self.macd_fast, self.macd_slow),
            ));
        }
        if self.bollinger_mult_x100 == 0 {
            return Err(SamquantError::invalid("bollinger_mult", "must be positive"));
        }
        Ok(())
    }

    pub fn indicator_type(&self, kind: IndicatorKind) -> IndicatorType {
        match kind {
            IndicatorKind::Rsi => IndicatorType::Rsi(self.lookback),
            IndicatorKind::Macd => IndicatorType::Macd {
                fast: self.macd_fast,
                slow: self.macd_slow,
                signal: self.macd_signal,
            },
            IndicatorKind::Bollinger => IndicatorType::Bollinger {
                period: self.bollinger_period,
                stddev_mult_x100: self.bollinger_mult_x100,
            },
            IndicatorKind::Sma => IndicatorType::Sma(self.sma_period),
            IndicatorKind::Ema => IndicatorType::Ema(self.ema_period),
            IndicatorKind::Atr => IndicatorType::Atr(self.lookback),
            IndicatorKind::Obv => IndicatorType::Obv,
            IndicatorKind::Stochastic => IndicatorType::Stochastic {
                k_period: self.lookback,
                d_period: self.stochastic_d,
            },
            IndicatorKind::Adx => IndicatorType::Adx(self.lookback),
        }
    }

    /// Minimum number of bars needed before `kind` yields a classified reading.
    pub fn required_bars(&self, kind: IndicatorKind) -> usize {
        match kind {
            IndicatorKind::Rsi | IndicatorKind::Atr | IndicatorKind::Obv => self.lookback + 1,
            IndicatorKind::Macd => self.macd_slow + self.macd_signal,
            IndicatorKind::Bollinger => self.bollinger_period,
            IndicatorKind::Sma => self.sma_period,
            IndicatorKind::Ema => self.ema_period,
            IndicatorKind::Stochastic => self.lookback + self.stochastic_d - 1,
            IndicatorKind::Adx => 2 * self.lookback,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorResult {
    pub kind: IndicatorKind,
    pub name: String,
    pub current_value: IndicatorValue,
    pub history: Vec<IndicatorValue>,
    pub signal: Signal,
    pub interpretation: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoteTally {
    pub bullish: usize,
    pub bearish: usize,
    pub overbought: usize,
    pub oversold: usize,
}

impl VoteTally {
    pub fn total(&self) -> usize {
        self.bullish + self.bearish + self.overbought + self.oversold
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorReport {
    pub ticker: String,
    pub as_of: NaiveDate,
    pub results: Vec<IndicatorResult>,
    pub aggregate_signal: Signal,
    pub confidence: u32,
    pub votes: VoteTally,
}

impl IndicatorReport {
    pub fn result(&self, kind: IndicatorKind) -> Option<&IndicatorResult> {
        self.results.iter().find(|r| r.kind == kind)
    }
}

/// Majority vote over the non-neutral signals.
///
/// Returns the winning signal and its share of the classified votes as a
/// rounded percentage. A tie at the top, or no classified votes at all,
/// yields neutral.
pub fn aggregate_signals(signals: &[Signal]) -> (Signal, u32, VoteTally) {
    let mut tally = VoteTally::default();
    for signal in signals {
        match signal {
            Signal::Bullish => tally.bullish += 1,
            Signal::Bearish => tally.bearish += 1,
            Signal::Overbought => tally.overbought += 1,
            Signal::Oversold => tally.oversold += 1,
            Signal::Neutral => {}
        }
    }

    let total = tally.total();
    if total == 0 {
        return (Signal::Neutral, 0, tally);
    }

    let counts = [
        (Signal::Bullish, tally.bullish),
        (Signal::Bearish, tally.bearish),
        (Signal::Overbought, tally.overbought),
        (Signal::Oversold, tally.oversold),
    ];
    let top = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    let leaders: Vec<Signal> = counts
        .iter()
        .filter(|(_, c)| *c == top)
        .map(|(s, _)| *s)
        .collect();

    let confidence = (top as f64 / total as f64 * 100.0).round() as u32;
    let signal = if leaders.len() == 1 {
        leaders[0]
    } else {
        Signal::Neutral
    };
    (signal, confidence, tally)
}

/// Compute, classify and aggregate the requested indicators for `series`.
///
/// Fails without partial results when the series is shorter than any
/// requested indicator's minimum history.
pub fn analyze(
    series: &PriceSeries,
    request: &IndicatorRequest,
) -> Result<IndicatorReport, SamquantError> {
    request.validate()?;

    let mut kinds: Vec<IndicatorKind> = Vec::with_capacity(request.indicators.len());
    for kind in &request.indicators {
        if !kinds.contains(kind) {
            kinds.push(*kind);
        }
    }

    for kind in &kinds {
        let need = request.required_bars(*kind);
        if series.len() < need {
            return Err(SamquantError::insufficient(
                format!("{} for {}", request.indicator_type(*kind), series.ticker()),
                series.len(),
                need,
            ));
        }
    }

    let latest_bar = series
        .last()
        .ok_or_else(|| SamquantError::insufficient(series.ticker(), 0, 1))?;
    let bars = series.points();
    let mut results = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let computed = compute(bars, kind, request);
        let result = classify(bars, latest_bar.close, kind, &computed, request)?;
        debug!(
            ticker = series.ticker(),
            indicator = %result.name,
            signal = %result.signal,
            "indicator classified"
        );
        results.push(result);
    }

    let signals: Vec<Signal> = results.iter().map(|r| r.signal).collect();
    let (aggregate_signal, confidence, votes) = aggregate_signals(&signals);

    Ok(IndicatorReport {
        ticker: series.ticker().to_string(),
        as_of: latest_bar.date,
        results,
        aggregate_signal,
        confidence,
        votes,
    })
}

fn compute(bars: &[PricePoint], kind: IndicatorKind, req: &IndicatorRequest) -> IndicatorSeries {
    match kind {
        IndicatorKind::Rsi => indicator::calculate_rsi(bars, req.lookback),
        IndicatorKind::Macd => {
            indicator::calculate_macd(bars, req.macd_fast, req.macd_slow, req.macd_signal)
        }
        IndicatorKind::Bollinger => {
            indicator::calculate_bollinger(bars, req.bollinger_period, req.bollinger_mult_x100)
        }
        IndicatorKind::Sma => indicator::calculate_sma(bars, req.sma_period),
        IndicatorKind::Ema => indicator::calculate_ema(bars, req.ema_period),
        IndicatorKind::Atr => indicator::calculate_atr(bars, req.lookback),
        IndicatorKind::Obv => indicator::calculate_obv(bars),
        IndicatorKind::Stochastic => {
            indicator::calculate_stochastic(bars, req.lookback, req.stochastic_d)
        }
        IndicatorKind::Adx => indicator::calculate_adx(bars, req.lookback),
    }
}

fn classify(
    bars: &[PricePoint],
    close: f64,
    kind: IndicatorKind,
    series: &IndicatorSeries,
    req: &IndicatorRequest,
) -> Result<IndicatorResult, SamquantError> {
    let name = series.indicator_type.to_string();
    let latest = series
        .latest_valid()
        .ok_or_else(|| SamquantError::insufficient(name.clone(), bars.len(), req.required_bars(kind)))?;

    let (signal, interpretation) = match latest.value {
        IndicatorValue::Simple { value } => match kind {
            IndicatorKind::Rsi => classify_rsi(value),
            IndicatorKind::Sma | IndicatorKind::Ema => classify_average(&name, close, value),
            IndicatorKind::Atr => classify_atr(close, value),
            IndicatorKind::Obv => classify_obv(series, req.lookback),
            _ => (Signal::Neutral, String::new()),
        },
        IndicatorValue::Macd { line, signal, .. } => classify_macd(series, line, signal),
        IndicatorValue::Bollinger { upper, lower, .. } => classify_bollinger(close, upper, lower),
        IndicatorValue::Stochastic { k, d } => classify_stochastic(k, d),
        IndicatorValue::Adx {
            adx,
            plus_di,
            minus_di,
        } => classify_adx(adx, plus_di, minus_di),
    };

    Ok(IndicatorResult {
        kind,
        name,
        current_value: latest.value.clone(),
        history: series.valid_tail(req.history_len),
        signal,
        interpretation,
    })
}

fn classify_rsi(rsi: f64) -> (Signal, String) {
    if rsi > 70.0 {
        (Signal::Overbought, format!("RSI {rsi:.1} above 70: overbought"))
    } else if rsi < 30.0 {
        (Signal::Oversold, format!("RSI {rsi:.1} below 30: oversold"))
    } else {
        (Signal::Neutral, format!("RSI {rsi:.1} within 30-70"))
    }
}

fn classify_average(name: &str, close: f64, average: f64) -> (Signal, String) {
    if close > average {
        (Signal::Bullish, format!("close {close:.2} above {name} {average:.2}"))
    } else if close < average {
        (Signal::Bearish, format!("close {close:.2} below {name} {average:.2}"))
    } else {
        (Signal::Neutral, format!("close at {name} {average:.2}"))
    }
}

fn classify_atr(close: f64, atr: f64) -> (Signal, String) {
    let pct = if close > 0.0 { atr / close * 100.0 } else { 0.0 };
    let level = if pct > 3.0 {
        "high volatility"
    } else if pct < 1.0 {
        "low volatility"
    } else {
        "moderate volatility"
    };
    (Signal::Neutral, format!("ATR {atr:.2} is {pct:.2}% of price: {level}"))
}

fn classify_obv(series: &IndicatorSeries, lookback: usize) -> (Signal, String) {
    let values = &series.values;
    let now = values[values.len() - 1].value.primary();
    let then = values[values.len() - 1 - lookback].value.primary();
    if now > then {
        (Signal::Bullish, format!("OBV rising over {lookback} bars: accumulation"))
    } else if now < then {
        (Signal::Bearish, format!("OBV falling over {lookback} bars: distribution"))
    } else {
        (Signal::Neutral, format!("OBV flat over {lookback} bars"))
    }
}

fn classify_macd(series: &IndicatorSeries, line: f64, signal: f64) -> (Signal, String) {
    let previous = series
        .values
        .iter()
        .rev()
        .filter(|p| p.valid)
        .nth(1)
        .and_then(|p| match p.value {
            IndicatorValue::Macd { line, signal, .. } => Some(line - signal),
            _ => None,
        });
    let spread = line - signal;
    let crossed = previous.is_some_and(|prev| prev.signum() != spread.signum() && prev != 0.0);

    if spread > 0.0 {
        let note = if crossed { "crossed above" } else { "above" };
        (Signal::Bullish, format!("MACD line {note} signal line ({line:.3} vs {signal:.3})"))
    } else if spread < 0.0 {
        let note = if crossed { "crossed below" } else { "below" };
        (Signal::Bearish, format!("MACD line {note} signal line ({line:.3} vs {signal:.3})"))
    } else {
        (Signal::Neutral, "MACD line on signal line".to_string())
    }
}

fn classify_bollinger(close: f64, upper: f64, lower: f64) -> (Signal, String) {
    if close > upper {
        (Signal::Overbought, format!("close {close:.2} above upper band {upper:.2}"))
    } else if close < lower {
        (Signal::Oversold, format!("close {close:.2} below lower band {lower:.2}"))
    } else {
        (Signal::Neutral, format!("close {close:.2} inside bands {lower:.2}-{upper:.2}"))
    }
}

fn classify_stochastic(k: f64, d: f64) -> (Signal, String) {
    if k > 80.0 {
        (Signal::Overbought, format!("%K {k:.1} above 80"))
    } else if k < 20.0 {
        (Signal::Oversold, format!("%K {k:.1} below 20"))
    } else if k > d {
        (Signal::Bullish, format!("%K {k:.1} above %D {d:.1}"))
    } else if k < d {
        (Signal::Bearish, format!("%K {k:.1} below %D {d:.1}"))
    } else {
        (Signal::Neutral, format!("%K {k:.1} equals %D"))
    }
}

fn classify_adx(adx: f64, plus_di: f64, minus_di: f64) -> (Signal, String) {
    if adx > 25.0 && plus_di > minus_di {
        (Signal::Bullish, format!("ADX {adx:.1}: strong uptrend (+DI {plus_di:.1} > -DI {minus_di:.1})"))
    } else if adx > 25.0 && minus_di > plus_di {
        (Signal::Bearish, format!("ADX {adx:.1}: strong downtrend (-DI {minus_di:.1} > +DI {plus_di:.1})"))
    } else {
        (Signal::Neutral, format!("ADX {adx:.1}: no strong trend"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series_from(prices: &[f64]) -> PriceSeries {
        PriceSeries::from_closes("TEST", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), prices)
            .unwrap()
    }

    fn rising_60() -> PriceSeries {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        series_from(&prices)
    }

    #[test]
    fn rising_series_is_overbought_with_bullish_macd() {
        let report = analyze(&rising_60(), &IndicatorRequest::default()).unwrap();

        let rsi = report.result(IndicatorKind::Rsi).unwrap();
        assert!(rsi.current_value.primary() >= 70.0);
        assert_eq!(rsi.signal, Signal::Overbought);

        let macd = report.result(IndicatorKind::Macd).unwrap();
        assert_eq!(macd.signal, Signal::Bullish);

        assert_eq!(report.results.len(), 9);
        assert_eq!(report.aggregate_signal, Signal::Bullish);
    }

    #[test]
    fn macd_needs_35_bars() {
        let prices: Vec<f64> = (0..34).map(|i| 100.0 + i as f64).collect();
        let request = IndicatorRequest {
            indicators: vec![IndicatorKind::Macd],
            ..IndicatorRequest::default()
        };
        let err = analyze(&series_from(&prices), &request).unwrap_err();
        match err {
            SamquantError::InsufficientData { have, need, context } => {
                assert_eq!(have, 34);
                assert_eq!(need, 35);
                assert!(context.contains("MACD(12,26,9)"));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn short_series_fails_for_all_requested() {
        let err = analyze(&series_from(&[1.0, 2.0, 3.0]), &IndicatorRequest::default()).unwrap_err();
        assert!(matches!(err, SamquantError::InsufficientData { .. }));
    }

    #[test]
    fn rejects_tiny_lookback() {
        let request = IndicatorRequest {
            lookback: 1,
            ..IndicatorRequest::default()
        };
        let err = analyze(&rising_60(), &request).unwrap_err();
        assert!(matches!(err, SamquantError::InvalidParameter { .. }));
    }

    #[test]
    fn history_is_bounded() {
        let request = IndicatorRequest {
            indicators: vec![IndicatorKind::Sma],
            history_len: 5,
            ..IndicatorRequest::default()
        };
        let report = analyze(&rising_60(), &request).unwrap();
        let sma = report.result(IndicatorKind::Sma).unwrap();
        assert_eq!(sma.history.len(), 5);
        assert_eq!(sma.history.last(), Some(&sma.current_value));
    }

    #[test]
    fn duplicate_requests_are_computed_once() {
        let request = IndicatorRequest {
            indicators: vec![IndicatorKind::Rsi, IndicatorKind::Rsi],
            ..IndicatorRequest::default()
        };
        let report = analyze(&rising_60(), &request).unwrap();
        assert_eq!(report.results.len(), 1);
    }

    #[test]
    fn falling_series_is_oversold() {
        let prices: Vec<f64> = (0..60).map(|i| 100.0 * 0.99f64.powi(i)).collect();
        let request = IndicatorRequest {
            indicators: vec![IndicatorKind::Rsi, IndicatorKind::Sma, IndicatorKind::Adx],
            ..IndicatorRequest::default()
        };
        let report = analyze(&series_from(&prices), &request).unwrap();
        assert_eq!(report.result(IndicatorKind::Rsi).unwrap().signal, Signal::Oversold);
        assert_eq!(report.result(IndicatorKind::Sma).unwrap().signal, Signal::Bearish);
        assert_eq!(report.result(IndicatorKind::Adx).unwrap().signal, Signal::Bearish);
        assert_eq!(report.aggregate_signal, Signal::Bearish);
        assert_eq!(report.confidence, 67);
    }

    #[test]
    fn price_comparisons_use_the_latest_close() {
        let mut prices = vec![100.0; 20];
        prices.push(120.0);
        let request = IndicatorRequest {
            indicators: vec![IndicatorKind::Sma],
            ..IndicatorRequest::default()
        };
        let report = analyze(&series_from(&prices), &request).unwrap();
        let sma = report.result(IndicatorKind::Sma).unwrap();
        assert_eq!(sma.signal, Signal::Bullish);
        assert!(sma.interpretation.contains("close 120.00"), "{}", sma.interpretation);
        assert_eq!(report.as_of, NaiveDate::from_ymd_opt(2024, 1, 21).unwrap());
    }

    #[test]
    fn vote_majority_and_confidence() {
        let (signal, confidence, tally) = aggregate_signals(&[
            Signal::Bullish,
            Signal::Bullish,
            Signal::Overbought,
            Signal::Neutral,
        ]);
        assert_eq!(signal, Signal::Bullish);
        assert_eq!(confidence, 67);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn vote_tie_is_neutral() {
        let (signal, confidence, _) = aggregate_signals(&[Signal::Bullish, Signal::Bearish]);
        assert_eq!(signal, Signal::Neutral);
        assert_eq!(confidence, 50);
    }

    #[test]
    fn vote_with_only_neutral() {
        let (signal, confidence, _) = aggregate_signals(&[Signal::Neutral, Signal::Neutral]);
        assert_eq!(signal, Signal::Neutral);
        assert_eq!(confidence, 0);
    }

    #[test]
    fn indicator_kind_parses_case_insensitively() {
        assert_eq!("MACD".parse::<IndicatorKind>().unwrap(), IndicatorKind::Macd);
        assert_eq!(" adx ".parse::<IndicatorKind>().unwrap(), IndicatorKind::Adx);
        assert!("vwap".parse::<IndicatorKind>().is_err());
    }

    #[test]
    fn repeated_analysis_is_identical() {
        let series = rising_60();
        let a = analyze(&series, &IndicatorRequest::default()).unwrap();
        let b = analyze(&series, &IndicatorRequest::default()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
