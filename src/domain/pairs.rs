//! Pair relationship analysis for pairs trading.
//!
//! The spread is the price ratio A/B. Z-scores are taken against the mean and
//! standard deviation of the whole window.

use crate::domain::error::SamquantError;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::stats;
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, warn};

pub const DEFAULT_Z_THRESHOLD: f64 = 2.0;
const CONVERGENCE_Z: f64 = 0.5;
const MIN_POINTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairConfig {
    pub z_threshold: f64,
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            z_threshold: DEFAULT_Z_THRESHOLD,
        }
    }
}

impl PairConfig {
    pub fn validate(&self) -> Result<(), SamquantError> {
        if !(1.0..=3.0).contains(&self.z_threshold) {
            return Err(SamquantError::invalid(
                "z_threshold",
                format!("{} outside [1, 3]", self.z_threshold),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CointegrationEstimate {
    /// Coefficient of variation of the price ratio.
    pub ratio_cov: f64,
    /// 90, 70, 50 or 0.
    pub confidence: u32,
    pub cointegrated: bool,
    /// OLS slope of A on B.
    pub hedge_ratio: Option<f64>,
    /// Dickey–Fuller t-statistic of the OLS residuals. Informational only.
    pub df_statistic: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadPoint {
    pub date: NaiveDate,
    pub ratio: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairSignal {
    /// Ratio stretched high: short A, long B.
    ShortALongB,
    /// Ratio stretched low: long A, short B.
    LongAShortB,
    Convergence,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadDirection {
    Short,
    Long,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairTrade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub direction: SpreadDirection,
    pub entry_ratio: f64,
    pub exit_ratio: f64,
    pub return_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PairBacktest {
    pub trades: Vec<PairTrade>,
    pub total_trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub average_return: f64,
    pub total_return: f64,
    pub sharpe: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PairGrade {
    None,
    Weak,
    Moderate,
    Strong,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairRelationship {
    pub ticker_a: String,
    pub ticker_b: String,
    pub correlation: f64,
    pub cointegration: CointegrationEstimate,
    pub spread: Vec<SpreadPoint>,
    pub current_z_score: f64,
    pub signal: PairSignal,
    pub confidence: u32,
    pub interpretation: String,
    pub backtest: PairBacktest,
    pub grade: PairGrade,
}

fn check_inputs(a: &PriceSeries, b: &PriceSeries) -> Result<(), SamquantError> {
    a.ensure_aligned(b)?;
    if a.len() < MIN_POINTS {
        return Err(SamquantError::insufficient(
            format!("pair {}/{}", a.ticker(), b.ticker()),
            a.len(),
            MIN_POINTS,
        ));
    }
    for series in [a, b] {
        if let Some(p) = series.points().iter().find(|p| p.close <= 0.0) {
            return Err(SamquantError::invalid(
                format!("{} close on {}", series.ticker(), p.date),
                "pair analysis needs strictly positive closes",
            ));
        }
    }
    Ok(())
}

fn cointegration(ratio: &[f64], a: &[f64], b: &[f64]) -> Result<CointegrationEstimate, SamquantError> {
    let ratio_cov = stats::stddev(ratio)? / stats::mean(ratio)?;
    let confidence = if ratio_cov < 0.05 {
        90
    } else if ratio_cov < 0.10 {
        70
    } else if ratio_cov < 0.15 {
        50
    } else {
        0
    };

    let var_b = stats::variance(b)?;
    let (hedge_ratio, df_statistic) = if var_b > 0.0 {
        let beta = stats::covariance(a, b)? / var_b;
        let alpha = stats::mean(a)? - beta * stats::mean(b)?;
        let residuals: Vec<f64> = a.iter().zip(b).map(|(x, y)| x - alpha - beta * y).collect();
        (Some(beta), dickey_fuller(&residuals, stats::mean(a)?))
    } else {
        (None, None)
    };

    Ok(CointegrationEstimate {
        ratio_cov,
        confidence,
        cointegrated: confidence > 0,
        hedge_ratio,
        df_statistic,
    })
}

/// t-statistic of gamma in Δe[t] = gamma * e[t-1] + u[t].
fn dickey_fuller(residuals: &[f64], scale: f64) -> Option<f64> {
    let n = residuals.len().checked_sub(1)?;
    if n < 3 {
        return None;
    }
    let lagged = &residuals[..n];
    let diffs: Vec<f64> = residuals.windows(2).map(|w| w[1] - w[0]).collect();

    let lag_ss: f64 = lagged.iter().map(|e| e * e).sum();
    if (lag_ss / n as f64).sqrt() <= 1e-10 * scale.abs().max(1.0) {
        return None;
    }
    let gamma = lagged.iter().zip(&diffs).map(|(e, d)| e * d).sum::<f64>() / lag_ss;
    let rss: f64 = lagged
        .iter()
        .zip(&diffs)
        .map(|(e, d)| (d - gamma * e).powi(2))
        .sum();
    let se = (rss / (n - 1) as f64 / lag_ss).sqrt();
    (se > 0.0 && se.is_finite()).then(|| gamma / se)
}

/// Z-scores of the ratio against the window. A flat ratio scores 0 everywhere.
fn z_scores(ratio: &[f64]) -> Result<(Vec<f64>, bool), SamquantError> {
    let mean = stats::mean(ratio)?;
    let sd = stats::stddev(ratio)?;
    if sd <= 1e-12 * mean.abs().max(1.0) {
        return Ok((vec![0.0; ratio.len()], true));
    }
    Ok((ratio.iter().map(|r| (r - mean) / sd).collect(), false))
}

fn classify(z: f64, threshold: f64) -> (PairSignal, String) {
    if z.abs() > threshold {
        if z > 0.0 {
            (
                PairSignal::ShortALongB,
                format!("ratio {z:.2} sd above its mean: short A, long B"),
            )
        } else {
            (
                PairSignal::LongAShortB,
                format!("ratio {:.2} sd below its mean: long A, short B", z.abs()),
            )
        }
    } else if z.abs() < CONVERGENCE_Z {
        (
            PairSignal::Convergence,
            format!("ratio near its mean (z {z:.2}): close spread positions"),
        )
    } else {
        (
            PairSignal::Neutral,
            format!("z {z:.2} inside the {threshold:.1} sd band: no action"),
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum BacktestState {
    Flat,
    Positioned {
        entry: usize,
        direction: SpreadDirection,
    },
}

/// Replay the z-score series: enter beyond the threshold, exit on the first
/// crossing of the mean. Open positions at the end are ignored.
pub fn backtest_spread(spread: &[SpreadPoint], threshold: f64) -> PairBacktest {
    let mut trades = Vec::new();
    let mut state = BacktestState::Flat;

    for (i, point) in spread.iter().enumerate() {
        state = match state {
            BacktestState::Flat if point.z_score.abs() > threshold => BacktestState::Positioned {
                entry: i,
                direction: if point.z_score > 0.0 {
                    SpreadDirection::Short
                } else {
                    SpreadDirection::Long
                },
            },
            BacktestState::Flat => BacktestState::Flat,
            BacktestState::Positioned { entry, direction } => {
                let crossed = match direction {
                    SpreadDirection::Short => point.z_score <= 0.0,
                    SpreadDirection::Long => point.z_score >= 0.0,
                };
                if crossed {
                    let start = &spread[entry];
                    let change = (point.ratio - start.ratio) / start.ratio;
                    let return_pct = match direction {
                        SpreadDirection::Short => -change,
                        SpreadDirection::Long => change,
                    };
                    trades.push(PairTrade {
                        entry_date: start.date,
                        exit_date: point.date,
                        direction,
                        entry_ratio: start.ratio,
                        exit_ratio: point.ratio,
                        return_pct,
                    });
                    BacktestState::Flat
                } else {
                    state
                }
            }
        };
    }

    summarize(trades)
}

fn summarize(trades: Vec<PairTrade>) -> PairBacktest {
    if trades.is_empty() {
        return PairBacktest::default();
    }
    let n = trades.len();
    let wins = trades.iter().filter(|t| t.return_pct > 0.0).count();
    let total_return: f64 = trades.iter().map(|t| t.return_pct).sum();
    let average_return = total_return / n as f64;
    PairBacktest {
        total_trades: n,
        wins,
        win_rate: wins as f64 / n as f64,
        average_return,
        total_return,
        sharpe: average_return / ((n as f64).sqrt() * 0.1),
        trades,
    }
}

fn grade(
    coint: &CointegrationEstimate,
    correlation: f64,
    z: f64,
    backtest: &PairBacktest,
    threshold: f64,
) -> PairGrade {
    let mut points = match coint.confidence {
        90 => 3,
        70 => 2,
        50 => 1,
        _ => 0,
    };
    points += if correlation.abs() >= 0.8 {
        2
    } else if correlation.abs() >= 0.6 {
        1
    } else {
        0
    };
    points += if z.abs() > threshold {
        2
    } else if z.abs() > 1.0 {
        1
    } else {
        0
    };
    if backtest.total_trades > 0 {
        points += if backtest.win_rate >= 0.6 {
            2
        } else if backtest.win_rate >= 0.5 {
            1
        } else {
            0
        };
    }
    match points {
        p if p >= 7 => PairGrade::Strong,
        p if p >= 5 => PairGrade::Moderate,
        p if p >= 3 => PairGrade::Weak,
        _ => PairGrade::None,
    }
}

pub fn analyze_pair(
    a: &PriceSeries,
    b: &PriceSeries,
    config: &PairConfig,
) -> Result<PairRelationship, SamquantError> {
    config.validate()?;
    check_inputs(a, b)?;

    let closes_a = a.closes();
    let closes_b = b.closes();
    let correlation = stats::correlation(&stats::returns(&closes_a)?, &stats::returns(&closes_b)?)?;

    let ratio: Vec<f64> = closes_a.iter().zip(&closes_b).map(|(x, y)| x / y).collect();
    let cointegration = cointegration(&ratio, &closes_a, &closes_b)?;
    let (z, degenerate) = z_scores(&ratio)?;

    let spread: Vec<SpreadPoint> = a
        .points()
        .iter()
        .zip(ratio.iter().zip(&z))
        .map(|(p, (r, z))| SpreadPoint {
            date: p.date,
            ratio: *r,
            z_score: *z,
        })
        .collect();
    let current_z_score = z
        .last()
        .copied()
        .ok_or_else(|| {
            SamquantError::insufficient(format!("pair {}/{}", a.ticker(), b.ticker()), 0, MIN_POINTS)
        })?;

    let (signal, interpretation) = if degenerate {
        (PairSignal::Neutral, "price ratio is constant: no spread to trade".to_string())
    } else {
        classify(current_z_score, config.z_threshold)
    };
    let confidence = (50.0 + current_z_score.abs() * 15.0).clamp(0.0, 95.0).round() as u32;
    let backtest = backtest_spread(&spread, config.z_threshold);
    let grade = if degenerate {
        PairGrade::None
    } else {
        grade(&cointegration, correlation, current_z_score, &backtest, config.z_threshold)
    };

    debug!(
        a = a.ticker(),
        b = b.ticker(),
        correlation,
        z = current_z_score,
        ?grade,
        "pair analyzed"
    );

    Ok(PairRelationship {
        ticker_a: a.ticker().to_string(),
        ticker_b: b.ticker().to_string(),
        correlation,
        cointegration,
        spread,
        current_z_score,
        signal,
        confidence,
        interpretation,
        backtest,
        grade,
    })
}

/// Analyze every unordered pair, best grade first, then largest |z|.
///
/// Pairs that cannot be analyzed are logged and skipped.
pub fn scan_pairs(
    universe: &[PriceSeries],
    config: &PairConfig,
) -> Result<Vec<PairRelationship>, SamquantError> {
    config.validate()?;
    if universe.len() < 2 {
        return Err(SamquantError::insufficient("pair scan", universe.len(), 2));
    }

    let mut found = Vec::new();
    for (i, a) in universe.iter().enumerate() {
        for b in &universe[i + 1..] {
            match analyze_pair(a, b, config) {
                Ok(rel) => found.push(rel),
                Err(e) => warn!(a = a.ticker(), b = b.ticker(), error = %e, "pair skipped"),
            }
        }
    }

    found.sort_by(|x, y| {
        y.grade.cmp(&x.grade).then_with(|| {
            y.current_z_score
                .abs()
                .partial_cmp(&x.current_z_score.abs())
                .unwrap_or(Ordering::Equal)
        })
    });
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(ticker: &str, closes: &[f64]) -> PriceSeries {
        PriceSeries::from_closes(ticker, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), closes)
            .unwrap()
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + 10.0 * (i as f64 * 0.4).sin() + i as f64 * 0.2).collect()
    }

    fn point(day: u32, ratio: f64, z_score: f64) -> SpreadPoint {
        SpreadPoint {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            ratio,
            z_score,
        }
    }

    #[test]
    fn identical_pair_is_flat_spread() {
        let a = series("A", &wave(40));
        let b = series("B", &wave(40));
        let rel = analyze_pair(&a, &b, &PairConfig::default()).unwrap();
        assert_relative_eq!(rel.correlation, 1.0, epsilon = 1e-12);
        assert_eq!(rel.current_z_score, 0.0);
        assert!(rel.cointegration.confidence >= 90);
        assert_eq!(rel.signal, PairSignal::Neutral);
        assert_eq!(rel.grade, PairGrade::None);
        assert_eq!(rel.backtest.total_trades, 0);
        assert!(rel.spread.iter().all(|p| p.z_score == 0.0));
    }

    #[test]
    fn divergence_signal_when_ratio_spikes() {
        let b = wave(30);
        let mut a: Vec<f64> = b.iter().map(|x| x * 1.5).collect();
        a[29] *= 1.3;
        let rel = analyze_pair(&series("A", &a), &series("B", &b), &PairConfig::default()).unwrap();
        assert!(rel.current_z_score > 2.0);
        assert_eq!(rel.signal, PairSignal::ShortALongB);
        assert_eq!(rel.confidence, 95);
    }

    #[test]
    fn threshold_out_of_range() {
        let a = series("A", &wave(10));
        let err = analyze_pair(&a, &a, &PairConfig { z_threshold: 3.5 }).unwrap_err();
        assert!(matches!(err, SamquantError::InvalidParameter { .. }));
    }

    #[test]
    fn too_few_points() {
        let a = series("A", &[1.0, 2.0]);
        let err = analyze_pair(&a, &a, &PairConfig::default()).unwrap_err();
        assert!(matches!(err, SamquantError::InsufficientData { need: 3, .. }));
    }

    #[test]
    fn misaligned_dates_rejected() {
        let a = series("A", &wave(10));
        let b = PriceSeries::from_closes("B", NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(), &wave(10))
            .unwrap();
        assert!(analyze_pair(&a, &b, &PairConfig::default()).is_err());
    }

    #[test]
    fn zero_close_rejected() {
        let mut closes = wave(10);
        closes[3] = 0.0;
        let err = analyze_pair(&series("A", &closes), &series("B", &wave(10)), &PairConfig::default())
            .unwrap_err();
        assert!(matches!(err, SamquantError::InvalidParameter { .. }));
    }

    #[test]
    fn backtest_short_round_trip() {
        let spread = vec![
            point(1, 1.00, 0.1),
            point(2, 1.10, 2.5),
            point(3, 1.05, 1.0),
            point(4, 0.99, -0.2),
            point(5, 0.90, -2.4),
        ];
        let bt = backtest_spread(&spread, 2.0);
        assert_eq!(bt.total_trades, 1);
        let trade = &bt.trades[0];
        assert_eq!(trade.direction, SpreadDirection::Short);
        assert_relative_eq!(trade.return_pct, (1.10 - 0.99) / 1.10, epsilon = 1e-12);
        assert_eq!(bt.wins, 1);
        assert_relative_eq!(bt.win_rate, 1.0);
        assert_relative_eq!(bt.sharpe, trade.return_pct / 0.1, epsilon = 1e-12);
    }

    #[test]
    fn backtest_long_trade_and_open_position_ignored() {
        let spread = vec![
            point(1, 1.00, -2.5),
            point(2, 0.98, -1.0),
            point(3, 1.02, 0.0),
            point(4, 0.90, -3.0),
        ];
        let bt = backtest_spread(&spread, 2.0);
        assert_eq!(bt.total_trades, 1);
        assert_eq!(bt.trades[0].direction, SpreadDirection::Long);
        assert_relative_eq!(bt.trades[0].return_pct, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn backtest_without_trades_is_zero() {
        let spread = vec![point(1, 1.0, 0.0), point(2, 1.0, 0.5)];
        let bt = backtest_spread(&spread, 2.0);
        assert_eq!(bt, PairBacktest::default());
        assert_eq!(bt.sharpe, 0.0);
    }

    #[test]
    fn classify_bands() {
        assert_eq!(classify(2.1, 2.0).0, PairSignal::ShortALongB);
        assert_eq!(classify(-2.1, 2.0).0, PairSignal::LongAShortB);
        assert_eq!(classify(0.3, 2.0).0, PairSignal::Convergence);
        assert_eq!(classify(1.5, 2.0).0, PairSignal::Neutral);
    }

    #[test]
    fn grade_points() {
        let coint = CointegrationEstimate {
            ratio_cov: 0.02,
            confidence: 90,
            cointegrated: true,
            hedge_ratio: None,
            df_statistic: None,
        };
        let bt = PairBacktest {
            total_trades: 3,
            wins: 2,
            win_rate: 2.0 / 3.0,
            ..PairBacktest::default()
        };
        // 3 + 2 + 2 + 2
        assert_eq!(grade(&coint, 0.9, 2.5, &bt, 2.0), PairGrade::Strong);
        // 3 + 1 + 1 + 0
        assert_eq!(
            grade(&coint, 0.7, 1.5, &PairBacktest::default(), 2.0),
            PairGrade::Moderate
        );
        // 3 + 0 + 0 + 0
        assert_eq!(
            grade(&coint, 0.1, 0.0, &PairBacktest::default(), 2.0),
            PairGrade::Weak
        );
    }

    #[test]
    fn dickey_fuller_on_mean_reverting_residuals() {
        let residuals: Vec<f64> = (0..50).map(|i| (i as f64 * 2.5).sin()).collect();
        let t = dickey_fuller(&residuals, 1.0).unwrap();
        assert!(t < -3.0);
        assert!(dickey_fuller(&[0.0; 20], 1.0).is_none());
    }

    #[test]
    fn hedge_ratio_for_scaled_series() {
        let b = wave(30);
        let a: Vec<f64> = b.iter().map(|x| 2.0 * x + 5.0).collect();
        let rel = analyze_pair(&series("A", &a), &series("B", &b), &PairConfig::default()).unwrap();
        assert_relative_eq!(rel.cointegration.hedge_ratio.unwrap(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn scan_ranks_all_pairs() {
        let base = wave(40);
        let noisy: Vec<f64> = base
            .iter()
            .enumerate()
            .map(|(i, x)| x * (1.0 + 0.05 * (i as f64 * 1.3).cos()))
            .collect();
        let trend: Vec<f64> = (0..40).map(|i| 50.0 + i as f64 + (i % 3) as f64).collect();
        let universe = vec![series("A", &base), series("B", &noisy), series("C", &trend)];
        let ranked = scan_pairs(&universe, &PairConfig::default()).unwrap();
        assert_eq!(ranked.len(), 3);
        for w in ranked.windows(2) {
            assert!(w[0].grade >= w[1].grade);
        }
    }

    #[test]
    fn scan_needs_two_series() {
        let err = scan_pairs(&[series("A", &wave(5))], &PairConfig::default()).unwrap_err();
        assert!(matches!(err, SamquantError::InsufficientData { .. }));
    }
}
