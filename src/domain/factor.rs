//! Multi-factor scoring.
//!
//! Each metric is mapped onto a 1–10 scale with a clamped linear band, factors
//! average their metric scores, and the combined assessment weights the
//! factors that could be scored.

use crate::domain::error::SamquantError;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::signal::Signal;
use crate::domain::stats;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub const BARS_1M: usize = 21;
pub const BARS_3M: usize = 63;
pub const BARS_6M: usize = 126;

pub const LARGE_CAP: f64 = 10e9;
pub const MID_CAP: f64 = 2e9;

const STRONG_FACTOR: f64 = 7.0;
const WEAK_FACTOR: f64 = 4.0;

/// Raw inputs for factor scoring. Every metric is optional; factors with no
/// metric present are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FactorMetrics {
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub ps: Option<f64>,
    pub roe: Option<f64>,
    pub roa: Option<f64>,
    pub operating_margin: Option<f64>,
    pub return_1m: Option<f64>,
    pub return_3m: Option<f64>,
    pub return_6m: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub market_cap: Option<f64>,
    pub volatility: Option<f64>,
    pub beta: Option<f64>,
    /// Carried for strategy context; not part of any factor.
    pub dividend_yield: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BenchmarkReturns {
    pub return_1m: Option<f64>,
    pub return_3m: Option<f64>,
    pub return_6m: Option<f64>,
}

fn period_return(closes: &[f64], bars: usize) -> Option<f64> {
    let last = *closes.last()?;
    let base = *closes.get(closes.len().checked_sub(bars + 1)?)?;
    (base > 0.0).then(|| last / base - 1.0)
}

impl BenchmarkReturns {
    pub fn from_prices(series: &PriceSeries) -> Self {
        let closes = series.closes();
        Self {
            return_1m: period_return(&closes, BARS_1M),
            return_3m: period_return(&closes, BARS_3M),
            return_6m: period_return(&closes, BARS_6M),
        }
    }
}

impl FactorMetrics {
    /// Derive the price-based metrics: 1/3/6 month returns, annualized
    /// realized volatility and, with an aligned benchmark, beta.
    ///
    /// Horizons longer than the series are left empty.
    pub fn from_prices(
        series: &PriceSeries,
        benchmark: Option<&PriceSeries>,
    ) -> Result<Self, SamquantError> {
        let closes = series.closes();
        if closes.len() < 3 {
            return Err(SamquantError::insufficient(
                format!("price metrics for {}", series.ticker()),
                closes.len(),
                3,
            ));
        }
        let rets = stats::returns(&closes)?;
        let volatility =
            stats::annualize_volatility(stats::stddev(&rets)?, stats::TRADING_DAYS_PER_YEAR);

        let beta = match benchmark {
            Some(bench) => {
                series.ensure_aligned(bench)?;
                let bench_rets = stats::returns(&bench.closes())?;
                let var = stats::variance(&bench_rets)?;
                if var > 0.0 {
                    Some(stats::covariance(&rets, &bench_rets)? / var)
                } else {
                    None
                }
            }
            None => None,
        };

        Ok(Self {
            return_1m: period_return(&closes, BARS_1M),
            return_3m: period_return(&closes, BARS_3M),
            return_6m: period_return(&closes, BARS_6M),
            volatility: Some(volatility),
            beta,
            ..Self::default()
        })
    }

    /// Fill every missing metric from `fallback`.
    pub fn or(self, fallback: FactorMetrics) -> Self {
        Self {
            pe: self.pe.or(fallback.pe),
            pb: self.pb.or(fallback.pb),
            ps: self.ps.or(fallback.ps),
            roe: self.roe.or(fallback.roe),
            roa: self.roa.or(fallback.roa),
            operating_margin: self.operating_margin.or(fallback.operating_margin),
            return_1m: self.return_1m.or(fallback.return_1m),
            return_3m: self.return_3m.or(fallback.return_3m),
            return_6m: self.return_6m.or(fallback.return_6m),
            earnings_growth: self.earnings_growth.or(fallback.earnings_growth),
            revenue_growth: self.revenue_growth.or(fallback.revenue_growth),
            market_cap: self.market_cap.or(fallback.market_cap),
            volatility: self.volatility.or(fallback.volatility),
            beta: self.beta.or(fallback.beta),
            dividend_yield: self.dividend_yield.or(fallback.dividend_yield),
        }
    }

    /// Set a metric by its snake_case name. Returns false for unknown names.
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        let slot = match name {
            "pe" => &mut self.pe,
            "pb" => &mut self.pb,
            "ps" => &mut self.ps,
            "roe" => &mut self.roe,
            "roa" => &mut self.roa,
            "operating_margin" => &mut self.operating_margin,
            "return_1m" => &mut self.return_1m,
            "return_3m" => &mut self.return_3m,
            "return_6m" => &mut self.return_6m,
            "earnings_growth" => &mut self.earnings_growth,
            "revenue_growth" => &mut self.revenue_growth,
            "market_cap" => &mut self.market_cap,
            "volatility" => &mut self.volatility,
            "beta" => &mut self.beta,
            "dividend_yield" => &mut self.dividend_yield,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    fn named(&self) -> [(&'static str, Option<f64>); 15] {
        [
            ("pe", self.pe),
            ("pb", self.pb),
            ("ps", self.ps),
            ("roe", self.roe),
            ("roa", self.roa),
            ("operating_margin", self.operating_margin),
            ("return_1m", self.return_1m),
            ("return_3m", self.return_3m),
            ("return_6m", self.return_6m),
            ("earnings_growth", self.earnings_growth),
            ("revenue_growth", self.revenue_growth),
            ("market_cap", self.market_cap),
            ("volatility", self.volatility),
            ("beta", self.beta),
            ("dividend_yield", self.dividend_yield),
        ]
    }

    pub fn validate(&self) -> Result<(), SamquantError> {
        for (name, value) in self.named() {
            if let Some(v) = value.filter(|v| !v.is_finite()) {
                return Err(SamquantError::invalid(name, format!("non-finite value {v}")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Value,
    Quality,
    Momentum,
    Size,
    Volatility,
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactorKind::Value => "value",
            FactorKind::Quality => "quality",
            FactorKind::Momentum => "momentum",
            FactorKind::Size => "size",
            FactorKind::Volatility => "volatility",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Large,
    Mid,
    Small,
}

impl SizeClass {
    pub fn from_market_cap(market_cap: f64) -> Self {
        if market_cap >= LARGE_CAP {
            SizeClass::Large
        } else if market_cap >= MID_CAP {
            SizeClass::Mid
        } else {
            SizeClass::Small
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorScore {
    pub factor: FactorKind,
    pub raw_metrics: BTreeMap<String, f64>,
    pub normalized_score: f64,
    pub signal: Signal,
    pub interpretation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinedFactorAssessment {
    pub score: f64,
    pub signal: Signal,
    pub confidence: u32,
    pub strong_factors: Vec<FactorKind>,
    pub weak_factors: Vec<FactorKind>,
    pub size: Option<SizeClass>,
    pub factors: Vec<FactorScore>,
}

impl CombinedFactorAssessment {
    pub fn factor(&self, kind: FactorKind) -> Option<&FactorScore> {
        self.factors.iter().find(|f| f.factor == kind)
    }
}

#[derive(Debug, Clone, Copy)]
struct Band {
    min: f64,
    max: f64,
    higher_is_better: bool,
}

impl Band {
    const fn higher(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            higher_is_better: true,
        }
    }

    const fn lower(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            higher_is_better: false,
        }
    }

    fn score(&self, x: f64) -> f64 {
        let t = ((x - self.min) / (self.max - self.min)).clamp(0.0, 1.0);
        if self.higher_is_better {
            1.0 + 9.0 * t
        } else {
            10.0 - 9.0 * t
        }
    }
}

const PE: Band = Band::lower(5.0, 40.0);
const PB: Band = Band::lower(0.5, 8.0);
const PS: Band = Band::lower(0.5, 10.0);
const ROE: Band = Band::higher(0.0, 0.30);
const ROA: Band = Band::higher(0.0, 0.15);
const OPERATING_MARGIN: Band = Band::higher(0.0, 0.35);
const RELATIVE_1M: Band = Band::higher(-0.10, 0.10);
const RELATIVE_3M: Band = Band::higher(-0.20, 0.20);
const RELATIVE_6M: Band = Band::higher(-0.30, 0.30);
const EARNINGS_GROWTH: Band = Band::higher(-0.20, 0.40);
const REVENUE_GROWTH: Band = Band::higher(-0.10, 0.30);
const VOLATILITY: Band = Band::lower(0.10, 0.60);
const BETA: Band = Band::lower(0.5, 2.0);

const COMBINED_WEIGHTS: [(FactorKind, f64); 4] = [
    (FactorKind::Value, 0.25),
    (FactorKind::Quality, 0.20),
    (FactorKind::Momentum, 0.25),
    (FactorKind::Volatility, 0.15),
];

/// (name, value, band, weight) entries present in the metrics.
type Scored = Vec<(&'static str, f64, f64, f64)>;

fn collect(entries: &[(&'static str, Option<f64>, Band, f64)]) -> Scored {
    entries
        .iter()
        .filter_map(|(name, value, band, weight)| value.map(|v| (*name, v, band.score(v), *weight)))
        .collect()
}

fn build(factor: FactorKind, scored: &Scored, describe: fn(f64) -> &'static str) -> Option<FactorScore> {
    if scored.is_empty() {
        return None;
    }
    let total_weight: f64 = scored.iter().map(|s| s.3).sum();
    let score = scored.iter().map(|s| s.2 * s.3).sum::<f64>() / total_weight;
    let raw_metrics = scored
        .iter()
        .map(|(name, value, _, _)| (name.to_string(), *value))
        .collect();
    Some(FactorScore {
        factor,
        raw_metrics,
        normalized_score: score,
        signal: Signal::from_score(score),
        interpretation: format!("{factor} score {score:.1}: {}", describe(score)),
    })
}

pub fn value_score(m: &FactorMetrics) -> Option<FactorScore> {
    let scored = collect(&[
        ("pe", m.pe, PE, 1.0),
        ("pb", m.pb, PB, 1.0),
        ("ps", m.ps, PS, 1.0),
    ]);
    build(FactorKind::Value, &scored, |s| {
        if s >= STRONG_FACTOR {
            "attractively valued"
        } else if s <= WEAK_FACTOR {
            "expensive relative to fundamentals"
        } else {
            "fairly valued"
        }
    })
}

pub fn quality_score(m: &FactorMetrics) -> Option<FactorScore> {
    let scored = collect(&[
        ("roe", m.roe, ROE, 1.0),
        ("roa", m.roa, ROA, 1.0),
        ("operating_margin", m.operating_margin, OPERATING_MARGIN, 1.0),
    ]);
    build(FactorKind::Quality, &scored, |s| {
        if s >= STRONG_FACTOR {
            "high profitability"
        } else if s <= WEAK_FACTOR {
            "weak profitability"
        } else {
            "average profitability"
        }
    })
}

/// Momentum from period returns (relative to `benchmark` when given) and
/// growth rates, weighted and renormalized over the inputs present.
pub fn momentum_score(m: &FactorMetrics, benchmark: Option<&BenchmarkReturns>) -> Option<FactorScore> {
    let relative = |ret: Option<f64>, bench: Option<f64>| ret.map(|r| r - bench.unwrap_or(0.0));
    let bench = benchmark.copied().unwrap_or_default();
    let scored = collect(&[
        ("return_1m", relative(m.return_1m, bench.return_1m), RELATIVE_1M, 0.10),
        ("return_3m", relative(m.return_3m, bench.return_3m), RELATIVE_3M, 0.20),
        ("return_6m", relative(m.return_6m, bench.return_6m), RELATIVE_6M, 0.30),
        ("earnings_growth", m.earnings_growth, EARNINGS_GROWTH, 0.25),
        ("revenue_growth", m.revenue_growth, REVENUE_GROWTH, 0.15),
    ]);
    build(FactorKind::Momentum, &scored, |s| {
        if s >= STRONG_FACTOR {
            "strong price and earnings momentum"
        } else if s <= WEAK_FACTOR {
            "lagging momentum"
        } else {
            "mixed momentum"
        }
    })
}

pub fn volatility_score(m: &FactorMetrics) -> Option<FactorScore> {
    let scored = collect(&[
        ("volatility", m.volatility, VOLATILITY, 1.0),
        ("beta", m.beta, BETA, 1.0),
    ]);
    build(FactorKind::Volatility, &scored, |s| {
        if s >= STRONG_FACTOR {
            "low risk profile"
        } else if s <= WEAK_FACTOR {
            "high risk profile"
        } else {
            "moderate risk profile"
        }
    })
}

pub fn size_score(m: &FactorMetrics) -> Option<FactorScore> {
    let cap = m.market_cap?;
    let class = SizeClass::from_market_cap(cap);
    let label = match class {
        SizeClass::Large => "large cap",
        SizeClass::Mid => "mid cap",
        SizeClass::Small => "small cap",
    };
    Some(FactorScore {
        factor: FactorKind::Size,
        raw_metrics: BTreeMap::from([("market_cap".to_string(), cap)]),
        normalized_score: 5.5,
        signal: Signal::Neutral,
        interpretation: format!("{label} ({:.1}B market cap)", cap / 1e9),
    })
}

/// Score every factor that has inputs and combine them.
///
/// Size is reported but does not contribute to the combined score.
pub fn score_factors(
    metrics: &FactorMetrics,
    benchmark: Option<&BenchmarkReturns>,
) -> Result<CombinedFactorAssessment, SamquantError> {
    metrics.validate()?;
    if let Some(b) = benchmark {
        for (name, v) in [
            ("benchmark return_1m", b.return_1m),
            ("benchmark return_3m", b.return_3m),
            ("benchmark return_6m", b.return_6m),
        ] {
            if let Some(v) = v.filter(|v| !v.is_finite()) {
                return Err(SamquantError::invalid(name, format!("non-finite value {v}")));
            }
        }
    }

    let factors: Vec<FactorScore> = [
        value_score(metrics),
        quality_score(metrics),
        momentum_score(metrics, benchmark),
        size_score(metrics),
        volatility_score(metrics),
    ]
    .into_iter()
    .flatten()
    .collect();

    let weighted: Vec<(FactorKind, f64, f64)> = COMBINED_WEIGHTS
        .iter()
        .filter_map(|(kind, w)| {
            factors
                .iter()
                .find(|f| f.factor == *kind)
                .map(|f| (*kind, f.normalized_score, *w))
        })
        .collect();

    if weighted.is_empty() {
        return Err(SamquantError::insufficient("factor scoring", 0, 1));
    }

    let total_weight: f64 = weighted.iter().map(|w| w.2).sum();
    let score = weighted.iter().map(|w| w.1 * w.2).sum::<f64>() / total_weight;
    let confidence = (30.0 + (score - 5.0).abs() * 20.0).clamp(30.0, 95.0).round() as u32;

    let strong_factors = weighted
        .iter()
        .filter(|w| w.1 >= STRONG_FACTOR)
        .map(|w| w.0)
        .collect();
    let weak_factors = weighted
        .iter()
        .filter(|w| w.1 <= WEAK_FACTOR)
        .map(|w| w.0)
        .collect();

    debug!(score, factors = weighted.len(), "factor assessment");

    Ok(CombinedFactorAssessment {
        score,
        signal: Signal::from_score(score),
        confidence,
        strong_factors,
        weak_factors,
        size: metrics.market_cap.map(SizeClass::from_market_cap),
        factors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn band_edges_and_clamping() {
        assert_relative_eq!(PE.score(5.0), 10.0);
        assert_relative_eq!(PE.score(40.0), 1.0);
        assert_relative_eq!(PE.score(2.0), 10.0);
        assert_relative_eq!(PE.score(100.0), 1.0);
        assert_relative_eq!(ROE.score(0.15), 5.5);
    }

    #[test]
    fn value_averages_present_metrics() {
        let m = FactorMetrics {
            pe: Some(5.0),
            pb: Some(8.0),
            ..FactorMetrics::default()
        };
        let value = value_score(&m).unwrap();
        assert_relative_eq!(value.normalized_score, 5.5);
        assert_eq!(value.raw_metrics.len(), 2);
        assert_eq!(value.signal, Signal::Neutral);
    }

    #[test]
    fn momentum_renormalizes_weights() {
        let m = FactorMetrics {
            return_6m: Some(0.30),
            ..FactorMetrics::default()
        };
        let momentum = momentum_score(&m, None).unwrap();
        assert_relative_eq!(momentum.normalized_score, 10.0);
    }

    #[test]
    fn momentum_is_relative_to_benchmark() {
        let m = FactorMetrics {
            return_3m: Some(0.10),
            ..FactorMetrics::default()
        };
        let bench = BenchmarkReturns {
            return_3m: Some(0.10),
            ..BenchmarkReturns::default()
        };
        let momentum = momentum_score(&m, Some(&bench)).unwrap();
        assert_relative_eq!(momentum.normalized_score, 5.5);
        assert_relative_eq!(momentum.raw_metrics["return_3m"], 0.0);
    }

    #[test]
    fn combined_strong_profile() {
        let m = FactorMetrics {
            pe: Some(6.0),
            pb: Some(0.8),
            roe: Some(0.28),
            return_6m: Some(0.25),
            volatility: Some(0.12),
            market_cap: Some(50e9),
            ..FactorMetrics::default()
        };
        let combined = score_factors(&m, None).unwrap();
        assert!(combined.score >= 7.0);
        assert_eq!(combined.signal, Signal::Bullish);
        assert_eq!(combined.strong_factors.len(), 4);
        assert!(combined.weak_factors.is_empty());
        assert_eq!(combined.size, Some(SizeClass::Large));
        assert!(combined.confidence >= 70);
        assert!(combined.factor(FactorKind::Size).is_some());
    }

    #[test]
    fn confidence_floor_at_midpoint() {
        let m = FactorMetrics {
            roe: Some(0.15),
            ..FactorMetrics::default()
        };
        let combined = score_factors(&m, None).unwrap();
        assert_relative_eq!(combined.score, 5.5);
        assert_eq!(combined.confidence, 40);
        assert_eq!(combined.signal, Signal::Neutral);
    }

    #[test]
    fn weak_profile_is_bearish() {
        let m = FactorMetrics {
            pe: Some(60.0),
            roe: Some(-0.05),
            volatility: Some(0.8),
            ..FactorMetrics::default()
        };
        let combined = score_factors(&m, None).unwrap();
        assert_relative_eq!(combined.score, 1.0);
        assert_eq!(combined.signal, Signal::Bearish);
        assert_eq!(combined.confidence, 95);
        assert_eq!(combined.weak_factors.len(), 3);
    }

    #[test]
    fn size_only_is_insufficient() {
        let m = FactorMetrics {
            market_cap: Some(1e9),
            ..FactorMetrics::default()
        };
        let err = score_factors(&m, None).unwrap_err();
        assert!(matches!(err, SamquantError::InsufficientData { .. }));
    }

    #[test]
    fn nan_metric_is_rejected() {
        let m = FactorMetrics {
            pe: Some(f64::NAN),
            ..FactorMetrics::default()
        };
        let err = score_factors(&m, None).unwrap_err();
        assert!(matches!(err, SamquantError::InvalidParameter { .. }));
    }

    #[test]
    fn size_classes() {
        assert_eq!(SizeClass::from_market_cap(10e9), SizeClass::Large);
        assert_eq!(SizeClass::from_market_cap(2e9), SizeClass::Mid);
        assert_eq!(SizeClass::from_market_cap(1.99e9), SizeClass::Small);
    }

    #[test]
    fn metrics_from_prices() {
        let closes: Vec<f64> = (0..130).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let series = PriceSeries::from_closes("UP", start(), &closes).unwrap();
        let m = FactorMetrics::from_prices(&series, None).unwrap();
        assert_relative_eq!(m.return_1m.unwrap(), 1.01f64.powi(21) - 1.0, epsilon = 1e-9);
        assert_relative_eq!(m.return_6m.unwrap(), 1.01f64.powi(126) - 1.0, epsilon = 1e-9);
        assert!(m.volatility.unwrap() < 1e-9);
        assert_eq!(m.beta, None);
    }

    #[test]
    fn metrics_from_prices_beta_against_benchmark() {
        let bench: Vec<f64> = (0..40)
            .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 } + i as f64 * 0.1)
            .collect();
        let bench_series = PriceSeries::from_closes("IDX", start(), &bench).unwrap();
        let m = FactorMetrics::from_prices(&bench_series, Some(&bench_series)).unwrap();
        assert_relative_eq!(m.beta.unwrap(), 1.0, epsilon = 1e-9);
        assert_eq!(m.return_3m, None);
    }

    #[test]
    fn or_fills_missing_metrics() {
        let fundamentals = FactorMetrics {
            pe: Some(12.0),
            volatility: Some(0.5),
            ..FactorMetrics::default()
        };
        let prices = FactorMetrics {
            volatility: Some(0.2),
            return_1m: Some(0.01),
            ..FactorMetrics::default()
        };
        let merged = fundamentals.or(prices);
        assert_eq!(merged.pe, Some(12.0));
        assert_eq!(merged.volatility, Some(0.5));
        assert_eq!(merged.return_1m, Some(0.01));
    }

    #[test]
    fn set_by_name() {
        let mut m = FactorMetrics::default();
        assert!(m.set("roe", 0.2));
        assert!(!m.set("ebitda", 1.0));
        assert_eq!(m.roe, Some(0.2));
    }
}
