//! Strategy recommendation scoring.
//!
//! Nine strategies start at zero and collect fixed deltas from the investor
//! profile (risk tolerance, horizon, market condition) and from whichever
//! fundamental, technical and macro context is supplied.

use crate::domain::analysis::{IndicatorKind, IndicatorReport};
use crate::domain::error::SamquantError;
use crate::domain::factor::FactorMetrics;
use crate::domain::signal::Signal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Value,
    Growth,
    Momentum,
    MeanReversion,
    TrendFollowing,
    Dividend,
    Factor,
    Quantitative,
    Technical,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 9] = [
        StrategyKind::Value,
        StrategyKind::Growth,
        StrategyKind::Momentum,
        StrategyKind::MeanReversion,
        StrategyKind::TrendFollowing,
        StrategyKind::Dividend,
        StrategyKind::Factor,
        StrategyKind::Quantitative,
        StrategyKind::Technical,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StrategyKind::Value => "value",
            StrategyKind::Growth => "growth",
            StrategyKind::Momentum => "momentum",
            StrategyKind::MeanReversion => "mean_reversion",
            StrategyKind::TrendFollowing => "trend_following",
            StrategyKind::Dividend => "dividend",
            StrategyKind::Factor => "factor",
            StrategyKind::Quantitative => "quantitative",
            StrategyKind::Technical => "technical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    Bull,
    Bear,
    Neutral,
    Volatile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateTrend {
    Rising,
    Falling,
    Stable,
}

fn parse_choice<T: Copy>(name: &str, raw: &str, choices: &[(&str, T)]) -> Result<T, SamquantError> {
    let wanted = raw.trim().to_ascii_lowercase();
    choices
        .iter()
        .find(|(label, _)| *label == wanted)
        .map(|(_, v)| *v)
        .ok_or_else(|| {
            let labels: Vec<&str> = choices.iter().map(|(l, _)| *l).collect();
            SamquantError::invalid(name, format!("'{raw}' is not one of {}", labels.join(", ")))
        })
}

impl FromStr for RiskTolerance {
    type Err = SamquantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            "risk_tolerance",
            s,
            &[
                ("low", RiskTolerance::Low),
                ("moderate", RiskTolerance::Moderate),
                ("high", RiskTolerance::High),
            ],
        )
    }
}

impl FromStr for Horizon {
    type Err = SamquantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            "horizon",
            s,
            &[
                ("short", Horizon::Short),
                ("medium", Horizon::Medium),
                ("long", Horizon::Long),
            ],
        )
    }
}

impl FromStr for MarketCondition {
    type Err = SamquantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            "market_condition",
            s,
            &[
                ("bull", MarketCondition::Bull),
                ("bear", MarketCondition::Bear),
                ("neutral", MarketCondition::Neutral),
                ("volatile", MarketCondition::Volatile),
            ],
        )
    }
}

impl FromStr for RateTrend {
    type Err = SamquantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_choice(
            "rate_trend",
            s,
            &[
                ("rising", RateTrend::Rising),
                ("falling", RateTrend::Falling),
                ("stable", RateTrend::Stable),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FundamentalContext {
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub roe: Option<f64>,
}

impl FundamentalContext {
    pub fn from_metrics(metrics: &FactorMetrics) -> Self {
        Self {
            pe: metrics.pe,
            pb: metrics.pb,
            dividend_yield: metrics.dividend_yield,
            earnings_growth: metrics.earnings_growth,
            revenue_growth: metrics.revenue_growth,
            roe: metrics.roe,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TechnicalContext {
    pub rsi: Option<f64>,
    /// Bullish or bearish MACD reading.
    pub macd_signal: Option<Signal>,
    pub adx: Option<f64>,
    pub above_long_sma: Option<bool>,
}

impl TechnicalContext {
    /// Pull RSI, MACD, ADX and the SMA position out of an indicator report.
    pub fn from_report(report: &IndicatorReport) -> Self {
        let above_long_sma = report.result(IndicatorKind::Sma).and_then(|r| match r.signal {
            Signal::Bullish => Some(true),
            Signal::Bearish => Some(false),
            _ => None,
        });
        Self {
            rsi: report.result(IndicatorKind::Rsi).map(|r| r.current_value.primary()),
            macd_signal: report.result(IndicatorKind::Macd).map(|r| r.signal),
            adx: report.result(IndicatorKind::Adx).map(|r| r.current_value.primary()),
            above_long_sma,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MacroContext {
    pub vix: Option<f64>,
    pub rate_trend: Option<RateTrend>,
    pub gdp_growth: Option<f64>,
    pub inflation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyInputs {
    pub risk_tolerance: RiskTolerance,
    pub horizon: Horizon,
    pub market: MarketCondition,
    pub fundamental: Option<FundamentalContext>,
    pub technical: Option<TechnicalContext>,
    pub macro_context: Option<MacroContext>,
}

impl StrategyInputs {
    pub fn new(risk_tolerance: RiskTolerance, horizon: Horizon, market: MarketCondition) -> Self {
        Self {
            risk_tolerance,
            horizon,
            market,
            fundamental: None,
            technical: None,
            macro_context: None,
        }
    }

    /// Every supplied context value must be finite.
    pub fn validate(&self) -> Result<(), SamquantError> {
        let mut fields: Vec<(&str, Option<f64>)> = Vec::new();
        if let Some(f) = &self.fundamental {
            fields.extend([
                ("pe", f.pe),
                ("pb", f.pb),
                ("dividend_yield", f.dividend_yield),
                ("earnings_growth", f.earnings_growth),
                ("revenue_growth", f.revenue_growth),
                ("roe", f.roe),
            ]);
        }
        if let Some(t) = &self.technical {
            fields.extend([("rsi", t.rsi), ("adx", t.adx)]);
        }
        if let Some(m) = &self.macro_context {
            fields.extend([
                ("vix", m.vix),
                ("gdp_growth", m.gdp_growth),
                ("inflation", m.inflation),
            ]);
        }
        match fields
            .into_iter()
            .find(|(_, value)| value.is_some_and(|v| !v.is_finite()))
        {
            Some((name, value)) => Err(SamquantError::invalid(
                name,
                format!("context value {value:?} is not finite"),
            )),
            None => Ok(()),
        }
    }

    fn context_count(&self) -> usize {
        [
            self.fundamental.is_some(),
            self.technical.is_some(),
            self.macro_context.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskManagement {
    pub max_position_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub trailing_stop_pct: f64,
}

impl RiskManagement {
    pub fn for_tolerance(tolerance: RiskTolerance) -> Self {
        match tolerance {
            RiskTolerance::Low => Self {
                max_position_pct: 5.0,
                stop_loss_pct: 5.0,
                take_profit_pct: 10.0,
                trailing_stop_pct: 3.0,
            },
            RiskTolerance::Moderate => Self {
                max_position_pct: 10.0,
                stop_loss_pct: 8.0,
                take_profit_pct: 20.0,
                trailing_stop_pct: 5.0,
            },
            RiskTolerance::High => Self {
                max_position_pct: 15.0,
                stop_loss_pct: 12.0,
                take_profit_pct: 30.0,
                trailing_stop_pct: 8.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradingRules {
    pub entry: Vec<String>,
    pub exit: Vec<String>,
    pub risk_management: RiskManagement,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StrategyScore {
    pub strategy: StrategyKind,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyRecommendation {
    pub primary: StrategyKind,
    pub secondary: StrategyKind,
    /// Share of capital for the primary strategy; the rest goes to the secondary.
    pub allocation_pct: u32,
    pub parameters: BTreeMap<String, f64>,
    pub trading_rules: TradingRules,
    pub confidence: u32,
    /// All strategies, best first.
    pub scores: Vec<StrategyScore>,
}

type Deltas = &'static [(StrategyKind, i32)];

use StrategyKind::{
    Dividend, Factor, Growth, MeanReversion, Momentum, Quantitative, Technical, TrendFollowing,
    Value,
};

fn risk_deltas(risk: RiskTolerance) -> Deltas {
    match risk {
        RiskTolerance::Low => &[
            (Value, 35),
            (Dividend, 40),
            (Factor, 10),
            (Quantitative, 5),
            (Momentum, -20),
            (TrendFollowing, -20),
            (Growth, -5),
            (Technical, -5),
        ],
        RiskTolerance::Moderate => &[
            (Value, 10),
            (Growth, 10),
            (Factor, 15),
            (Quantitative, 10),
            (TrendFollowing, 10),
            (Momentum, 5),
            (Dividend, 10),
            (MeanReversion, 5),
            (Technical, 5),
        ],
        RiskTolerance::High => &[
            (Growth, 20),
            (Momentum, 25),
            (Technical, 15),
            (TrendFollowing, 15),
            (MeanReversion, 10),
            (Quantitative, 10),
            (Dividend, -10),
            (Factor, 5),
        ],
    }
}

fn horizon_deltas(horizon: Horizon) -> Deltas {
    match horizon {
        Horizon::Short => &[
            (Momentum, 15),
            (Technical, 20),
            (MeanReversion, 15),
            (TrendFollowing, 5),
            (Value, -5),
            (Dividend, -10),
        ],
        Horizon::Medium => &[
            (TrendFollowing, 15),
            (Factor, 10),
            (Quantitative, 10),
            (Growth, 10),
            (Momentum, 5),
            (MeanReversion, 5),
            (Value, 5),
        ],
        Horizon::Long => &[
            (Value, 20),
            (Dividend, 20),
            (Growth, 15),
            (Factor, 10),
            (Technical, -10),
            (Momentum, -5),
        ],
    }
}

fn market_deltas(market: MarketCondition) -> Deltas {
    match market {
        MarketCondition::Bull => &[
            (Momentum, 15),
            (Growth, 15),
            (TrendFollowing, 20),
            (Dividend, -5),
        ],
        MarketCondition::Bear => &[
            (Value, 15),
            (Dividend, 15),
            (MeanReversion, 10),
            (Momentum, -15),
            (TrendFollowing, -5),
        ],
        MarketCondition::Neutral => &[
            (MeanReversion, 15),
            (Factor, 10),
            (Quantitative, 10),
            (Value, 5),
        ],
        MarketCondition::Volatile => &[
            (MeanReversion, 15),
            (Quantitative, 15),
            (Dividend, 10),
            (Technical, 10),
            (Momentum, -10),
        ],
    }
}

struct Scores([i32; 9]);

impl Scores {
    fn add(&mut self, kind: StrategyKind, delta: i32) {
        self.0[kind.index()] += delta;
    }

    fn apply(&mut self, deltas: Deltas) {
        for (kind, delta) in deltas {
            self.add(*kind, *delta);
        }
    }
}

fn apply_fundamental(scores: &mut Scores, ctx: &FundamentalContext) {
    if let Some(pe) = ctx.pe {
        if pe < 15.0 {
            scores.add(Value, 15);
        } else if pe > 30.0 {
            scores.add(Growth, 5);
            scores.add(Value, -10);
        }
    }
    if ctx.pb.is_some_and(|pb| pb < 1.5) {
        scores.add(Value, 10);
    }
    if let Some(y) = ctx.dividend_yield {
        if y > 0.03 {
            scores.add(Dividend, 20);
        } else if y > 0.015 {
            scores.add(Dividend, 10);
        }
    }
    if ctx.earnings_growth.is_some_and(|g| g > 0.15) {
        scores.add(Growth, 20);
    }
    if ctx.revenue_growth.is_some_and(|g| g > 0.10) {
        scores.add(Growth, 10);
    }
    if ctx.roe.is_some_and(|roe| roe > 0.15) {
        scores.add(Factor, 10);
        scores.add(Value, 5);
    }
}

fn apply_technical(scores: &mut Scores, ctx: &TechnicalContext) {
    if let Some(rsi) = ctx.rsi {
        if (60.0..=75.0).contains(&rsi) {
            scores.add(Momentum, 15);
        }
        if !(30.0..=70.0).contains(&rsi) {
            scores.add(MeanReversion, 15);
        }
    }
    if let Some(adx) = ctx.adx {
        if adx > 25.0 {
            scores.add(TrendFollowing, 20);
            scores.add(Technical, 5);
        } else if adx < 20.0 {
            scores.add(MeanReversion, 10);
        }
    }
    match ctx.macd_signal {
        Some(Signal::Bullish) => {
            scores.add(Momentum, 10);
            scores.add(TrendFollowing, 10);
        }
        Some(Signal::Bearish) => scores.add(MeanReversion, 5),
        _ => {}
    }
    if ctx.above_long_sma == Some(true) {
        scores.add(TrendFollowing, 10);
    }
}

fn apply_macro(scores: &mut Scores, ctx: &MacroContext) {
    if ctx.vix.is_some_and(|vix| vix > 25.0) {
        scores.add(Quantitative, 10);
        scores.add(MeanReversion, 10);
        scores.add(Momentum, -10);
    }
    match ctx.rate_trend {
        Some(RateTrend::Rising) => {
            scores.add(Value, 10);
            scores.add(Growth, -10);
        }
        Some(RateTrend::Falling) => {
            scores.add(Growth, 10);
            scores.add(Dividend, 5);
        }
        _ => {}
    }
    if let Some(gdp) = ctx.gdp_growth {
        if gdp > 0.03 {
            scores.add(Growth, 10);
            scores.add(Momentum, 5);
        } else if gdp < 0.01 {
            scores.add(Dividend, 10);
            scores.add(Value, 5);
        }
    }
    if ctx.inflation.is_some_and(|i| i > 0.04) {
        scores.add(Value, 10);
        scores.add(Growth, -5);
    }
}

/// Strategy parameters keyed by risk tolerance: (name, [low, moderate, high]).
fn parameter_table(kind: StrategyKind) -> &'static [(&'static str, [f64; 3])] {
    match kind {
        Value => &[
            ("max_pe", [15.0, 20.0, 25.0]),
            ("max_pb", [1.5, 2.5, 3.5]),
            ("min_roe", [0.12, 0.10, 0.08]),
        ],
        Growth => &[
            ("min_revenue_growth", [0.10, 0.15, 0.20]),
            ("min_earnings_growth", [0.10, 0.15, 0.25]),
            ("max_peg", [1.5, 2.0, 2.5]),
        ],
        Momentum => &[
            ("lookback_days", [126.0, 90.0, 63.0]),
            ("min_rsi", [55.0, 60.0, 65.0]),
            ("max_rsi", [70.0, 75.0, 80.0]),
        ],
        MeanReversion => &[
            ("entry_z", [2.5, 2.0, 1.5]),
            ("oversold_rsi", [25.0, 30.0, 35.0]),
            ("max_holding_days", [10.0, 15.0, 20.0]),
        ],
        TrendFollowing => &[
            ("fast_ma", [50.0, 20.0, 10.0]),
            ("slow_ma", [200.0, 100.0, 50.0]),
            ("min_adx", [30.0, 25.0, 20.0]),
        ],
        Dividend => &[
            ("min_yield", [0.04, 0.03, 0.02]),
            ("max_payout_ratio", [0.60, 0.70, 0.80]),
        ],
        Factor => &[
            ("min_factor_score", [7.5, 7.0, 6.5]),
            ("rebalance_days", [90.0, 63.0, 21.0]),
        ],
        Quantitative => &[
            ("z_threshold", [2.5, 2.0, 1.5]),
            ("lookback_days", [252.0, 126.0, 63.0]),
            ("max_positions", [20.0, 15.0, 10.0]),
        ],
        Technical => &[
            ("rsi_period", [14.0, 14.0, 9.0]),
            ("rsi_overbought", [70.0, 70.0, 75.0]),
            ("atr_stop_multiple", [2.0, 2.5, 3.0]),
        ],
    }
}

pub fn strategy_parameters(kind: StrategyKind, risk: RiskTolerance) -> BTreeMap<String, f64> {
    let column = match risk {
        RiskTolerance::Low => 0,
        RiskTolerance::Moderate => 1,
        RiskTolerance::High => 2,
    };
    parameter_table(kind)
        .iter()
        .map(|(name, values)| (name.to_string(), values[column]))
        .collect()
}

fn pct(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

pub fn trading_rules(
    kind: StrategyKind,
    params: &BTreeMap<String, f64>,
    risk: RiskTolerance,
) -> TradingRules {
    let p = |name: &str| params.get(name).copied().unwrap_or_default();
    let (entry, mut exit) = match kind {
        Value => (
            vec![
                format!("P/E below {:.0}", p("max_pe")),
                format!("P/B below {:.1}", p("max_pb")),
                format!("ROE above {}", pct(p("min_roe"))),
            ],
            vec![format!("P/E rises above {:.0}", p("max_pe") * 1.5)],
        ),
        Growth => (
            vec![
                format!("revenue growth above {}", pct(p("min_revenue_growth"))),
                format!("earnings growth above {}", pct(p("min_earnings_growth"))),
                format!("PEG below {:.1}", p("max_peg")),
            ],
            vec!["two consecutive quarters of decelerating growth".to_string()],
        ),
        Momentum => (
            vec![
                format!("{:.0}-day return in the top quintile", p("lookback_days")),
                format!("RSI between {:.0} and {:.0}", p("min_rsi"), p("max_rsi")),
            ],
            vec![format!("RSI above {:.0} or momentum rank drops", p("max_rsi"))],
        ),
        MeanReversion => (
            vec![
                format!("price z-score below -{:.1}", p("entry_z")),
                format!("RSI below {:.0}", p("oversold_rsi")),
            ],
            vec![
                "price returns to its mean".to_string(),
                format!("held {:.0} days without reverting", p("max_holding_days")),
            ],
        ),
        TrendFollowing => (
            vec![
                format!("SMA({:.0}) crosses above SMA({:.0})", p("fast_ma"), p("slow_ma")),
                format!("ADX above {:.0}", p("min_adx")),
            ],
            vec![format!("SMA({:.0}) crosses below SMA({:.0})", p("fast_ma"), p("slow_ma"))],
        ),
        Dividend => (
            vec![
                format!("dividend yield above {}", pct(p("min_yield"))),
                format!("payout ratio below {}", pct(p("max_payout_ratio"))),
            ],
            vec!["dividend cut or payout ratio breach".to_string()],
        ),
        Factor => (
            vec![format!("combined factor score at least {:.1}", p("min_factor_score"))],
            vec![format!("score falls below 5 at the {:.0}-day rebalance", p("rebalance_days"))],
        ),
        Quantitative => (
            vec![format!(
                "spread z-score beyond {:.1} over {:.0} days",
                p("z_threshold"),
                p("lookback_days")
            )],
            vec![
                "spread z-score crosses zero".to_string(),
                format!("hold at most {:.0} positions", p("max_positions")),
            ],
        ),
        Technical => (
            vec![
                format!("RSI({:.0}) crosses up through 30", p("rsi_period")),
                "MACD line crosses above its signal".to_string(),
            ],
            vec![
                format!("RSI({:.0}) above {:.0}", p("rsi_period"), p("rsi_overbought")),
                format!("stop at {:.1} x ATR", p("atr_stop_multiple")),
            ],
        ),
    };

    let risk_management = RiskManagement::for_tolerance(risk);
    exit.push(format!("stop-loss at -{:.0}%", risk_management.stop_loss_pct));
    exit.push(format!("take-profit at +{:.0}%", risk_management.take_profit_pct));
    TradingRules {
        entry,
        exit,
        risk_management,
    }
}

pub fn recommend(inputs: &StrategyInputs) -> Result<StrategyRecommendation, SamquantError> {
    inputs.validate()?;
    let mut scores = Scores([0; 9]);
    scores.apply(risk_deltas(inputs.risk_tolerance));
    scores.apply(horizon_deltas(inputs.horizon));
    scores.apply(market_deltas(inputs.market));
    if let Some(ctx) = &inputs.fundamental {
        apply_fundamental(&mut scores, ctx);
    }
    if let Some(ctx) = &inputs.technical {
        apply_technical(&mut scores, ctx);
    }
    if let Some(ctx) = &inputs.macro_context {
        apply_macro(&mut scores, ctx);
    }

    let mut ranked: Vec<StrategyScore> = StrategyKind::ALL
        .iter()
        .map(|&strategy| StrategyScore {
            strategy,
            score: scores.0[strategy.index()].max(0),
        })
        .collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));

    let primary = ranked[0];
    let secondary = ranked[1];
    let total = primary.score + secondary.score;
    let allocation_pct = if total == 0 {
        50
    } else {
        (primary.score as f64 / total as f64 * 100.0).round() as u32
    };

    let margin = primary.score - secondary.score;
    let margin_adj = if margin >= 20 {
        10
    } else if margin >= 10 {
        5
    } else if margin < 5 {
        -10
    } else {
        0
    };
    let context_adj = match inputs.context_count() {
        0 => -5,
        n => 5 * n as i32,
    };
    let confidence = (70 + margin_adj + context_adj).clamp(50, 95) as u32;

    let parameters = strategy_parameters(primary.strategy, inputs.risk_tolerance);
    let trading_rules = trading_rules(primary.strategy, &parameters, inputs.risk_tolerance);

    debug!(
        primary = %primary.strategy,
        secondary = %secondary.strategy,
        margin,
        confidence,
        "strategy recommended"
    );

    Ok(StrategyRecommendation {
        primary: primary.strategy,
        secondary: secondary.strategy,
        allocation_pct,
        parameters,
        trading_rules,
        confidence,
        scores: ranked,
    })
}
