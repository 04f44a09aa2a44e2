//! Monte Carlo portfolio weight search.
//!
//! Candidate weights are drawn sequentially from the caller's RNG and then
//! evaluated in parallel, so a seeded RNG yields identical results on any
//! thread count.

use crate::domain::error::SamquantError;
use crate::domain::ohlcv::PriceSeries;
use crate::domain::stats;
use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_CANDIDATES: usize = 5000;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;
const TIE_TOLERANCE: f64 = 1e-9;

/// Aligned daily return series for a set of assets.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetReturns {
    tickers: Vec<String>,
    returns: Vec<Vec<f64>>,
}

impl AssetReturns {
    pub fn new(tickers: Vec<String>, returns: Vec<Vec<f64>>) -> Result<Self, SamquantError> {
        if tickers.is_empty() {
            return Err(SamquantError::insufficient("asset returns", 0, 1));
        }
        if tickers.len() != returns.len() {
            return Err(SamquantError::invalid(
                "asset returns",
                format!("{} tickers but {} return series", tickers.len(), returns.len()),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = tickers.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(SamquantError::invalid("tickers", format!("duplicate ticker {dup}")));
        }
        let periods = returns[0].len();
        if periods < 2 {
            return Err(SamquantError::insufficient(
                format!("returns for {}", tickers[0]),
                periods,
                2,
            ));
        }
        for (ticker, series) in tickers.iter().zip(&returns) {
            if series.len() != periods {
                return Err(SamquantError::invalid(
                    format!("returns for {ticker}"),
                    format!("length {} differs from {periods}", series.len()),
                ));
            }
            if let Some(v) = series.iter().find(|v| !v.is_finite()) {
                return Err(SamquantError::invalid(
                    format!("returns for {ticker}"),
                    format!("non-finite value {v}"),
                ));
            }
        }
        Ok(Self { tickers, returns })
    }

    /// Daily returns of date-aligned price series.
    pub fn from_prices(series: &[PriceSeries]) -> Result<Self, SamquantError> {
        let Some(first) = series.first() else {
            return Err(SamquantError::insufficient("asset returns", 0, 1));
        };
        let mut tickers = Vec::with_capacity(series.len());
        let mut returns = Vec::with_capacity(series.len());
        for s in series {
            first.ensure_aligned(s)?;
            tickers.push(s.ticker().to_string());
            returns.push(stats::returns(&s.closes())?);
        }
        Self::new(tickers, returns)
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn returns(&self) -> &[Vec<f64>] {
        &self.returns
    }

    pub fn asset_count(&self) -> usize {
        self.tickers.len()
    }

    pub fn periods(&self) -> usize {
        self.returns[0].len()
    }

    pub fn validate_weights(&self, weights: &[f64]) -> Result<(), SamquantError> {
        if weights.len() != self.asset_count() {
            return Err(SamquantError::invalid(
                "weights",
                format!("{} weights for {} assets", weights.len(), self.asset_count()),
            ));
        }
        if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(SamquantError::invalid("weights", format!("weight {w} is negative or non-finite")));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(SamquantError::invalid("weights", format!("weights sum to {sum}, not 1")));
        }
        Ok(())
    }

    fn combine(&self, weights: &[f64]) -> Vec<f64> {
        (0..self.periods())
            .map(|t| {
                self.returns
                    .iter()
                    .zip(weights)
                    .map(|(series, w)| series[t] * w)
                    .sum()
            })
            .collect()
    }
}

/// Weighted daily portfolio returns.
pub fn portfolio_returns(assets: &AssetReturns, weights: &[f64]) -> Result<Vec<f64>, SamquantError> {
    assets.validate_weights(weights)?;
    Ok(assets.combine(weights))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationTarget {
    MaxSharpe,
    MinRisk,
    MaxReturn,
    Balanced,
}

impl fmt::Display for OptimizationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptimizationTarget::MaxSharpe => "max_sharpe",
            OptimizationTarget::MinRisk => "min_risk",
            OptimizationTarget::MaxReturn => "max_return",
            OptimizationTarget::Balanced => "balanced",
        };
        f.write_str(s)
    }
}

impl FromStr for OptimizationTarget {
    type Err = SamquantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "max_sharpe" | "maxsharpe" => Ok(OptimizationTarget::MaxSharpe),
            "min_risk" | "minrisk" => Ok(OptimizationTarget::MinRisk),
            "max_return" | "maxreturn" => Ok(OptimizationTarget::MaxReturn),
            "balanced" => Ok(OptimizationTarget::Balanced),
            _ => Err(SamquantError::invalid("target", format!("unknown optimization target '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptimizerConfig {
    pub candidates: usize,
    pub risk_free_rate: f64,
    pub trading_days: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            trading_days: stats::TRADING_DAYS_PER_YEAR,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), SamquantError> {
        if self.candidates == 0 {
            return Err(SamquantError::invalid("candidates", "must be at least 1"));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(SamquantError::invalid("risk_free_rate", "must be finite"));
        }
        if !(self.trading_days.is_finite() && self.trading_days > 0.0) {
            return Err(SamquantError::invalid("trading_days", "must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioPerformance {
    pub annualized_return: f64,
    pub annualized_risk: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioCandidate {
    pub weights: BTreeMap<String, f64>,
    pub performance: PortfolioPerformance,
}

impl PortfolioCandidate {
    /// Sum of squared weights.
    pub fn concentration(&self) -> f64 {
        self.weights.values().map(|w| w * w).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub target: OptimizationTarget,
    pub selected_index: usize,
    pub selected: PortfolioCandidate,
    pub candidates: Vec<PortfolioCandidate>,
}

fn performance_of(daily: &[f64], config: &OptimizerConfig) -> Result<PortfolioPerformance, SamquantError> {
    let annualized_return = stats::annualize_return(stats::mean(daily)?, config.trading_days);
    let annualized_risk = stats::annualize_volatility(stats::stddev(daily)?, config.trading_days);
    let sharpe_ratio = if annualized_risk > 0.0 {
        (annualized_return - config.risk_free_rate) / annualized_risk
    } else {
        0.0
    };
    Ok(PortfolioPerformance {
        annualized_return,
        annualized_risk,
        sharpe_ratio,
        max_drawdown: stats::max_drawdown(&stats::equity_curve(daily)),
    })
}

/// Annualized performance of a fixed weight vector.
pub fn evaluate(
    assets: &AssetReturns,
    weights: &[f64],
    config: &OptimizerConfig,
) -> Result<PortfolioPerformance, SamquantError> {
    let daily = portfolio_returns(assets, weights)?;
    performance_of(&daily, config)
}

fn draw_weights<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
    let sum: f64 = raw.iter().sum();
    if sum > 0.0 {
        raw.iter().map(|w| w / sum).collect()
    } else {
        vec![1.0 / n as f64; n]
    }
}

fn ties(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIE_TOLERANCE * a.abs().max(b.abs())
}

/// Index of the candidate maximizing `key` among `eligible`. Near-ties go to
/// the less concentrated candidate, then the earlier one.
fn best_by(
    candidates: &[PortfolioCandidate],
    eligible: impl Iterator<Item = usize>,
    key: impl Fn(&PortfolioCandidate) -> f64,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for i in eligible {
        let value = key(&candidates[i]);
        best = match best {
            None => Some((i, value)),
            Some((j, best_value)) => {
                let better = if ties(value, best_value) {
                    candidates[i].concentration() < candidates[j].concentration()
                } else {
                    value > best_value
                };
                if better { Some((i, value)) } else { Some((j, best_value)) }
            }
        };
    }
    best.map(|(i, _)| i)
}

fn select(candidates: &[PortfolioCandidate], target: OptimizationTarget) -> usize {
    let all = 0..candidates.len();
    let chosen = match target {
        OptimizationTarget::MaxSharpe => best_by(candidates, all, |c| c.performance.sharpe_ratio),
        OptimizationTarget::MinRisk => best_by(candidates, all, |c| -c.performance.annualized_risk),
        OptimizationTarget::MaxReturn => {
            best_by(candidates, all, |c| c.performance.annualized_return)
        }
        OptimizationTarget::Balanced => {
            let mean_return = candidates
                .iter()
                .map(|c| c.performance.annualized_return)
                .sum::<f64>()
                / candidates.len() as f64;
            let floor = mean_return - TIE_TOLERANCE * mean_return.abs();
            let eligible = all.filter(|&i| candidates[i].performance.annualized_return >= floor);
            best_by(candidates, eligible, |c| {
                if c.performance.annualized_risk > 0.0 {
                    c.performance.annualized_return / c.performance.annualized_risk
                } else {
                    0.0
                }
            })
        }
    };
    chosen.unwrap_or(0)
}

/// Search `config.candidates` random long-only weightings and pick the best
/// one for `target`.
pub fn optimize<R: Rng + ?Sized>(
    assets: &AssetReturns,
    target: OptimizationTarget,
    config: &OptimizerConfig,
    rng: &mut R,
) -> Result<OptimizationResult, SamquantError> {
    config.validate()?;

    let draws: Vec<Vec<f64>> = (0..config.candidates)
        .map(|_| draw_weights(rng, assets.asset_count()))
        .collect();

    let candidates = draws
        .par_iter()
        .map(|weights| {
            let performance = performance_of(&assets.combine(weights), config)?;
            Ok(PortfolioCandidate {
                weights: assets.tickers().iter().cloned().zip(weights.iter().copied()).collect(),
                performance,
            })
        })
        .collect::<Result<Vec<_>, SamquantError>>()?;

    let selected_index = select(&candidates, target);
    let selected = candidates[selected_index].clone();
    debug!(
        %target,
        candidates = candidates.len(),
        selected_index,
        sharpe = selected.performance.sharpe_ratio,
        "portfolio optimized"
    );

    Ok(OptimizationResult {
        target,
        selected_index,
        selected,
        candidates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn wiggle(n: usize, drift: f64, amp: f64, phase: f64) -> Vec<f64> {
        (0..n)
            .map(|i| drift + amp * (i as f64 * 0.9 + phase).sin())
            .collect()
    }

    fn three_assets() -> AssetReturns {
        AssetReturns::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![
                wiggle(120, 0.001, 0.01, 0.0),
                wiggle(120, 0.0005, 0.004, 1.0),
                wiggle(120, 0.0015, 0.02, 2.0),
            ],
        )
        .unwrap()
    }

    fn small_config() -> OptimizerConfig {
        OptimizerConfig {
            candidates: 500,
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn candidate_weights_are_normalized() {
        let mut rng = StdRng::seed_from_u64(7);
        let result = optimize(&three_assets(), OptimizationTarget::MaxSharpe, &small_config(), &mut rng)
            .unwrap();
        assert_eq!(result.candidates.len(), 500);
        for c in &result.candidates {
            assert!(c.weights.values().all(|w| *w >= 0.0));
            let sum: f64 = c.weights.values().sum();
            assert!((sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE);
        }
    }

    #[test]
    fn same_seed_same_result() {
        let assets = three_assets();
        let a = optimize(&assets, OptimizationTarget::Balanced, &small_config(), &mut StdRng::seed_from_u64(42))
            .unwrap();
        let b = optimize(&assets, OptimizationTarget::Balanced, &small_config(), &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a.selected, b.selected);
        assert_eq!(a.candidates, b.candidates);
    }

    #[test]
    fn targets_pick_extremes() {
        let assets = three_assets();
        let config = small_config();
        let pick = |target| {
            optimize(&assets, target, &config, &mut StdRng::seed_from_u64(3)).unwrap()
        };

        let max_ret = pick(OptimizationTarget::MaxReturn);
        assert!(max_ret
            .candidates
            .iter()
            .all(|c| c.performance.annualized_return <= max_ret.selected.performance.annualized_return));

        let min_risk = pick(OptimizationTarget::MinRisk);
        assert!(min_risk
            .candidates
            .iter()
            .all(|c| c.performance.annualized_risk >= min_risk.selected.performance.annualized_risk));

        let max_sharpe = pick(OptimizationTarget::MaxSharpe);
        assert!(max_sharpe
            .candidates
            .iter()
            .all(|c| c.performance.sharpe_ratio <= max_sharpe.selected.performance.sharpe_ratio));
    }

    #[test]
    fn balanced_on_identical_assets_is_near_equal_weight() {
        let series = wiggle(100, 0.001, 0.01, 0.5);
        let assets = AssetReturns::new(
            vec!["X".into(), "Y".into(), "Z".into()],
            vec![series.clone(), series.clone(), series],
        )
        .unwrap();
        let result = optimize(
            &assets,
            OptimizationTarget::Balanced,
            &OptimizerConfig::default(),
            &mut StdRng::seed_from_u64(11),
        )
        .unwrap();
        for w in result.selected.weights.values() {
            assert!((w - 1.0 / 3.0).abs() < 0.05, "weight {w}");
        }
    }

    #[test]
    fn zero_risk_portfolio_has_zero_sharpe() {
        let assets = AssetReturns::new(vec!["CASH".into()], vec![vec![0.0; 30]]).unwrap();
        let perf = evaluate(&assets, &[1.0], &OptimizerConfig::default()).unwrap();
        assert_eq!(perf.annualized_risk, 0.0);
        assert_eq!(perf.sharpe_ratio, 0.0);
        assert_eq!(perf.max_drawdown, 0.0);
        assert_eq!(perf.annualized_return, 0.0);
    }

    #[test]
    fn portfolio_returns_validates_weights() {
        let assets = three_assets();
        assert!(portfolio_returns(&assets, &[0.5, 0.5]).is_err());
        assert!(portfolio_returns(&assets, &[0.6, 0.6, -0.2]).is_err());
        assert!(portfolio_returns(&assets, &[0.5, 0.3, 0.1]).is_err());
        let daily = portfolio_returns(&assets, &[0.2, 0.3, 0.5]).unwrap();
        assert_eq!(daily.len(), 120);
        let expected = 0.2 * assets.returns()[0][0] + 0.3 * assets.returns()[1][0] + 0.5 * assets.returns()[2][0];
        assert_relative_eq!(daily[0], expected, epsilon = 1e-15);
    }

    #[test]
    fn asset_returns_rejects_bad_shapes() {
        assert!(AssetReturns::new(vec!["A".into(), "A".into()], vec![vec![0.0; 3], vec![0.0; 3]]).is_err());
        assert!(AssetReturns::new(vec!["A".into(), "B".into()], vec![vec![0.0; 3], vec![0.0; 4]]).is_err());
        assert!(AssetReturns::new(vec!["A".into()], vec![vec![0.0, f64::NAN]]).is_err());
        let err = AssetReturns::new(vec!["A".into()], vec![vec![0.0]]).unwrap_err();
        assert!(matches!(err, SamquantError::InsufficientData { .. }));
    }

    #[test]
    fn target_parses() {
        assert_eq!("max-sharpe".parse::<OptimizationTarget>().unwrap(), OptimizationTarget::MaxSharpe);
        assert_eq!("Balanced".parse::<OptimizationTarget>().unwrap(), OptimizationTarget::Balanced);
        assert!("yolo".parse::<OptimizationTarget>().is_err());
    }

    #[test]
    fn zero_candidates_rejected() {
        let config = OptimizerConfig {
            candidates: 0,
            ..OptimizerConfig::default()
        };
        let err = optimize(&three_assets(), OptimizationTarget::MinRisk, &config, &mut StdRng::seed_from_u64(1))
            .unwrap_err();
        assert!(matches!(err, SamquantError::InvalidParameter { .. }));
    }
}
