//! Portfolio risk reporting: volatility, VaR/CVaR, benchmark-relative
//! measures, stress scenarios and sector diversification.

use crate::domain::error::SamquantError;
use crate::domain::optimizer::{AssetReturns, portfolio_returns};
use crate::domain::sector::{self, SectorDiversification};
use crate::domain::stats;
use crate::ports::sector_port::SectorClassifier;
use serde::Serialize;
use tracing::debug;

const VOLATILITY_SPIKE: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskConfig {
    pub trading_days: f64,
    /// Sector weight above which a concentration warning is raised.
    pub concentration_limit: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            trading_days: stats::TRADING_DAYS_PER_YEAR,
            concentration_limit: sector::DEFAULT_CONCENTRATION_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StressScenario {
    pub name: &'static str,
    /// Annual return shift spread evenly over the trading days.
    pub annual_shift: f64,
    /// Multiplier applied to deviations from the mean daily return.
    pub volatility_multiplier: f64,
}

pub const STRESS_SCENARIOS: [StressScenario; 6] = [
    StressScenario {
        name: "Strong rally",
        annual_shift: 0.15,
        volatility_multiplier: 1.0,
    },
    StressScenario {
        name: "Moderate rally",
        annual_shift: 0.07,
        volatility_multiplier: 1.0,
    },
    StressScenario {
        name: "Moderate decline",
        annual_shift: -0.07,
        volatility_multiplier: 1.0,
    },
    StressScenario {
        name: "Bear market",
        annual_shift: -0.15,
        volatility_multiplier: 1.0,
    },
    StressScenario {
        name: "Market crash",
        annual_shift: -0.25,
        volatility_multiplier: 1.0,
    },
    StressScenario {
        name: "Volatility spike",
        annual_shift: 0.0,
        volatility_multiplier: VOLATILITY_SPIKE,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StressResult {
    pub scenario: String,
    pub annualized_return: f64,
    pub annualized_risk: f64,
    pub max_drawdown: f64,
    /// Share of days with a negative return.
    pub loss_probability: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub annualized_return: f64,
    pub volatility: f64,
    pub beta: Option<f64>,
    pub var_95: f64,
    pub var_99: f64,
    pub cvar_95: f64,
    pub max_drawdown: f64,
    pub tracking_error: Option<f64>,
    pub information_ratio: Option<f64>,
    pub stress_scenarios: Vec<StressResult>,
    pub sector_allocation: SectorDiversification,
}

/// Historical value at risk at `confidence` (e.g. 0.95), as a positive loss.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> Result<f64, SamquantError> {
    Ok(-stats::quantile(returns, 1.0 - confidence)?)
}

/// Mean of the returns at or below the (1 - confidence) quantile.
pub fn conditional_var(returns: &[f64], confidence: f64) -> Result<f64, SamquantError> {
    let cutoff = stats::quantile(returns, 1.0 - confidence)?;
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= cutoff).collect();
    stats::mean(&tail)
}

fn apply_scenario(
    daily: &[f64],
    scenario: &StressScenario,
    trading_days: f64,
) -> Result<StressResult, SamquantError> {
    let mean = stats::mean(daily)?;
    let shift = scenario.annual_shift / trading_days;
    let stressed: Vec<f64> = daily
        .iter()
        .map(|r| mean + (r - mean) * scenario.volatility_multiplier + shift)
        .collect();

    let losses = stressed.iter().filter(|r| **r < 0.0).count();
    Ok(StressResult {
        scenario: scenario.name.to_string(),
        annualized_return: stats::annualize_return(stats::mean(&stressed)?, trading_days),
        annualized_risk: stats::annualize_volatility(stats::stddev(&stressed)?, trading_days),
        max_drawdown: stats::max_drawdown(&stats::equity_curve(&stressed)),
        loss_probability: losses as f64 / stressed.len() as f64,
    })
}

pub fn stress_test(daily: &[f64], trading_days: f64) -> Result<Vec<StressResult>, SamquantError> {
    STRESS_SCENARIOS
        .iter()
        .map(|s| apply_scenario(daily, s, trading_days))
        .collect()
}

struct BenchmarkStats {
    beta: f64,
    tracking_error: f64,
    information_ratio: f64,
}

fn benchmark_stats(
    daily: &[f64],
    benchmark: &[f64],
    trading_days: f64,
) -> Result<BenchmarkStats, SamquantError> {
    if benchmark.len() != daily.len() {
        return Err(SamquantError::invalid(
            "benchmark",
            format!("{} benchmark returns for {} portfolio returns", benchmark.len(), daily.len()),
        ));
    }
    let bench_var = stats::variance(benchmark)?;
    if bench_var == 0.0 {
        return Err(SamquantError::degenerate("beta", "benchmark returns have zero variance"));
    }
    let excess: Vec<f64> = daily.iter().zip(benchmark).map(|(p, b)| p - b).collect();
    let excess_sd = stats::stddev(&excess)?;
    Ok(BenchmarkStats {
        beta: stats::covariance(daily, benchmark)? / bench_var,
        tracking_error: stats::annualize_volatility(excess_sd, trading_days),
        information_ratio: if excess_sd > 0.0 {
            stats::mean(&excess)? / excess_sd
        } else {
            0.0
        },
    })
}

pub fn risk_report(
    assets: &AssetReturns,
    weights: &[f64],
    benchmark: Option<&[f64]>,
    classifier: &dyn SectorClassifier,
    config: &RiskConfig,
) -> Result<RiskReport, SamquantError> {
    if !(config.trading_days.is_finite() && config.trading_days > 0.0) {
        return Err(SamquantError::invalid("trading_days", "must be positive"));
    }
    let daily = portfolio_returns(assets, weights)?;
    let days = config.trading_days;

    let bench = benchmark
        .map(|b| benchmark_stats(&daily, b, days))
        .transpose()?;

    let holdings: Vec<(String, f64)> = assets
        .tickers()
        .iter()
        .cloned()
        .zip(weights.iter().copied())
        .collect();

    let report = RiskReport {
        annualized_return: stats::annualize_return(stats::mean(&daily)?, days),
        volatility: stats::annualize_volatility(stats::stddev(&daily)?, days),
        beta: bench.as_ref().map(|b| b.beta),
        var_95: value_at_risk(&daily, 0.95)?,
        var_99: value_at_risk(&daily, 0.99)?,
        cvar_95: conditional_var(&daily, 0.95)?,
        max_drawdown: stats::max_drawdown(&stats::equity_curve(&daily)),
        tracking_error: bench.as_ref().map(|b| b.tracking_error),
        information_ratio: bench.as_ref().map(|b| b.information_ratio),
        stress_scenarios: stress_test(&daily, days)?,
        sector_allocation: sector::sector_diversification(
            &holdings,
            classifier,
            config.concentration_limit,
        )?,
    };

    debug!(
        volatility = report.volatility,
        var_95 = report.var_95,
        hhi = report.sector_allocation.hhi,
        "risk report built"
    );
    Ok(report)
}
