//! Configuration validation.
//!
//! Each command validates the sections it reads before any data is loaded.

use crate::domain::analysis::IndicatorKind;
use crate::domain::error::SamquantError;
use crate::domain::optimizer::OptimizationTarget;
use crate::domain::strategy::{Horizon, MarketCondition, RateTrend, RiskTolerance};
use crate::ports::config_port::{ConfigPort, parse_bool};
use chrono::NaiveDate;
use std::str::FromStr;

const WEIGHT_TOLERANCE: f64 = 1e-6;

const INDICATOR_INT_KEYS: [&str; 9] = [
    "lookback",
    "sma_period",
    "ema_period",
    "bollinger_period",
    "macd_fast",
    "macd_slow",
    "macd_signal",
    "stochastic_d",
    "history_len",
];

fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> SamquantError {
    SamquantError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SamquantError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(SamquantError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn parse_enum<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, SamquantError>
where
    T: FromStr<Err = SamquantError>,
{
    config
        .get_string(section, key)
        .map(|raw| raw.parse::<T>().map_err(|e| config_invalid(section, key, e.to_string())))
        .transpose()
}

fn check_int(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), SamquantError> {
    match config.get_string(section, key) {
        Some(raw) if raw.trim().parse::<i64>().is_err() => {
            Err(config_invalid(section, key, format!("'{raw}' is not an integer")))
        }
        _ => Ok(()),
    }
}

fn check_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), SamquantError> {
    match config.get_string(section, key) {
        Some(raw) if parse_bool(&raw).is_none() => {
            Err(config_invalid(section, key, format!("'{raw}' is not a boolean")))
        }
        _ => Ok(()),
    }
}

/// Optional numeric key: absent is `None`, present must be a finite number.
pub fn optional_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, SamquantError> {
    config
        .get_string(section, key)
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| config_invalid(section, key, format!("'{raw}' is not a finite number")))
        })
        .transpose()
}

fn require_tickers(
    config: &dyn ConfigPort,
    section: &str,
    min: usize,
) -> Result<Vec<String>, SamquantError> {
    let tickers = config.get_list(section, "tickers");
    if tickers.is_empty() {
        return Err(SamquantError::ConfigMissing {
            section: section.to_string(),
            key: "tickers".to_string(),
        });
    }
    if tickers.len() < min {
        return Err(config_invalid(
            section,
            "tickers",
            format!("at least {min} tickers required, got {}", tickers.len()),
        ));
    }
    let mut seen = tickers.clone();
    seen.sort();
    seen.dedup();
    if seen.len() != tickers.len() {
        return Err(config_invalid(section, "tickers", "duplicate ticker"));
    }
    Ok(tickers)
}

pub fn parse_date(value: &str, section: &str, key: &str) -> Result<NaiveDate, SamquantError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        config_invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD"))
    })
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), SamquantError> {
    require(config, "data", "path")?;
    let start = parse_date(&require(config, "data", "start_date")?, "data", "start_date")?;
    let end = parse_date(&require(config, "data", "end_date")?, "data", "end_date")?;
    if start >= end {
        return Err(config_invalid("data", "start_date", "start_date must be before end_date"));
    }
    Ok(())
}

pub fn validate_indicator_config(config: &dyn ConfigPort) -> Result<(), SamquantError> {
    require(config, "indicators", "ticker")?;
    for name in config.get_list("indicators", "indicators") {
        name.parse::<IndicatorKind>()
            .map_err(|e| config_invalid("indicators", "indicators", e.to_string()))?;
    }
    for key in INDICATOR_INT_KEYS {
        check_int(config, "indicators", key)?;
    }
    if config.get_int("indicators", "lookback", 14) < 2 {
        return Err(config_invalid("indicators", "lookback", "lookback must be at least 2"));
    }
    let fast = config.get_int("indicators", "macd_fast", 12);
    let slow = config.get_int("indicators", "macd_slow", 26);
    if fast < 1 || fast >= slow {
        return Err(config_invalid(
            "indicators",
            "macd_fast",
            "macd_fast must be positive and below macd_slow",
        ));
    }
    if optional_double(config, "indicators", "bollinger_mult")?.unwrap_or(2.0) <= 0.0 {
        return Err(config_invalid("indicators", "bollinger_mult", "bollinger_mult must be positive"));
    }
    Ok(())
}

pub fn validate_factor_config(config: &dyn ConfigPort) -> Result<(), SamquantError> {
    require(config, "factors", "ticker")?;
    Ok(())
}

pub fn validate_pairs_config(config: &dyn ConfigPort) -> Result<(), SamquantError> {
    require_tickers(config, "pairs", 2)?;
    let z = optional_double(config, "pairs", "z_threshold")?.unwrap_or(2.0);
    if !(1.0..=3.0).contains(&z) {
        return Err(config_invalid("pairs", "z_threshold", "z_threshold must be between 1 and 3"));
    }
    Ok(())
}

pub fn validate_optimizer_config(config: &dyn ConfigPort) -> Result<(), SamquantError> {
    require_tickers(config, "optimizer", 2)?;
    check_int(config, "optimizer", "candidates")?;
    check_int(config, "optimizer", "seed")?;
    check_bool(config, "optimizer", "include_candidates")?;
    if config.get_int("optimizer", "candidates", 5000) < 1 {
        return Err(config_invalid("optimizer", "candidates", "candidates must be at least 1"));
    }
    if config.get_int("optimizer", "seed", 0) < 0 {
        return Err(config_invalid("optimizer", "seed", "seed must be non-negative"));
    }
    let rf = optional_double(config, "optimizer", "risk_free_rate")?.unwrap_or(0.02);
    if !(0.0..1.0).contains(&rf) {
        return Err(config_invalid(
            "optimizer",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    parse_enum::<OptimizationTarget>(config, "optimizer", "target")?;
    Ok(())
}

/// Parse `[risk] weights`, checking count, sign and that they sum to 1.
pub fn risk_weights(config: &dyn ConfigPort, count: usize) -> Result<Vec<f64>, SamquantError> {
    let raw = config.get_list("risk", "weights");
    if raw.is_empty() {
        return Err(SamquantError::ConfigMissing {
            section: "risk".to_string(),
            key: "weights".to_string(),
        });
    }
    if raw.len() != count {
        return Err(config_invalid(
            "risk",
            "weights",
            format!("{} weights for {count} tickers", raw.len()),
        ));
    }
    let weights = raw
        .iter()
        .map(|w| {
            w.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| config_invalid("risk", "weights", format!("invalid weight '{w}'")))
        })
        .collect::<Result<Vec<f64>, _>>()?;
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(config_invalid("risk", "weights", format!("weights sum to {sum}, expected 1")));
    }
    Ok(weights)
}

pub fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), SamquantError> {
    let tickers = require_tickers(config, "risk", 1)?;
    risk_weights(config, tickers.len())?;
    let limit = optional_double(config, "risk", "concentration_limit")?.unwrap_or(0.40);
    if !(limit > 0.0 && limit <= 1.0) {
        return Err(config_invalid(
            "risk",
            "concentration_limit",
            "concentration_limit must be in (0, 1]",
        ));
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), SamquantError> {
    for key in ["risk_tolerance", "horizon", "market_condition"] {
        require(config, "strategy", key)?;
    }
    parse_enum::<RiskTolerance>(config, "strategy", "risk_tolerance")?;
    parse_enum::<Horizon>(config, "strategy", "horizon")?;
    parse_enum::<MarketCondition>(config, "strategy", "market_condition")?;
    parse_enum::<RateTrend>(config, "strategy", "rate_trend")?;
    if optional_double(config, "strategy", "vix")?.is_some_and(|vix| vix < 0.0) {
        return Err(config_invalid("strategy", "vix", "vix must be non-negative"));
    }
    optional_double(config, "strategy", "gdp_growth")?;
    optional_double(config, "strategy", "inflation")?;
    check_int(config, "strategy", "sma_period")?;
    check_bool(config, "strategy", "use_fundamentals")?;
    check_bool(config, "strategy", "use_technical")?;
    Ok(())
}

/// Validate `[data]` plus every analysis section the file declares.
/// Returns the names of the sections that were checked.
pub fn validate_all(config: &dyn ConfigPort) -> Result<Vec<&'static str>, SamquantError> {
    validate_data_config(config)?;
    let mut checked = vec!["data"];
    let sections: [(&str, &str, fn(&dyn ConfigPort) -> Result<(), SamquantError>); 6] = [
        ("indicators", "ticker", validate_indicator_config),
        ("factors", "ticker", validate_factor_config),
        ("pairs", "tickers", validate_pairs_config),
        ("optimizer", "tickers", validate_optimizer_config),
        ("risk", "tickers", validate_risk_config),
        ("strategy", "risk_tolerance", validate_strategy_config),
    ];
    for (section, marker, validate) in sections {
        if config.get_string(section, marker).is_some() {
            validate(config)?;
            checked.push(section);
        }
    }
    Ok(checked)
}
