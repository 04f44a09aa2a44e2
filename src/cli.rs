//! CLI definition and dispatch.
//!
//! Every subcommand reads an INI file, loads prices from the CSV directory
//! named in `[data] path`, and prints its result as JSON.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvDataProvider;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::static_sector_adapter::StaticSectorTable;
use crate::domain::analysis::{self, IndicatorKind, IndicatorReport, IndicatorRequest};
use crate::domain::config_validation::{
    optional_double, parse_date, risk_weights, validate_all, validate_data_config,
    validate_factor_config, validate_indicator_config, validate_optimizer_config,
    validate_pairs_config, validate_risk_config, validate_strategy_config,
};
use crate::domain::error::SamquantError;
use crate::domain::factor::{self, BenchmarkReturns, CombinedFactorAssessment, FactorMetrics};
use crate::domain::ohlcv::PriceSeries;
use crate::domain::optimizer::{
    self, AssetReturns, OptimizationResult, OptimizationTarget, OptimizerConfig,
};
use crate::domain::pairs::{self, PairConfig, PairRelationship};
use crate::domain::risk::{self, RiskConfig, RiskReport};
use crate::domain::stats;
use crate::domain::strategy::{
    self, FundamentalContext, MacroContext, StrategyInputs, StrategyRecommendation,
    TechnicalContext,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataProvider;
use crate::ports::sector_port::SectorClassifier;

const DEFAULT_PERIOD: &str = "ttm";
const LONG_SMA_PERIOD: usize = 50;

#[derive(Parser, Debug)]
#[command(name = "samquant", about = "Quantitative equity analytics")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// INI configuration file
    #[arg(short, long)]
    pub config: PathBuf,
    /// Write JSON here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Technical indicators and aggregate signal for one ticker
    Indicators(CommonArgs),
    /// Factor scores for one ticker
    Factors(CommonArgs),
    /// Relationship between the first two tickers in [pairs]
    Pair(CommonArgs),
    /// Rank every pair of the tickers in [pairs]
    Scan(CommonArgs),
    /// Monte Carlo portfolio optimization
    Optimize(CommonArgs),
    /// Risk report for a fixed weighting
    Risk(CommonArgs),
    /// Strategy recommendation for an investor profile
    Recommend(CommonArgs),
    /// Validate a configuration file
    Validate(CommonArgs),
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Indicators(args) => execute(&args, indicators_command),
        Command::Factors(args) => execute(&args, factors_command),
        Command::Pair(args) => execute(&args, pair_command),
        Command::Scan(args) => execute(&args, scan_command),
        Command::Optimize(args) => execute(&args, optimize_command),
        Command::Risk(args) => execute(&args, |c, d| {
            let sectors = build_sector_table(c)?;
            risk_command(c, d, &sectors)
        }),
        Command::Recommend(args) => execute(&args, recommend_command),
        Command::Validate(args) => run_validate(&args),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: SamquantError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

fn execute<T, F>(args: &CommonArgs, command: F) -> ExitCode
where
    T: Serialize,
    F: FnOnce(&dyn ConfigPort, &dyn DataProvider) -> Result<T, SamquantError>,
{
    info!(config = %args.config.display(), "loading config");
    let adapter = match load_config(&args.config) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_data_config(&adapter) {
        return fail(e);
    }
    let data = match adapter.get_string("data", "path") {
        Some(path) => CsvDataProvider::new(PathBuf::from(path)),
        None => {
            return fail(SamquantError::ConfigMissing {
                section: "data".into(),
                key: "path".into(),
            });
        }
    };

    match command(&adapter, &data).and_then(|out| write_json(&out, args.output.as_deref())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), SamquantError> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    match output {
        Some(path) => {
            fs::write(path, json)?;
            info!(path = %path.display(), "result written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn run_validate(args: &CommonArgs) -> ExitCode {
    #[derive(Serialize)]
    struct ValidationOutput {
        valid: bool,
        sections: Vec<&'static str>,
    }

    let adapter = match load_config(&args.config) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let result = validate_all(&adapter).and_then(|sections| {
        info!(sections = ?sections, "configuration is valid");
        write_json(
            &ValidationOutput {
                valid: true,
                sections,
            },
            args.output.as_deref(),
        )
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

/// Date range from `[data]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

pub fn data_window(config: &dyn ConfigPort) -> Result<DataWindow, SamquantError> {
    validate_data_config(config)?;
    let date = |key: &str| -> Result<NaiveDate, SamquantError> {
        let raw = config.get_string("data", key).unwrap_or_default();
        parse_date(&raw, "data", key)
    };
    Ok(DataWindow {
        start: date("start_date")?,
        end: date("end_date")?,
    })
}

fn load_series(
    data: &dyn DataProvider,
    window: DataWindow,
    ticker: &str,
) -> Result<PriceSeries, SamquantError> {
    let series = data.get_price_series(ticker, window.start, window.end)?;
    info!(ticker, bars = series.len(), "loaded prices");
    Ok(series)
}

fn load_all(
    data: &dyn DataProvider,
    window: DataWindow,
    tickers: &[String],
) -> Result<Vec<PriceSeries>, SamquantError> {
    tickers.iter().map(|t| load_series(data, window, t)).collect()
}

fn usize_setting(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value).unwrap_or(0)
}

pub fn build_indicator_request(config: &dyn ConfigPort) -> Result<IndicatorRequest, SamquantError> {
    let defaults = IndicatorRequest::default();
    let names = config.get_list("indicators", "indicators");
    let indicators = if names.is_empty() {
        defaults.indicators.clone()
    } else {
        names
            .iter()
            .map(|n| n.parse::<IndicatorKind>())
            .collect::<Result<Vec<_>, _>>()?
    };
    let mult = config.get_double(
        "indicators",
        "bollinger_mult",
        f64::from(defaults.bollinger_mult_x100) / 100.0,
    );
    let request = IndicatorRequest {
        indicators,
        lookback: usize_setting(config, "indicators", "lookback", defaults.lookback),
        sma_period: usize_setting(config, "indicators", "sma_period", defaults.sma_period),
        ema_period: usize_setting(config, "indicators", "ema_period", defaults.ema_period),
        bollinger_period: usize_setting(
            config,
            "indicators",
            "bollinger_period",
            defaults.bollinger_period,
        ),
        bollinger_mult_x100: (mult * 100.0).round().max(0.0) as u32,
        macd_fast: usize_setting(config, "indicators", "macd_fast", defaults.macd_fast),
        macd_slow: usize_setting(config, "indicators", "macd_slow", defaults.macd_slow),
        macd_signal: usize_setting(config, "indicators", "macd_signal", defaults.macd_signal),
        stochastic_d: usize_setting(config, "indicators", "stochastic_d", defaults.stochastic_d),
        history_len: usize_setting(config, "indicators", "history_len", defaults.history_len),
    };
    request.validate()?;
    Ok(request)
}

pub fn indicators_command(
    config: &dyn ConfigPort,
    data: &dyn DataProvider,
) -> Result<IndicatorReport, SamquantError> {
    validate_indicator_config(config)?;
    let window = data_window(config)?;
    let request = build_indicator_request(config)?;
    let ticker = config.get_string("indicators", "ticker").unwrap_or_default();
    let series = load_series(data, window, &ticker)?;
    let report = analysis::analyze(&series, &request)?;
    info!(
        ticker = %report.ticker,
        signal = %report.aggregate_signal,
        confidence = report.confidence,
        "indicators computed"
    );
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorOutput {
    pub ticker: String,
    pub period: String,
    pub metrics: FactorMetrics,
    pub assessment: CombinedFactorAssessment,
}

pub fn factors_command(
    config: &dyn ConfigPort,
    data: &dyn DataProvider,
) -> Result<FactorOutput, SamquantError> {
    validate_factor_config(config)?;
    let window = data_window(config)?;
    let ticker = config.get_string("factors", "ticker").unwrap_or_default();
    let period = config
        .get_string("factors", "period")
        .unwrap_or_else(|| DEFAULT_PERIOD.to_string());

    let series = load_series(data, window, &ticker)?;
    let benchmark = config
        .get_string("factors", "benchmark")
        .map(|b| load_series(data, window, &b))
        .transpose()?;

    let price_metrics = FactorMetrics::from_prices(&series, benchmark.as_ref())?;
    let metrics = match data.get_financial_metrics(&ticker, &period) {
        Ok(fundamentals) => fundamentals.or(price_metrics),
        Err(e @ SamquantError::DataUnavailable { .. }) => {
            warn!(ticker = %ticker, error = %e, "no fundamentals, scoring price factors only");
            price_metrics
        }
        Err(e) => return Err(e),
    };
    let bench_returns = benchmark.as_ref().map(BenchmarkReturns::from_prices);
    let assessment = factor::score_factors(&metrics, bench_returns.as_ref())?;
    info!(ticker = %ticker, score = assessment.score, signal = %assessment.signal, "factors scored");

    Ok(FactorOutput {
        ticker,
        period,
        metrics,
        assessment,
    })
}

pub fn build_pair_config(config: &dyn ConfigPort) -> Result<PairConfig, SamquantError> {
    let pair_config = PairConfig {
        z_threshold: config.get_double("pairs", "z_threshold", PairConfig::default().z_threshold),
    };
    pair_config.validate()?;
    Ok(pair_config)
}

pub fn pair_command(
    config: &dyn ConfigPort,
    data: &dyn DataProvider,
) -> Result<PairRelationship, SamquantError> {
    validate_pairs_config(config)?;
    let window = data_window(config)?;
    let pair_config = build_pair_config(config)?;
    let tickers = config.get_list("pairs", "tickers");
    let a = load_series(data, window, &tickers[0])?;
    let b = load_series(data, window, &tickers[1])?;
    let relationship = pairs::analyze_pair(&a, &b, &pair_config)?;
    info!(
        pair = %format!("{}/{}", relationship.ticker_a, relationship.ticker_b),
        grade = ?relationship.grade,
        "pair analyzed"
    );
    Ok(relationship)
}

pub fn scan_command(
    config: &dyn ConfigPort,
    data: &dyn DataProvider,
) -> Result<Vec<PairRelationship>, SamquantError> {
    validate_pairs_config(config)?;
    let window = data_window(config)?;
    let pair_config = build_pair_config(config)?;
    let universe = load_all(data, window, &config.get_list("pairs", "tickers"))?;
    let ranked = pairs::scan_pairs(&universe, &pair_config)?;
    info!(pairs = ranked.len(), "pair scan complete");
    Ok(ranked)
}

pub fn build_optimizer_config(config: &dyn ConfigPort) -> Result<OptimizerConfig, SamquantError> {
    let defaults = OptimizerConfig::default();
    let optimizer_config = OptimizerConfig {
        candidates: usize_setting(config, "optimizer", "candidates", defaults.candidates),
        risk_free_rate: config.get_double("optimizer", "risk_free_rate", defaults.risk_free_rate),
        trading_days: defaults.trading_days,
    };
    optimizer_config.validate()?;
    Ok(optimizer_config)
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeOutput {
    pub seed: u64,
    pub candidates_evaluated: usize,
    #[serde(flatten)]
    pub result: OptimizationResult,
}

pub fn optimize_command(
    config: &dyn ConfigPort,
    data: &dyn DataProvider,
) -> Result<OptimizeOutput, SamquantError> {
    validate_optimizer_config(config)?;
    let window = data_window(config)?;
    let optimizer_config = build_optimizer_config(config)?;
    let target = config
        .get_string("optimizer", "target")
        .map(|t| t.parse::<OptimizationTarget>())
        .transpose()?
        .unwrap_or(OptimizationTarget::MaxSharpe);
    let seed = u64::try_from(config.get_int("optimizer", "seed", 0)).unwrap_or(0);

    let series = load_all(data, window, &config.get_list("optimizer", "tickers"))?;
    let assets = AssetReturns::from_prices(&series)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut result = optimizer::optimize(&assets, target, &optimizer_config, &mut rng)?;
    let candidates_evaluated = result.candidates.len();
    if !config.get_bool("optimizer", "include_candidates", false) {
        result.candidates.clear();
    }
    info!(
        target = %target,
        seed,
        sharpe = result.selected.performance.sharpe_ratio,
        "optimization complete"
    );

    Ok(OptimizeOutput {
        seed,
        candidates_evaluated,
        result,
    })
}

/// Built-in sector table extended by `[risk] sectors = TICKER:Sector, ...`.
pub fn build_sector_table(config: &dyn ConfigPort) -> Result<StaticSectorTable, SamquantError> {
    config
        .get_list("risk", "sectors")
        .iter()
        .try_fold(StaticSectorTable::new(), |table, entry| {
            match entry.split_once(':') {
                Some((ticker, sector)) if !ticker.trim().is_empty() && !sector.trim().is_empty() => {
                    Ok(table.with(ticker.trim(), sector.trim()))
                }
                _ => Err(SamquantError::ConfigInvalid {
                    section: "risk".into(),
                    key: "sectors".into(),
                    reason: format!("expected TICKER:Sector, got '{entry}'"),
                }),
            }
        })
}

pub fn risk_command(
    config: &dyn ConfigPort,
    data: &dyn DataProvider,
    sectors: &dyn SectorClassifier,
) -> Result<RiskReport, SamquantError> {
    validate_risk_config(config)?;
    let window = data_window(config)?;
    let tickers = config.get_list("risk", "tickers");
    let weights = risk_weights(config, tickers.len())?;
    let risk_config = RiskConfig {
        concentration_limit: config.get_double(
            "risk",
            "concentration_limit",
            RiskConfig::default().concentration_limit,
        ),
        ..RiskConfig::default()
    };

    let series = load_all(data, window, &tickers)?;
    let assets = AssetReturns::from_prices(&series)?;
    let benchmark = match config.get_string("risk", "benchmark") {
        Some(ticker) => {
            let bench = load_series(data, window, &ticker)?;
            series[0].ensure_aligned(&bench)?;
            Some(stats::returns(&bench.closes())?)
        }
        None => None,
    };

    let report = risk::risk_report(&assets, &weights, benchmark.as_deref(), sectors, &risk_config)?;
    info!(
        volatility = report.volatility,
        var_95 = report.var_95,
        level = ?report.sector_allocation.level,
        "risk report complete"
    );
    Ok(report)
}

fn macro_context(config: &dyn ConfigPort) -> Result<Option<MacroContext>, SamquantError> {
    let context = MacroContext {
        vix: optional_double(config, "strategy", "vix")?,
        rate_trend: config
            .get_string("strategy", "rate_trend")
            .map(|r| r.parse())
            .transpose()?,
        gdp_growth: optional_double(config, "strategy", "gdp_growth")?,
        inflation: optional_double(config, "strategy", "inflation")?,
    };
    Ok((context != MacroContext::default()).then_some(context))
}

fn fundamental_context(
    data: &dyn DataProvider,
    ticker: &str,
    period: &str,
) -> Result<Option<FundamentalContext>, SamquantError> {
    match data.get_financial_metrics(ticker, period) {
        Ok(metrics) => Ok(Some(FundamentalContext::from_metrics(&metrics))),
        Err(e @ SamquantError::DataUnavailable { .. }) => {
            warn!(ticker, error = %e, "fundamental context skipped");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn technical_context(
    data: &dyn DataProvider,
    window: DataWindow,
    ticker: &str,
    sma_period: usize,
) -> Result<Option<TechnicalContext>, SamquantError> {
    let request = IndicatorRequest {
        indicators: vec![
            IndicatorKind::Rsi,
            IndicatorKind::Macd,
            IndicatorKind::Adx,
            IndicatorKind::Sma,
        ],
        sma_period,
        ..IndicatorRequest::default()
    };
    let report = data
        .get_price_series(ticker, window.start, window.end)
        .and_then(|series| analysis::analyze(&series, &request));
    match report {
        Ok(report) => Ok(Some(TechnicalContext::from_report(&report))),
        Err(e @ (SamquantError::DataUnavailable { .. } | SamquantError::InsufficientData { .. })) => {
            warn!(ticker, error = %e, "technical context skipped");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

pub fn build_strategy_inputs(
    config: &dyn ConfigPort,
    data: &dyn DataProvider,
) -> Result<StrategyInputs, SamquantError> {
    validate_strategy_config(config)?;
    let required = |key: &str| config.get_string("strategy", key).unwrap_or_default();
    let mut inputs = StrategyInputs::new(
        required("risk_tolerance").parse()?,
        required("horizon").parse()?,
        required("market_condition").parse()?,
    );
    inputs.macro_context = macro_context(config)?;

    if let Some(ticker) = config.get_string("strategy", "ticker") {
        if config.get_bool("strategy", "use_fundamentals", true) {
            let period = config
                .get_string("strategy", "period")
                .unwrap_or_else(|| DEFAULT_PERIOD.to_string());
            inputs.fundamental = fundamental_context(data, &ticker, &period)?;
        }
        if config.get_bool("strategy", "use_technical", true) {
            let window = data_window(config)?;
            let sma_period = usize_setting(config, "strategy", "sma_period", LONG_SMA_PERIOD);
            inputs.technical = technical_context(data, window, &ticker, sma_period)?;
        }
    }
    Ok(inputs)
}

pub fn recommend_command(
    config: &dyn ConfigPort,
    data: &dyn DataProvider,
) -> Result<StrategyRecommendation, SamquantError> {
    let inputs = build_strategy_inputs(config, data)?;
    let recommendation = strategy::recommend(&inputs)?;
    info!(
        primary = %recommendation.primary,
        secondary = %recommendation.secondary,
        confidence = recommendation.confidence,
        "strategy recommended"
    );
    Ok(recommendation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn cli_parses_subcommand_with_output() {
        let cli = Cli::try_parse_from([
            "samquant",
            "optimize",
            "--config",
            "q.ini",
            "--output",
            "out.json",
        ])
        .unwrap();
        match cli.command {
            Command::Optimize(args) => {
                assert_eq!(args.config, PathBuf::from("q.ini"));
                assert_eq!(args.output, Some(PathBuf::from("out.json")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_requires_config() {
        assert!(Cli::try_parse_from(["samquant", "risk"]).is_err());
    }

    #[test]
    fn indicator_request_defaults() {
        let request = build_indicator_request(&make_config("[indicators]\nticker = AAPL\n")).unwrap();
        assert_eq!(request, IndicatorRequest::default());
    }

    #[test]
    fn indicator_request_from_config() {
        let config = make_config(
            "[indicators]\nticker = AAPL\nindicators = rsi, MACD\nlookback = 10\nbollinger_mult = 2.5\n",
        );
        let request = build_indicator_request(&config).unwrap();
        assert_eq!(request.indicators, vec![IndicatorKind::Rsi, IndicatorKind::Macd]);
        assert_eq!(request.lookback, 10);
        assert_eq!(request.bollinger_mult_x100, 250);
    }

    #[test]
    fn negative_period_is_rejected() {
        let config = make_config("[indicators]\nticker = AAPL\nsma_period = -5\n");
        let err = build_indicator_request(&config).unwrap_err();
        assert!(matches!(err, SamquantError::InvalidParameter { name, .. } if name == "sma_period"));
    }

    #[test]
    fn optimizer_config_from_ini() {
        let config = make_config("[optimizer]\ncandidates = 300\nrisk_free_rate = 0.03\n");
        let built = build_optimizer_config(&config).unwrap();
        assert_eq!(built.candidates, 300);
        assert_eq!(built.risk_free_rate, 0.03);
    }

    #[test]
    fn sector_overrides() {
        let config = make_config("[risk]\nsectors = BHP:Materials, XYZ:Energy\n");
        let table = build_sector_table(&config).unwrap();
        assert_eq!(table.sector_of("BHP"), Some("Materials".to_string()));
        assert_eq!(table.sector_of("AAPL"), Some("Technology".to_string()));

        let bad = make_config("[risk]\nsectors = BHP\n");
        assert!(matches!(
            build_sector_table(&bad),
            Err(SamquantError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn macro_context_only_when_declared() {
        let none = make_config("[strategy]\nrisk_tolerance = low\n");
        assert_eq!(macro_context(&none).unwrap(), None);

        let some = make_config("[strategy]\nvix = 32\nrate_trend = rising\n");
        let context = macro_context(&some).unwrap().unwrap();
        assert_eq!(context.vix, Some(32.0));
        assert!(context.rate_trend.is_some());
        assert_eq!(context.inflation, None);
    }

    #[test]
    fn malformed_macro_value_is_an_error() {
        let bad = make_config("[strategy]\nvix = abc\n");
        assert!(matches!(
            macro_context(&bad),
            Err(SamquantError::ConfigInvalid { ref key, .. }) if key == "vix"
        ));
    }
}
