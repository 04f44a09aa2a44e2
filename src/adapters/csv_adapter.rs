//! CSV file data provider.
//!
//! Prices live in `<dir>/<TICKER>.csv` with a `date,open,high,low,close,volume`
//! header; fundamentals in `<dir>/<TICKER>_metrics.csv` as
//! `period,metric,value` rows.

use crate::domain::error::SamquantError;
use crate::domain::factor::FactorMetrics;
use crate::domain::ohlcv::{PricePoint, PriceSeries};
use crate::ports::data_port::DataProvider;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

const METRICS_SUFFIX: &str = "_metrics.csv";

pub struct CsvDataProvider {
    base_path: PathBuf,
}

fn unavailable(ticker: &str, reason: impl Into<String>) -> SamquantError {
    SamquantError::DataUnavailable {
        ticker: ticker.to_string(),
        reason: reason.into(),
    }
}

fn field<T: FromStr>(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
    ticker: &str,
) -> Result<T, SamquantError>
where
    T::Err: std::fmt::Display,
{
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    record
        .get(index)
        .ok_or_else(|| unavailable(ticker, format!("line {line}: missing {name} column")))?
        .trim()
        .parse()
        .map_err(|e| unavailable(ticker, format!("line {line}: invalid {name} value: {e}")))
}

impl CsvDataProvider {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn price_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{ticker}.csv"))
    }

    fn metrics_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{ticker}{METRICS_SUFFIX}"))
    }

    fn read(&self, ticker: &str, path: &Path) -> Result<String, SamquantError> {
        fs::read_to_string(path)
            .map_err(|e| unavailable(ticker, format!("failed to read {}: {e}", path.display())))
    }
}

impl DataProvider for CsvDataProvider {
    fn get_price_series(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, SamquantError> {
        let path = self.price_path(ticker);
        let content = self.read(ticker, &path)?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut points = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| unavailable(ticker, format!("CSV parse error: {e}")))?;
            let date_str: String = field(&record, 0, "date", ticker)?;
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .map_err(|e| unavailable(ticker, format!("invalid date '{date_str}': {e}")))?;
            if date < start || date > end {
                continue;
            }
            points.push(PricePoint {
                date,
                open: field(&record, 1, "open", ticker)?,
                high: field(&record, 2, "high", ticker)?,
                low: field(&record, 3, "low", ticker)?,
                close: field(&record, 4, "close", ticker)?,
                volume: field(&record, 5, "volume", ticker)?,
            });
        }

        if points.is_empty() {
            return Err(unavailable(ticker, format!("no bars between {start} and {end}")));
        }
        points.sort_by_key(|p| p.date);
        debug!(ticker, bars = points.len(), "loaded price series");
        PriceSeries::new(ticker, points)
    }

    fn get_financial_metrics(
        &self,
        ticker: &str,
        period: &str,
    ) -> Result<FactorMetrics, SamquantError> {
        let path = self.metrics_path(ticker);
        let content = self.read(ticker, &path)?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut metrics = FactorMetrics::default();
        let mut found = 0usize;
        for result in rdr.records() {
            let record = result.map_err(|e| unavailable(ticker, format!("CSV parse error: {e}")))?;
            let row_period: String = field(&record, 0, "period", ticker)?;
            if !row_period.eq_ignore_ascii_case(period) {
                continue;
            }
            let name: String = field(&record, 1, "metric", ticker)?;
            let value: f64 = field(&record, 2, "value", ticker)?;
            if metrics.set(&name, value) {
                found += 1;
            } else {
                warn!(ticker, metric = %name, "unknown metric skipped");
            }
        }

        if found == 0 {
            return Err(unavailable(ticker, format!("no metrics for period {period}")));
        }
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "date,open,high,low,close,volume\n\
            2024-01-17,110.0,120.0,105.0,115.0,55000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000\n";
        fs::write(path.join("BHP.csv"), csv_content).unwrap();
        fs::write(path.join("CBA.csv"), "date,open,high,low,close,volume\n").unwrap();
        fs::write(
            path.join("BHP_metrics.csv"),
            "period,metric,value\n\
             ttm,pe,11.5\n\
             ttm,roe,0.21\n\
             ttm,ebitda_margin,0.4\n\
             2023,pe,14.0\n",
        )
        .unwrap();
        fs::write(
            path.join("BAD.csv"),
            "date,open,high,low,close,volume\n2024-01-15,100.0,abc,90.0,105.0,50000\n",
        )
        .unwrap();

        (dir, path)
    }

    fn jan(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn price_series_is_sorted_and_complete() {
        let (_dir, path) = setup_test_data();
        let provider = CsvDataProvider::new(path);

        let series = provider.get_price_series("BHP", jan(1), jan(31)).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.ticker(), "BHP");
        let first = &series.points()[0];
        assert_eq!(first.date, jan(15));
        assert_eq!(first.open, 100.0);
        assert_eq!(first.high, 110.0);
        assert_eq!(first.low, 90.0);
        assert_eq!(first.close, 105.0);
        assert_eq!(first.volume, 50000);
    }

    #[test]
    fn price_series_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let provider = CsvDataProvider::new(path);
        let series = provider.get_price_series("BHP", jan(16), jan(16)).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series.points()[0].date, jan(16));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let (_dir, path) = setup_test_data();
        let provider = CsvDataProvider::new(path);
        let err = provider.get_price_series("XYZ", jan(1), jan(31)).unwrap_err();
        assert!(matches!(err, SamquantError::DataUnavailable { ref ticker, .. } if ticker == "XYZ"));
    }

    #[test]
    fn empty_range_is_unavailable() {
        let (_dir, path) = setup_test_data();
        let provider = CsvDataProvider::new(path);
        let err = provider.get_price_series("CBA", jan(1), jan(31)).unwrap_err();
        assert!(err.to_string().contains("no bars"));
    }

    #[test]
    fn malformed_value_names_the_column() {
        let (_dir, path) = setup_test_data();
        let provider = CsvDataProvider::new(path);
        let err = provider.get_price_series("BAD", jan(1), jan(31)).unwrap_err();
        assert!(err.to_string().contains("invalid high value"));
    }

    #[test]
    fn metrics_for_period() {
        let (_dir, path) = setup_test_data();
        let provider = CsvDataProvider::new(path);

        let ttm = provider.get_financial_metrics("BHP", "TTM").unwrap();
        assert_eq!(ttm.pe, Some(11.5));
        assert_eq!(ttm.roe, Some(0.21));
        assert_eq!(ttm.pb, None);

        let fy = provider.get_financial_metrics("BHP", "2023").unwrap();
        assert_eq!(fy.pe, Some(14.0));
        assert_eq!(fy.roe, None);

        assert!(provider.get_financial_metrics("BHP", "2020").is_err());
        assert!(provider.get_financial_metrics("CBA", "ttm").is_err());
    }
}
