//! Market and fundamental data access port.

use crate::domain::error::SamquantError;
use crate::domain::factor::FactorMetrics;
use crate::domain::ohlcv::PriceSeries;
use chrono::NaiveDate;

pub trait DataProvider {
    /// Daily bars for `ticker` between `start` and `end` inclusive.
    ///
    /// Fails with `DataUnavailable` when the ticker cannot be loaded.
    fn get_price_series(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, SamquantError>;

    /// Fundamental metrics for `ticker` reported for `period` (e.g. "ttm" or
    /// "2024Q4"). Metrics the source does not report are left empty.
    fn get_financial_metrics(
        &self,
        ticker: &str,
        period: &str,
    ) -> Result<FactorMetrics, SamquantError>;
}
