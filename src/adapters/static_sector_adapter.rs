//! Built-in ticker to sector table.

use crate::ports::sector_port::SectorClassifier;
use std::collections::HashMap;

const MAJOR_SECTORS: [&str; 8] = [
    "Technology",
    "Healthcare",
    "Financials",
    "Consumer Discretionary",
    "Consumer Staples",
    "Industrials",
    "Energy",
    "Utilities",
];

const DEFAULT_TABLE: [(&str, &str); 40] = [
    ("AAPL", "Technology"),
    ("MSFT", "Technology"),
    ("GOOGL", "Technology"),
    ("META", "Technology"),
    ("NVDA", "Technology"),
    ("AMD", "Technology"),
    ("INTC", "Technology"),
    ("ORCL", "Technology"),
    ("JNJ", "Healthcare"),
    ("PFE", "Healthcare"),
    ("UNH", "Healthcare"),
    ("MRK", "Healthcare"),
    ("ABBV", "Healthcare"),
    ("JPM", "Financials"),
    ("BAC", "Financials"),
    ("WFC", "Financials"),
    ("GS", "Financials"),
    ("MS", "Financials"),
    ("V", "Financials"),
    ("AMZN", "Consumer Discretionary"),
    ("TSLA", "Consumer Discretionary"),
    ("HD", "Consumer Discretionary"),
    ("NKE", "Consumer Discretionary"),
    ("MCD", "Consumer Discretionary"),
    ("PG", "Consumer Staples"),
    ("KO", "Consumer Staples"),
    ("PEP", "Consumer Staples"),
    ("WMT", "Consumer Staples"),
    ("COST", "Consumer Staples"),
    ("BA", "Industrials"),
    ("CAT", "Industrials"),
    ("GE", "Industrials"),
    ("HON", "Industrials"),
    ("XOM", "Energy"),
    ("CVX", "Energy"),
    ("COP", "Energy"),
    ("NEE", "Utilities"),
    ("DUK", "Utilities"),
    ("SO", "Utilities"),
    ("SPY", "Index"),
];

/// Sector lookup backed by an in-memory table. Lookups are case-insensitive.
pub struct StaticSectorTable {
    sectors: HashMap<String, String>,
    major: Vec<String>,
}

impl Default for StaticSectorTable {
    fn default() -> Self {
        Self {
            sectors: DEFAULT_TABLE
                .iter()
                .map(|(t, s)| (t.to_string(), s.to_string()))
                .collect(),
            major: MAJOR_SECTORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl StaticSectorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the sector for `ticker`.
    pub fn with(mut self, ticker: &str, sector: &str) -> Self {
        self.sectors
            .insert(ticker.to_ascii_uppercase(), sector.to_string());
        self
    }
}

impl SectorClassifier for StaticSectorTable {
    fn sector_of(&self, ticker: &str) -> Option<String> {
        self.sectors.get(&ticker.to_ascii_uppercase()).cloned()
    }

    fn major_sectors(&self) -> Vec<String> {
        self.major.clone()
    }
}
