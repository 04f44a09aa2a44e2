//! Sector allocation and diversification.

use crate::domain::error::SamquantError;
use crate::ports::sector_port::SectorClassifier;
use serde::Serialize;
use std::collections::BTreeMap;

pub const OTHER_SECTOR: &str = "Other";
pub const DEFAULT_CONCENTRATION_LIMIT: f64 = 0.40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiversificationLevel {
    High,
    Medium,
    Low,
}

impl DiversificationLevel {
    /// Classify a Herfindahl–Hirschman index computed on percentage shares.
    pub fn from_hhi(hhi: f64) -> Self {
        if hhi < 1500.0 {
            DiversificationLevel::High
        } else if hhi < 2500.0 {
            DiversificationLevel::Medium
        } else {
            DiversificationLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorWeight {
    pub sector: String,
    pub weight: f64,
    pub tickers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorDiversification {
    /// Largest sector first.
    pub sectors: Vec<SectorWeight>,
    pub hhi: f64,
    pub level: DiversificationLevel,
    pub concentration_warnings: Vec<String>,
    pub missing_sectors: Vec<String>,
}

/// Group `holdings` (ticker, weight) by sector. Tickers the classifier does
/// not know are grouped under [`OTHER_SECTOR`].
pub fn sector_diversification(
    holdings: &[(String, f64)],
    classifier: &dyn SectorClassifier,
    concentration_limit: f64,
) -> Result<SectorDiversification, SamquantError> {
    if holdings.is_empty() {
        return Err(SamquantError::insufficient("sector allocation", 0, 1));
    }
    if !(0.0..=1.0).contains(&concentration_limit) {
        return Err(SamquantError::invalid(
            "concentration_limit",
            format!("{concentration_limit} outside [0, 1]"),
        ));
    }

    let mut grouped: BTreeMap<String, SectorWeight> = BTreeMap::new();
    for (ticker, weight) in holdings {
        let sector = classifier
            .sector_of(ticker)
            .unwrap_or_else(|| OTHER_SECTOR.to_string());
        let entry = grouped.entry(sector.clone()).or_insert_with(|| SectorWeight {
            sector,
            weight: 0.0,
            tickers: Vec::new(),
        });
        entry.weight += weight;
        entry.tickers.push(ticker.clone());
    }

    let mut sectors: Vec<SectorWeight> = grouped.into_values().collect();
    sectors.sort_by(|a, b| b.weight.total_cmp(&a.weight).then_with(|| a.sector.cmp(&b.sector)));

    let hhi: f64 = sectors.iter().map(|s| (s.weight * 100.0).powi(2)).sum();

    let concentration_warnings = sectors
        .iter()
        .filter(|s| s.weight > concentration_limit)
        .map(|s| {
            format!(
                "{} is {:.1}% of the portfolio (limit {:.0}%)",
                s.sector,
                s.weight * 100.0,
                concentration_limit * 100.0
            )
        })
        .collect();

    let missing_sectors = classifier
        .major_sectors()
        .into_iter()
        .filter(|major| !sectors.iter().any(|s| &s.sector == major))
        .collect();

    Ok(SectorDiversification {
        level: DiversificationLevel::from_hhi(hhi),
        sectors,
        hhi,
        concentration_warnings,
        missing_sectors,
    })
}
