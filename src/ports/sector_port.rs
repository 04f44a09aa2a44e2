//! Sector classification port.

pub trait SectorClassifier {
    /// The sector `ticker` belongs to, if known.
    fn sector_of(&self, ticker: &str) -> Option<String>;

    /// Sectors a diversified portfolio is expected to cover.
    fn major_sectors(&self) -> Vec<String>;
}
