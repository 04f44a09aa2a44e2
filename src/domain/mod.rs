//! Core domain types and analytics.

pub mod analysis;
pub mod config_validation;
pub mod error;
pub mod factor;
pub mod indicator;
pub mod ohlcv;
pub mod optimizer;
pub mod pairs;
pub mod risk;
pub mod sector;
pub mod signal;
pub mod stats;
pub mod strategy;
