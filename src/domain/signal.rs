//! Qualitative signal shared by indicators and factor scores.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Bullish,
    Bearish,
    Overbought,
    Oversold,
    Neutral,
}

impl Signal {
    /// Map a 1–10 score onto bullish (≥ 7), bearish (≤ 3) or neutral.
    pub fn from_score(score: f64) -> Self {
        if score >= 7.0 {
            Signal::Bullish
        } else if score <= 3.0 {
            Signal::Bearish
        } else {
            Signal::Neutral
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Bullish => "bullish",
            Signal::Bearish => "bearish",
            Signal::Overbought => "overbought",
            Signal::Oversold => "oversold",
            Signal::Neutral => "neutral",
        };
        f.write_str(s)
    }
}
