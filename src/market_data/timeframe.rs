// =============================================================================
// Timeframe: closed set of bar intervals understood by the engine
// =============================================================================
//
// Accepts the terminal-style tags used in settings files ("M15", "H1", "D1")
// as well as the exchange interval labels ("15m", "1h", "1d").  Anything else
// is a configuration error; there is no silent default.
// =============================================================================

use crate::error::EngineError;

/// Bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    W1,
    MN1,
}

const MINUTE_MS: i64 = 60_000;

impl Timeframe {
    /// Parse a timeframe tag.
    pub fn from_tag(tag: &str) -> Result<Self, EngineError> {
        let tf = match tag.trim() {
            "M1" | "1m" => Self::M1,
            "M3" | "3m" => Self::M3,
            "M5" | "5m" => Self::M5,
            "M15" | "15m" => Self::M15,
            "M30" | "30m" => Self::M30,
            "H1" | "1h" => Self::H1,
            "H2" | "2h" => Self::H2,
            "H4" | "4h" => Self::H4,
            "H6" | "6h" => Self::H6,
            "H8" | "8h" => Self::H8,
            "H12" | "12h" => Self::H12,
            "D1" | "1d" => Self::D1,
            "W1" | "1w" => Self::W1,
            "MN1" | "1M" => Self::MN1,
            other => {
                return Err(EngineError::Config(format!(
                    "unrecognised timeframe tag '{other}'"
                )))
            }
        };
        Ok(tf)
    }

    /// Exchange interval label (e.g. `"15m"`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::W1 => "1w",
            Self::MN1 => "1M",
        }
    }

    /// Nominal bar length in milliseconds. Months are counted as 30 days.
    pub fn duration_ms(&self) -> i64 {
        let minutes = match self {
            Self::M1 => 1,
            Self::M3 => 3,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H2 => 120,
            Self::H4 => 240,
            Self::H6 => 360,
            Self::H8 => 480,
            Self::H12 => 720,
            Self::D1 => 1_440,
            Self::W1 => 10_080,
            Self::MN1 => 43_200,
        };
        minutes * MINUTE_MS
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
