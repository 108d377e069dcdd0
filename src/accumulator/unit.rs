//! Counter units and their presentation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Minutes per hour
pub const MINUTES_PER_HOUR: u64 = 60;

/// Minutes per day
pub const MINUTES_PER_DAY: u64 = 1440;

/// Presentation unit of a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CounterUnit {
    /// Raw minutes
    #[default]
    Minute,
    /// Whole hours
    Hour,
    /// Whole days
    Day,
    /// Days, hours and minutes
    All,
}

impl CounterUnit {
    /// Parse a unit name; unknown names fall back to minutes
    pub fn parse_lossy(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    /// Render `total_minutes` in this unit
    pub fn format(&self, total_minutes: u64) -> String {
        match self {
            CounterUnit::Minute => format!("{} min", total_minutes),
            CounterUnit::Hour => format!("{} h", total_minutes / MINUTES_PER_HOUR),
            CounterUnit::Day => format!("{} j", total_minutes / MINUTES_PER_DAY),
            CounterUnit::All => {
                let days = total_minutes / MINUTES_PER_DAY;
                let hours = (total_minutes / MINUTES_PER_HOUR) % 24;
                let minutes = total_minutes % MINUTES_PER_HOUR;
                format!("{}j {}h {}min", days, hours, minutes)
            }
        }
    }
}

impl std::str::FromStr for CounterUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" | "minutes" | "min" => Ok(CounterUnit::Minute),
            "hour" | "hours" | "h" => Ok(CounterUnit::Hour),
            "day" | "days" | "j" => Ok(CounterUnit::Day),
            "all" => Ok(CounterUnit::All),
            other => Err(format!("unknown counter unit '{}'", other)),
        }
    }
}

impl fmt::Display for CounterUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CounterUnit::Minute => "minute",
            CounterUnit::Hour => "hour",
            CounterUnit::Day => "day",
            CounterUnit::All => "all",
        };
        f.write_str(name)
    }
}
