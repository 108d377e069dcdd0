//! Sample model: the immutable, timestamped observations stored in the log
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// Export SampleBuilder for tests
pub use builder::SampleBuilder;

mod builder;

/// Instant at which a sample was recorded
pub type Timestamp = DateTime<Utc>;

/// Value carried by a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean indicator (alarm raised, machine running, ...)
    Bool(bool),
    /// Numeric reading
    Number(f64),
}

impl Scalar {
    /// Whether this value marks the key as active
    pub fn is_active(&self) -> bool {
        matches!(self, Scalar::Bool(true))
    }

    /// Boolean view of the value, if it is one
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::Number(_) => None,
        }
    }

    /// Numeric view of the value; booleans count as 1 and 0
    pub fn as_f64(&self) -> f64 {
        match self {
            Scalar::Bool(true) => 1.0,
            Scalar::Bool(false) => 0.0,
            Scalar::Number(n) => *n,
        }
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Classification of the variable that produced a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    /// Default (fault) indicator
    Default,
    /// Alert indicator
    Alert,
    /// Anything else, including machine and counter variables
    #[default]
    #[serde(alias = "machine")]
    Other,
}

impl SampleKind {
    /// Lowercase name as stored in the log
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleKind::Default => "default",
            SampleKind::Alert => "alert",
            SampleKind::Other => "other",
        }
    }
}

impl std::str::FromStr for SampleKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(SampleKind::Default),
            "alert" => Ok(SampleKind::Alert),
            "other" | "machine" => Ok(SampleKind::Other),
            other => Err(format!("unknown sample kind '{}'", other)),
        }
    }
}

/// One immutable timestamped observation of a key's value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Identifier of the monitored variable
    pub key: String,
    /// Recording instant
    pub timestamp: Timestamp,
    /// Observed value
    pub value: Scalar,
    /// Grouping used by dashboards (line, zone, ...)
    #[serde(default)]
    pub category: String,
    /// Variable classification
    #[serde(default)]
    pub kind: SampleKind,
}

impl Sample {
    /// Create a sample with an empty category and kind `Other`
    pub fn new(key: impl Into<String>, timestamp: Timestamp, value: impl Into<Scalar>) -> Self {
        Self {
            key: key.into(),
            timestamp,
            value: value.into(),
            category: String::new(),
            kind: SampleKind::Other,
        }
    }

    /// Whether the sample marks its key as active
    pub fn is_active(&self) -> bool {
        self.value.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_scalar_untagged_serde() {
        let b: Scalar = serde_json::from_str("true").unwrap();
        assert_eq!(b, Scalar::Bool(true));
        let n: Scalar = serde_json::from_str("12.5").unwrap();
        assert_eq!(n, Scalar::Number(12.5));
        assert_eq!(serde_json::to_string(&Scalar::Bool(false)).unwrap(), "false");
    }

    #[test]
    fn test_scalar_activity() {
        assert!(Scalar::Bool(true).is_active());
        assert!(!Scalar::Bool(false).is_active());
        assert!(!Scalar::Number(1.0).is_active());
        assert_eq!(Scalar::Bool(true).as_f64(), 1.0);
        assert_eq!(Scalar::Number(3.25).as_bool(), None);
    }

    #[test]
    fn test_sample_from_json_line() {
        let line = r#"{"key":"press-2/alarm","timestamp":"2024-03-01T08:00:00Z","value":true,"category":"line-1","kind":"alert"}"#;
        let sample: Sample = serde_json::from_str(line).unwrap();
        assert_eq!(sample.key, "press-2/alarm");
        assert_eq!(sample.kind, SampleKind::Alert);
        assert_eq!(
            sample.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
        );
        assert!(sample.is_active());
    }

    #[test]
    fn test_kind_defaults_and_aliases() {
        let line = r#"{"key":"k","timestamp":"2024-03-01T08:00:00Z","value":1}"#;
        let sample: Sample = serde_json::from_str(line).unwrap();
        assert_eq!(sample.kind, SampleKind::Other);
        assert_eq!(sample.category, "");

        let kind: SampleKind = serde_json::from_str("\"machine\"").unwrap();
        assert_eq!(kind, SampleKind::Other);
        assert_eq!("ALERT".parse::<SampleKind>().unwrap(), SampleKind::Alert);
        assert!("condition".parse::<SampleKind>().is_err());
    }
}
