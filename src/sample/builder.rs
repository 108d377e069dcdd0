use super::{Sample, SampleKind, Scalar, Timestamp};
use chrono::Utc;

/// Builder for creating test samples
pub struct SampleBuilder {
    key: String,
    timestamp: Option<Timestamp>,
    value: Scalar,
    category: String,
    kind: SampleKind,
}

impl SampleBuilder {
    /// Create a new SampleBuilder for `key`
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            timestamp: None,
            value: Scalar::Bool(false),
            category: String::new(),
            kind: SampleKind::Other,
        }
    }

    /// Set the recording instant
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the observed value
    pub fn value(mut self, value: impl Into<Scalar>) -> Self {
        self.value = value.into();
        self
    }

    /// Set the category
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the variable kind
    pub fn kind(mut self, kind: SampleKind) -> Self {
        self.kind = kind;
        self
    }

    /// Build the Sample, stamped now when no timestamp was given
    pub fn build(self) -> Sample {
        Sample {
            key: self.key,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            value: self.value,
            category: self.category,
            kind: self.kind,
        }
    }
}
