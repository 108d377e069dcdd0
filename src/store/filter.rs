//! Sample filters for cross-key scans

use crate::error::{Result, StateError};
use crate::sample::{Sample, SampleKind};
use crate::window::Window;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

/// Upper bound on a compiled search pattern
const MAX_PATTERN_SIZE: usize = 1 << 20;

/// Case-insensitive free-text match on sample keys
#[derive(Debug, Clone)]
pub struct KeyPattern {
    text: String,
    regex: Regex,
}

impl KeyPattern {
    /// Compile a literal substring search
    pub fn new(text: &str) -> Result<Self> {
        let regex = RegexBuilder::new(&regex::escape(text))
            .case_insensitive(true)
            .size_limit(MAX_PATTERN_SIZE)
            .build()
            .map_err(|e| StateError::InvalidWindow(format!("invalid search '{}': {}", text, e)))?;
        Ok(Self {
            text: text.to_string(),
            regex,
        })
    }

    /// The search text as given
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether `key` contains the search text
    pub fn is_match(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

/// Filter for [`SampleLog::stream_scan`](crate::store::SampleLog::stream_scan)
///
/// The window is closed on both ends.
#[derive(Debug, Clone)]
pub struct ScanFilter {
    /// Restrict to these keys
    pub keys: Option<BTreeSet<String>>,
    /// Restrict to one category
    pub category: Option<String>,
    /// Restrict to keys containing a search text
    pub key_pattern: Option<KeyPattern>,
    /// Restrict to these kinds
    pub kinds: Option<BTreeSet<SampleKind>>,
    /// Time bounds, inclusive
    pub window: Window,
}

impl ScanFilter {
    /// Filter matching every sample inside `window`
    pub fn new(window: Window) -> Self {
        Self {
            keys: None,
            category: None,
            key_pattern: None,
            kinds: None,
            window,
        }
    }

    /// Restrict to a key set
    pub fn with_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to a category; `"all"` and empty mean no restriction
    pub fn with_category(mut self, category: Option<&str>) -> Self {
        self.category = category
            .map(str::trim)
            .filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("all"))
            .map(str::to_string);
        self
    }

    /// Restrict to keys containing `search`; empty means no restriction
    pub fn with_search(mut self, search: Option<&str>) -> Result<Self> {
        self.key_pattern = match search.map(str::trim) {
            Some(text) if !text.is_empty() => Some(KeyPattern::new(text)?),
            _ => None,
        };
        Ok(self)
    }

    /// Restrict to a set of kinds
    pub fn with_kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = SampleKind>,
    {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Whether a sample passes the filter
    pub fn matches(&self, sample: &Sample) -> bool {
        if !self.window.contains_closed(sample.timestamp) {
            return false;
        }
        if let Some(keys) = &self.keys {
            if !keys.contains(&sample.key) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &sample.category != category {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&sample.kind) {
                return false;
            }
        }
        if let Some(pattern) = &self.key_pattern {
            if !pattern.is_match(&sample.key) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleBuilder;
    use chrono::{Duration, TimeZone, Utc};

    fn window() -> Window {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Window::new(t0, t0 + Duration::days(1)).unwrap()
    }

    #[test]
    fn test_search_is_literal_and_case_insensitive() {
        let pattern = KeyPattern::new("Press.2").unwrap();
        assert!(pattern.is_match("line-1/press.2/alarm"));
        assert!(pattern.is_match("LINE-1/PRESS.2"));
        assert!(!pattern.is_match("line-1/pressX2"));
    }

    #[test]
    fn test_filter_combines_constraints() {
        let w = window();
        let filter = ScanFilter::new(w)
            .with_category(Some("line-1"))
            .with_kinds([SampleKind::Alert])
            .with_search(Some("oven"))
            .unwrap();

        let hit = SampleBuilder::new("oven-3/overheat")
            .timestamp(w.from + Duration::hours(1))
            .value(true)
            .category("line-1")
            .kind(SampleKind::Alert)
            .build();
        assert!(filter.matches(&hit));

        let wrong_category = Sample {
            category: "line-2".into(),
            ..hit.clone()
        };
        assert!(!filter.matches(&wrong_category));

        let wrong_kind = Sample {
            kind: SampleKind::Default,
            ..hit.clone()
        };
        assert!(!filter.matches(&wrong_kind));

        let on_upper_bound = Sample {
            timestamp: w.to,
            ..hit.clone()
        };
        assert!(filter.matches(&on_upper_bound));

        let outside = Sample {
            timestamp: w.to + Duration::seconds(1),
            ..hit
        };
        assert!(!filter.matches(&outside));
    }

    #[test]
    fn test_category_all_means_unfiltered() {
        let filter = ScanFilter::new(window()).with_category(Some("all"));
        assert!(filter.category.is_none());
        let filter = ScanFilter::new(window()).with_search(Some("  ")).unwrap();
        assert!(filter.key_pattern.is_none());
    }
}
