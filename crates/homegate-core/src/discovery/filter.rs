// ── Discovery filters ──
//
// A filter pairs a URI regex with a value regex. A candidate passes
// when every filter matches at least one of its initial (uri, value)
// pairs. Both regexes are unanchored searches.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryFilter {
    pub uri_pattern: String,
    pub value_pattern: String,
}

impl DiscoveryFilter {
    pub fn new(uri_pattern: impl Into<String>, value_pattern: impl Into<String>) -> Self {
        Self {
            uri_pattern: uri_pattern.into(),
            value_pattern: value_pattern.into(),
        }
    }
}

/// Compiled filters owned by a session.
#[derive(Debug, Clone, Default)]
pub(crate) struct FilterSet {
    filters: Vec<(Regex, Regex)>,
}

impl FilterSet {
    pub(crate) fn compile(filters: &[DiscoveryFilter]) -> Result<Self, CoreError> {
        let compile = |pattern: &str| {
            if pattern.is_empty() {
                return Err(CoreError::invalid_argument("empty discovery filter pattern"));
            }
            Regex::new(pattern).map_err(|e| {
                CoreError::invalid_argument(format!("invalid discovery filter {pattern}: {e}"))
            })
        };

        let filters = filters
            .iter()
            .map(|f| Ok((compile(&f.uri_pattern)?, compile(&f.value_pattern)?)))
            .collect::<Result<Vec<_>, CoreError>>()?;
        Ok(Self { filters })
    }

    pub(crate) fn matches(&self, values: &[(String, String)]) -> bool {
        self.filters.iter().all(|(uri_re, value_re)| {
            values
                .iter()
                .any(|(uri, value)| uri_re.is_match(uri) && value_re.is_match(value))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn values() -> Vec<(String, String)> {
        vec![
            ("/abc/r/manufacturer".into(), "Acme".into()),
            ("/abc/r/model".into(), "S2".into()),
        ]
    }

    #[test]
    fn empty_set_accepts_everything() {
        assert!(FilterSet::default().matches(&values()));
        assert!(FilterSet::default().matches(&[]));
    }

    #[test]
    fn every_filter_must_match_some_pair() {
        let set = FilterSet::compile(&[
            DiscoveryFilter::new("manufacturer$", "^Acme$"),
            DiscoveryFilter::new("/r/model", "S\\d"),
        ])
        .unwrap();
        assert!(set.matches(&values()));

        let strict = FilterSet::compile(&[
            DiscoveryFilter::new("manufacturer$", "^Acme$"),
            DiscoveryFilter::new("/r/model", "^X"),
        ])
        .unwrap();
        assert!(!strict.matches(&values()));
    }

    #[test]
    fn uri_and_value_must_match_the_same_pair() {
        let set = FilterSet::compile(&[DiscoveryFilter::new("model", "Acme")]).unwrap();
        assert!(!set.matches(&values()));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(FilterSet::compile(&[DiscoveryFilter::new("(", ".*")]).is_err());
        assert!(FilterSet::compile(&[DiscoveryFilter::new("", ".*")]).is_err());
    }
}
