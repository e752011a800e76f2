//! Regular-expression focus and hide filters

use crate::variant::{Variant, VariantMap};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Visit only regions the patterns match
    Focus,
    /// Skip regions the patterns match
    Hide,
}

/// How per-variant matches combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connective {
    #[default]
    And,
    Or,
}

impl Connective {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "and" => Some(Connective::And),
            "or" => Some(Connective::Or),
            _ => None,
        }
    }
}

/// Per-variant patterns plus a connective.
///
/// A variant without a pattern matches every region.
#[derive(Debug, Clone)]
pub struct RegexpFilter {
    mode: FilterMode,
    connective: Connective,
    patterns: VariantMap<Regex>,
}

impl RegexpFilter {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            mode,
            connective: Connective::default(),
            patterns: VariantMap::new(),
        }
    }

    pub fn with_connective(mut self, connective: Connective) -> Self {
        self.connective = connective;
        self
    }

    /// Add a pattern for `variant`; an empty pattern clears it
    pub fn with_pattern(mut self, variant: Variant, pattern: &str) -> Result<Self, regex::Error> {
        if pattern.is_empty() {
            self.patterns.remove(variant);
        } else {
            self.patterns.insert(variant, Regex::new(pattern)?);
        }
        Ok(self)
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn connective(&self) -> Connective {
        self.connective
    }

    pub fn pattern(&self, variant: Variant) -> Option<&str> {
        self.patterns.get(variant).map(Regex::as_str)
    }

    /// Variants carrying a pattern
    pub fn variants(&self) -> Vec<Variant> {
        self.patterns.variants()
    }

    /// Whether the region whose texts `text_of` yields is skipped.
    ///
    /// `variants` are the variants the filter considers for the job.
    pub fn skips<F>(&self, variants: &[Variant], mut text_of: F) -> bool
    where
        F: FnMut(Variant) -> Option<String>,
    {
        let mut clause = |variant: Variant| match self.patterns.get(variant) {
            None => true,
            Some(re) => text_of(variant).is_some_and(|text| re.is_match(&text)),
        };
        let matched = match self.connective {
            Connective::And => variants.iter().all(|&v| clause(v)),
            Connective::Or => variants.iter().any(|&v| clause(v)),
        };
        match self.mode {
            FilterMode::Focus => !matched,
            FilterMode::Hide => matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AB: &[Variant] = &[Variant::A, Variant::B];

    fn texts(a: &'static str, b: &'static str) -> impl FnMut(Variant) -> Option<String> {
        move |v| match v {
            Variant::A => Some(a.to_string()),
            Variant::B => Some(b.to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_focus_or_with_empty_pattern_never_skips_match() {
        let filter = RegexpFilter::new(FilterMode::Focus)
            .with_connective(Connective::Or)
            .with_pattern(Variant::A, "foo")
            .unwrap()
            .with_pattern(Variant::B, "")
            .unwrap();
        assert!(!filter.skips(AB, texts("a foo here", "nothing")));
        assert!(!filter.skips(AB, texts("a foo here", "foo too")));
    }

    #[test]
    fn test_focus_and_treats_missing_pattern_as_match() {
        let filter = RegexpFilter::new(FilterMode::Focus)
            .with_pattern(Variant::A, "foo")
            .unwrap();
        assert!(!filter.skips(AB, texts("foo", "bar")));
        assert!(filter.skips(AB, texts("bar", "foo")));
    }

    #[test]
    fn test_hide_skips_matches() {
        let filter = RegexpFilter::new(FilterMode::Hide)
            .with_connective(Connective::Or)
            .with_pattern(Variant::A, "^#")
            .unwrap()
            .with_pattern(Variant::B, "^#")
            .unwrap();
        assert!(filter.skips(AB, texts("# comment", "code")));
        assert!(!filter.skips(AB, texts("code", "code")));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(RegexpFilter::new(FilterMode::Hide)
            .with_pattern(Variant::A, "(")
            .is_err());
    }
}
