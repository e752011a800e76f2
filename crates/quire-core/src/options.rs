//! Session flags and their defaults
//!
//! Every field has a default so a partial `[session]` table in the binary's
//! config file deserializes cleanly.

use crate::diff::DiffOptions;
use crate::variant::Variant;
use serde::{Deserialize, Serialize};

/// When regions are refined into word-level differences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoRefine {
    /// Refine every selected region
    #[default]
    On,
    Off,
    /// Refine but do not surface the result
    Suppressed,
}

/// Content a merge region takes when nothing else decides it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultVariant {
    #[default]
    A,
    B,
    Combined,
}

impl DefaultVariant {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a" => Some(DefaultVariant::A),
            "b" => Some(DefaultVariant::B),
            "combined" | "c" => Some(DefaultVariant::Combined),
            _ => None,
        }
    }

    /// Variant whose text a default region copies, if not combined
    pub fn variant(self) -> Option<Variant> {
        match self {
            DefaultVariant::A => Some(Variant::A),
            DefaultVariant::B => Some(Variant::B),
            DefaultVariant::Combined => None,
        }
    }
}

/// What quitting does with unmodified variant buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepPolicy {
    Ask,
    #[default]
    AlwaysKeep,
    AlwaysDiscard,
}

/// Marker lines framing combined merge content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombinationMarkers {
    pub a: String,
    pub b: String,
    pub ancestor: String,
    pub end: String,
}

impl Default for CombinationMarkers {
    fn default() -> Self {
        Self {
            a: "<<<<<<< variant A".to_string(),
            b: ">>>>>>> variant B".to_string(),
            ancestor: "####### Ancestor".to_string(),
            end: "======= end".to_string(),
        }
    }
}

/// Per-session behaviour flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub auto_refine: AutoRefine,
    /// Regions larger than this (bytes, all variants) are not auto-refined
    pub auto_refine_limit: usize,
    /// Skip regions whose variants differ only in whitespace
    pub ignore_similar_regions: bool,
    /// Merge jobs: visit only regions where A and B both changed the ancestor
    pub show_clashes_only: bool,
    /// Merge jobs: skip regions whose result was changed from the default
    pub skip_changed_regions: bool,
    pub show_ancestor: bool,
    pub default_variant: DefaultVariant,
    pub keep_variants: KeepPolicy,
    pub diff: DiffOptions,
    pub combination: CombinationMarkers,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            auto_refine: AutoRefine::default(),
            auto_refine_limit: 14000,
            ignore_similar_regions: false,
            show_clashes_only: false,
            skip_changed_regions: false,
            show_ancestor: true,
            default_variant: DefaultVariant::default(),
            keep_variants: KeepPolicy::default(),
            diff: DiffOptions::default(),
            combination: CombinationMarkers::default(),
        }
    }
}

impl SessionOptions {
    pub fn with_auto_refine(mut self, auto_refine: AutoRefine) -> Self {
        self.auto_refine = auto_refine;
        self
    }

    pub fn with_default_variant(mut self, variant: DefaultVariant) -> Self {
        self.default_variant = variant;
        self
    }

    pub fn with_ignore_similar_regions(mut self, on: bool) -> Self {
        self.ignore_similar_regions = on;
        self
    }

    pub fn with_show_clashes_only(mut self, on: bool) -> Self {
        self.show_clashes_only = on;
        self
    }

    pub fn with_skip_changed_regions(mut self, on: bool) -> Self {
        self.skip_changed_regions = on;
        self
    }

    pub fn with_diff(mut self, diff: DiffOptions) -> Self {
        self.diff = diff;
        self
    }
}
