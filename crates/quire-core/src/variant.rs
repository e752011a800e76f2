//! Variants, job kinds and a small variant-indexed map

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the parallel texts taking part in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
    /// Third text of a 3-way comparison, or the merge result
    C,
    Ancestor,
}

impl Variant {
    pub const ALL: [Variant; 4] = [Variant::A, Variant::B, Variant::C, Variant::Ancestor];

    fn slot(self) -> usize {
        match self {
            Variant::A => 0,
            Variant::B => 1,
            Variant::C => 2,
            Variant::Ancestor => 3,
        }
    }

    /// Short label used in reports and markers
    pub fn label(self) -> &'static str {
        match self {
            Variant::A => "A",
            Variant::B => "B",
            Variant::C => "C",
            Variant::Ancestor => "Ancestor",
        }
    }

    /// Parse a user supplied variant name ("a", "B", "ancestor", ...)
    pub fn parse(name: &str) -> Option<Variant> {
        match name.to_ascii_lowercase().as_str() {
            "a" => Some(Variant::A),
            "b" => Some(Variant::B),
            "c" => Some(Variant::C),
            "ancestor" | "anc" => Some(Variant::Ancestor),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind of comparison or merge a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Compare2,
    Compare3,
    Merge,
    MergeWithAncestor,
}

impl JobKind {
    /// Variants holding spans in every record
    pub fn active_variants(self) -> &'static [Variant] {
        match self {
            JobKind::Compare2 => &[Variant::A, Variant::B],
            JobKind::Compare3 | JobKind::Merge => &[Variant::A, Variant::B, Variant::C],
            JobKind::MergeWithAncestor => {
                &[Variant::A, Variant::B, Variant::C, Variant::Ancestor]
            }
        }
    }

    /// Variants whose texts feed the diff backend at setup
    pub fn setup_variants(self) -> &'static [Variant] {
        match self {
            JobKind::Compare2 | JobKind::Merge => &[Variant::A, Variant::B],
            JobKind::Compare3 => &[Variant::A, Variant::B, Variant::C],
            JobKind::MergeWithAncestor => &[Variant::A, Variant::B, Variant::Ancestor],
        }
    }

    /// Variants whose texts feed the diff backend on a rebuild. Merge jobs
    /// include the result so edits made to it show up as regions.
    pub fn rebuild_variants(self) -> &'static [Variant] {
        match self {
            JobKind::MergeWithAncestor => {
                &[Variant::A, Variant::B, Variant::C, Variant::Ancestor]
            }
            _ => self.active_variants(),
        }
    }

    /// Variants taking part in fine (word-level) refinement
    pub fn refined_variants(self) -> &'static [Variant] {
        match self {
            JobKind::Compare2 => &[Variant::A, Variant::B],
            _ => &[Variant::A, Variant::B, Variant::C],
        }
    }

    pub fn is_merge(self) -> bool {
        matches!(self, JobKind::Merge | JobKind::MergeWithAncestor)
    }

    pub fn is_three_way_comparison(self) -> bool {
        self == JobKind::Compare3
    }

    pub fn has_ancestor(self) -> bool {
        self == JobKind::MergeWithAncestor
    }

    pub fn uses(self, variant: Variant) -> bool {
        self.active_variants().contains(&variant)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Compare2 => "2-way comparison",
            JobKind::Compare3 => "3-way comparison",
            JobKind::Merge => "merge",
            JobKind::MergeWithAncestor => "merge with ancestor",
        };
        f.write_str(name)
    }
}

/// Fixed-size map keyed by [`Variant`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantMap<T> {
    slots: [Option<T>; 4],
}

impl<T> Default for VariantMap<T> {
    fn default() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }
}

impl<T> VariantMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, variant: Variant) -> Option<&T> {
        self.slots[variant.slot()].as_ref()
    }

    pub fn get_mut(&mut self, variant: Variant) -> Option<&mut T> {
        self.slots[variant.slot()].as_mut()
    }

    pub fn insert(&mut self, variant: Variant, value: T) -> Option<T> {
        self.slots[variant.slot()].replace(value)
    }

    pub fn remove(&mut self, variant: Variant) -> Option<T> {
        self.slots[variant.slot()].take()
    }

    pub fn contains(&self, variant: Variant) -> bool {
        self.slots[variant.slot()].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Present entries in variant order
    pub fn iter(&self) -> impl Iterator<Item = (Variant, &T)> {
        Variant::ALL
            .iter()
            .filter_map(move |&v| self.get(v).map(|value| (v, value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Variant, &mut T)> {
        Variant::ALL.iter().copied().zip(self.slots.iter_mut()).filter_map(
            |(variant, slot)| slot.as_mut().map(|value| (variant, value)),
        )
    }

    pub fn variants(&self) -> Vec<Variant> {
        self.iter().map(|(v, _)| v).collect()
    }
}

impl<T> FromIterator<(Variant, T)> for VariantMap<T> {
    fn from_iter<I: IntoIterator<Item = (Variant, T)>>(iter: I) -> Self {
        let mut map = VariantMap::new();
        for (variant, value) in iter {
            map.insert(variant, value);
        }
        map
    }
}
