//! Line-level diff backends
//!
//! The region engine never diffs text itself. It asks a [`DiffBackend`] for
//! line correspondences between two to four texts and builds its records
//! from them. [`BuiltinDiff`] runs in-process on `imara-diff`; the external
//! `diff`/`diff3` programs live in [`crate::external`].

use crate::span::LineRange;
use crate::variant::{Variant, VariantMap};
use imara_diff::intern::{InternedInput, TokenSource};
use imara_diff::{diff, Algorithm};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("unparsable {program} output at line {line}: {message}")]
    Parse {
        program: String,
        line: usize,
        message: String,
    },
    #[error("regions out of order for variant {0}")]
    Disordered(Variant),
    #[error("cannot compare {0} texts")]
    Arity(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Line normalization applied before comparing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    /// Treat lines differing only in whitespace as equal
    pub ignore_whitespace: bool,
    /// Treat lines differing only in letter case as equal
    pub ignore_case: bool,
}

impl DiffOptions {
    pub fn with_ignore_whitespace(mut self, on: bool) -> Self {
        self.ignore_whitespace = on;
        self
    }

    pub fn with_ignore_case(mut self, on: bool) -> Self {
        self.ignore_case = on;
        self
    }

    fn normalize(&self, line: &str) -> String {
        let line = if self.ignore_whitespace {
            line.chars().filter(|c| !c.is_whitespace()).collect()
        } else {
            line.to_string()
        };
        if self.ignore_case {
            line.to_lowercase()
        } else {
            line
        }
    }
}

/// One corresponding difference: a line range per compared variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionCorrespondence {
    pub lines: VariantMap<LineRange>,
}

impl RegionCorrespondence {
    pub fn new(lines: VariantMap<LineRange>) -> Self {
        Self { lines }
    }

    pub fn range(&self, variant: Variant) -> Option<LineRange> {
        self.lines.get(variant).copied()
    }
}

/// The external "ComputeDiff" collaborator.
///
/// Returned correspondences must be ascending and non-overlapping per
/// variant. Two texts get diff semantics, three get diff3 semantics.
pub trait DiffBackend {
    fn compute(
        &mut self,
        texts: &[(Variant, &str)],
    ) -> Result<Vec<RegionCorrespondence>, DiffToolError>;

    /// Release anything kept between invocations
    fn cleanup(&mut self) {}

    fn name(&self) -> &str;
}

/// Hunk of a pairwise comparison between the pivot text and one other
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairHunk {
    pub base: LineRange,
    pub other: LineRange,
}

impl PairHunk {
    pub fn new(base: Range<usize>, other: Range<usize>) -> Self {
        Self {
            base: LineRange::new(base.start, base.end),
            other: LineRange::new(other.start, other.end),
        }
    }
}

/// Group pairwise hunks (pivot against each other text) into N-way regions.
///
/// Hunks that overlap or touch on the pivot fuse into one region. A text
/// without a hunk in a region gets the pivot range shifted by the line
/// delta its earlier hunks accumulated. The first variant of `variants` is
/// the pivot; `pairs[k]` belongs to `variants[k + 1]`.
pub fn align(variants: &[Variant], pairs: &[Vec<PairHunk>]) -> Vec<RegionCorrespondence> {
    debug_assert_eq!(variants.len(), pairs.len() + 1);

    let mut items: Vec<(usize, PairHunk)> = pairs
        .iter()
        .enumerate()
        .flat_map(|(k, hunks)| hunks.iter().map(move |h| (k, *h)))
        .collect();
    items.sort_by_key(|(k, h)| (h.base.start, h.base.end, *k));

    let mut regions = Vec::new();
    let mut deltas = vec![0isize; pairs.len()];
    let mut idx = 0;

    while idx < items.len() {
        let group_start = items[idx].1.base.start;
        let mut group_end = items[idx].1.base.end;
        let mut last = idx + 1;
        while last < items.len() && items[last].1.base.start <= group_end {
            group_end = group_end.max(items[last].1.base.end);
            last += 1;
        }
        let group = &items[idx..last];

        let mut lines = VariantMap::new();
        lines.insert(variants[0], LineRange::new(group_start, group_end));

        for (k, delta) in deltas.iter_mut().enumerate() {
            let own: Vec<&PairHunk> = group
                .iter()
                .filter(|(owner, _)| *owner == k)
                .map(|(_, h)| h)
                .collect();
            let range = match (own.first(), own.last()) {
                (Some(first), Some(last_hunk)) => LineRange::new(
                    first.other.start - (first.base.start - group_start),
                    last_hunk.other.end + (group_end - last_hunk.base.end),
                ),
                _ => LineRange::new(
                    shift(group_start, *delta),
                    shift(group_end, *delta),
                ),
            };
            for hunk in &own {
                *delta += hunk.other.len() as isize - hunk.base.len() as isize;
            }
            lines.insert(variants[k + 1], range);
        }

        regions.push(RegionCorrespondence::new(lines));
        idx = last;
    }

    regions
}

fn shift(line: usize, delta: isize) -> usize {
    if delta >= 0 {
        line + delta as usize
    } else {
        line.saturating_sub(delta.unsigned_abs())
    }
}

/// Borrowed token list fed to imara-diff
pub(crate) struct Tokens<'s, 't>(pub(crate) &'s [&'t str]);

impl<'s, 't> TokenSource for Tokens<'s, 't> {
    type Token = &'t str;
    type Tokenizer = std::iter::Copied<std::slice::Iter<'s, &'t str>>;

    fn tokenize(&self) -> Self::Tokenizer {
        self.0.iter().copied()
    }

    fn estimate_tokens(&self) -> u32 {
        self.0.len() as u32
    }
}

/// Diff two token lists, returning token-index hunks in ascending order
pub(crate) fn diff_tokens(
    algorithm: Algorithm,
    before: &[&str],
    after: &[&str],
) -> Vec<(Range<usize>, Range<usize>)> {
    let input = InternedInput::new(Tokens(before), Tokens(after));
    let mut hunks = Vec::new();
    diff(algorithm, &input, |b: Range<u32>, a: Range<u32>| {
        hunks.push((
            b.start as usize..b.end as usize,
            a.start as usize..a.end as usize,
        ));
    });
    hunks
}

/// In-process line diff
#[derive(Debug, Clone, Default)]
pub struct BuiltinDiff {
    options: DiffOptions,
}

impl BuiltinDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: DiffOptions) -> Self {
        self.options = options;
        self
    }

    fn normalized_lines(&self, text: &str) -> Vec<String> {
        text.split_inclusive('\n')
            .map(|line| self.options.normalize(line))
            .collect()
    }

    fn pair(&self, base: &[String], other: &[String]) -> Vec<PairHunk> {
        let base: Vec<&str> = base.iter().map(String::as_str).collect();
        let other: Vec<&str> = other.iter().map(String::as_str).collect();
        diff_tokens(Algorithm::Histogram, &base, &other)
            .into_iter()
            .map(|(b, a)| PairHunk::new(b, a))
            .collect()
    }
}

impl DiffBackend for BuiltinDiff {
    fn compute(
        &mut self,
        texts: &[(Variant, &str)],
    ) -> Result<Vec<RegionCorrespondence>, DiffToolError> {
        if !(2..=4).contains(&texts.len()) {
            return Err(DiffToolError::Arity(texts.len()));
        }
        let lines: Vec<Vec<String>> = texts
            .iter()
            .map(|(_, text)| self.normalized_lines(text))
            .collect();
        let pairs: Vec<Vec<PairHunk>> = lines[1..]
            .iter()
            .map(|other| self.pair(&lines[0], other))
            .collect();
        let variants: Vec<Variant> = texts.iter().map(|(v, _)| *v).collect();
        Ok(align(&variants, &pairs))
    }

    fn name(&self) -> &str {
        "builtin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(region: &RegionCorrespondence, variants: &[Variant]) -> Vec<(usize, usize)> {
        variants
            .iter()
            .map(|v| {
                let r = region.range(*v).unwrap();
                (r.start, r.end)
            })
            .collect()
    }

    #[test]
    fn test_two_way_regions() {
        let a = "one\ntwo\nthree\nfour\nfive\n";
        let b = "one\nTWO\nthree\nfour\nfive\nsix\n";
        let regions = BuiltinDiff::new()
            .compute(&[(Variant::A, a), (Variant::B, b)])
            .unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(ranges(&regions[0], &[Variant::A, Variant::B]), vec![(1, 2), (1, 2)]);
        assert_eq!(ranges(&regions[1], &[Variant::A, Variant::B]), vec![(5, 5), (5, 6)]);
    }

    #[test]
    fn test_identical_texts_have_no_regions() {
        let regions = BuiltinDiff::new()
            .compute(&[(Variant::A, "x\ny\n"), (Variant::B, "x\ny\n")])
            .unwrap();
        assert!(regions.is_empty());
    }

    #[test]
    fn test_ignore_whitespace_and_case() {
        let a = "let x = 1;\nfoo\n";
        let b = "let  x=1;\nFOO\n";
        let mut plain = BuiltinDiff::new();
        assert_eq!(plain.compute(&[(Variant::A, a), (Variant::B, b)]).unwrap().len(), 1);

        let mut folded = BuiltinDiff::new().with_options(
            DiffOptions::default()
                .with_ignore_whitespace(true)
                .with_ignore_case(true),
        );
        assert!(folded
            .compute(&[(Variant::A, a), (Variant::B, b)])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_three_way_groups_overlapping_hunks() {
        let a = "1\n2\n3\n4\n5\n6\n7\n";
        let b = "1\nX\n3\n4\n5\n6\n7\n";
        let c = "1\n2\nY\n4\n5\n6\n7\nZ\n";
        let regions = BuiltinDiff::new()
            .compute(&[(Variant::A, a), (Variant::B, b), (Variant::C, c)])
            .unwrap();
        assert_eq!(regions.len(), 2);
        // Lines 2 and 3 touch, so the B and C hunks fuse
        assert_eq!(
            ranges(&regions[0], &[Variant::A, Variant::B, Variant::C]),
            vec![(1, 3), (1, 3), (1, 3)]
        );
        assert_eq!(
            ranges(&regions[1], &[Variant::A, Variant::B, Variant::C]),
            vec![(7, 7), (7, 7), (7, 8)]
        );
    }

    #[test]
    fn test_align_maps_untouched_variant_through_delta() {
        let variants = [Variant::A, Variant::B, Variant::C];
        let pairs = vec![
            vec![PairHunk::new(0..0, 0..2), PairHunk::new(5..6, 7..8)],
            vec![PairHunk::new(9..10, 9..9)],
        ];
        let regions = align(&variants, &pairs);
        assert_eq!(regions.len(), 3);
        assert_eq!(ranges(&regions[0], &variants), vec![(0, 0), (0, 2), (0, 0)]);
        assert_eq!(ranges(&regions[1], &variants), vec![(5, 6), (7, 8), (5, 6)]);
        assert_eq!(ranges(&regions[2], &variants), vec![(9, 10), (11, 12), (9, 9)]);
    }
}
