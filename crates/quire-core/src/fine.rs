//! Word-level refinement of regions

use crate::buffer::Buffers;
use crate::diff::diff_tokens;
use crate::options::AutoRefine;
use crate::registry::{DiffRegistry, RegistryError};
use crate::variant::Variant;
use imara_diff::Algorithm;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use unicode_segmentation::UnicodeSegmentation;

/// Byte range inside one variant's region, relative to the region start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineRange {
    pub variant: Variant,
    pub range: Range<usize>,
}

/// Corresponding differing token runs of two variants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubSpanPair {
    pub left: FineRange,
    pub right: FineRange,
}

impl SubSpanPair {
    pub fn involves(&self, variant: Variant) -> bool {
        self.left.variant == variant || self.right.variant == variant
    }
}

/// Cached refinement of one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FineDiff {
    pairs: Vec<SubSpanPair>,
    surfaced: bool,
}

impl FineDiff {
    pub fn pairs(&self) -> &[SubSpanPair] {
        &self.pairs
    }

    /// No word-level differences at all (whitespace only)
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// No word-level difference touches `variant`
    pub fn is_empty_for(&self, variant: Variant) -> bool {
        !self.pairs.iter().any(|pair| pair.involves(variant))
    }

    /// Computed for display rather than only for skipping
    pub fn is_surfaced(&self) -> bool {
        self.surfaced
    }

    /// Ranges of `variant` that differ from any other variant, relative to
    /// the region start, sorted and deduplicated
    pub fn ranges_for(&self, variant: Variant) -> Vec<Range<usize>> {
        let mut ranges: Vec<Range<usize>> = self
            .pairs
            .iter()
            .flat_map(|pair| [&pair.left, &pair.right])
            .filter(|side| side.variant == variant && !side.range.is_empty())
            .map(|side| side.range.clone())
            .collect();
        ranges.sort_by_key(|r| (r.start, r.end));
        ranges.dedup();
        ranges
    }
}

/// Non-whitespace word tokens of `text` with their byte offsets
pub fn tokenize(text: &str) -> Vec<(usize, &str)> {
    text.split_word_bound_indices()
        .filter(|(_, token)| !token.chars().all(char::is_whitespace))
        .collect()
}

/// Word-level differences between two region texts
pub fn diff_words(left: (Variant, &str), right: (Variant, &str)) -> Vec<SubSpanPair> {
    let left_tokens = tokenize(left.1);
    let right_tokens = tokenize(right.1);
    let before: Vec<&str> = left_tokens.iter().map(|(_, t)| *t).collect();
    let after: Vec<&str> = right_tokens.iter().map(|(_, t)| *t).collect();

    diff_tokens(Algorithm::Myers, &before, &after)
        .into_iter()
        .map(|(b, a)| SubSpanPair {
            left: FineRange {
                variant: left.0,
                range: byte_range(&left_tokens, b, left.1.len()),
            },
            right: FineRange {
                variant: right.0,
                range: byte_range(&right_tokens, a, right.1.len()),
            },
        })
        .collect()
}

fn byte_range(tokens: &[(usize, &str)], hunk: Range<usize>, text_len: usize) -> Range<usize> {
    let start = tokens.get(hunk.start).map_or(text_len, |(offset, _)| *offset);
    if hunk.is_empty() {
        return start..start;
    }
    let end = tokens
        .get(hunk.end - 1)
        .map_or(text_len, |(offset, token)| offset + token.len());
    start..end
}

/// Computes and caches fine differences on registry records
#[derive(Debug, Clone, Copy)]
pub struct FineDiffEngine {
    mode: AutoRefine,
    limit: usize,
}

impl FineDiffEngine {
    pub fn new(mode: AutoRefine, limit: usize) -> Self {
        Self { mode, limit }
    }

    pub fn mode(&self) -> AutoRefine {
        self.mode
    }

    /// Refine region `n`, replacing any cached result
    pub fn refine<'r>(
        &self,
        registry: &'r mut DiffRegistry,
        n: usize,
        buffers: &Buffers,
        surface: bool,
    ) -> Result<&'r FineDiff, RegistryError> {
        let variants = registry.job().refined_variants();
        let mut texts = Vec::with_capacity(variants.len());
        for &variant in variants {
            texts.push((variant, registry.content(n, variant, buffers)?));
        }

        let mut pairs = Vec::new();
        for (i, (left, left_text)) in texts.iter().enumerate() {
            for (right, right_text) in &texts[i + 1..] {
                if left_text != right_text {
                    pairs.extend(diff_words(
                        (*left, left_text.as_str()),
                        (*right, right_text.as_str()),
                    ));
                }
            }
        }

        let record = registry.record_mut(n)?;
        record.fine = Some(FineDiff { pairs, surfaced: surface });
        Ok(record.fine.get_or_insert_with(FineDiff::default))
    }

    /// Refinement as the auto-refine mode dictates on selection.
    ///
    /// Returns `None` when auto-refine is off or the region is over the size
    /// limit. A cached result is reused.
    pub fn auto<'r>(
        &self,
        registry: &'r mut DiffRegistry,
        n: usize,
        buffers: &Buffers,
    ) -> Result<Option<&'r FineDiff>, RegistryError> {
        let surface = match self.mode {
            AutoRefine::Off => return Ok(None),
            AutoRefine::On => true,
            AutoRefine::Suppressed => false,
        };
        let record = registry.record(n)?;
        if record.total_len() > self.limit {
            return Ok(None);
        }
        if record.fine.is_none() {
            self.refine(registry, n, buffers, surface)?;
        }
        Ok(registry.record(n)?.fine())
    }

    /// Drop the cache of region `n`
    pub fn clear(registry: &mut DiffRegistry, n: usize) -> Result<(), RegistryError> {
        registry.record_mut(n)?.fine = None;
        Ok(())
    }

    /// Whether region `n` differs only in whitespace.
    ///
    /// Merge jobs look only at differences touching the result. Regions that
    /// cannot be refined automatically are never similar.
    pub fn is_similar(
        &self,
        registry: &mut DiffRegistry,
        n: usize,
        buffers: &Buffers,
    ) -> Result<bool, RegistryError> {
        let merge = registry.job().is_merge();
        Ok(match self.auto(registry, n, buffers)? {
            None => false,
            Some(fine) if merge => fine.is_empty_for(Variant::C),
            Some(fine) => fine.is_empty(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemoryBuffer;
    use crate::diff::BuiltinDiff;
    use crate::registry::VariantText;
    use crate::variant::JobKind;

    #[test]
    fn test_tokenize_drops_whitespace() {
        let tokens = tokenize("let  x = 42;\n");
        let words: Vec<&str> = tokens.iter().map(|(_, t)| *t).collect();
        assert_eq!(words, vec!["let", "x", "=", "42", ";"]);
        assert_eq!(tokens[1].0, 5);
    }

    #[test]
    fn test_diff_words_finds_changed_token() {
        let pairs = diff_words((Variant::A, "the quick fox\n"), (Variant::B, "the slow fox\n"));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].left.range, 4..9);
        assert_eq!(pairs[0].right.range, 4..8);
    }

    #[test]
    fn test_whitespace_only_change_is_empty() {
        let pairs = diff_words((Variant::A, "a  b\n"), (Variant::B, "a b\n"));
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_insertion_gives_empty_left_range() {
        let pairs = diff_words((Variant::A, "a c"), (Variant::B, "a b c"));
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].left.range, 2..2);
        assert_eq!(pairs[0].right.range, 2..3);
    }

    fn session_parts(a: &str, b: &str) -> (DiffRegistry, Buffers) {
        let registry = DiffRegistry::build(
            JobKind::Compare2,
            &[
                VariantText { variant: Variant::A, text: a, offset: 0 },
                VariantText { variant: Variant::B, text: b, offset: 0 },
            ],
            &mut BuiltinDiff::new(),
        )
        .unwrap();
        let mut buffers = Buffers::new();
        buffers.insert(Variant::A, Box::new(MemoryBuffer::new("a", a)));
        buffers.insert(Variant::B, Box::new(MemoryBuffer::new("b", b)));
        (registry, buffers)
    }

    #[test]
    fn test_refine_caches_on_record() {
        let (mut registry, buffers) = session_parts("x\nfoo bar\n", "x\nfoo baz\n");
        let engine = FineDiffEngine::new(AutoRefine::On, 14000);
        let fine = engine.refine(&mut registry, 0, &buffers, true).unwrap();
        assert_eq!(fine.ranges_for(Variant::B), vec![4..7]);
        assert!(registry.records()[0].fine().is_some());

        FineDiffEngine::clear(&mut registry, 0).unwrap();
        assert!(registry.records()[0].fine().is_none());
    }

    #[test]
    fn test_auto_respects_mode_and_limit() {
        let (mut registry, buffers) = session_parts("a b\n", "a  b\n");
        let off = FineDiffEngine::new(AutoRefine::Off, 14000);
        assert!(off.auto(&mut registry, 0, &buffers).unwrap().is_none());

        let tiny = FineDiffEngine::new(AutoRefine::On, 3);
        assert!(!tiny.is_similar(&mut registry, 0, &buffers).unwrap());

        let suppressed = FineDiffEngine::new(AutoRefine::Suppressed, 14000);
        assert!(suppressed.is_similar(&mut registry, 0, &buffers).unwrap());
        assert!(!registry.records()[0].fine().unwrap().is_surfaced());
    }
}
