//! The ordered set of difference regions of one session

use crate::buffer::{Buffers, LineIndex};
use crate::copy::UndoTable;
use crate::diff::{DiffBackend, DiffToolError, RegionCorrespondence};
use crate::fine::FineDiff;
use crate::merge::MergeState;
use crate::span::Span;
use crate::variant::{JobKind, Variant, VariantMap};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("bad difference number {n} (valid: 1 to {len})")]
    BadDiffNumber { n: isize, len: usize },
    #[error("no differences")]
    NoDifferences,
    #[error("variant {0} is unavailable")]
    VariantUnavailable(Variant),
    #[error("variant {0} was changed outside the session; recompute differences")]
    StaleVariant(Variant),
}

/// Agreement between variants inside a region (comparison jobs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffState {
    AllDiffer,
    /// This variant differs, the other two agree
    Odd(Variant),
    AllEqual,
}

impl DiffState {
    pub fn classify(a: &str, b: &str, c: &str) -> DiffState {
        match (a == b, a == c, b == c) {
            (true, true, _) => DiffState::AllEqual,
            (true, false, _) => DiffState::Odd(Variant::C),
            (false, true, _) => DiffState::Odd(Variant::B),
            (false, false, true) => DiffState::Odd(Variant::A),
            (false, false, false) => DiffState::AllDiffer,
        }
    }
}

/// Text handed to [`DiffRegistry::build`], positioned inside its buffer
#[derive(Debug, Clone, Copy)]
pub struct VariantText<'a> {
    pub variant: Variant,
    pub text: &'a str,
    /// Buffer offset of `text[0]` (non-zero for narrowed jobs)
    pub offset: usize,
}

/// One correspondence across variants
#[derive(Debug, Clone)]
pub struct DiffRecord {
    index: usize,
    spans: VariantMap<Span>,
    pub(crate) diff_state: DiffState,
    pub(crate) merge_state: Option<MergeState>,
    /// State a re-merge assigns to this region
    pub(crate) default_state: Option<MergeState>,
    pub(crate) clash: bool,
    pub(crate) fine: Option<FineDiff>,
}

impl DiffRecord {
    fn new(index: usize, spans: VariantMap<Span>) -> Self {
        Self {
            index,
            spans,
            diff_state: DiffState::AllDiffer,
            merge_state: None,
            default_state: None,
            clash: false,
            fine: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn span(&self, variant: Variant) -> Option<&Span> {
        self.spans.get(variant)
    }

    pub fn spans(&self) -> &VariantMap<Span> {
        &self.spans
    }

    pub fn diff_state(&self) -> DiffState {
        self.diff_state
    }

    pub fn merge_state(&self) -> Option<MergeState> {
        self.merge_state
    }

    /// Both A and B changed the ancestor, differently
    pub fn is_clash(&self) -> bool {
        self.clash
    }

    pub fn fine(&self) -> Option<&FineDiff> {
        self.fine.as_ref()
    }

    pub(crate) fn set_span(&mut self, span: Span) {
        self.spans.insert(span.variant, span);
    }

    /// Sum of span lengths over all variants
    pub fn total_len(&self) -> usize {
        self.spans.iter().map(|(_, s)| s.len()).sum()
    }
}

/// Ordered difference records plus the undo table.
///
/// Records never survive a rebuild; indices handed out before a rebuild are
/// meaningless afterwards.
#[derive(Debug)]
pub struct DiffRegistry {
    job: JobKind,
    records: Vec<DiffRecord>,
    pub(crate) undo: UndoTable,
    revisions: VariantMap<u64>,
}

impl DiffRegistry {
    pub fn empty(job: JobKind) -> Self {
        Self {
            job,
            records: Vec::new(),
            undo: UndoTable::default(),
            revisions: VariantMap::new(),
        }
    }

    /// Run the backend over `texts` and turn its correspondences into records.
    ///
    /// Nothing is modified on failure; callers replace their registry only
    /// with the returned one.
    pub fn build(
        job: JobKind,
        texts: &[VariantText<'_>],
        backend: &mut dyn DiffBackend,
    ) -> Result<DiffRegistry, DiffToolError> {
        let input: Vec<(Variant, &str)> = texts.iter().map(|t| (t.variant, t.text)).collect();
        let regions = backend.compute(&input)?;
        validate_order(texts, &regions)?;

        let indexes: Vec<LineIndex> = texts.iter().map(|t| LineIndex::new(t.text)).collect();
        let records = regions
            .iter()
            .enumerate()
            .map(|(index, region)| {
                let spans = texts
                    .iter()
                    .zip(&indexes)
                    .filter_map(|(text, lines)| {
                        let range = region.range(text.variant)?;
                        Some((
                            text.variant,
                            Span::new(
                                text.variant,
                                text.offset + lines.offset(range.start),
                                text.offset + lines.offset(range.end),
                            ),
                        ))
                    })
                    .collect();
                DiffRecord::new(index, spans)
            })
            .collect::<Vec<_>>();

        log::debug!(
            "{} found {} regions for {}",
            backend.name(),
            records.len(),
            job
        );

        let mut registry = DiffRegistry {
            job,
            records,
            undo: UndoTable::default(),
            revisions: VariantMap::new(),
        };
        if job.is_three_way_comparison() {
            for record in &mut registry.records {
                record.diff_state = classify_spans(texts, &record.spans);
            }
        }
        Ok(registry)
    }

    pub fn job(&self) -> JobKind {
        self.job
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DiffRecord] {
        &self.records
    }

    pub fn record(&self, n: usize) -> Result<&DiffRecord, RegistryError> {
        self.check_index(n)?;
        Ok(&self.records[n])
    }

    pub(crate) fn record_mut(&mut self, n: usize) -> Result<&mut DiffRecord, RegistryError> {
        self.check_index(n)?;
        Ok(&mut self.records[n])
    }

    pub fn check_index(&self, n: usize) -> Result<(), RegistryError> {
        if self.records.is_empty() {
            Err(RegistryError::NoDifferences)
        } else if n >= self.records.len() {
            Err(RegistryError::BadDiffNumber {
                n: n as isize + 1,
                len: self.records.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Span of region `n` in `variant`
    pub fn get(&self, n: usize, variant: Variant) -> Result<Span, RegistryError> {
        self.record(n)?
            .span(variant)
            .copied()
            .ok_or(RegistryError::VariantUnavailable(variant))
    }

    /// All spans of `variant`, in region order
    pub fn spans_for(&self, variant: Variant) -> Vec<Span> {
        self.records
            .iter()
            .filter_map(|r| r.span(variant).copied())
            .collect()
    }

    /// Drop every span and, optionally, every fine-diff cache.
    ///
    /// Saved copies always go: the regions they would restore are gone.
    pub fn clear(&mut self, also_fine: bool) {
        for record in &mut self.records {
            record.spans = VariantMap::new();
            if also_fine {
                record.fine = None;
            }
        }
        self.undo.clear();
    }

    /// Remember the buffer revision the spans of `variant` agree with
    pub(crate) fn observe(&mut self, variant: Variant, revision: u64) {
        self.revisions.insert(variant, revision);
    }

    /// A record is valid when every span it needs resolves inside a live buffer
    pub fn is_valid(&self, n: usize, buffers: &Buffers) -> bool {
        self.check(n, buffers).is_ok()
    }

    /// Validity check with the reason it failed
    pub fn check(&self, n: usize, buffers: &Buffers) -> Result<(), RegistryError> {
        let record = self.record(n)?;
        for &variant in self.job.active_variants() {
            let span = record
                .span(variant)
                .ok_or(RegistryError::VariantUnavailable(variant))?;
            let buffer = buffers.get(variant)?;
            self.check_fresh(variant, buffer.revision())?;
            if span.end > buffer.len() {
                return Err(RegistryError::StaleVariant(variant));
            }
        }
        Ok(())
    }

    pub(crate) fn check_fresh(&self, variant: Variant, revision: u64) -> Result<(), RegistryError> {
        match self.revisions.get(variant) {
            Some(&seen) if seen != revision => Err(RegistryError::StaleVariant(variant)),
            _ => Ok(()),
        }
    }

    /// Text of region `n` in `variant`
    pub fn content(
        &self,
        n: usize,
        variant: Variant,
        buffers: &Buffers,
    ) -> Result<String, RegistryError> {
        let span = self.get(n, variant)?;
        let buffer = buffers.get(variant)?;
        self.check_fresh(variant, buffer.revision())?;
        buffer
            .content(span.range())
            .map_err(|_| RegistryError::StaleVariant(variant))
    }

    /// Resize region `n`'s span in `variant` after its text was replaced with
    /// `new_len` bytes; later spans in that variant move along.
    pub(crate) fn replace_span(&mut self, n: usize, variant: Variant, new_len: usize) {
        let Some(old) = self.records.get(n).and_then(|r| r.span(variant)).copied() else {
            return;
        };
        let delta = new_len as isize - old.len() as isize;
        self.records[n].set_span(Span::new(variant, old.begin, old.begin + new_len));
        for record in &mut self.records[n + 1..] {
            if let Some(span) = record.span(variant).copied() {
                record.set_span(span.shifted(delta));
            }
        }
    }

    /// Carry every span of `variant` across an arbitrary edit
    pub(crate) fn apply_edit(&mut self, variant: Variant, edited: &Range<usize>, new_len: usize) {
        for record in &mut self.records {
            let Some(span) = record.spans.get_mut(variant) else {
                continue;
            };
            let hit = span.begin <= edited.end && edited.start <= span.end;
            span.adjust_for_edit(edited, new_len);
            if hit {
                record.fine = None;
            }
        }
    }

    pub(crate) fn records_mut(&mut self) -> &mut [DiffRecord] {
        &mut self.records
    }
}

fn validate_order(
    texts: &[VariantText<'_>],
    regions: &[RegionCorrespondence],
) -> Result<(), DiffToolError> {
    for text in texts {
        let mut previous_end = 0;
        for region in regions {
            if let Some(range) = region.range(text.variant) {
                if range.start < previous_end {
                    return Err(DiffToolError::Disordered(text.variant));
                }
                previous_end = range.end;
            }
        }
    }
    Ok(())
}

fn classify_spans(texts: &[VariantText<'_>], spans: &VariantMap<Span>) -> DiffState {
    DiffState::classify(
        slice(texts, spans, Variant::A),
        slice(texts, spans, Variant::B),
        slice(texts, spans, Variant::C),
    )
}

fn slice<'a>(texts: &[VariantText<'a>], spans: &VariantMap<Span>, variant: Variant) -> &'a str {
    texts
        .iter()
        .find(|t| t.variant == variant)
        .zip(spans.get(variant))
        .and_then(|(t, span)| t.text.get(span.begin - t.offset..span.end - t.offset))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemoryBuffer;
    use crate::copy::UndoEntry;
    use crate::diff::BuiltinDiff;

    fn texts<'a>(pairs: &[(Variant, &'a str)]) -> Vec<VariantText<'a>> {
        pairs
            .iter()
            .map(|&(variant, text)| VariantText {
                variant,
                text,
                offset: 0,
            })
            .collect()
    }

    const A: &str = "same\nalpha\nsame\nsame\nbeta\nsame\nsame\ngamma\n";
    const B: &str = "same\nALPHA\nsame\nsame\nBETA\nBETA2\nsame\nsame\n";

    fn two_way() -> DiffRegistry {
        DiffRegistry::build(
            JobKind::Compare2,
            &texts(&[(Variant::A, A), (Variant::B, B)]),
            &mut BuiltinDiff::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_build_produces_ordered_spans() {
        let registry = two_way();
        assert_eq!(registry.len(), 3);
        for variant in [Variant::A, Variant::B] {
            let spans = registry.spans_for(variant);
            assert_eq!(spans.len(), registry.len());
            for pair in spans.windows(2) {
                assert!(pair[0].end <= pair[1].begin);
                assert!(pair[0].begin <= pair[0].end);
            }
        }
        let first = registry.get(0, Variant::A).unwrap();
        assert_eq!(&A[first.range()], "alpha\n");
        let last = registry.get(2, Variant::B).unwrap();
        assert!(last.is_empty());
    }

    #[test]
    fn test_get_errors() {
        let registry = two_way();
        assert_eq!(
            registry.get(3, Variant::A),
            Err(RegistryError::BadDiffNumber { n: 4, len: 3 })
        );
        assert_eq!(
            registry.get(0, Variant::C),
            Err(RegistryError::VariantUnavailable(Variant::C))
        );
        let empty = DiffRegistry::empty(JobKind::Compare2);
        assert_eq!(empty.get(0, Variant::A), Err(RegistryError::NoDifferences));
    }

    #[test]
    fn test_three_way_diff_state() {
        let a = "x\none\ny\n";
        let b = "x\none\ny\n\n";
        let c = "x\ntwo\ny\n";
        let registry = DiffRegistry::build(
            JobKind::Compare3,
            &texts(&[(Variant::A, a), (Variant::B, b), (Variant::C, c)]),
            &mut BuiltinDiff::new(),
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.records()[0].diff_state(), DiffState::Odd(Variant::C));
        assert_eq!(registry.records()[1].diff_state(), DiffState::Odd(Variant::B));
    }

    #[test]
    fn test_replace_span_shifts_later_regions() {
        let mut registry = two_way();
        let before = registry.get(1, Variant::A).unwrap();
        let first = registry.get(0, Variant::A).unwrap();
        registry.replace_span(0, Variant::A, first.len() + 4);
        assert_eq!(registry.get(0, Variant::A).unwrap().len(), first.len() + 4);
        let after = registry.get(1, Variant::A).unwrap();
        assert_eq!(after.begin, before.begin + 4);
        assert_eq!(registry.get(1, Variant::B).unwrap(), two_way().get(1, Variant::B).unwrap());
    }

    #[test]
    fn test_validity_tracks_buffers() {
        let mut registry = two_way();
        let mut buffers = Buffers::new();
        buffers.insert(Variant::A, Box::new(MemoryBuffer::new("a", A)));
        buffers.insert(Variant::B, Box::new(MemoryBuffer::new("b", B)));
        registry.observe(Variant::A, 0);
        registry.observe(Variant::B, 0);
        assert!(registry.is_valid(0, &buffers));

        buffers.get_mut(Variant::B).unwrap().replace(0..0, "x").unwrap();
        assert_eq!(
            registry.check(0, &buffers),
            Err(RegistryError::StaleVariant(Variant::B))
        );

        buffers.take(Variant::A);
        assert!(!registry.is_valid(0, &buffers));
    }

    #[test]
    fn test_clear_drops_spans() {
        let mut registry = two_way();
        registry.clear(true);
        assert_eq!(registry.len(), 3);
        assert!(registry.spans_for(Variant::A).is_empty());
        assert_eq!(
            registry.get(0, Variant::A),
            Err(RegistryError::VariantUnavailable(Variant::A))
        );
    }

    #[test]
    fn test_clear_always_drops_saved_copies() {
        let mut registry = two_way();
        registry.undo.insert(
            0,
            Variant::B,
            UndoEntry {
                text: "old".to_string(),
                diff_state: DiffState::AllDiffer,
                merge_state: None,
            },
        );
        registry.clear(false);
        assert!(registry.undo.is_empty());
    }

    #[test]
    fn test_disordered_backend_output_is_rejected() {
        struct Backwards;
        impl DiffBackend for Backwards {
            fn compute(
                &mut self,
                _texts: &[(Variant, &str)],
            ) -> Result<Vec<RegionCorrespondence>, DiffToolError> {
                use crate::span::LineRange;
                let region = |s, e| {
                    RegionCorrespondence::new(
                        [(Variant::A, LineRange::new(s, e)), (Variant::B, LineRange::new(s, e))]
                            .into_iter()
                            .collect(),
                    )
                };
                Ok(vec![region(3, 4), region(1, 2)])
            }
            fn name(&self) -> &str {
                "backwards"
            }
        }
        let result = DiffRegistry::build(
            JobKind::Compare2,
            &texts(&[(Variant::A, A), (Variant::B, B)]),
            &mut Backwards,
        );
        assert!(matches!(result, Err(DiffToolError::Disordered(Variant::A))));
    }
}
