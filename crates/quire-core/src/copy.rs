//! Copying region content between variants, with single-level undo

use crate::buffer::{BufferError, Buffers};
use crate::merge::{MergeState, RegionTexts};
use crate::options::CombinationMarkers;
use crate::registry::{DiffRegistry, DiffState, RegistryError};
use crate::variant::Variant;
use rustc_hash::FxHashMap;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CopyError {
    #[error("cannot write to variant {0}: {1}")]
    TargetUnwritable(Variant, BufferError),
    #[error("region {} of {variant} already holds a saved copy; confirm to overwrite it", .index + 1)]
    ConfirmationRequired { index: usize, variant: Variant },
    #[error("source and target variant are the same")]
    SameVariant,
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    #[error("nothing saved for region {} of {variant}", .index + 1)]
    NothingSaved { index: usize, variant: Variant },
    #[error("cannot write to variant {0}: {1}")]
    TargetUnwritable(Variant, BufferError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Result of a single copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CopyOutcome {
    Applied,
    /// Source and target already agree
    NoOp,
}

/// Text a copy overwrote, plus the record states it had
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoEntry {
    pub text: String,
    pub diff_state: DiffState,
    pub merge_state: Option<MergeState>,
}

/// At most one saved entry per `(index, variant)`
#[derive(Debug, Default)]
pub struct UndoTable {
    entries: FxHashMap<(usize, Variant), UndoEntry>,
}

impl UndoTable {
    pub fn get(&self, index: usize, variant: Variant) -> Option<&UndoEntry> {
        self.entries.get(&(index, variant))
    }

    pub fn contains(&self, index: usize, variant: Variant) -> bool {
        self.entries.contains_key(&(index, variant))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Variants of region `index` holding a saved entry
    pub fn saved_variants(&self, index: usize) -> Vec<Variant> {
        let mut variants: Vec<Variant> = self
            .entries
            .keys()
            .filter(|(i, _)| *i == index)
            .map(|(_, v)| *v)
            .collect();
        variants.sort();
        variants
    }

    pub(crate) fn insert(&mut self, index: usize, variant: Variant, entry: UndoEntry) {
        self.entries.insert((index, variant), entry);
    }

    fn remove(&mut self, index: usize, variant: Variant) -> Option<UndoEntry> {
        self.entries.remove(&(index, variant))
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Outcome of [`CopyEngine::copy_all`]
#[derive(Debug, Default)]
pub struct CopyReport {
    pub applied: Vec<usize>,
    pub unchanged: Vec<usize>,
    pub failed: Vec<(usize, CopyError)>,
}

impl CopyReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Mutates variant text region by region.
///
/// Never prompts: a copy over an existing saved entry fails with
/// [`CopyError::ConfirmationRequired`] unless the caller passes `confirmed`.
pub struct CopyEngine<'s> {
    registry: &'s mut DiffRegistry,
    buffers: &'s mut Buffers,
}

impl<'s> CopyEngine<'s> {
    pub fn new(registry: &'s mut DiffRegistry, buffers: &'s mut Buffers) -> Self {
        Self { registry, buffers }
    }

    /// Copy region `index` of `from` over the same region of `to`
    pub fn copy(
        &mut self,
        index: usize,
        from: Variant,
        to: Variant,
        confirmed: bool,
    ) -> Result<CopyOutcome, CopyError> {
        if from == to {
            return Err(CopyError::SameVariant);
        }
        self.registry.check(index, self.buffers)?;
        let source = self.registry.content(index, from, self.buffers)?;
        let merge_state = if self.registry.job().is_merge() && to == Variant::C {
            MergeState::for_copy(from)
        } else {
            None
        };
        self.write(index, to, &source, merge_state, confirmed)
    }

    /// Write the combination of A and B (and the ancestor) into the result
    pub fn combine(
        &mut self,
        index: usize,
        markers: &CombinationMarkers,
        confirmed: bool,
    ) -> Result<CopyOutcome, CopyError> {
        self.registry.check(index, self.buffers)?;
        let combined = RegionTexts::read(self.registry, index, self.buffers)?.combined(markers);
        self.write(index, Variant::C, &combined, Some(MergeState::Combined), confirmed)
    }

    /// Copy every valid region, continuing past failures. Saved entries
    /// are overwritten without confirmation.
    pub fn copy_all(&mut self, from: Variant, to: Variant) -> CopyReport {
        let mut report = CopyReport::default();
        for index in 0..self.registry.len() {
            match self.copy(index, from, to, true) {
                Ok(CopyOutcome::Applied) => report.applied.push(index),
                Ok(CopyOutcome::NoOp) => report.unchanged.push(index),
                Err(e) => {
                    log::warn!("copy of region {} from {from} to {to} failed: {e}", index + 1);
                    report.failed.push((index, e));
                }
            }
        }
        report
    }

    /// Put back what the last copy into region `index` of `variant` overwrote
    pub fn restore(&mut self, index: usize, variant: Variant) -> Result<(), RestoreError> {
        let entry = self
            .registry
            .undo
            .get(index, variant)
            .cloned()
            .ok_or(RestoreError::NothingSaved { index, variant })?;
        self.registry.check(index, self.buffers)?;

        self.replace(index, variant, &entry.text)
            .map_err(|e| RestoreError::TargetUnwritable(variant, e))?;
        self.registry.undo.remove(index, variant);

        let record = self.registry.record_mut(index)?;
        record.diff_state = entry.diff_state;
        record.merge_state = entry.merge_state;
        log::debug!("restored region {} of {variant}", index + 1);
        Ok(())
    }

    fn write(
        &mut self,
        index: usize,
        to: Variant,
        text: &str,
        merge_state: Option<MergeState>,
        confirmed: bool,
    ) -> Result<CopyOutcome, CopyError> {
        let previous = self.registry.content(index, to, self.buffers)?;
        if previous == text {
            return Ok(CopyOutcome::NoOp);
        }
        if self.registry.undo.contains(index, to) && !confirmed {
            return Err(CopyError::ConfirmationRequired { index, variant: to });
        }

        let record = self.registry.record(index)?;
        let saved = UndoEntry {
            text: previous,
            diff_state: record.diff_state(),
            merge_state: record.merge_state(),
        };
        self.replace(index, to, text)
            .map_err(|e| CopyError::TargetUnwritable(to, e))?;
        self.registry.undo.insert(index, to, saved);

        if let Some(state) = merge_state {
            self.registry.record_mut(index)?.merge_state = Some(state);
        }
        if self.registry.job().is_three_way_comparison() {
            let state = DiffState::classify(
                &self.registry.content(index, Variant::A, self.buffers)?,
                &self.registry.content(index, Variant::B, self.buffers)?,
                &self.registry.content(index, Variant::C, self.buffers)?,
            );
            self.registry.record_mut(index)?.diff_state = state;
        }
        log::debug!("copied region {} into {to}", index + 1);
        Ok(CopyOutcome::Applied)
    }

    /// Replace the text of one span and carry the registry along
    fn replace(&mut self, index: usize, variant: Variant, text: &str) -> Result<(), BufferError> {
        let Ok(span) = self.registry.get(index, variant) else {
            return Err(BufferError::Dead(variant.to_string()));
        };
        let Ok(buffer) = self.buffers.get_mut(variant) else {
            return Err(BufferError::Dead(variant.to_string()));
        };
        buffer.replace(span.range(), text)?;
        let revision = buffer.revision();
        self.registry.replace_span(index, variant, text.len());
        self.registry.observe(variant, revision);
        if let Ok(record) = self.registry.record_mut(index) {
            record.fine = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{MemoryBuffer, ProtectedVariables, VariantBuffer};
    use crate::diff::BuiltinDiff;
    use crate::registry::VariantText;
    use crate::variant::JobKind;
    use std::ops::Range;

    fn setup(job: JobKind, texts: &[(Variant, &str)]) -> (DiffRegistry, Buffers) {
        let input: Vec<VariantText> = texts
            .iter()
            .map(|&(variant, text)| VariantText { variant, text, offset: 0 })
            .collect();
        let mut registry = DiffRegistry::build(job, &input, &mut BuiltinDiff::new()).unwrap();
        let mut buffers = Buffers::new();
        for &(variant, text) in texts {
            buffers.insert(variant, Box::new(MemoryBuffer::new(variant.label(), text)));
            registry.observe(variant, 0);
        }
        (registry, buffers)
    }

    fn text_of(buffers: &Buffers, variant: Variant) -> String {
        buffers.get(variant).unwrap().text().to_string()
    }

    #[test]
    fn test_copy_then_restore_round_trips() {
        let (mut registry, mut buffers) =
            setup(JobKind::Compare2, &[(Variant::A, "k\nnew\nk\n"), (Variant::B, "k\nold\nk\n")]);
        let mut engine = CopyEngine::new(&mut registry, &mut buffers);
        assert_eq!(engine.copy(0, Variant::A, Variant::B, false), Ok(CopyOutcome::Applied));
        drop(engine);
        assert_eq!(text_of(&buffers, Variant::B), "k\nnew\nk\n");
        assert!(registry.undo.contains(0, Variant::B));

        let mut engine = CopyEngine::new(&mut registry, &mut buffers);
        engine.restore(0, Variant::B).unwrap();
        assert_eq!(text_of(&buffers, Variant::B), "k\nold\nk\n");
        assert!(registry.undo.is_empty());
    }

    #[test]
    fn test_copy_equal_content_is_noop() {
        let (mut registry, mut buffers) =
            setup(JobKind::Compare2, &[(Variant::A, "a\nx\n"), (Variant::B, "b\nx\n")]);
        let mut engine = CopyEngine::new(&mut registry, &mut buffers);
        engine.copy(0, Variant::A, Variant::B, false).unwrap();
        assert_eq!(engine.copy(0, Variant::A, Variant::B, false), Ok(CopyOutcome::NoOp));
        assert_eq!(registry.undo.len(), 1);
    }

    #[test]
    fn test_second_overwrite_needs_confirmation() {
        let (mut registry, mut buffers) = setup(
            JobKind::Compare3,
            &[(Variant::A, "1\n"), (Variant::B, "2\n"), (Variant::C, "3\n")],
        );
        let mut engine = CopyEngine::new(&mut registry, &mut buffers);
        engine.copy(0, Variant::A, Variant::C, false).unwrap();
        assert_eq!(
            engine.copy(0, Variant::B, Variant::C, false),
            Err(CopyError::ConfirmationRequired { index: 0, variant: Variant::C })
        );
        assert_eq!(engine.copy(0, Variant::B, Variant::C, true), Ok(CopyOutcome::Applied));
        engine.restore(0, Variant::C).unwrap();
        drop(engine);
        // The confirmed copy replaced the first saved entry
        assert_eq!(text_of(&buffers, Variant::C), "1\n");
    }

    #[test]
    fn test_three_way_restore_brings_back_diff_state() {
        let (mut registry, mut buffers) = setup(
            JobKind::Compare3,
            &[(Variant::A, "1\n"), (Variant::B, "2\n"), (Variant::C, "3\n")],
        );
        assert_eq!(registry.records()[0].diff_state(), DiffState::AllDiffer);
        let mut engine = CopyEngine::new(&mut registry, &mut buffers);
        engine.copy(0, Variant::A, Variant::B, false).unwrap();
        drop(engine);
        assert_eq!(registry.records()[0].diff_state(), DiffState::Odd(Variant::C));

        CopyEngine::new(&mut registry, &mut buffers).restore(0, Variant::B).unwrap();
        assert_eq!(registry.records()[0].diff_state(), DiffState::AllDiffer);
    }

    #[test]
    fn test_read_only_target_is_unwritable_and_leaves_no_entry() {
        let (mut registry, mut buffers) =
            setup(JobKind::Compare2, &[(Variant::A, "a\n"), (Variant::B, "b\n")]);
        buffers.get_mut(Variant::B).unwrap().set_read_only(true);
        let result = CopyEngine::new(&mut registry, &mut buffers).copy(0, Variant::A, Variant::B, false);
        assert!(matches!(result, Err(CopyError::TargetUnwritable(Variant::B, _))));
        assert!(registry.undo.is_empty());
        assert_eq!(text_of(&buffers, Variant::B), "b\n");
    }

    #[test]
    fn test_restore_without_entry() {
        let (mut registry, mut buffers) =
            setup(JobKind::Compare2, &[(Variant::A, "a\n"), (Variant::B, "b\n")]);
        assert_eq!(
            CopyEngine::new(&mut registry, &mut buffers).restore(0, Variant::A),
            Err(RestoreError::NothingSaved { index: 0, variant: Variant::A })
        );
    }

    /// Buffer refusing edits that touch one byte range
    struct Guarded {
        inner: MemoryBuffer,
        locked: Range<usize>,
    }

    impl VariantBuffer for Guarded {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn text(&self) -> &str {
            self.inner.text()
        }
        fn replace(&mut self, range: Range<usize>, text: &str) -> Result<(), BufferError> {
            if range.start < self.locked.end && self.locked.start < range.end {
                return Err(BufferError::ReadOnly(self.name().to_string()));
            }
            self.inner.replace(range, text)
        }
        fn is_read_only(&self) -> bool {
            false
        }
        fn set_read_only(&mut self, read_only: bool) {
            self.inner.set_read_only(read_only);
        }
        fn is_modified(&self) -> bool {
            self.inner.is_modified()
        }
        fn revision(&self) -> u64 {
            self.inner.revision()
        }
        fn snapshot(&self) -> ProtectedVariables {
            self.inner.snapshot()
        }
        fn restore(&mut self, saved: ProtectedVariables) {
            self.inner.restore(saved);
        }
    }

    #[test]
    fn test_copy_all_skips_equal_regions_and_survives_failures() {
        let a = "1\nA\n1\nA\n1\nA\n1\nA\n1\nA\n1\n";
        let b = "1\nB\n1\nB\n1\nB\n1\nB\n1\nB\n1\n";
        let (mut registry, mut buffers) = setup(JobKind::Compare2, &[(Variant::A, a), (Variant::B, b)]);
        assert_eq!(registry.len(), 5);

        // Regions 2 and 4 already agree
        let mut engine = CopyEngine::new(&mut registry, &mut buffers);
        engine.copy(1, Variant::A, Variant::B, false).unwrap();
        engine.copy(3, Variant::A, Variant::B, false).unwrap();
        drop(engine);
        registry.undo.clear();

        let report = CopyEngine::new(&mut registry, &mut buffers).copy_all(Variant::A, Variant::B);
        assert_eq!(report.applied, vec![0, 2, 4]);
        assert_eq!(report.unchanged, vec![1, 3]);
        assert!(report.is_clean());
        assert_eq!(registry.undo.len(), 3);
        assert_eq!(text_of(&buffers, Variant::B), a);

        // Same batch with region 3 locked in B
        let (mut registry, mut buffers) = setup(JobKind::Compare2, &[(Variant::A, a), (Variant::B, b)]);
        let locked = registry.get(2, Variant::B).unwrap().range();
        buffers.insert(
            Variant::B,
            Box::new(Guarded { inner: MemoryBuffer::new("b", b), locked }),
        );
        let report = CopyEngine::new(&mut registry, &mut buffers).copy_all(Variant::A, Variant::B);
        assert_eq!(report.applied, vec![0, 1, 3, 4]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0], (2, CopyError::TargetUnwritable(Variant::B, _))));
        assert_eq!(registry.undo.len(), 4);
    }
}
