//! Merge states and result assembly

use crate::buffer::Buffers;
use crate::copy::CopyError;
use crate::options::{CombinationMarkers, DefaultVariant};
use crate::registry::{DiffRecord, DiffRegistry, RegistryError};
use crate::span::Span;
use crate::variant::Variant;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Where a merge region's result content comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeState {
    /// A, because A is the default variant
    DefaultA,
    /// B, because B is the default variant
    DefaultB,
    /// A, because only A changed the ancestor
    PreferA,
    /// B, because only B changed the ancestor
    PreferB,
    Combined,
    /// Both sides changed the ancestor differently
    Conflict,
    A,
    B,
    Ancestor,
    /// Result matches none of the variants
    Edited,
}

impl MergeState {
    pub fn for_default(default: DefaultVariant) -> MergeState {
        match default {
            DefaultVariant::A => MergeState::DefaultA,
            DefaultVariant::B => MergeState::DefaultB,
            DefaultVariant::Combined => MergeState::Combined,
        }
    }

    /// State a user copy from `variant` into the result leaves behind
    pub fn for_copy(variant: Variant) -> Option<MergeState> {
        match variant {
            Variant::A => Some(MergeState::A),
            Variant::B => Some(MergeState::B),
            Variant::Ancestor => Some(MergeState::Ancestor),
            Variant::C => None,
        }
    }

    /// Variant the result content mirrors, when it mirrors a single one
    pub fn source(self) -> Option<Variant> {
        match self {
            MergeState::DefaultA | MergeState::PreferA | MergeState::A => Some(Variant::A),
            MergeState::DefaultB | MergeState::PreferB | MergeState::B => Some(Variant::B),
            MergeState::Ancestor => Some(Variant::Ancestor),
            MergeState::Combined | MergeState::Conflict | MergeState::Edited => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MergeState::DefaultA => "default-A",
            MergeState::DefaultB => "default-B",
            MergeState::PreferA => "prefer-A",
            MergeState::PreferB => "prefer-B",
            MergeState::Combined => "combined",
            MergeState::Conflict => "conflict",
            MergeState::A => "A",
            MergeState::B => "B",
            MergeState::Ancestor => "Ancestor",
            MergeState::Edited => "edited",
        }
    }
}

/// Region contents of the merge inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTexts {
    pub a: String,
    pub b: String,
    pub ancestor: Option<String>,
}

impl RegionTexts {
    pub fn read(
        registry: &DiffRegistry,
        n: usize,
        buffers: &Buffers,
    ) -> Result<RegionTexts, RegistryError> {
        let ancestor = if registry.job().has_ancestor() {
            Some(registry.content(n, Variant::Ancestor, buffers)?)
        } else {
            None
        };
        Ok(RegionTexts {
            a: registry.content(n, Variant::A, buffers)?,
            b: registry.content(n, Variant::B, buffers)?,
            ancestor,
        })
    }

    /// Starting state of a region and whether it clashes
    pub fn initial_state(&self, default: DefaultVariant) -> (MergeState, bool) {
        let Some(ancestor) = &self.ancestor else {
            return (MergeState::for_default(default), false);
        };
        let a_changed = self.a != *ancestor;
        let b_changed = self.b != *ancestor;
        match (a_changed, b_changed) {
            (false, true) => (MergeState::PreferB, false),
            (true, false) => (MergeState::PreferA, false),
            (true, true) if self.a == self.b => (MergeState::PreferA, false),
            (true, true) => (MergeState::Conflict, true),
            (false, false) => (MergeState::for_default(default), false),
        }
    }

    /// Result content for `state`; `None` for an edited region
    pub fn content_for(
        &self,
        state: MergeState,
        default: DefaultVariant,
        markers: &CombinationMarkers,
    ) -> Option<String> {
        match state {
            MergeState::Combined => Some(self.combined(markers)),
            MergeState::Conflict => match default.variant() {
                Some(variant) => self.get(variant).map(str::to_string),
                None => Some(self.combined(markers)),
            },
            MergeState::Edited => None,
            other => other
                .source()
                .and_then(|variant| self.get(variant))
                .map(str::to_string),
        }
    }

    fn get(&self, variant: Variant) -> Option<&str> {
        match variant {
            Variant::A => Some(&self.a),
            Variant::B => Some(&self.b),
            Variant::Ancestor => self.ancestor.as_deref(),
            Variant::C => None,
        }
    }

    /// Both sides, framed by the combination markers
    pub fn combined(&self, markers: &CombinationMarkers) -> String {
        let mut out = String::new();
        push_section(&mut out, &markers.a, &self.a);
        push_section(&mut out, &markers.b, &self.b);
        if let Some(ancestor) = &self.ancestor {
            push_section(&mut out, &markers.ancestor, ancestor);
        }
        out.push_str(&markers.end);
        out.push('\n');
        out
    }

    /// State that explains `result` after a rebuild
    pub fn infer_state(
        &self,
        result: &str,
        default: DefaultVariant,
        markers: &CombinationMarkers,
    ) -> (MergeState, bool) {
        let (initial, clash) = self.initial_state(default);
        if self.content_for(initial, default, markers).as_deref() == Some(result) {
            return (initial, clash);
        }
        let state = if result == self.a {
            MergeState::A
        } else if result == self.b {
            MergeState::B
        } else if self.ancestor.as_deref() == Some(result) {
            MergeState::Ancestor
        } else if result == self.combined(markers) {
            MergeState::Combined
        } else {
            MergeState::Edited
        };
        (state, clash)
    }
}

fn push_section(out: &mut String, marker: &str, body: &str) {
    out.push_str(marker);
    out.push('\n');
    out.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        out.push('\n');
    }
}

/// Assign initial merge states and build the result text.
///
/// Text between regions comes from A (`a_text[a_range]`); each region
/// contributes the content for its state. C spans are set on every record,
/// relative to the start of the returned text.
pub fn assemble(
    records: &mut [DiffRecord],
    texts: &[RegionTexts],
    a_text: &str,
    a_range: Range<usize>,
    default: DefaultVariant,
    markers: &CombinationMarkers,
) -> String {
    let mut result = String::with_capacity(a_range.len());
    let mut cursor = a_range.start;

    for (record, region) in records.iter_mut().zip(texts) {
        let Some(span) = record.span(Variant::A).copied() else {
            continue;
        };
        result.push_str(a_text.get(cursor..span.begin).unwrap_or_default());
        cursor = span.end;

        let (state, clash) = region.initial_state(default);
        let content = region
            .content_for(state, default, markers)
            .unwrap_or_else(|| region.a.clone());
        let begin = result.len();
        result.push_str(&content);
        record.set_span(Span::new(Variant::C, begin, result.len()));
        record.merge_state = Some(state);
        record.default_state = Some(state);
        record.clash = clash;
    }
    result.push_str(a_text.get(cursor..a_range.end).unwrap_or_default());
    result
}

/// Region still carrying the content its default state gives it
pub fn is_default(record: &DiffRecord) -> bool {
    match record.merge_state {
        Some(MergeState::DefaultA | MergeState::DefaultB | MergeState::Conflict) => true,
        Some(MergeState::Combined) => record.default_state == Some(MergeState::Combined),
        _ => false,
    }
}

/// Result content of region `n` differs from what its default state gives
pub fn changed_from_default(
    registry: &DiffRegistry,
    n: usize,
    buffers: &Buffers,
    default: DefaultVariant,
    markers: &CombinationMarkers,
) -> Result<bool, RegistryError> {
    let record = registry.record(n)?;
    let Some(state) = record.default_state else {
        return Ok(false);
    };
    let texts = RegionTexts::read(registry, n, buffers)?;
    let result = registry.content(n, Variant::C, buffers)?;
    Ok(texts.content_for(state, default, markers).as_deref() != Some(result.as_str()))
}

/// Re-merge every region still in a default state for a new default variant.
///
/// No undo entries are made. Returns the number of regions rewritten.
pub fn remerge(
    registry: &mut DiffRegistry,
    buffers: &mut Buffers,
    default: DefaultVariant,
    markers: &CombinationMarkers,
) -> Result<usize, CopyError> {
    let mut rewritten = 0;
    for n in 0..registry.len() {
        let record = registry.record(n)?;
        if !is_default(record) {
            continue;
        }
        let conflict = record.merge_state == Some(MergeState::Conflict);
        let state = if conflict {
            MergeState::Conflict
        } else {
            MergeState::for_default(default)
        };

        let texts = RegionTexts::read(registry, n, buffers)?;
        let Some(content) = texts.content_for(state, default, markers) else {
            continue;
        };
        let current = registry.content(n, Variant::C, buffers)?;
        if current != content {
            let span = registry.get(n, Variant::C)?;
            let target = buffers.get_mut(Variant::C)?;
            target
                .replace(span.range(), &content)
                .map_err(|e| CopyError::TargetUnwritable(Variant::C, e))?;
            let revision = target.revision();
            registry.replace_span(n, Variant::C, content.len());
            registry.observe(Variant::C, revision);
            rewritten += 1;
        }

        let record = registry.record_mut(n)?;
        record.merge_state = Some(state);
        if !conflict {
            record.default_state = Some(state);
        }
        record.fine = None;
    }
    log::debug!("re-merged {rewritten} regions for default {default:?}");
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(a: &str, b: &str, ancestor: Option<&str>) -> RegionTexts {
        RegionTexts {
            a: a.to_string(),
            b: b.to_string(),
            ancestor: ancestor.map(str::to_string),
        }
    }

    #[test]
    fn test_initial_state_without_ancestor_follows_default() {
        let region = texts("x\n", "y\n", None);
        assert_eq!(region.initial_state(DefaultVariant::B), (MergeState::DefaultB, false));
        assert_eq!(
            region.initial_state(DefaultVariant::Combined),
            (MergeState::Combined, false)
        );
    }

    #[test]
    fn test_initial_state_with_ancestor() {
        let d = DefaultVariant::A;
        assert_eq!(
            texts("o\n", "b\n", Some("o\n")).initial_state(d),
            (MergeState::PreferB, false)
        );
        assert_eq!(
            texts("a\n", "o\n", Some("o\n")).initial_state(d),
            (MergeState::PreferA, false)
        );
        assert_eq!(
            texts("s\n", "s\n", Some("o\n")).initial_state(d),
            (MergeState::PreferA, false)
        );
        assert_eq!(
            texts("a\n", "b\n", Some("o\n")).initial_state(d),
            (MergeState::Conflict, true)
        );
    }

    #[test]
    fn test_combined_content_uses_markers() {
        let markers = CombinationMarkers::default();
        let region = texts("left\n", "right", Some("base\n"));
        assert_eq!(
            region.combined(&markers),
            "<<<<<<< variant A\nleft\n>>>>>>> variant B\nright\n####### Ancestor\nbase\n======= end\n"
        );
        let plain = texts("l\n", "r\n", None);
        assert!(!plain.combined(&markers).contains("Ancestor"));
    }

    #[test]
    fn test_conflict_content_follows_default() {
        let markers = CombinationMarkers::default();
        let region = texts("a\n", "b\n", Some("o\n"));
        assert_eq!(
            region.content_for(MergeState::Conflict, DefaultVariant::B, &markers),
            Some("b\n".to_string())
        );
        assert_eq!(
            region.content_for(MergeState::Edited, DefaultVariant::A, &markers),
            None
        );
    }

    #[test]
    fn test_infer_state_after_edit() {
        let markers = CombinationMarkers::default();
        let region = texts("a\n", "b\n", None);
        let d = DefaultVariant::A;
        assert_eq!(region.infer_state("a\n", d, &markers).0, MergeState::DefaultA);
        assert_eq!(region.infer_state("b\n", d, &markers).0, MergeState::B);
        assert_eq!(region.infer_state("zzz\n", d, &markers).0, MergeState::Edited);
    }

    #[test]
    fn test_assemble_builds_result_from_a_and_states() {
        use crate::diff::BuiltinDiff;
        use crate::registry::VariantText;
        use crate::variant::JobKind;

        let a = "keep\nmine\nkeep\n";
        let b = "keep\ntheirs\nkeep\n";
        let mut registry = DiffRegistry::build(
            JobKind::Merge,
            &[
                VariantText { variant: Variant::A, text: a, offset: 0 },
                VariantText { variant: Variant::B, text: b, offset: 0 },
            ],
            &mut BuiltinDiff::new(),
        )
        .unwrap();
        let region = texts("mine\n", "theirs\n", None);
        let result = assemble(
            registry.records_mut(),
            &[region],
            a,
            0..a.len(),
            DefaultVariant::B,
            &CombinationMarkers::default(),
        );
        assert_eq!(result, "keep\ntheirs\nkeep\n");
        let span = registry.get(0, Variant::C).unwrap();
        assert_eq!(&result[span.range()], "theirs\n");
        assert_eq!(registry.records()[0].merge_state(), Some(MergeState::DefaultB));
    }
}
