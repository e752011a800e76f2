use super::{LifecycleState, Session, Visibility};
use crate::filter::{Connective, FilterMode};
use crate::merge::MergeState;
use crate::options::{AutoRefine, DefaultVariant};
use crate::registry::{DiffRecord, DiffState};
use crate::variant::{JobKind, Variant};
use serde::{Deserialize, Serialize};

/// Lines a region covers in one variant (1-based first line)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub variant: Variant,
    pub first_line: usize,
    pub line_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSummary {
    /// 1-based region number
    pub number: usize,
    pub lines: Vec<LineSpan>,
    pub diff_state: DiffState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_state: Option<MergeState>,
    pub clash: bool,
    pub refined: bool,
    /// Variants with a saved copy to restore
    pub saved: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub mode: FilterMode,
    pub connective: Connective,
    pub patterns: Vec<(Variant, String)>,
}

/// Serializable snapshot of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub name: String,
    pub job: JobKind,
    pub lifecycle: LifecycleState,
    /// 1-based selected region
    pub current: Option<usize>,
    pub regions: usize,
    pub visibility: Visibility,
    pub auto_refine: AutoRefine,
    pub ignore_similar_regions: bool,
    pub show_clashes_only: bool,
    pub skip_changed_regions: bool,
    pub show_ancestor: bool,
    pub default_variant: DefaultVariant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSummary>,
    pub summaries: Vec<RegionSummary>,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        let filter = self.filter.as_ref().map(|f| FilterSummary {
            mode: f.mode(),
            connective: f.connective(),
            patterns: f
                .variants()
                .into_iter()
                .filter_map(|v| f.pattern(v).map(|p| (v, p.to_string())))
                .collect(),
        });
        SessionStatus {
            name: self.name.clone(),
            job: self.job,
            lifecycle: self.state,
            current: self.current_region().map(|n| n + 1),
            regions: self.registry.len(),
            visibility: self.visibility,
            auto_refine: self.options.auto_refine,
            ignore_similar_regions: self.options.ignore_similar_regions,
            show_clashes_only: self.options.show_clashes_only,
            skip_changed_regions: self.options.skip_changed_regions,
            show_ancestor: self.options.show_ancestor,
            default_variant: self.options.default_variant,
            filter,
            summaries: self
                .registry
                .records()
                .iter()
                .map(|record| self.summarize(record))
                .collect(),
        }
    }

    /// Summary of region `n` (internal index)
    pub fn region_summary(&self, n: usize) -> Option<RegionSummary> {
        self.registry.record(n).ok().map(|record| self.summarize(record))
    }

    fn summarize(&self, record: &DiffRecord) -> RegionSummary {
        let lines = record
            .spans()
            .iter()
            .filter_map(|(variant, span)| {
                let buffer = self.buffers.get(variant).ok()?;
                let first = buffer.line_of(span.begin);
                let end = if span.is_empty() {
                    first
                } else {
                    buffer.line_of(span.end - 1) + 1
                };
                Some(LineSpan {
                    variant,
                    first_line: first + 1,
                    line_count: end - first,
                })
            })
            .collect();
        RegionSummary {
            number: record.index() + 1,
            lines,
            diff_state: record.diff_state(),
            merge_state: record.merge_state(),
            clash: record.is_clash(),
            refined: record.fine().is_some(),
            saved: self.registry.undo.saved_variants(record.index()),
        }
    }
}
