//! Synchronized scrolling of variant panes

use crate::registry::DiffRecord;
use crate::variant::{Variant, VariantMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrollDirection {
    /// Toward the end of the text
    Forward,
    Backward,
}

/// Lines a variant's pane currently shows, 0-based and inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub top_line: usize,
    pub bottom_line: usize,
    pub visible: bool,
}

impl Viewport {
    pub fn new(top_line: usize, bottom_line: usize) -> Self {
        Self {
            top_line,
            bottom_line: bottom_line.max(top_line),
            visible: true,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn height(&self) -> usize {
        self.bottom_line - self.top_line + 1
    }
}

/// Line numbers a region covers in one variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLines {
    pub start: usize,
    pub end: usize,
}

/// Pure scroll-coefficient math over the current region
#[derive(Debug, Clone, Default)]
pub struct ScrollSynchronizer {
    viewports: VariantMap<Viewport>,
    region: VariantMap<RegionLines>,
}

impl ScrollSynchronizer {
    /// `region` is the current region's line extent per variant, or empty
    /// when no region is selected
    pub fn new(viewports: VariantMap<Viewport>, region: VariantMap<RegionLines>) -> Self {
        Self { viewports, region }
    }

    /// Region line extents of `record`, given a line lookup per variant
    pub fn region_lines<F>(record: &DiffRecord, mut line_of: F) -> VariantMap<RegionLines>
    where
        F: FnMut(Variant, usize) -> usize,
    {
        record
            .spans()
            .iter()
            .map(|(variant, span)| {
                (
                    variant,
                    RegionLines {
                        start: line_of(variant, span.begin),
                        end: line_of(variant, span.end),
                    },
                )
            })
            .collect()
    }

    fn distance(&self, variant: Variant, op: ScrollDirection) -> Option<usize> {
        let view = self.viewports.get(variant)?;
        let region = self.region.get(variant)?;
        Some(match op {
            ScrollDirection::Forward => region.end.saturating_sub(view.top_line),
            ScrollDirection::Backward => view.bottom_line.saturating_sub(region.start),
        })
    }

    /// Scale for `variant`'s scroll amount: its own distance to the region
    /// edge over the largest distance among visible panes
    pub fn coefficient(&self, variant: Variant, op: ScrollDirection) -> f64 {
        if self.region.is_empty() {
            return 1.0;
        }
        let max = self
            .viewports
            .iter()
            .filter(|(_, view)| view.visible)
            .filter_map(|(v, _)| self.distance(v, op))
            .max()
            .unwrap_or(0);
        if max == 0 {
            return 1.0;
        }
        match self.distance(variant, op) {
            Some(own) => own as f64 / max as f64,
            None => 1.0,
        }
    }

    /// Half the smallest visible pane, less one line, at least one
    pub fn default_amount(&self) -> usize {
        let min_height = self
            .viewports
            .iter()
            .filter(|(_, view)| view.visible)
            .map(|(_, view)| view.height())
            .min()
            .unwrap_or(2);
        (min_height / 2).saturating_sub(1).max(1)
    }

    /// Lines each visible pane scrolls for a requested `amount`
    pub fn scroll_amounts(&self, op: ScrollDirection, amount: Option<usize>) -> VariantMap<usize> {
        let amount = amount.unwrap_or_else(|| self.default_amount());
        self.viewports
            .iter()
            .filter(|(_, view)| view.visible)
            .map(|(variant, _)| {
                let scaled = (amount as f64 * self.coefficient(variant, op)).round();
                (variant, scaled as usize)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync(views: &[(Variant, Viewport)], region: &[(Variant, usize, usize)]) -> ScrollSynchronizer {
        ScrollSynchronizer::new(
            views.iter().copied().collect(),
            region
                .iter()
                .map(|&(v, start, end)| (v, RegionLines { start, end }))
                .collect(),
        )
    }

    #[test]
    fn test_forward_coefficient_scales_by_distance() {
        let s = sync(
            &[(Variant::A, Viewport::new(0, 39)), (Variant::B, Viewport::new(0, 39))],
            &[(Variant::A, 10, 50), (Variant::B, 10, 25)],
        );
        assert_eq!(s.coefficient(Variant::A, ScrollDirection::Forward), 1.0);
        assert_eq!(s.coefficient(Variant::B, ScrollDirection::Forward), 0.5);
        let amounts = s.scroll_amounts(ScrollDirection::Forward, Some(10));
        assert_eq!(amounts.get(Variant::A), Some(&10));
        assert_eq!(amounts.get(Variant::B), Some(&5));
    }

    #[test]
    fn test_region_above_view_gives_zero_distance() {
        let s = sync(
            &[(Variant::A, Viewport::new(30, 50)), (Variant::B, Viewport::new(0, 20))],
            &[(Variant::A, 5, 10), (Variant::B, 5, 10)],
        );
        assert_eq!(s.coefficient(Variant::A, ScrollDirection::Forward), 0.0);
        assert_eq!(s.coefficient(Variant::B, ScrollDirection::Forward), 1.0);
    }

    #[test]
    fn test_backward_uses_region_start_to_bottom() {
        let s = sync(
            &[(Variant::A, Viewport::new(0, 40)), (Variant::B, Viewport::new(0, 40))],
            &[(Variant::A, 20, 22), (Variant::B, 30, 31)],
        );
        assert_eq!(s.coefficient(Variant::A, ScrollDirection::Backward), 1.0);
        assert_eq!(s.coefficient(Variant::B, ScrollDirection::Backward), 0.5);
    }

    #[test]
    fn test_no_region_or_zero_max_is_neutral() {
        let views = [(Variant::A, Viewport::new(0, 9)), (Variant::B, Viewport::new(0, 9))];
        let s = sync(&views, &[]);
        assert_eq!(s.coefficient(Variant::B, ScrollDirection::Forward), 1.0);

        let s = sync(&views, &[(Variant::A, 0, 0), (Variant::B, 0, 0)]);
        assert_eq!(s.coefficient(Variant::A, ScrollDirection::Forward), 1.0);
    }

    #[test]
    fn test_hidden_panes_are_ignored() {
        let s = sync(
            &[
                (Variant::A, Viewport::new(0, 9)),
                (Variant::B, Viewport::new(0, 9)),
                (Variant::Ancestor, Viewport::new(0, 3).hidden()),
            ],
            &[(Variant::A, 0, 4), (Variant::B, 0, 8), (Variant::Ancestor, 0, 80)],
        );
        assert_eq!(s.coefficient(Variant::A, ScrollDirection::Forward), 0.5);
        assert_eq!(s.default_amount(), 4);
        assert!(s.scroll_amounts(ScrollDirection::Forward, None).get(Variant::Ancestor).is_none());
    }
}
