//! Position intervals inside one variant's text

use crate::variant::Variant;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Half-open byte interval `[begin, end)` in one variant's text.
///
/// A span owns no text. An empty span marks an insertion or deletion point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub begin: usize,
    pub end: usize,
    pub variant: Variant,
}

impl Span {
    pub fn new(variant: Variant, begin: usize, end: usize) -> Self {
        debug_assert!(begin <= end, "span begins after it ends");
        Self {
            begin,
            end: end.max(begin),
            variant,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    /// True when `pos` lies inside the span or on one of its edges
    pub fn touches(&self, pos: usize) -> bool {
        self.begin <= pos && pos <= self.end
    }

    /// True when `other` lies completely inside this span
    pub fn covers(&self, other: &Span) -> bool {
        self.begin <= other.begin && other.end <= self.end
    }

    pub(crate) fn shifted(&self, delta: isize) -> Span {
        Span::new(
            self.variant,
            offset(self.begin, delta),
            offset(self.end, delta),
        )
    }

    /// Move the span across an edit that replaced `edited` with `new_len` bytes.
    ///
    /// Text inserted exactly at a boundary belongs to whatever follows it, so an
    /// insertion at `begin` grows the span while one at `end` does not.
    pub(crate) fn adjust_for_edit(&mut self, edited: &Range<usize>, new_len: usize) {
        self.begin = adjust_position(self.begin, edited, new_len, false);
        self.end = adjust_position(self.end, edited, new_len, true).max(self.begin);
    }
}

fn offset(pos: usize, delta: isize) -> usize {
    if delta >= 0 {
        pos + delta as usize
    } else {
        pos.saturating_sub(delta.unsigned_abs())
    }
}

fn adjust_position(pos: usize, edited: &Range<usize>, new_len: usize, is_end: bool) -> usize {
    let removed = edited.end - edited.start;
    if pos <= edited.start {
        return pos;
    }
    if pos >= edited.end {
        return pos - removed + new_len;
    }
    // Inside the replaced text
    if is_end {
        edited.start + new_len
    } else {
        edited.start
    }
}

/// 0-based, end-exclusive line interval as reported by a diff backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    /// Empty range positioned before line `at`
    pub fn empty(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(begin: usize, end: usize) -> Span {
        Span::new(Variant::A, begin, end)
    }

    #[test]
    fn test_edit_before_span_shifts_it() {
        let mut s = span(10, 20);
        s.adjust_for_edit(&(2..4), 5);
        assert_eq!((s.begin, s.end), (13, 23));
    }

    #[test]
    fn test_edit_after_span_leaves_it() {
        let mut s = span(10, 20);
        s.adjust_for_edit(&(25..30), 0);
        assert_eq!((s.begin, s.end), (10, 20));
    }

    #[test]
    fn test_edit_inside_span_resizes_it() {
        let mut s = span(10, 20);
        s.adjust_for_edit(&(12..15), 10);
        assert_eq!((s.begin, s.end), (10, 27));
    }

    #[test]
    fn test_insertion_at_boundaries() {
        let mut s = span(10, 20);
        s.adjust_for_edit(&(10..10), 3);
        assert_eq!((s.begin, s.end), (10, 23));

        let mut s = span(10, 20);
        s.adjust_for_edit(&(20..20), 3);
        assert_eq!((s.begin, s.end), (10, 20));

        let mut s = span(5, 12);
        s.adjust_for_edit(&(12..15), 1);
        assert_eq!((s.begin, s.end), (5, 12));
    }

    #[test]
    fn test_edit_swallowing_span_collapses_it() {
        let mut s = span(10, 20);
        s.adjust_for_edit(&(5..25), 2);
        assert_eq!((s.begin, s.end), (5, 7));
    }

    #[test]
    fn test_touches_and_covers() {
        let s = span(10, 20);
        assert!(s.touches(10));
        assert!(s.touches(20));
        assert!(!s.touches(21));
        assert!(s.covers(&span(12, 20)));
        assert!(!s.covers(&span(9, 12)));
    }
}
