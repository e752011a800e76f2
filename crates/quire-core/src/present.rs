//! Presentation hooks a host implements to paint regions

use crate::span::Span;
use crate::variant::Variant;
use std::ops::Range;

/// Receives highlighting and window requests from a session.
///
/// Every method defaults to doing nothing, so hosts implement only what
/// they can show.
pub trait Presenter {
    /// Paint region `index` in one variant; `current` marks the selection
    fn highlight(&mut self, _index: usize, _span: &Span, _current: bool) {}

    fn unhighlight(&mut self, _index: usize, _span: &Span) {}

    /// Word-level ranges (absolute offsets) of a refined region; empty
    /// removes earlier fine highlighting
    fn highlight_fine(&mut self, _index: usize, _variant: Variant, _ranges: &[Range<usize>]) {}

    /// Bring `span` into view in the pane showing `variant`
    fn recenter(&mut self, _variant: Variant, _span: &Span) {}

    fn hide(&mut self) {}

    fn show(&mut self) {}
}

/// Presenter for headless sessions
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresenter;

impl Presenter for NoopPresenter {}
