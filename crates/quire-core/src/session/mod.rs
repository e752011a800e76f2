//! Comparison and merge sessions
//!
//! A [`Session`] owns the variant buffers, the region registry and the
//! collaborators for one job, and runs the lifecycle
//! `Setup -> Active <-> Suspended -> Quitting -> Closed`.

mod quit;
mod status;

pub use quit::{FileMergeStore, MergeStore, QuitOptions, QuitReport};
pub use status::{FilterSummary, LineSpan, RegionSummary, SessionStatus};

use crate::buffer::{BufferError, Buffers, MemoryBuffer, ProtectedVariables, VariantBuffer};
use crate::copy::{CopyEngine, CopyError, CopyOutcome, CopyReport, RestoreError};
use crate::diff::{BuiltinDiff, DiffBackend, DiffToolError};
use crate::directory::{SessionDirectory, SessionId};
use crate::filter::RegexpFilter;
use crate::fine::{FineDiff, FineDiffEngine};
use crate::merge::{self, RegionTexts};
use crate::navigate::{Direction, LocateMode, Navigator, Step};
use crate::options::{AutoRefine, DefaultVariant, SessionOptions};
use crate::present::{NoopPresenter, Presenter};
use crate::registry::{DiffRegistry, RegistryError, VariantText};
use crate::scroll::{ScrollDirection, ScrollSynchronizer, Viewport};
use crate::span::Span;
use crate::variant::{JobKind, Variant, VariantMap};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    DiffTool(#[from] DiffToolError),
    #[error(transparent)]
    Copy(#[from] CopyError),
    #[error(transparent)]
    Restore(#[from] RestoreError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("session is closed")]
    SessionClosed,
    #[error("session is not active ({0:?})")]
    NotActive(LifecycleState),
    #[error("not possible in this job: {0}")]
    InvalidJob(String),
    #[error("this session has no narrow bounds")]
    NoNarrowBounds,
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
    #[error("failed to store merge result: {0}")]
    MergeStore(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Setup,
    Active,
    Suspended,
    Quitting,
    Closed,
}

/// Which bounds limit the compared text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Wide,
    Narrow,
}

/// Something that happened to a session, delivered to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Selection moved; indices are internal (`-1` and `len` are sentinels)
    Select { previous: isize, current: isize },
    Rebuild { regions: usize },
    Copy { index: usize, from: Variant, to: Variant },
    Restore { index: usize, variant: Variant },
    Suspend,
    Resume,
    Quit,
}

pub type Listener = Box<dyn FnMut(&SessionEvent)>;

/// Assembles the collaborators of a [`Session`]
pub struct SessionBuilder {
    job: JobKind,
    name: String,
    buffers: Buffers,
    backend: Option<Box<dyn DiffBackend>>,
    options: SessionOptions,
    presenter: Option<Box<dyn Presenter>>,
    narrow: VariantMap<Range<usize>>,
    directory: Option<Arc<SessionDirectory>>,
    listeners: Vec<Listener>,
}

impl SessionBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn variant(mut self, variant: Variant, buffer: Box<dyn VariantBuffer>) -> Self {
        self.buffers.insert(variant, buffer);
        self
    }

    /// Shorthand for an in-memory variant
    pub fn text(self, variant: Variant, text: impl Into<String>) -> Self {
        let name = variant.label().to_string();
        self.variant(variant, Box::new(MemoryBuffer::new(name, text)))
    }

    pub fn backend(mut self, backend: Box<dyn DiffBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn presenter(mut self, presenter: Box<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Compare only `range` of `variant` (region comparison jobs)
    pub fn narrow(mut self, variant: Variant, range: Range<usize>) -> Self {
        self.narrow.insert(variant, range);
        self
    }

    pub fn directory(mut self, directory: Arc<SessionDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Run setup: build the registry, assemble a merge result, and enter
    /// the active state
    pub fn start(self) -> Result<Session, SessionError> {
        let job = self.job;
        let mut buffers = self.buffers;

        if job.is_merge() && !buffers.contains(Variant::C) {
            buffers.insert(Variant::C, Box::new(MemoryBuffer::new("merge", "")));
        }
        for &variant in job.active_variants() {
            buffers.get(variant).map_err(|_| {
                SessionError::InvalidJob(format!("{job} needs variant {variant}"))
            })?;
        }

        let mut narrow = VariantMap::new();
        for (variant, range) in self.narrow.iter() {
            let buffer = buffers.get(variant)?;
            if range.start > range.end || range.end > buffer.len() {
                return Err(BufferError::OutOfBounds {
                    name: buffer.name().to_string(),
                    start: range.start,
                    end: range.end,
                    len: buffer.len(),
                }
                .into());
            }
            narrow.insert(variant, Span::new(variant, range.start, range.end));
        }

        let id = self
            .directory
            .as_ref()
            .map(|dir| dir.register(self.name.clone(), job));

        let protected: VariantMap<ProtectedVariables> = job
            .active_variants()
            .iter()
            .filter_map(|&v| buffers.get(v).ok().map(|b| (v, b.snapshot())))
            .collect();

        let mut session = Session {
            id,
            name: self.name,
            job,
            options: self.options.clone(),
            buffers,
            registry: DiffRegistry::empty(job),
            backend: self
                .backend
                .unwrap_or_else(|| Box::new(BuiltinDiff::new().with_options(self.options.diff))),
            presenter: self.presenter.unwrap_or_else(|| Box::new(NoopPresenter)),
            listeners: self.listeners,
            current: -1,
            narrow,
            visibility: Visibility::Wide,
            filter: None,
            state: LifecycleState::Setup,
            protected,
            directory: self.directory,
        };
        if !session.narrow.is_empty() {
            session.visibility = Visibility::Narrow;
        }

        if let Err(e) = session.setup() {
            session.backend.cleanup();
            if let (Some(dir), Some(id)) = (&session.directory, session.id) {
                dir.remove(id);
            }
            return Err(e);
        }
        Ok(session)
    }
}

/// One comparison or merge
pub struct Session {
    id: Option<SessionId>,
    name: String,
    job: JobKind,
    options: SessionOptions,
    buffers: Buffers,
    registry: DiffRegistry,
    backend: Box<dyn DiffBackend>,
    presenter: Box<dyn Presenter>,
    listeners: Vec<Listener>,
    current: isize,
    narrow: VariantMap<Span>,
    visibility: Visibility,
    filter: Option<RegexpFilter>,
    state: LifecycleState,
    protected: VariantMap<ProtectedVariables>,
    directory: Option<Arc<SessionDirectory>>,
}

impl Session {
    pub fn builder(job: JobKind) -> SessionBuilder {
        SessionBuilder {
            job,
            name: job.to_string(),
            buffers: Buffers::new(),
            backend: None,
            options: SessionOptions::default(),
            presenter: None,
            narrow: VariantMap::new(),
            directory: None,
            listeners: Vec::new(),
        }
    }

    fn setup(&mut self) -> Result<(), SessionError> {
        let registry = self.build_registry(self.job.setup_variants())?;
        self.registry = registry;

        if self.job.is_merge() {
            self.assemble_merge()?;
        }
        if self.job.has_ancestor() {
            self.buffers.get_mut(Variant::Ancestor)?.set_read_only(true);
        }
        self.observe_all();

        self.set_state(LifecycleState::Active);
        self.highlight_all();
        log::debug!(
            "session {:?} started: {} with {} regions",
            self.name,
            self.job,
            self.registry.len()
        );
        self.emit(SessionEvent::Rebuild {
            regions: self.registry.len(),
        });
        Ok(())
    }

    /// Text of `variant` inside its bounds, and the bounds' start
    fn bounded_text(&self, variant: Variant) -> Result<(String, usize), SessionError> {
        let buffer = self.buffers.get(variant)?;
        let range = match self.narrow.get(variant) {
            Some(span) => span.range(),
            None => 0..buffer.len(),
        };
        Ok((buffer.content(range.clone())?, range.start))
    }

    fn build_registry(&mut self, variants: &[Variant]) -> Result<DiffRegistry, SessionError> {
        let mut owned = Vec::with_capacity(variants.len());
        for &variant in variants {
            let (text, offset) = self.bounded_text(variant)?;
            owned.push((variant, text, offset));
        }
        let texts: Vec<VariantText<'_>> = owned
            .iter()
            .map(|(variant, text, offset)| VariantText {
                variant: *variant,
                text,
                offset: *offset,
            })
            .collect();
        Ok(DiffRegistry::build(self.job, &texts, self.backend.as_mut())?)
    }

    fn assemble_merge(&mut self) -> Result<(), SessionError> {
        let mut texts = Vec::with_capacity(self.registry.len());
        for n in 0..self.registry.len() {
            texts.push(RegionTexts::read(&self.registry, n, &self.buffers)?);
        }
        let a = self.buffers.get(Variant::A)?;
        let a_range = self.narrow.get(Variant::A).map_or(0..a.len(), Span::range);
        let a_text = a.text().to_string();
        let result = merge::assemble(
            self.registry.records_mut(),
            &texts,
            &a_text,
            a_range,
            self.options.default_variant,
            &self.options.combination,
        );

        let target = self.buffers.get_mut(Variant::C)?;
        let len = target.len();
        target.replace(0..len, &result)?;
        self.narrow.remove(Variant::C);
        if !self.narrow.is_empty() {
            self.narrow
                .insert(Variant::C, Span::new(Variant::C, 0, result.len()));
        }
        Ok(())
    }

    fn observe_all(&mut self) {
        for &variant in self.job.active_variants() {
            if let Ok(buffer) = self.buffers.get(variant) {
                let revision = buffer.revision();
                self.registry.observe(variant, revision);
            }
        }
    }

    fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
        if let (Some(dir), Some(id)) = (&self.directory, self.id) {
            dir.update(id, state);
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    pub fn subscribe(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.state {
            LifecycleState::Active => Ok(()),
            LifecycleState::Closed => Err(SessionError::SessionClosed),
            other => Err(SessionError::NotActive(other)),
        }
    }

    /// Fail when a variant is gone or was edited behind the session's back
    fn ensure_fresh(&self) -> Result<(), SessionError> {
        for &variant in self.job.active_variants() {
            let buffer = self.buffers.get(variant)?;
            self.registry.check_fresh(variant, buffer.revision())?;
        }
        Ok(())
    }

    fn current_index(&self) -> Result<usize, SessionError> {
        match self.current_region() {
            Some(n) => Ok(n),
            None if self.registry.is_empty() => Err(RegistryError::NoDifferences.into()),
            None => Err(RegistryError::BadDiffNumber {
                n: self.current + 1,
                len: self.registry.len(),
            }
            .into()),
        }
    }

    fn fine_engine(&self) -> FineDiffEngine {
        FineDiffEngine::new(self.options.auto_refine, self.options.auto_refine_limit)
    }

    pub fn id(&self) -> Option<SessionId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn job(&self) -> JobKind {
        self.job
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn registry(&self) -> &DiffRegistry {
        &self.registry
    }

    pub fn buffers(&self) -> &Buffers {
        &self.buffers
    }

    /// Text of `variant`
    pub fn text(&self, variant: Variant) -> Result<&str, SessionError> {
        Ok(self.buffers.get(variant)?.text())
    }

    /// Selected index, `-1` before the first region, `len` after the last
    pub fn current(&self) -> isize {
        self.current
    }

    pub fn current_region(&self) -> Option<usize> {
        usize::try_from(self.current)
            .ok()
            .filter(|&n| n < self.registry.len())
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn filter(&self) -> Option<&RegexpFilter> {
        self.filter.as_ref()
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Move `count` visible regions forward
    pub fn next(&mut self, count: usize) -> Result<Step, SessionError> {
        self.advance(Direction::Forward, count)
    }

    /// Move `count` visible regions backward
    pub fn previous(&mut self, count: usize) -> Result<Step, SessionError> {
        self.advance(Direction::Backward, count)
    }

    fn advance(&mut self, direction: Direction, count: usize) -> Result<Step, SessionError> {
        self.ensure_active()?;
        if self.registry.is_empty() {
            return Err(RegistryError::NoDifferences.into());
        }
        self.ensure_fresh()?;
        self.widen();
        let nav = Navigator::new(&self.registry);
        let step = nav.advance(self.current, direction, count, |n| self.should_skip(n));
        match step {
            Step::Moved(n) => self.select(n as isize),
            Step::AtBoundary => {
                let edge = nav.boundary(direction);
                if self.current != edge {
                    self.select(edge);
                }
            }
        }
        Ok(step)
    }

    /// Select region `n_user` (1-based; negative counts from the end, `0`
    /// clears the selection). Returns the new internal index.
    pub fn jump(&mut self, n_user: isize) -> Result<isize, SessionError> {
        self.ensure_active()?;
        self.ensure_fresh()?;
        let n = Navigator::new(&self.registry).jump(n_user)?;
        self.widen();
        self.select(n);
        Ok(n)
    }

    /// Select the region of `variant` at or near byte `pos`
    pub fn jump_to_point(
        &mut self,
        variant: Variant,
        pos: usize,
        mode: LocateMode,
    ) -> Result<isize, SessionError> {
        self.ensure_active()?;
        self.ensure_fresh()?;
        let text = self.buffers.get(variant)?.text();
        let n = Navigator::new(&self.registry).locate(&self.registry, variant, text, pos, mode)?;
        self.widen();
        self.select(n);
        Ok(n)
    }

    /// Composed skip predicate, in precedence order
    fn should_skip(&mut self, n: usize) -> bool {
        if let Some(filter) = &self.filter {
            let registry = &self.registry;
            let buffers = &self.buffers;
            let variants = filter_variants(self.job);
            if filter.skips(variants, |v| registry.content(n, v, buffers).ok()) {
                return true;
            }
        }

        if self.job.is_merge() {
            let clash = self.registry.record(n).map(|r| r.is_clash()).unwrap_or(false);
            if self.options.show_clashes_only && !clash {
                return true;
            }
            if self.options.skip_changed_regions {
                let changed = merge::changed_from_default(
                    &self.registry,
                    n,
                    &self.buffers,
                    self.options.default_variant,
                    &self.options.combination,
                );
                if changed.unwrap_or(false) {
                    return true;
                }
            }
        }

        if self.options.ignore_similar_regions && self.options.auto_refine != AutoRefine::Off {
            let engine = self.fine_engine();
            return engine
                .is_similar(&mut self.registry, n, &self.buffers)
                .unwrap_or(false);
        }
        false
    }

    /// Every navigation starts from the wide view
    fn widen(&mut self) {
        if self.visibility == Visibility::Narrow {
            log::debug!("navigation widens the view");
            self.visibility = Visibility::Wide;
        }
    }

    /// Move the selection to internal index `n` (sentinels allowed)
    fn select(&mut self, n: isize) {
        let previous = self.current;
        if let Some(old) = self.current_region() {
            self.paint(old, false);
        }
        self.current = n;

        if let Some(index) = self.current_region() {
            self.paint(index, true);
            self.auto_refine(index);
            let show_ancestor = self.options.show_ancestor;
            if let Ok(record) = self.registry.record(index) {
                for (variant, span) in record.spans().iter() {
                    if variant != Variant::Ancestor || show_ancestor {
                        self.presenter.recenter(variant, span);
                    }
                }
            }
        }
        log::debug!("selected {n} (was {previous})");
        self.emit(SessionEvent::Select {
            previous,
            current: n,
        });
    }

    fn paint(&mut self, index: usize, current: bool) {
        let show_ancestor = self.options.show_ancestor;
        if let Ok(record) = self.registry.record(index) {
            for (variant, span) in record.spans().iter() {
                if variant != Variant::Ancestor || show_ancestor {
                    self.presenter.highlight(index, span, current);
                }
            }
        }
    }

    fn highlight_all(&mut self) {
        for index in 0..self.registry.len() {
            let current = self.current_region() == Some(index);
            self.paint(index, current);
        }
    }

    fn unhighlight_all(&mut self) {
        for record in self.registry.records() {
            for (variant, span) in record.spans().iter() {
                self.presenter.unhighlight(record.index(), span);
                if record.fine().is_some() {
                    self.presenter.highlight_fine(record.index(), variant, &[]);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Fine differences
    // ------------------------------------------------------------------

    fn auto_refine(&mut self, index: usize) {
        let engine = self.fine_engine();
        let surfaced = match engine.auto(&mut self.registry, index, &self.buffers) {
            Ok(Some(fine)) if fine.is_surfaced() => Some(fine.clone()),
            Ok(_) => None,
            Err(e) => {
                log::debug!("cannot refine region {}: {e}", index + 1);
                None
            }
        };
        if let Some(fine) = surfaced {
            self.show_fine(index, &fine);
        }
    }

    fn show_fine(&mut self, index: usize, fine: &FineDiff) {
        let Ok(record) = self.registry.record(index) else {
            return;
        };
        for (variant, span) in record.spans().iter() {
            let ranges: Vec<Range<usize>> = fine
                .ranges_for(variant)
                .into_iter()
                .map(|r| span.begin + r.start..span.begin + r.end)
                .collect();
            self.presenter.highlight_fine(index, variant, &ranges);
        }
    }

    /// Refine the current region regardless of size, and show the result
    pub fn refine(&mut self) -> Result<FineDiff, SessionError> {
        self.ensure_active()?;
        self.ensure_fresh()?;
        let index = self.current_index()?;
        let fine = self
            .fine_engine()
            .refine(&mut self.registry, index, &self.buffers, true)?
            .clone();
        self.show_fine(index, &fine);
        Ok(fine)
    }

    /// Drop the current region's fine differences
    pub fn unrefine(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        let index = self.current_index()?;
        FineDiffEngine::clear(&mut self.registry, index)?;
        for &variant in self.job.refined_variants() {
            self.presenter.highlight_fine(index, variant, &[]);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Copy and restore
    // ------------------------------------------------------------------

    /// Copy the current region of `from` into `to`
    pub fn copy(&mut self, from: Variant, to: Variant, confirmed: bool) -> Result<CopyOutcome, SessionError> {
        self.ensure_active()?;
        self.ensure_fresh()?;
        let index = self.current_index()?;
        let before = self.registry.spans_for(to);
        let outcome = CopyEngine::new(&mut self.registry, &mut self.buffers)
            .copy(index, from, to, confirmed)?;
        if outcome == CopyOutcome::Applied {
            self.after_edit(to, &before);
            self.paint(index, true);
            self.emit(SessionEvent::Copy { index, from, to });
        }
        Ok(outcome)
    }

    /// Copy every region of `from` into `to`; individual failures are
    /// reported, not fatal
    pub fn copy_all(&mut self, from: Variant, to: Variant) -> Result<CopyReport, SessionError> {
        self.ensure_active()?;
        self.ensure_fresh()?;
        if from == to {
            return Err(CopyError::SameVariant.into());
        }
        let before = self.registry.spans_for(to);
        let report = CopyEngine::new(&mut self.registry, &mut self.buffers).copy_all(from, to);
        self.after_edit(to, &before);
        for &index in &report.applied {
            let current = self.current_region() == Some(index);
            self.paint(index, current);
            self.emit(SessionEvent::Copy { index, from, to });
        }
        Ok(report)
    }

    /// Put back what the last copy into the current region of `variant`
    /// overwrote
    pub fn restore(&mut self, variant: Variant) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.ensure_fresh()?;
        let index = self.current_index()?;
        let before = self.registry.spans_for(variant);
        CopyEngine::new(&mut self.registry, &mut self.buffers).restore(index, variant)?;
        self.after_edit(variant, &before);
        self.paint(index, true);
        self.emit(SessionEvent::Restore { index, variant });
        Ok(())
    }

    /// Write the combination of both sides into the current merge region
    pub fn combine(&mut self, confirmed: bool) -> Result<CopyOutcome, SessionError> {
        self.ensure_active()?;
        self.require_merge("combining regions")?;
        self.ensure_fresh()?;
        let index = self.current_index()?;
        let before = self.registry.spans_for(Variant::C);
        let outcome = CopyEngine::new(&mut self.registry, &mut self.buffers).combine(
            index,
            &self.options.combination,
            confirmed,
        )?;
        if outcome == CopyOutcome::Applied {
            self.after_edit(Variant::C, &before);
            self.paint(index, true);
            self.emit(SessionEvent::Copy {
                index,
                from: Variant::A,
                to: Variant::C,
            });
        }
        Ok(outcome)
    }

    /// Carry narrow bounds across region rewrites in `variant`; `before`
    /// holds that variant's spans prior to the change
    fn after_edit(&mut self, variant: Variant, before: &[Span]) {
        let Some(bound) = self.narrow.get(variant).copied() else {
            return;
        };
        let after = self.registry.spans_for(variant);
        let mut begin = bound.begin as isize;
        let mut end = bound.end as isize;
        for (old, new) in before.iter().zip(&after) {
            let delta = new.len() as isize - old.len() as isize;
            if delta == 0 {
                continue;
            }
            // Regions inside the bounds stretch them; earlier ones move them
            if old.end <= bound.begin && old.begin < bound.begin {
                begin += delta;
            }
            if old.begin <= bound.end {
                end += delta;
            }
        }
        self.narrow.insert(
            variant,
            Span::new(variant, begin.max(0) as usize, end.max(begin).max(0) as usize),
        );
    }

    // ------------------------------------------------------------------
    // Flags and filters
    // ------------------------------------------------------------------

    fn require_merge(&self, what: &str) -> Result<(), SessionError> {
        if self.job.is_merge() {
            Ok(())
        } else {
            Err(SessionError::InvalidJob(format!("{what} needs a merge job")))
        }
    }

    pub fn set_auto_refine(&mut self, mode: AutoRefine) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.options.auto_refine = mode;
        if mode == AutoRefine::On {
            if let Some(index) = self.current_region() {
                self.auto_refine(index);
            }
        }
        Ok(())
    }

    pub fn toggle_ignore_similar(&mut self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        self.options.ignore_similar_regions = !self.options.ignore_similar_regions;
        Ok(self.options.ignore_similar_regions)
    }

    pub fn toggle_show_clashes_only(&mut self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        if !self.job.has_ancestor() {
            return Err(SessionError::InvalidJob(
                "clashes exist only in merges with an ancestor".to_string(),
            ));
        }
        self.options.show_clashes_only = !self.options.show_clashes_only;
        Ok(self.options.show_clashes_only)
    }

    pub fn toggle_skip_changed_regions(&mut self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        self.require_merge("skipping changed regions")?;
        self.options.skip_changed_regions = !self.options.skip_changed_regions;
        Ok(self.options.skip_changed_regions)
    }

    pub fn toggle_show_ancestor(&mut self) -> Result<bool, SessionError> {
        self.ensure_active()?;
        if !self.job.has_ancestor() {
            return Err(SessionError::InvalidJob("this merge has no ancestor".to_string()));
        }
        self.options.show_ancestor = !self.options.show_ancestor;
        let current = self.current_region();
        for record in self.registry.records() {
            let Some(span) = record.span(Variant::Ancestor) else {
                continue;
            };
            let index = record.index();
            if self.options.show_ancestor {
                self.presenter.highlight(index, span, current == Some(index));
            } else {
                self.presenter.unhighlight(index, span);
            }
        }
        Ok(self.options.show_ancestor)
    }

    /// Install (or with `None` remove) the focus/hide filter
    pub fn set_regexp_filter(&mut self, filter: Option<RegexpFilter>) -> Result<(), SessionError> {
        self.ensure_active()?;
        if let Some(filter) = &filter {
            let allowed = filter_variants(self.job);
            if let Some(bad) = filter.variants().into_iter().find(|v| !allowed.contains(v)) {
                return Err(SessionError::InvalidJob(format!(
                    "variant {bad} cannot be filtered in a {}",
                    self.job
                )));
            }
        }
        self.filter = filter;
        Ok(())
    }

    pub fn toggle_visibility(&mut self) -> Result<Visibility, SessionError> {
        self.ensure_active()?;
        if self.narrow.is_empty() {
            return Err(SessionError::NoNarrowBounds);
        }
        self.visibility = match self.visibility {
            Visibility::Wide => Visibility::Narrow,
            Visibility::Narrow => Visibility::Wide,
        };
        Ok(self.visibility)
    }

    /// Narrow bound of `variant`, if the session has one
    pub fn narrow_bounds(&self, variant: Variant) -> Option<Span> {
        self.narrow.get(variant).copied()
    }

    /// Change the default variant and re-merge regions still at their default
    pub fn set_default_variant(&mut self, default: DefaultVariant) -> Result<usize, SessionError> {
        self.ensure_active()?;
        self.require_merge("a default variant")?;
        self.ensure_fresh()?;
        self.options.default_variant = default;
        let before = self.registry.spans_for(Variant::C);
        let rewritten = merge::remerge(
            &mut self.registry,
            &mut self.buffers,
            default,
            &self.options.combination,
        )?;
        self.after_edit(Variant::C, &before);
        self.highlight_all();
        Ok(rewritten)
    }

    // ------------------------------------------------------------------
    // Rebuild and host edits
    // ------------------------------------------------------------------

    /// Recompute every region from the current texts.
    ///
    /// On failure the old regions stay in place.
    pub fn recompute(&mut self) -> Result<usize, SessionError> {
        self.ensure_active()?;
        let mut registry = self.build_registry(self.job.rebuild_variants())?;

        if self.job.is_merge() {
            for n in 0..registry.len() {
                let texts = RegionTexts::read(&registry, n, &self.buffers)?;
                let result = registry.content(n, Variant::C, &self.buffers)?;
                let (initial, clash) = texts.initial_state(self.options.default_variant);
                let (state, _) = texts.infer_state(
                    &result,
                    self.options.default_variant,
                    &self.options.combination,
                );
                let record = registry.record_mut(n)?;
                record.merge_state = Some(state);
                record.default_state = Some(initial);
                record.clash = clash;
            }
        }

        self.unhighlight_all();
        self.registry.clear(true);
        self.registry = registry;
        self.observe_all();
        self.current = -1;
        self.highlight_all();

        let regions = self.registry.len();
        log::debug!("recomputed {}: {regions} regions", self.name);
        self.emit(SessionEvent::Rebuild { regions });
        Ok(regions)
    }

    /// Apply a host edit to `variant` and carry every span along
    pub fn edit(&mut self, variant: Variant, range: Range<usize>, text: &str) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.ensure_fresh()?;
        let buffer = self.buffers.get_mut(variant)?;
        buffer.replace(range.clone(), text)?;
        let revision = buffer.revision();
        self.registry.apply_edit(variant, &range, text.len());
        self.registry.observe(variant, revision);
        if let Some(bound) = self.narrow.get_mut(variant) {
            bound.adjust_for_edit(&range, text.len());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scrolling
    // ------------------------------------------------------------------

    /// Scroll synchronizer over the current region
    pub fn scroller(&self, viewports: VariantMap<Viewport>) -> ScrollSynchronizer {
        let region = match self.current_region().and_then(|n| self.registry.record(n).ok()) {
            Some(record) => ScrollSynchronizer::region_lines(record, |variant, pos| {
                self.buffers
                    .get(variant)
                    .map(|b| b.line_of(pos))
                    .unwrap_or(0)
            }),
            None => VariantMap::new(),
        };
        ScrollSynchronizer::new(viewports, region)
    }

    pub fn scroll_coefficient(
        &self,
        variant: Variant,
        op: ScrollDirection,
        viewports: VariantMap<Viewport>,
    ) -> f64 {
        self.scroller(viewports).coefficient(variant, op)
    }

    pub fn scroll_amounts(
        &self,
        op: ScrollDirection,
        viewports: VariantMap<Viewport>,
        amount: Option<usize>,
    ) -> VariantMap<usize> {
        self.scroller(viewports).scroll_amounts(op, amount)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn suspend(&mut self) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.presenter.hide();
        self.set_state(LifecycleState::Suspended);
        self.emit(SessionEvent::Suspend);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), SessionError> {
        match self.state {
            LifecycleState::Suspended => {}
            LifecycleState::Closed => return Err(SessionError::SessionClosed),
            other => return Err(SessionError::NotActive(other)),
        }
        self.set_state(LifecycleState::Active);
        self.presenter.show();
        self.emit(SessionEvent::Resume);
        Ok(())
    }
}

/// Variants a regexp filter may look at
fn filter_variants(job: JobKind) -> &'static [Variant] {
    if job.is_three_way_comparison() {
        &[Variant::A, Variant::B, Variant::C]
    } else {
        &[Variant::A, Variant::B]
    }
}
