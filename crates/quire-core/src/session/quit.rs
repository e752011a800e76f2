use super::{LifecycleState, Session, SessionError, SessionEvent};
use crate::buffer::VariantBuffer;
use crate::options::KeepPolicy;
use crate::variant::Variant;
use std::io;
use std::path::{Path, PathBuf};

/// Destination for a finished merge result
pub trait MergeStore {
    fn store(&mut self, text: &str) -> io::Result<()>;
}

/// Writes the merge result to a file
#[derive(Debug, Clone)]
pub struct FileMergeStore {
    path: PathBuf,
}

impl FileMergeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MergeStore for FileMergeStore {
    fn store(&mut self, text: &str) -> io::Result<()> {
        std::fs::write(&self.path, text)
    }
}

/// Decides whether an unmodified variant is discarded (`true`) at quit
pub type DiscardPrompt<'a> = &'a mut dyn FnMut(Variant, &str) -> bool;

/// How [`Session::quit`] treats buffers and the merge result
#[derive(Default)]
pub struct QuitOptions<'a> {
    /// Overrides the session's keep policy
    pub keep: Option<KeepPolicy>,
    pub merge_store: Option<&'a mut dyn MergeStore>,
    /// Consulted under [`KeepPolicy::Ask`]; without it everything is kept
    pub ask: Option<DiscardPrompt<'a>>,
}

/// What quitting did with each variant
#[derive(Default)]
pub struct QuitReport {
    /// Buffers handed back to the host
    pub kept: Vec<(Variant, Box<dyn VariantBuffer>)>,
    pub discarded: Vec<Variant>,
    pub merge_stored: bool,
}

impl QuitReport {
    pub fn kept_variants(&self) -> Vec<Variant> {
        self.kept.iter().map(|(v, _)| *v).collect()
    }

    pub fn take(&mut self, variant: Variant) -> Option<Box<dyn VariantBuffer>> {
        let pos = self.kept.iter().position(|(v, _)| *v == variant)?;
        Some(self.kept.remove(pos).1)
    }
}

impl std::fmt::Debug for QuitReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuitReport")
            .field("kept", &self.kept_variants())
            .field("discarded", &self.discarded)
            .field("merge_stored", &self.merge_stored)
            .finish()
    }
}

impl Session {
    /// Tear the session down.
    ///
    /// The merge result goes to the store first; if storing fails nothing
    /// else happens and the session stays usable. Afterwards every
    /// operation fails with [`SessionError::SessionClosed`].
    pub fn quit(&mut self, options: QuitOptions<'_>) -> Result<QuitReport, SessionError> {
        match self.state {
            LifecycleState::Active | LifecycleState::Suspended => {}
            LifecycleState::Closed => return Err(SessionError::SessionClosed),
            other => return Err(SessionError::NotActive(other)),
        }

        let mut report = QuitReport::default();
        if self.job.is_merge() {
            if let Some(store) = options.merge_store {
                let result = self.buffers.get(Variant::C)?.text();
                store.store(result).map_err(SessionError::MergeStore)?;
                report.merge_stored = true;
            }
        }

        let resumed_from = self.state;
        self.set_state(LifecycleState::Quitting);
        if resumed_from == LifecycleState::Suspended {
            self.presenter.show();
        }

        self.unhighlight_all();
        self.registry.clear(true);
        self.backend.cleanup();
        self.current = -1;

        for (variant, saved) in std::mem::take(&mut self.protected).iter() {
            if let Ok(buffer) = self.buffers.get_mut(variant) {
                buffer.restore(saved.clone());
            }
        }

        let policy = options.keep.unwrap_or(self.options.keep_variants);
        let mut ask = options.ask;
        for variant in self.buffers.variants() {
            let Some(buffer) = self.buffers.take(variant) else {
                continue;
            };
            let stored_result = variant == Variant::C && report.merge_stored;
            let discardable = buffer.is_alive() && (!buffer.is_modified() || stored_result);
            let discard = discardable
                && match policy {
                    KeepPolicy::AlwaysKeep => false,
                    KeepPolicy::AlwaysDiscard => true,
                    KeepPolicy::Ask => ask.as_mut().is_some_and(|ask| ask(variant, buffer.name())),
                };
            if discard {
                report.discarded.push(variant);
            } else {
                report.kept.push((variant, buffer));
            }
        }

        self.emit(SessionEvent::Quit);
        if let (Some(dir), Some(id)) = (&self.directory, self.id) {
            dir.remove(id);
        }
        self.state = LifecycleState::Closed;
        log::debug!(
            "session {:?} closed; kept {:?}, discarded {:?}",
            self.name,
            report.kept_variants(),
            report.discarded
        );
        Ok(report)
    }
}
