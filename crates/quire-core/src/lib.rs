//! quire-core: region engine for comparing and merging parallel texts
//!
//! A [`Session`] compares two or three variants of a text (or merges two
//! variants, optionally against a common ancestor), keeps an ordered
//! registry of difference regions in sync with host edits, and offers
//! navigation, word-level refinement, region copying with undo, and
//! scroll synchronization over it.

pub mod buffer;
pub mod copy;
pub mod diff;
pub mod directory;
pub mod external;
pub mod filter;
pub mod fine;
pub mod merge;
pub mod navigate;
pub mod options;
pub mod present;
pub mod registry;
pub mod scroll;
pub mod session;
pub mod span;
pub mod variant;

pub use buffer::{BufferError, Buffers, MemoryBuffer, ProtectedVariables, VariantBuffer};
pub use copy::{CopyEngine, CopyError, CopyOutcome, CopyReport, RestoreError, UndoEntry};
pub use diff::{BuiltinDiff, DiffBackend, DiffOptions, DiffToolError, RegionCorrespondence};
pub use directory::{SessionDirectory, SessionEntry, SessionId};
pub use external::ExternalDiff;
pub use filter::{Connective, FilterMode, RegexpFilter};
pub use fine::{FineDiff, FineDiffEngine, FineRange, SubSpanPair};
pub use merge::MergeState;
pub use navigate::{Direction, LocateMode, Navigator, Step};
pub use options::{AutoRefine, CombinationMarkers, DefaultVariant, KeepPolicy, SessionOptions};
pub use present::{NoopPresenter, Presenter};
pub use registry::{DiffRecord, DiffRegistry, DiffState, RegistryError};
pub use scroll::{ScrollDirection, ScrollSynchronizer, Viewport};
pub use session::{
    FileMergeStore, LifecycleState, MergeStore, QuitOptions, QuitReport, Session, SessionBuilder,
    SessionError, SessionEvent, SessionStatus, Visibility,
};
pub use span::{LineRange, Span};
pub use variant::{JobKind, Variant, VariantMap};
