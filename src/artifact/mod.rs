//! Artifact persistence layer.
//!
//! Maps typed records onto files in the repository's working tree:
//!
//! ```text
//! ArtifactStore ── IdAllocator (counters/{folder}.json)
//!       │
//!       ├── format::encode / decode   (YAML front matter or JSON)
//!       │
//!       └── GitRepository             (working-tree I/O, history)
//! ```
//!
//! Every record lives at `{folder}/{id}.{ext}`; see [`ArtifactKind`] for
//! the table of folders and prefixes.

mod counter;
mod error;
pub mod format;
mod kind;
mod record;
mod store;

pub use counter::{counter_path, IdAllocator, COUNTERS_DIR};
pub use error::{ArtifactError, ArtifactResult};
pub use kind::{ArtifactKind, RecordFormat};
pub use record::{
    Artifact, ArtifactDraft, ArtifactId, ArtifactPatch, Lifecycle, Revision, RESERVED_KEYS,
};
pub use store::{ArtifactStore, ASSETS_DIR, BASELINES_DIR, SAVED_FILTERS_DIR};
