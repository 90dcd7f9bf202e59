//! Workspace facade.
//!
//! Wires the repository, the artifact store, the pending-changes service
//! and the baseline manager together behind one handle, and owns the
//! crate-level error taxonomy.

mod api;
mod config;
mod error;

pub use api::Workspace;
pub use config::{WorkspaceConfig, CONFIG_FILE};
pub use error::{ErrorClass, WorkspaceError, WorkspaceResult};
