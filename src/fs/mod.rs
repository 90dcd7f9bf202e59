//! storage adapter layer for reqtrace
//!
//! the version-control engine never touches a filesystem directly. Every
//! byte it reads or writes goes through the narrow [`StorageAdapter`]
//! contract defined here, so the same engine runs on a real directory, an
//! in-memory map in tests, or any other backend that can honor the contract.
//!
//! # Contract
//!
//! ```text
//!  stat / lstat   -> FileStat            absent path: FsError::NotFound
//!  read_file      -> bytes               absent path: FsError::NotFound
//!  write_file     -> ()                  parents created implicitly
//!  mkdir          -> ()                  idempotent
//!  readdir        -> sorted child names  absent path: FsError::NotFound
//!  unlink / rmdir -> ()
//!  readlink / symlink                    always FsError::SymlinkUnsupported
//! ```
//!
//! The engine uses the *failure* of `stat` as its existence test, so an
//! adapter must never hand back a placeholder for a missing path.

mod adapter;
mod disk;
mod memory;

pub use adapter::{normalize_path, EntryKind, FileStat, FsError, FsResult, StorageAdapter};
pub use disk::DiskAdapter;
pub use memory::MemoryAdapter;
