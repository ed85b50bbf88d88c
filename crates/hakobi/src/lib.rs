//! # hakobi
//!
//! A virtual filesystem with pluggable storage adapters.
//!
//! One API for reading, writing, streaming, copying, moving, deleting and
//! inspecting files, backed interchangeably by local disk, an object store
//! or memory. Key components:
//!
//! - [`Filesystem`] - The caller-facing operations, bound to one adapter
//! - [`Adapter`] - Core trait every storage backend implements
//! - [`backends`] - [`MemoryBackend`], [`LocalBackend`] and [`ObjectStoreBackend`]
//! - [`conformance`] - Shared behavioural checks for adapters
//!
//! ## Design Decisions
//!
//! - **Normalized paths only**: separators, `.`/`..` and leading slashes are
//!   resolved before an adapter sees a path; `..` never climbs above root.
//! - **Bytes at rest**: adapters store bytes. Text and its encoding are
//!   resolved at the [`Filesystem`] boundary.
//! - **Two-level visibility**: adapters map [`Visibility`] onto their own
//!   permission model (mode bits, canned ACLs).
//! - **Directories are adapter policy**: flat-key stores emulate them with
//!   key prefixes.
//!
//! ```no_run
//! # async fn demo() -> hakobi::VfsResult<()> {
//! use hakobi::{Encoding, Filesystem, ReadOptions, WriteOptions, backends::MemoryBackend};
//!
//! let fs = Filesystem::new(MemoryBackend::new());
//! fs.write("notes/today.txt", "Hello, friend!", WriteOptions::new()).await?;
//!
//! let file = fs
//!     .read("notes/today.txt", ReadOptions::new().with_encoding(Encoding::Utf8))
//!     .await?;
//! assert_eq!(file.mimetype, "text/plain");
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod config;
pub mod conformance;
pub mod encoding;
mod error;
mod filesystem;
pub mod metadata;
pub mod mime;
mod ops;
pub mod path;
mod types;
pub mod visibility;

pub use backends::{LocalBackend, LocalConfig, MemoryBackend, ObjectStoreBackend};
pub use config::FilesystemConfig;
pub use encoding::Encoding;
pub use error::{VfsError, VfsResult};
pub use filesystem::{Filesystem, ReadStream};
pub use metadata::{FileRecord, Metadata, PathInfo};
pub use ops::Adapter;
pub use path::{VfsPath, normalize};
pub use types::{
    ByteStream, ContentStream, Contents, FileAttr, FileType, ReadOptions, WriteContent,
    WriteOptions,
};
pub use visibility::{AclMap, IntoVisibility, PermissionMap, Visibility, VisibilityMap};
