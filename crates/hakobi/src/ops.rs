//! Adapter capability trait.
//!
//! Every storage backend implements [`Adapter`]. Paths arrive already
//! normalized; adapters never see separators other than `/`, nor `.` or
//! `..` segments.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::VfsResult;
use crate::path::VfsPath;
use crate::types::{ByteStream, FileAttr};
use crate::visibility::Visibility;

/// Core storage operations.
///
/// Writes always replace: no partial overwrite, no append. Intermediate
/// directories are created implicitly by writes, renames and copies.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    // ========================================================================
    // Reading
    // ========================================================================

    /// True if `path` names a file or a directory.
    async fn exists(&self, path: &VfsPath) -> VfsResult<bool>;

    /// Attributes of an entry.
    async fn stat(&self, path: &VfsPath) -> VfsResult<FileAttr>;

    /// Whole file contents plus attributes.
    async fn read(&self, path: &VfsPath) -> VfsResult<(Bytes, FileAttr)>;

    /// Open a file as a chunk stream.
    ///
    /// The attributes are optional: backends that cannot stat alongside a
    /// stream return `None` and callers degrade gracefully.
    async fn read_stream(&self, path: &VfsPath) -> VfsResult<(ByteStream, Option<FileAttr>)>;

    /// Visibility of an entry.
    async fn get_visibility(&self, path: &VfsPath) -> VfsResult<Visibility>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Store `data` at `path`, replacing anything there.
    async fn write(&self, path: &VfsPath, data: Bytes, visibility: Visibility) -> VfsResult<()>;

    /// Store a stream at `path`.
    ///
    /// The stream is consumed fully before this returns. If the stream
    /// yields an error, the write fails with [`VfsError::Stream`] and no
    /// partial file becomes visible.
    ///
    /// [`VfsError::Stream`]: crate::VfsError::Stream
    async fn write_stream(
        &self,
        path: &VfsPath,
        stream: ByteStream,
        visibility: Visibility,
    ) -> VfsResult<()>;

    /// Remove a file. Fails for directories and missing paths.
    async fn delete(&self, path: &VfsPath) -> VfsResult<()>;

    /// Remove an entry and everything below it.
    ///
    /// The root clears the whole store. Missing paths yield `NotFound`.
    async fn delete_dir(&self, path: &VfsPath) -> VfsResult<()>;

    /// Move a file.
    async fn rename(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()>;

    /// Copy a file.
    async fn copy(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()>;

    /// Change the visibility of an existing entry.
    async fn set_visibility(&self, path: &VfsPath, visibility: Visibility) -> VfsResult<()>;
}
