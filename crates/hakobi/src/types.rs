//! Core VFS types shared by adapters and the facade.

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::encoding::Encoding;
use crate::error::VfsResult;
use crate::visibility::Visibility;

/// Raw byte chunks flowing between an adapter and the facade.
pub type ByteStream = BoxStream<'static, VfsResult<Bytes>>;

/// Chunks handed to the caller, rendered per the requested encoding.
pub type ContentStream = BoxStream<'static, VfsResult<Contents>>;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory (real, or a key prefix on flat stores).
    Directory,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }
}

/// What an adapter knows about an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttr {
    /// Size in bytes.
    pub size: u64,
    /// File type.
    pub kind: FileType,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Content type, when the backend records one natively.
    pub mimetype: Option<String>,
}

impl FileAttr {
    /// Attributes for a file written now.
    pub fn file(size: u64) -> Self {
        Self {
            size,
            kind: FileType::File,
            mtime: SystemTime::now(),
            mimetype: None,
        }
    }

    /// Attributes for a directory created now.
    pub fn directory() -> Self {
        Self {
            size: 0,
            kind: FileType::Directory,
            mtime: SystemTime::now(),
            mimetype: None,
        }
    }

    /// Set the native content type.
    pub fn with_mimetype(mut self, mimetype: impl Into<String>) -> Self {
        self.mimetype = Some(mimetype.into());
        self
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// File contents as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contents {
    /// Raw bytes (no encoding requested).
    Bytes(Bytes),
    /// Bytes rendered in a text encoding.
    Text(String),
}

impl Contents {
    /// Text view, if this was rendered as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Contents::Text(s) => Some(s),
            Contents::Bytes(_) => None,
        }
    }

    /// Byte view, if this is raw.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Contents::Bytes(b) => Some(b),
            Contents::Text(_) => None,
        }
    }

    /// Length of the rendered value (bytes or UTF-8 length of text).
    pub fn len(&self) -> usize {
        match self {
            Contents::Bytes(b) => b.len(),
            Contents::Text(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq<&str> for Contents {
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

impl PartialEq<&[u8]> for Contents {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_bytes() == Some(*other)
    }
}

/// Caller input for writes: raw bytes, or text in some encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteContent {
    Bytes(Bytes),
    Text(String),
}

impl From<&str> for WriteContent {
    fn from(s: &str) -> Self {
        WriteContent::Text(s.to_string())
    }
}

impl From<String> for WriteContent {
    fn from(s: String) -> Self {
        WriteContent::Text(s)
    }
}

impl From<&[u8]> for WriteContent {
    fn from(b: &[u8]) -> Self {
        WriteContent::Bytes(Bytes::copy_from_slice(b))
    }
}

impl<const N: usize> From<&[u8; N]> for WriteContent {
    fn from(b: &[u8; N]) -> Self {
        WriteContent::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Vec<u8>> for WriteContent {
    fn from(b: Vec<u8>) -> Self {
        WriteContent::Bytes(Bytes::from(b))
    }
}

impl From<Bytes> for WriteContent {
    fn from(b: Bytes) -> Self {
        WriteContent::Bytes(b)
    }
}

/// Options for `write` and `write_stream`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Encoding of text input. Ignored for byte input.
    pub encoding: Option<Encoding>,
    /// Visibility for the new file; the configured default when unset.
    pub visibility: Option<Visibility>,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// Options for `read` and `read_stream`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Render contents as text in this encoding; raw bytes when unset.
    pub encoding: Option<Encoding>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }
}
