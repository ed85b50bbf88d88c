//! VFS error types.

use std::io;
use thiserror::Error;

use crate::encoding::Encoding;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Path escapes the adapter root (security violation).
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Visibility value outside `{public, private}`.
    #[error("invalid visibility: {0}")]
    InvalidVisibility(String),

    /// Encoding name we do not know how to handle.
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),

    /// Text that is not valid in its declared encoding.
    #[error("invalid {encoding} input: {message}")]
    Encoding { encoding: Encoding, message: String },

    /// A stream failed mid-transfer.
    #[error("stream failed for {path}: {message}")]
    Stream { path: String, message: String },

    /// Backend fault, wrapped with the path it happened on.
    #[error("adapter failure at {path}: {source}")]
    Adapter {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create an InvalidVisibility error carrying the offending literal.
    pub fn invalid_visibility(value: impl Into<String>) -> Self {
        Self::InvalidVisibility(value.into())
    }

    /// Create an Encoding error.
    pub fn encoding(encoding: Encoding, message: impl Into<String>) -> Self {
        Self::Encoding {
            encoding,
            message: message.into(),
        }
    }

    /// Create a Stream error.
    pub fn stream(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stream {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Map an I/O error from a backend onto the taxonomy, keeping the path.
    ///
    /// A lookup that runs through a file (`a.txt/child`) names nothing, so
    /// `ENOTDIR` reads as NotFound. Writes that need a directory there
    /// report [`VfsError::NotADirectory`] themselves.
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Self::NotFound(path),
            io::ErrorKind::IsADirectory => Self::IsADirectory(path),
            _ => Self::Adapter { path, source: err },
        }
    }

    /// Rewrite the path this error names with `f`.
    ///
    /// Used to report caller-relative paths for errors raised under a
    /// root prefix.
    pub fn map_path(self, f: impl FnOnce(&str) -> String) -> Self {
        match self {
            Self::NotFound(p) => Self::NotFound(f(&p)),
            Self::IsADirectory(p) => Self::IsADirectory(f(&p)),
            Self::NotADirectory(p) => Self::NotADirectory(f(&p)),
            Self::Stream { path, message } => Self::Stream {
                path: f(&path),
                message,
            },
            Self::Adapter { path, source } => Self::Adapter {
                path: f(&path),
                source,
            },
            other => other,
        }
    }

    /// Returns true for [`VfsError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
