//! Metadata resolution: turning a path plus adapter attributes into the
//! record callers see.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::mime;
use crate::path::VfsPath;
use crate::types::{Contents, FileAttr};
use crate::visibility::Visibility;

/// Names derived purely from the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    /// Normalized path, as the caller addresses it.
    pub path: String,
    /// Final segment.
    pub name: String,
    /// Extension including the dot (`".txt"`), or empty.
    pub ext: String,
    /// Path minus the final segment; `""` at top level.
    pub parent_dir: String,
}

impl PathInfo {
    pub fn new(path: &VfsPath) -> Self {
        let name = path.name().to_string();
        Self {
            path: path.as_key(),
            ext: extension(&name).to_string(),
            parent_dir: path.parent().as_key(),
            name,
        }
    }
}

/// Extension of a file name, starting at its last dot.
///
/// Dotfiles like `.env` have no extension.
pub fn extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &name[idx..],
    }
}

/// Everything we know about an entry except its contents and visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(flatten)]
    pub info: PathInfo,
    pub size: u64,
    pub is_file: bool,
    pub is_dir: bool,
    pub timestamp: SystemTime,
    pub mimetype: String,
}

/// Build [`Metadata`] from adapter attributes.
///
/// A native mimetype from the adapter wins; otherwise `sample` (the first
/// bytes of the file) is sniffed. Without either we fall back to
/// `application/octet-stream`.
pub fn resolve(path: &VfsPath, attr: &FileAttr, sample: Option<&[u8]>) -> Metadata {
    let mimetype = match (&attr.mimetype, sample) {
        (Some(native), _) => native.clone(),
        (None, Some(sample)) => mime::sniff(sample).to_string(),
        (None, None) => mime::OCTET_STREAM.to_string(),
    };
    Metadata {
        info: PathInfo::new(path),
        size: attr.size,
        is_file: attr.is_file(),
        is_dir: attr.is_dir(),
        timestamp: attr.mtime,
        mimetype,
    }
}

/// The result of a whole-file read.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: String,
    pub name: String,
    pub ext: String,
    pub parent_dir: String,
    pub contents: Contents,
    pub visibility: Visibility,
    pub size: u64,
    pub is_file: bool,
    pub is_dir: bool,
    pub timestamp: SystemTime,
    pub mimetype: String,
}

impl FileRecord {
    pub fn new(meta: Metadata, contents: Contents, visibility: Visibility) -> Self {
        let Metadata {
            info,
            size,
            is_file,
            is_dir,
            timestamp,
            mimetype,
        } = meta;
        Self {
            path: info.path,
            name: info.name,
            ext: info.ext,
            parent_dir: info.parent_dir,
            contents,
            visibility,
            size,
            is_file,
            is_dir,
            timestamp,
            mimetype,
        }
    }
}
