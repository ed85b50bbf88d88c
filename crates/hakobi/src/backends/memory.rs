//! In-memory filesystem backend.
//!
//! Used for testing and scratch space. All data is ephemeral.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{DEFAULT_CHUNK_SIZE, chunked, collect_stream};
use crate::error::{VfsError, VfsResult};
use crate::ops::Adapter;
use crate::path::VfsPath;
use crate::types::{ByteStream, FileAttr};
use crate::visibility::Visibility;

/// Entry in the memory filesystem.
#[derive(Debug, Clone)]
enum Entry {
    File {
        data: Bytes,
        attr: FileAttr,
        visibility: Visibility,
    },
    Directory {
        attr: FileAttr,
        visibility: Visibility,
    },
}

impl Entry {
    fn attr(&self) -> &FileAttr {
        match self {
            Entry::File { attr, .. } => attr,
            Entry::Directory { attr, .. } => attr,
        }
    }

    fn visibility_mut(&mut self) -> &mut Visibility {
        match self {
            Entry::File { visibility, .. } => visibility,
            Entry::Directory { visibility, .. } => visibility,
        }
    }

    fn directory() -> Self {
        Entry::Directory {
            attr: FileAttr::directory(),
            visibility: Visibility::Public,
        }
    }
}

/// In-memory filesystem backend.
///
/// Hierarchical: directories are real entries, created implicitly for
/// every ancestor of a written file. Thread-safe via internal `RwLock`.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<VfsPath, Entry>>,
    chunk_size: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        // Root directory always exists
        entries.insert(VfsPath::root(), Entry::directory());
        Self {
            entries: RwLock::new(entries),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Serve streams in chunks of `chunk_size` bytes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn read_entries(&self) -> VfsResult<RwLockReadGuard<'_, HashMap<VfsPath, Entry>>> {
        self.entries
            .read()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    fn write_entries(&self) -> VfsResult<RwLockWriteGuard<'_, HashMap<VfsPath, Entry>>> {
        self.entries
            .write()
            .map_err(|_| VfsError::other("lock poisoned"))
    }

    /// Ensure all parent directories exist.
    fn ensure_parents(entries: &mut HashMap<VfsPath, Entry>, path: &VfsPath) -> VfsResult<()> {
        for ancestor in path.ancestors() {
            match entries.get(&ancestor) {
                Some(Entry::Directory { .. }) => {}
                Some(Entry::File { .. }) => {
                    return Err(VfsError::not_a_directory(ancestor.as_key()));
                }
                None => {
                    entries.insert(ancestor, Entry::directory());
                }
            }
        }
        Ok(())
    }

    /// Insert a file, replacing any previous file at the same path.
    fn put_file(
        entries: &mut HashMap<VfsPath, Entry>,
        path: &VfsPath,
        data: Bytes,
        visibility: Visibility,
    ) -> VfsResult<()> {
        if path.is_root() || matches!(entries.get(path), Some(Entry::Directory { .. })) {
            return Err(VfsError::is_a_directory(path.as_key()));
        }
        Self::ensure_parents(entries, path)?;
        let attr = FileAttr::file(data.len() as u64);
        entries.insert(
            path.clone(),
            Entry::File {
                data,
                attr,
                visibility,
            },
        );
        Ok(())
    }

    fn file_entry<'a>(
        entries: &'a HashMap<VfsPath, Entry>,
        path: &VfsPath,
    ) -> VfsResult<(&'a Bytes, &'a FileAttr, Visibility)> {
        match entries.get(path) {
            Some(Entry::File {
                data,
                attr,
                visibility,
            }) => Ok((data, attr, *visibility)),
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(path.as_key())),
            None => Err(VfsError::not_found(path.as_key())),
        }
    }
}

#[async_trait]
impl Adapter for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn exists(&self, path: &VfsPath) -> VfsResult<bool> {
        Ok(self.read_entries()?.contains_key(path))
    }

    async fn stat(&self, path: &VfsPath) -> VfsResult<FileAttr> {
        self.read_entries()?
            .get(path)
            .map(|e| e.attr().clone())
            .ok_or_else(|| VfsError::not_found(path.as_key()))
    }

    async fn read(&self, path: &VfsPath) -> VfsResult<(Bytes, FileAttr)> {
        let entries = self.read_entries()?;
        let (data, attr, _) = Self::file_entry(&entries, path)?;
        Ok((data.clone(), attr.clone()))
    }

    async fn read_stream(&self, path: &VfsPath) -> VfsResult<(ByteStream, Option<FileAttr>)> {
        let (data, attr) = self.read(path).await?;
        Ok((chunked(data, self.chunk_size), Some(attr)))
    }

    async fn get_visibility(&self, path: &VfsPath) -> VfsResult<Visibility> {
        match self.read_entries()?.get(path) {
            Some(Entry::File { visibility, .. }) | Some(Entry::Directory { visibility, .. }) => {
                Ok(*visibility)
            }
            None => Err(VfsError::not_found(path.as_key())),
        }
    }

    async fn write(&self, path: &VfsPath, data: Bytes, visibility: Visibility) -> VfsResult<()> {
        let mut entries = self.write_entries()?;
        Self::put_file(&mut entries, path, data, visibility)
    }

    async fn write_stream(
        &self,
        path: &VfsPath,
        stream: ByteStream,
        visibility: Visibility,
    ) -> VfsResult<()> {
        // Buffer first so a failed stream never replaces the old contents.
        let data = collect_stream(path, stream).await?;
        self.write(path, data, visibility).await
    }

    async fn delete(&self, path: &VfsPath) -> VfsResult<()> {
        let mut entries = self.write_entries()?;
        match entries.get(path) {
            Some(Entry::File { .. }) => {
                entries.remove(path);
                Ok(())
            }
            Some(Entry::Directory { .. }) => Err(VfsError::is_a_directory(path.as_key())),
            None => Err(VfsError::not_found(path.as_key())),
        }
    }

    async fn delete_dir(&self, path: &VfsPath) -> VfsResult<()> {
        let mut entries = self.write_entries()?;
        if path.is_root() {
            entries.retain(|k, _| k.is_root());
            return Ok(());
        }
        if !entries.contains_key(path) {
            return Err(VfsError::not_found(path.as_key()));
        }
        entries.retain(|k, _| !k.starts_with(path));
        Ok(())
    }

    async fn rename(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        if from == to {
            return self.stat(from).await.map(|_| ());
        }
        if from.is_root() || to.starts_with(from) {
            return Err(VfsError::other(format!(
                "cannot move {} into itself",
                from.as_key()
            )));
        }

        let mut entries = self.write_entries()?;
        if !entries.contains_key(from) {
            return Err(VfsError::not_found(from.as_key()));
        }
        if matches!(entries.get(to), Some(Entry::Directory { .. })) {
            return Err(VfsError::is_a_directory(to.as_key()));
        }
        Self::ensure_parents(&mut entries, to)?;

        // Directories take their whole subtree with them
        let moved: Vec<VfsPath> = entries
            .keys()
            .filter(|k| k.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            if let (Some(entry), Some(relative)) = (entries.remove(&old), old.strip_prefix(from)) {
                entries.insert(to.join(&relative), entry);
            }
        }
        Ok(())
    }

    async fn copy(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        let mut entries = self.write_entries()?;
        let (data, _, visibility) = Self::file_entry(&entries, from)?;
        let data = data.clone();
        Self::put_file(&mut entries, to, data, visibility)
    }

    async fn set_visibility(&self, path: &VfsPath, visibility: Visibility) -> VfsResult<()> {
        let mut entries = self.write_entries()?;
        let entry = entries
            .get_mut(path)
            .ok_or_else(|| VfsError::not_found(path.as_key()))?;
        *entry.visibility_mut() = visibility;
        Ok(())
    }
}
