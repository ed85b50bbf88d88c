//! Flat-key object store backend.
//!
//! Emulates a bucket-style store in memory: one map from key to object,
//! no directory entries at all. A "directory" is any key prefix ending in
//! `/`, so:
//!
//! - `exists("a")` is true when some key starts with `a/`
//! - `delete_dir("a")` removes the key `a` and every key under `a/`
//! - object keys are never reported as directories
//!
//! Objects carry a content type (sniffed at upload) and a canned ACL,
//! mapped to [`Visibility`] through an [`AclMap`].

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::SystemTime;

use super::{DEFAULT_CHUNK_SIZE, chunked, collect_stream};
use crate::error::{VfsError, VfsResult};
use crate::mime;
use crate::ops::Adapter;
use crate::path::VfsPath;
use crate::types::{ByteStream, FileAttr, FileType};
use crate::visibility::{AclMap, Visibility, VisibilityMap};

#[derive(Debug, Clone)]
struct Object {
    data: Bytes,
    content_type: String,
    acl: String,
    last_modified: SystemTime,
}

impl Object {
    fn attr(&self) -> FileAttr {
        FileAttr {
            size: self.data.len() as u64,
            kind: FileType::File,
            mtime: self.last_modified,
            mimetype: Some(self.content_type.clone()),
        }
    }
}

/// What a key resolves to in a flat namespace.
enum Lookup<'a> {
    Object(&'a Object),
    Prefix,
    Missing,
}

/// In-memory object store with flat keys.
#[derive(Debug)]
pub struct ObjectStoreBackend {
    objects: RwLock<BTreeMap<String, Object>>,
    acl: AclMap,
    chunk_size: usize,
}

impl Default for ObjectStoreBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStoreBackend {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            acl: AclMap::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Use custom ACL names.
    pub fn with_acl_map(mut self, acl: AclMap) -> Self {
        self.acl = acl;
        self
    }

    /// Serve streams in chunks of `chunk_size` bytes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Raw ACL string stored on an object.
    pub fn acl_of(&self, path: &VfsPath) -> Option<String> {
        self.objects
            .read()
            .get(&path.as_key())
            .map(|o| o.acl.clone())
    }

    fn dir_prefix(key: &str) -> String {
        format!("{key}/")
    }

    fn lookup<'a>(objects: &'a BTreeMap<String, Object>, path: &VfsPath) -> Lookup<'a> {
        if path.is_root() {
            return Lookup::Prefix;
        }
        let key = path.as_key();
        if let Some(object) = objects.get(&key) {
            return Lookup::Object(object);
        }
        let prefix = Self::dir_prefix(&key);
        match objects.range(prefix.clone()..).next() {
            Some((k, _)) if k.starts_with(&prefix) => Lookup::Prefix,
            _ => Lookup::Missing,
        }
    }

    /// Keys equal to `path` or under it.
    fn keys_under(objects: &BTreeMap<String, Object>, path: &VfsPath) -> Vec<String> {
        if path.is_root() {
            return objects.keys().cloned().collect();
        }
        let key = path.as_key();
        let prefix = Self::dir_prefix(&key);
        objects
            .keys()
            .filter(|k| **k == key || k.starts_with(&prefix))
            .cloned()
            .collect()
    }

    fn put(&self, path: &VfsPath, data: Bytes, visibility: Visibility) -> VfsResult<()> {
        if path.is_root() {
            return Err(VfsError::is_a_directory(path.as_key()));
        }
        let sample = &data[..data.len().min(mime::DEFAULT_SNIFF_LEN)];
        let object = Object {
            content_type: mime::sniff(sample).to_string(),
            acl: self.acl.to_repr(visibility, FileType::File),
            last_modified: SystemTime::now(),
            data,
        };
        self.objects.write().insert(path.as_key(), object);
        Ok(())
    }
}

#[async_trait]
impl Adapter for ObjectStoreBackend {
    fn name(&self) -> &str {
        "object"
    }

    async fn exists(&self, path: &VfsPath) -> VfsResult<bool> {
        let objects = self.objects.read();
        Ok(!matches!(Self::lookup(&objects, path), Lookup::Missing))
    }

    async fn stat(&self, path: &VfsPath) -> VfsResult<FileAttr> {
        let objects = self.objects.read();
        match Self::lookup(&objects, path) {
            Lookup::Object(object) => Ok(object.attr()),
            Lookup::Prefix => Ok(FileAttr::directory()),
            Lookup::Missing => Err(VfsError::not_found(path.as_key())),
        }
    }

    async fn read(&self, path: &VfsPath) -> VfsResult<(Bytes, FileAttr)> {
        let objects = self.objects.read();
        match Self::lookup(&objects, path) {
            Lookup::Object(object) => Ok((object.data.clone(), object.attr())),
            Lookup::Prefix => Err(VfsError::is_a_directory(path.as_key())),
            Lookup::Missing => Err(VfsError::not_found(path.as_key())),
        }
    }

    async fn read_stream(&self, path: &VfsPath) -> VfsResult<(ByteStream, Option<FileAttr>)> {
        // A bare GET: body only, no head request
        let (data, _) = self.read(path).await?;
        Ok((chunked(data, self.chunk_size), None))
    }

    async fn get_visibility(&self, path: &VfsPath) -> VfsResult<Visibility> {
        let objects = self.objects.read();
        match Self::lookup(&objects, path) {
            Lookup::Object(object) => Ok(self.acl.from_repr(&object.acl)),
            // prefixes carry no ACL of their own
            Lookup::Prefix => Ok(Visibility::Public),
            Lookup::Missing => Err(VfsError::not_found(path.as_key())),
        }
    }

    async fn write(&self, path: &VfsPath, data: Bytes, visibility: Visibility) -> VfsResult<()> {
        self.put(path, data, visibility)
    }

    async fn write_stream(
        &self,
        path: &VfsPath,
        stream: ByteStream,
        visibility: Visibility,
    ) -> VfsResult<()> {
        let data = collect_stream(path, stream).await?;
        self.put(path, data, visibility)
    }

    async fn delete(&self, path: &VfsPath) -> VfsResult<()> {
        let mut objects = self.objects.write();
        match Self::lookup(&objects, path) {
            Lookup::Object(_) => {
                objects.remove(&path.as_key());
                Ok(())
            }
            Lookup::Prefix => Err(VfsError::is_a_directory(path.as_key())),
            Lookup::Missing => Err(VfsError::not_found(path.as_key())),
        }
    }

    async fn delete_dir(&self, path: &VfsPath) -> VfsResult<()> {
        let mut objects = self.objects.write();
        let doomed = Self::keys_under(&objects, path);
        if doomed.is_empty() && !path.is_root() {
            return Err(VfsError::not_found(path.as_key()));
        }
        tracing::debug!(prefix = %path, count = doomed.len(), "deleting keys");
        for key in doomed {
            objects.remove(&key);
        }
        Ok(())
    }

    async fn rename(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        if from == to {
            return self.stat(from).await.map(|_| ());
        }
        if to.starts_with(from) {
            return Err(VfsError::other(format!(
                "cannot move {} into itself",
                from.as_key()
            )));
        }
        let mut objects = self.objects.write();
        let moved = Self::keys_under(&objects, from);
        if moved.is_empty() {
            return Err(VfsError::not_found(from.as_key()));
        }
        let to_key = to.as_key();
        let from_key = from.as_key();
        for key in moved {
            if let Some(mut object) = objects.remove(&key) {
                object.last_modified = SystemTime::now();
                let new_key = format!("{to_key}{}", &key[from_key.len()..]);
                objects.insert(new_key, object);
            }
        }
        Ok(())
    }

    async fn copy(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        if to.is_root() {
            return Err(VfsError::is_a_directory(to.as_key()));
        }
        let mut objects = self.objects.write();
        let mut object = match Self::lookup(&objects, from) {
            Lookup::Object(object) => object.clone(),
            Lookup::Prefix => return Err(VfsError::is_a_directory(from.as_key())),
            Lookup::Missing => return Err(VfsError::not_found(from.as_key())),
        };
        object.last_modified = SystemTime::now();
        objects.insert(to.as_key(), object);
        Ok(())
    }

    async fn set_visibility(&self, path: &VfsPath, visibility: Visibility) -> VfsResult<()> {
        let mut objects = self.objects.write();
        let keys = Self::keys_under(&objects, path);
        if keys.is_empty() {
            return Err(VfsError::not_found(path.as_key()));
        }
        let acl = self.acl.to_repr(visibility, FileType::File);
        for key in keys {
            if let Some(object) = objects.get_mut(&key) {
                object.acl = acl.clone();
            }
        }
        Ok(())
    }
}
