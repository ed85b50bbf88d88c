//! Local filesystem backend.
//!
//! Provides access to real filesystem paths, with path security
//! to prevent escaping the root directory. Visibility is stored as Unix
//! permission bits through a [`PermissionMap`].

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use super::DEFAULT_CHUNK_SIZE;
use crate::error::{VfsError, VfsResult};
use crate::ops::Adapter;
use crate::path::VfsPath;
use crate::types::{ByteStream, FileAttr, FileType};
use crate::visibility::{PermissionMap, Visibility, VisibilityMap};

/// Tunables for [`LocalBackend`], loadable from RON.
///
/// ```ron
/// (
///     permissions: (file_public: 0o644, file_private: 0o600),
///     chunk_size: 8192,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Mode bits per visibility.
    pub permissions: PermissionMap,
    /// Read buffer size for streams.
    pub chunk_size: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            permissions: PermissionMap::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl LocalConfig {
    /// Parse a RON document. Missing fields take their defaults.
    pub fn from_ron_str(text: &str) -> VfsResult<Self> {
        let config: Self = ron::from_str(text).map_err(|e| VfsError::config(e.to_string()))?;
        if config.chunk_size == 0 {
            return Err(VfsError::config("chunk_size must be positive"));
        }
        Ok(config)
    }
}

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/srv/uploads`, then reading `avatars/1.png` reads
/// `/srv/uploads/avatars/1.png`.
///
/// Writes land in a temporary sibling first and are renamed into place,
/// so readers never observe a half-written file.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
    config: LocalConfig,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_config(root, LocalConfig::default())
    }

    pub fn with_config(root: impl Into<PathBuf>, config: LocalConfig) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self { root, config }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn io_err(path: &VfsPath) -> impl FnOnce(std::io::Error) -> VfsError + '_ {
        move |e| VfsError::from_io(path.as_key(), e)
    }

    /// Map a normalized path onto the host filesystem.
    ///
    /// The deepest existing ancestor is canonicalized so a symlink cannot
    /// lead outside the root.
    fn resolve(&self, path: &VfsPath) -> VfsResult<PathBuf> {
        let mut full = self.root.clone();
        for segment in path.segments() {
            full.push(segment);
        }

        let existing = full
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or(&self.root);
        let canonical = dunce::canonicalize(existing).map_err(Self::io_err(path))?;
        if !canonical.starts_with(&self.root) {
            return Err(VfsError::path_escapes_root(format!(
                "{} is not under {}",
                canonical.display(),
                self.root.display()
            )));
        }

        Ok(full)
    }

    fn metadata_to_attr(meta: &std::fs::Metadata) -> FileAttr {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };

        FileAttr {
            size: meta.len(),
            kind,
            mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
            mimetype: None,
        }
    }

    async fn metadata(&self, path: &VfsPath) -> VfsResult<std::fs::Metadata> {
        let full = self.resolve(path)?;
        fs::metadata(&full).await.map_err(Self::io_err(path))
    }

    async fn set_mode(&self, path: &VfsPath, target: &Path, mode: u32) -> VfsResult<()> {
        fs::set_permissions(target, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(Self::io_err(path))
    }

    /// Create any missing parent directories of `path`, public by default.
    async fn ensure_parents(&self, path: &VfsPath) -> VfsResult<()> {
        for ancestor in path.ancestors() {
            let dir = self.resolve(&ancestor)?;
            match fs::metadata(&dir).await {
                Ok(meta) if meta.is_dir() => continue,
                Ok(_) => return Err(VfsError::not_a_directory(ancestor.as_key())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    match fs::create_dir(&dir).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                        Err(e) => return Err(VfsError::from_io(ancestor.as_key(), e)),
                    }
                    let mode = self
                        .config
                        .permissions
                        .to_repr(Visibility::Public, FileType::Directory);
                    self.set_mode(&ancestor, &dir, mode).await?;
                }
                Err(e) => return Err(VfsError::from_io(ancestor.as_key(), e)),
            }
        }
        Ok(())
    }

    /// Resolve a write target and make room for it.
    async fn prepare_target(&self, path: &VfsPath) -> VfsResult<PathBuf> {
        if path.is_root() {
            return Err(VfsError::is_a_directory(path.as_key()));
        }
        self.ensure_parents(path).await?;
        let target = self.resolve(path)?;
        if matches!(fs::metadata(&target).await, Ok(meta) if meta.is_dir()) {
            return Err(VfsError::is_a_directory(path.as_key()));
        }
        Ok(target)
    }

    fn temp_path(target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        target.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4()))
    }

    /// Stream into a temporary sibling, then rename it over `target`.
    async fn write_atomic(
        &self,
        path: &VfsPath,
        target: &Path,
        mut stream: ByteStream,
        mode: u32,
    ) -> VfsResult<()> {
        let tmp = Self::temp_path(target);
        let result: VfsResult<()> = async {
            let mut file = fs::File::create(&tmp).await.map_err(Self::io_err(path))?;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| VfsError::stream(path.as_key(), e.to_string()))?;
                file.write_all(&chunk).await.map_err(Self::io_err(path))?;
            }
            file.flush().await.map_err(Self::io_err(path))?;
            drop(file);
            self.set_mode(path, &tmp, mode).await?;
            fs::rename(&tmp, target).await.map_err(Self::io_err(path))
        }
        .await;

        if result.is_err() {
            if let Err(e) = fs::remove_file(&tmp).await {
                tracing::debug!(tmp = %tmp.display(), error = %e, "temp file cleanup failed");
            }
        }
        result
    }

    async fn clear_dir(&self, path: &VfsPath, dir: &Path) -> VfsResult<()> {
        let mut entries = fs::read_dir(dir).await.map_err(Self::io_err(path))?;
        while let Some(entry) = entries.next_entry().await.map_err(Self::io_err(path))? {
            let file_type = entry.file_type().await.map_err(Self::io_err(path))?;
            let removed = if file_type.is_dir() {
                fs::remove_dir_all(entry.path()).await
            } else {
                fs::remove_file(entry.path()).await
            };
            removed.map_err(Self::io_err(path))?;
        }
        Ok(())
    }
}

#[async_trait]
impl Adapter for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn exists(&self, path: &VfsPath) -> VfsResult<bool> {
        let full = self.resolve(path)?;
        match fs::try_exists(&full).await {
            Ok(found) => Ok(found),
            // a file where a directory was expected
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => Ok(false),
            Err(e) => Err(VfsError::from_io(path.as_key(), e)),
        }
    }

    async fn stat(&self, path: &VfsPath) -> VfsResult<FileAttr> {
        let meta = self.metadata(path).await?;
        Ok(Self::metadata_to_attr(&meta))
    }

    async fn read(&self, path: &VfsPath) -> VfsResult<(Bytes, FileAttr)> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(Self::io_err(path))?;
        if meta.is_dir() {
            return Err(VfsError::is_a_directory(path.as_key()));
        }
        let data = fs::read(&full).await.map_err(Self::io_err(path))?;
        let mut attr = Self::metadata_to_attr(&meta);
        attr.size = data.len() as u64;
        Ok((Bytes::from(data), attr))
    }

    async fn read_stream(&self, path: &VfsPath) -> VfsResult<(ByteStream, Option<FileAttr>)> {
        let full = self.resolve(path)?;
        let file = fs::File::open(&full).await.map_err(Self::io_err(path))?;
        let meta = file.metadata().await.map_err(Self::io_err(path))?;
        if meta.is_dir() {
            return Err(VfsError::is_a_directory(path.as_key()));
        }

        let key = path.as_key();
        let stream = ReaderStream::with_capacity(file, self.config.chunk_size)
            .map(move |chunk| chunk.map_err(|e| VfsError::stream(key.clone(), e.to_string())))
            .boxed();
        Ok((stream, Some(Self::metadata_to_attr(&meta))))
    }

    async fn get_visibility(&self, path: &VfsPath) -> VfsResult<Visibility> {
        let meta = self.metadata(path).await?;
        Ok(self
            .config
            .permissions
            .from_repr(&(meta.permissions().mode() & 0o777)))
    }

    async fn write(&self, path: &VfsPath, data: Bytes, visibility: Visibility) -> VfsResult<()> {
        self.write_stream(path, stream::iter([Ok(data)]).boxed(), visibility)
            .await
    }

    async fn write_stream(
        &self,
        path: &VfsPath,
        stream: ByteStream,
        visibility: Visibility,
    ) -> VfsResult<()> {
        let target = self.prepare_target(path).await?;
        let mode = self.config.permissions.to_repr(visibility, FileType::File);
        self.write_atomic(path, &target, stream, mode).await?;
        tracing::debug!(path = %path, mode = %format!("{mode:o}"), "wrote file");
        Ok(())
    }

    async fn delete(&self, path: &VfsPath) -> VfsResult<()> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(Self::io_err(path))?;
        if meta.is_dir() {
            return Err(VfsError::is_a_directory(path.as_key()));
        }
        fs::remove_file(&full).await.map_err(Self::io_err(path))
    }

    async fn delete_dir(&self, path: &VfsPath) -> VfsResult<()> {
        let full = self.resolve(path)?;
        if path.is_root() {
            return self.clear_dir(path, &full).await;
        }
        let meta = fs::metadata(&full).await.map_err(Self::io_err(path))?;
        if meta.is_dir() {
            fs::remove_dir_all(&full).await.map_err(Self::io_err(path))
        } else {
            fs::remove_file(&full).await.map_err(Self::io_err(path))
        }
    }

    async fn rename(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        let from_path = self.resolve(from)?;
        fs::metadata(&from_path).await.map_err(Self::io_err(from))?;
        if from == to {
            return Ok(());
        }
        if to.is_root() {
            return Err(VfsError::is_a_directory(to.as_key()));
        }

        self.ensure_parents(to).await?;
        let to_path = self.resolve(to)?;
        fs::rename(&from_path, &to_path)
            .await
            .map_err(Self::io_err(to))
    }

    async fn copy(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        let from_path = self.resolve(from)?;
        let meta = fs::metadata(&from_path).await.map_err(Self::io_err(from))?;
        if meta.is_dir() {
            return Err(VfsError::is_a_directory(from.as_key()));
        }

        let target = self.prepare_target(to).await?;
        // fs::copy carries the permission bits, hence the visibility
        let tmp = Self::temp_path(&target);
        let result: VfsResult<()> = async {
            fs::copy(&from_path, &tmp).await.map_err(Self::io_err(to))?;
            fs::rename(&tmp, &target).await.map_err(Self::io_err(to))
        }
        .await;
        if result.is_err() {
            if let Err(e) = fs::remove_file(&tmp).await {
                tracing::debug!(tmp = %tmp.display(), error = %e, "temp file cleanup failed");
            }
        }
        result
    }

    async fn set_visibility(&self, path: &VfsPath, visibility: Visibility) -> VfsResult<()> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(Self::io_err(path))?;
        let kind = if meta.is_dir() {
            FileType::Directory
        } else {
            FileType::File
        };
        let mode = self.config.permissions.to_repr(visibility, kind);
        self.set_mode(path, &full, mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::normalize;
    use tempfile::TempDir;

    async fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        (backend, dir)
    }

    fn p(raw: &str) -> VfsPath {
        normalize(raw)
    }

    fn leftover_temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.ends_with(".tmp"))
            .collect()
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (backend, dir) = setup().await;

        backend
            .write(&p("nested/dir/test.txt"), Bytes::from_static(b"hello world"), Visibility::Public)
            .await
            .unwrap();

        let (data, attr) = backend.read(&p("nested/dir/test.txt")).await.unwrap();
        assert_eq!(&data[..], b"hello world");
        assert_eq!(attr.size, 11);
        assert!(attr.is_file());
        assert_eq!(
            std::fs::read(dir.path().join("nested/dir/test.txt")).unwrap(),
            b"hello world"
        );
        assert!(backend.stat(&p("nested")).await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_permissions_follow_visibility() {
        let (backend, dir) = setup().await;

        backend
            .write(&p("secret.txt"), Bytes::from_static(b"x"), Visibility::Private)
            .await
            .unwrap();
        let mode = std::fs::metadata(dir.path().join("secret.txt"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(
            backend.get_visibility(&p("secret.txt")).await.unwrap(),
            Visibility::Private
        );

        backend.set_visibility(&p("secret.txt"), Visibility::Public).await.unwrap();
        let mode = std::fs::metadata(dir.path().join("secret.txt"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_nothing_behind() {
        let (backend, dir) = setup().await;

        backend
            .write(&p("data.bin"), Bytes::from_static(b"original"), Visibility::Public)
            .await
            .unwrap();

        let broken = stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(VfsError::other("connection reset")),
        ])
        .boxed();
        let err = backend
            .write_stream(&p("data.bin"), broken, Visibility::Public)
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::Stream { .. }));

        let (data, _) = backend.read(&p("data.bin")).await.unwrap();
        assert_eq!(&data[..], b"original");
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_read_stream_chunks() {
        let dir = TempDir::new().unwrap();
        let config = LocalConfig {
            chunk_size: 4,
            ..LocalConfig::default()
        };
        let backend = LocalBackend::with_config(dir.path(), config);
        std::fs::write(dir.path().join("s.txt"), "0123456789").unwrap();

        let (stream, attr) = backend.read_stream(&p("s.txt")).await.unwrap();
        assert_eq!(attr.unwrap().size, 10);
        let chunks: Vec<Bytes> = stream.map(|c| c.unwrap()).collect().await;
        assert!(chunks.iter().all(|c| c.len() <= 4));
        assert_eq!(chunks.concat(), b"0123456789");
    }

    #[tokio::test]
    async fn test_symlink_escape_blocked() {
        let (backend, dir) = setup().await;
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("passwd"), "root").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = backend.read(&p("link/passwd")).await.unwrap_err();
        assert!(matches!(err, VfsError::PathEscapesRoot(_)));
        let err = backend
            .write(&p("link/new.txt"), Bytes::new(), Visibility::Public)
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::PathEscapesRoot(_)));
    }

    #[tokio::test]
    async fn test_dot_dot_stays_inside() {
        let (backend, dir) = setup().await;
        backend
            .write(&p("../../../etc/escape.txt"), Bytes::from_static(b"x"), Visibility::Public)
            .await
            .unwrap();
        assert!(dir.path().join("etc/escape.txt").exists());
    }

    #[tokio::test]
    async fn test_delete_and_delete_dir() {
        let (backend, dir) = setup().await;
        for path in ["a/1.txt", "a/b/2.txt", "top.txt"] {
            backend
                .write(&p(path), Bytes::from_static(b"x"), Visibility::Public)
                .await
                .unwrap();
        }

        assert!(matches!(
            backend.delete(&p("a")).await,
            Err(VfsError::IsADirectory(_))
        ));
        backend.delete(&p("a/1.txt")).await.unwrap();
        assert!(backend.delete(&p("a/1.txt")).await.unwrap_err().is_not_found());

        backend.delete_dir(&p("a")).await.unwrap();
        assert!(!backend.exists(&p("a")).await.unwrap());
        assert!(backend.delete_dir(&p("a")).await.unwrap_err().is_not_found());

        backend.delete_dir(&VfsPath::root()).await.unwrap();
        assert!(dir.path().exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rename_and_copy() {
        let (backend, _dir) = setup().await;
        backend
            .write(&p("old.txt"), Bytes::from_static(b"content"), Visibility::Private)
            .await
            .unwrap();

        backend.copy(&p("old.txt"), &p("copies/c.txt")).await.unwrap();
        assert_eq!(
            backend.get_visibility(&p("copies/c.txt")).await.unwrap(),
            Visibility::Private
        );

        backend.rename(&p("old.txt"), &p("moved/new.txt")).await.unwrap();
        assert!(!backend.exists(&p("old.txt")).await.unwrap());
        let (data, _) = backend.read(&p("moved/new.txt")).await.unwrap();
        assert_eq!(&data[..], b"content");
    }

    #[tokio::test]
    async fn test_write_through_file_is_not_a_directory() {
        let (backend, _dir) = setup().await;
        backend
            .write(&p("file"), Bytes::from_static(b"x"), Visibility::Public)
            .await
            .unwrap();
        let err = backend
            .write(&p("file/child.txt"), Bytes::new(), Visibility::Public)
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_lookup_through_file_is_not_found() {
        let (backend, _dir) = setup().await;
        backend
            .write(&p("a.txt"), Bytes::from_static(b"x"), Visibility::Public)
            .await
            .unwrap();

        let child = p("a.txt/child");
        assert!(!backend.exists(&child).await.unwrap());
        assert!(backend.stat(&child).await.unwrap_err().is_not_found());
        assert!(backend.read(&child).await.unwrap_err().is_not_found());
        assert!(backend.read_stream(&child).await.err().unwrap().is_not_found());
        assert!(backend.delete(&child).await.unwrap_err().is_not_found());
        assert!(backend.delete_dir(&child).await.unwrap_err().is_not_found());
        assert!(backend.get_visibility(&child).await.unwrap_err().is_not_found());
        assert!(
            backend
                .set_visibility(&child, Visibility::Private)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[test]
    fn test_config_from_ron() {
        let config = LocalConfig::from_ron_str("(permissions: (file_public: 0o664), chunk_size: 128)")
            .unwrap();
        assert_eq!(config.chunk_size, 128);
        assert_eq!(config.permissions.file_public, 0o664);
        assert_eq!(config.permissions.file_private, 0o600);

        assert!(LocalConfig::from_ron_str("(chunk_size: 0)").is_err());
        assert!(LocalConfig::from_ron_str("(chunk_size: \"big\")").is_err());
    }
}
