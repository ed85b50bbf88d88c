//! The caller-facing filesystem.
//!
//! [`Filesystem`] binds one [`Adapter`] for its whole life and sequences
//! the smaller pieces around it: paths are normalized and placed under the
//! configured root prefix, text is turned into bytes on the way in and
//! rendered on the way out, and reads are decorated with metadata and
//! visibility.

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use std::fmt;
use std::sync::Arc;

use crate::config::FilesystemConfig;
use crate::encoding::{self, Encoding, StreamDecoder, StreamEncoder};
use crate::error::{VfsError, VfsResult};
use crate::metadata::{self, FileRecord, Metadata, PathInfo};
use crate::ops::Adapter;
use crate::path::{VfsPath, normalize};
use crate::types::{ByteStream, ContentStream, Contents, ReadOptions, WriteContent, WriteOptions};
use crate::visibility::{IntoVisibility, Visibility};

/// A file opened for streaming.
///
/// `metadata` and `visibility` are best effort. Some adapters cannot stat
/// while streaming; the stream is still served and these are `None`.
pub struct ReadStream {
    pub info: PathInfo,
    pub metadata: Option<Metadata>,
    pub visibility: Option<Visibility>,
    pub stream: ContentStream,
}

impl ReadStream {
    /// Drain the stream into a single value.
    pub async fn collect(mut self) -> VfsResult<Contents> {
        let mut bytes = Vec::new();
        let mut text: Option<String> = None;
        while let Some(chunk) = self.stream.next().await {
            match chunk? {
                Contents::Bytes(b) => bytes.extend_from_slice(&b),
                Contents::Text(t) => text.get_or_insert_with(String::new).push_str(&t),
            }
        }
        Ok(match text {
            Some(text) => Contents::Text(text),
            None => Contents::Bytes(Bytes::from(bytes)),
        })
    }
}

impl fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadStream")
            .field("info", &self.info)
            .field("metadata", &self.metadata)
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

/// Virtual filesystem over a single storage adapter.
#[derive(Clone)]
pub struct Filesystem {
    adapter: Arc<dyn Adapter>,
    config: FilesystemConfig,
    prefix: VfsPath,
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filesystem")
            .field("adapter", &self.adapter.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Filesystem {
    /// Bind an adapter with default settings.
    pub fn new(adapter: impl Adapter + 'static) -> Self {
        Self {
            adapter: Arc::new(adapter),
            config: FilesystemConfig::default(),
            prefix: VfsPath::root(),
        }
    }

    /// Bind an adapter with explicit settings.
    pub fn with_config(adapter: impl Adapter + 'static, config: FilesystemConfig) -> VfsResult<Self> {
        Self::from_arc(Arc::new(adapter), config)
    }

    /// Bind a shared adapter. Several filesystems may share one adapter,
    /// typically each under its own root prefix.
    pub fn from_arc(adapter: Arc<dyn Adapter>, config: FilesystemConfig) -> VfsResult<Self> {
        config.validate()?;
        let prefix = config.prefix();
        Ok(Self {
            adapter,
            config,
            prefix,
        })
    }

    pub fn config(&self) -> &FilesystemConfig {
        &self.config
    }

    /// Name of the bound adapter.
    pub fn adapter_name(&self) -> &str {
        self.adapter.name()
    }

    /// Caller-relative and adapter-absolute forms of `path`.
    fn locate(&self, path: &str) -> (VfsPath, VfsPath) {
        let relative = normalize(path);
        let absolute = self.prefix.join(&relative);
        (relative, absolute)
    }

    /// Report adapter errors against the caller's path rather than the
    /// prefixed key.
    fn unprefix(&self) -> impl Fn(VfsError) -> VfsError + Clone + Send + 'static {
        let prefix = self.prefix.clone();
        move |e| {
            e.map_path(|p| match normalize(p).strip_prefix(&prefix) {
                Some(relative) => relative.as_key(),
                None => p.to_string(),
            })
        }
    }

    fn read_encoding(&self, opts: &ReadOptions) -> Option<Encoding> {
        opts.encoding.or(self.config.default_encoding)
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// True for files and directories alike.
    #[tracing::instrument(skip(self), name = "vfs.exists")]
    pub async fn exists(&self, path: &str) -> VfsResult<bool> {
        let (_, full) = self.locate(path);
        self.adapter.exists(&full).await.map_err(self.unprefix())
    }

    /// Read a whole file with its metadata.
    #[tracing::instrument(skip(self, opts), name = "vfs.read")]
    pub async fn read(&self, path: &str, opts: ReadOptions) -> VfsResult<FileRecord> {
        let (relative, full) = self.locate(path);
        let (data, attr) = self.adapter.read(&full).await.map_err(self.unprefix())?;
        if attr.is_dir() {
            return Err(VfsError::is_a_directory(relative.as_key()));
        }
        let visibility = self
            .adapter
            .get_visibility(&full)
            .await
            .map_err(self.unprefix())?;

        let sample = &data[..data.len().min(self.config.sniff_len)];
        let meta = metadata::resolve(&relative, &attr, Some(sample));
        let contents = encoding::render(data, self.read_encoding(&opts));
        Ok(FileRecord::new(meta, contents, visibility))
    }

    /// Open a file as a stream of chunks.
    ///
    /// Missing attributes are looked up with a separate stat; if that also
    /// fails the stream is returned without metadata. When the adapter has
    /// no native content type, the first chunk is sniffed.
    #[tracing::instrument(skip(self, opts), name = "vfs.read_stream")]
    pub async fn read_stream(&self, path: &str, opts: ReadOptions) -> VfsResult<ReadStream> {
        let (relative, full) = self.locate(path);
        let (mut source, attr) = self
            .adapter
            .read_stream(&full)
            .await
            .map_err(self.unprefix())?;

        let attr = match attr {
            Some(attr) => Some(attr),
            None => match self.adapter.stat(&full).await {
                Ok(attr) => Some(attr),
                Err(e) => {
                    tracing::warn!(path = %full, error = %e, "stat unavailable, streaming without metadata");
                    None
                }
            },
        };
        let visibility = match self.adapter.get_visibility(&full).await {
            Ok(visibility) => Some(visibility),
            Err(e) => {
                tracing::warn!(path = %full, error = %e, "visibility unavailable");
                None
            }
        };

        let needs_sniff = attr.as_ref().is_some_and(|a| a.mimetype.is_none());
        let head = if needs_sniff { source.next().await } else { None };
        let metadata = attr.map(|attr| {
            let sample = match &head {
                Some(Ok(chunk)) => Some(&chunk[..chunk.len().min(self.config.sniff_len)]),
                Some(Err(_)) => None,
                None => Some(&[][..]),
            };
            metadata::resolve(&relative, &attr, sample)
        });
        let unprefix = self.unprefix();
        let source: ByteStream = stream::iter(head)
            .chain(source)
            .map(move |chunk| chunk.map_err(&unprefix))
            .boxed();

        let stream = match self.read_encoding(&opts) {
            None => source.map(|chunk| chunk.map(Contents::Bytes)).boxed(),
            Some(encoding) => render_chunks(source, encoding),
        };

        Ok(ReadStream {
            info: PathInfo::new(&relative),
            metadata,
            visibility,
            stream,
        })
    }

    #[tracing::instrument(skip(self), name = "vfs.get_visibility")]
    pub async fn get_visibility(&self, path: &str) -> VfsResult<Visibility> {
        let (_, full) = self.locate(path);
        self.adapter.get_visibility(&full).await.map_err(self.unprefix())
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write a file, replacing any previous contents.
    #[tracing::instrument(skip(self, content, opts), name = "vfs.write")]
    pub async fn write(
        &self,
        path: &str,
        content: impl Into<WriteContent>,
        opts: WriteOptions,
    ) -> VfsResult<()> {
        let (_, full) = self.locate(path);
        let data = encoding::to_bytes(content.into(), opts.encoding)?;
        let visibility = opts.visibility.unwrap_or(self.config.default_visibility);
        self.adapter
            .write(&full, data, visibility)
            .await
            .map_err(self.unprefix())
    }

    /// Write a file from a stream of byte or text chunks.
    ///
    /// Text chunks are decoded with the write encoding (UTF-8 by default);
    /// a unit split across chunks is reassembled. A byte chunk may not
    /// interrupt an incomplete text unit.
    #[tracing::instrument(skip(self, source, opts), name = "vfs.write_stream")]
    pub async fn write_stream<S, C>(&self, path: &str, source: S, opts: WriteOptions) -> VfsResult<()>
    where
        S: Stream<Item = VfsResult<C>> + Send + 'static,
        C: Into<WriteContent> + Send + 'static,
    {
        let (_, full) = self.locate(path);
        let visibility = opts.visibility.unwrap_or(self.config.default_visibility);
        let bytes = decode_chunks(source.boxed(), opts.encoding.unwrap_or(Encoding::Utf8));
        self.adapter
            .write_stream(&full, bytes, visibility)
            .await
            .map_err(self.unprefix())
    }

    /// Delete a file. Directories are refused.
    #[tracing::instrument(skip(self), name = "vfs.delete")]
    pub async fn delete(&self, path: &str) -> VfsResult<()> {
        let (_, full) = self.locate(path);
        self.adapter.delete(&full).await.map_err(self.unprefix())
    }

    /// Delete a directory and everything below it.
    ///
    /// Deleting something that is already gone succeeds. The root clears
    /// everything this filesystem can see.
    #[tracing::instrument(skip(self), name = "vfs.delete_dir")]
    pub async fn delete_dir(&self, path: &str) -> VfsResult<()> {
        let (_, full) = self.locate(path);
        match self.adapter.delete_dir(&full).await {
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %full, "delete_dir on missing path");
                Ok(())
            }
            other => other.map_err(self.unprefix()),
        }
    }

    #[tracing::instrument(skip(self), name = "vfs.move")]
    pub async fn move_file(&self, from: &str, to: &str) -> VfsResult<()> {
        let (_, from) = self.locate(from);
        let (_, to) = self.locate(to);
        self.adapter.rename(&from, &to).await.map_err(self.unprefix())
    }

    #[tracing::instrument(skip(self), name = "vfs.copy")]
    pub async fn copy(&self, from: &str, to: &str) -> VfsResult<()> {
        let (_, from) = self.locate(from);
        let (_, to) = self.locate(to);
        self.adapter.copy(&from, &to).await.map_err(self.unprefix())
    }

    /// Change visibility. The value is validated before the adapter is
    /// consulted, so an invalid value never reports `NotFound`.
    #[tracing::instrument(skip(self, visibility), name = "vfs.set_visibility")]
    pub async fn set_visibility(&self, path: &str, visibility: impl IntoVisibility) -> VfsResult<()> {
        let visibility = visibility.into_visibility()?;
        let (_, full) = self.locate(path);
        self.adapter
            .set_visibility(&full, visibility)
            .await
            .map_err(self.unprefix())
    }
}

/// Caller chunks to bytes. Stops after the first error.
fn decode_chunks<C>(source: BoxStream<'static, VfsResult<C>>, encoding: Encoding) -> ByteStream
where
    C: Into<WriteContent> + Send + 'static,
{
    stream::unfold(
        Some((source, StreamDecoder::new(encoding))),
        move |state| async move {
            let (mut source, mut decoder) = state?;
            match source.next().await {
                Some(Ok(chunk)) => {
                    let item = match chunk.into() {
                        WriteContent::Bytes(_) if decoder.has_pending() => Err(VfsError::encoding(
                            encoding,
                            "byte chunk inside an incomplete text unit",
                        )),
                        WriteContent::Bytes(bytes) => Ok(bytes),
                        WriteContent::Text(text) => decoder.push(&text),
                    };
                    let next = item.is_ok().then_some((source, decoder));
                    Some((item, next))
                }
                Some(Err(e)) => Some((Err(e), None)),
                None => Some((decoder.finish(), None)),
            }
        },
    )
    .boxed()
}

/// Stored bytes to text chunks. Empty chunks are dropped.
fn render_chunks(source: ByteStream, encoding: Encoding) -> ContentStream {
    stream::unfold(
        Some((source, StreamEncoder::new(encoding))),
        |state| async move {
            let (mut source, mut encoder) = state?;
            match source.next().await {
                Some(Ok(chunk)) => {
                    let text = encoder.push(&chunk);
                    Some((Ok(text), Some((source, encoder))))
                }
                Some(Err(e)) => Some((Err(e), None)),
                None => Some((Ok(encoder.finish()), None)),
            }
        },
    )
    .filter(|chunk| futures::future::ready(!matches!(chunk, Ok(text) if text.is_empty())))
    .map(|chunk| chunk.map(Contents::Text))
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MemoryBackend, ObjectStoreBackend};

    fn fs() -> Filesystem {
        Filesystem::new(MemoryBackend::new())
    }

    #[tokio::test]
    async fn test_read_record() {
        let fs = fs();
        fs.write("path/to/test1.txt", "Test", WriteOptions::new())
            .await
            .unwrap();

        let record = fs
            .read("/path/to/test1.txt", ReadOptions::new().with_encoding(Encoding::Utf8))
            .await
            .unwrap();
        assert_eq!(record.contents, "Test");
        assert_eq!(record.path, "path/to/test1.txt");
        assert_eq!(record.name, "test1.txt");
        assert_eq!(record.ext, ".txt");
        assert_eq!(record.parent_dir, "path/to");
        assert_eq!(record.mimetype, "text/plain");
        assert_eq!(record.size, 4);
        assert_eq!(record.visibility, Visibility::Public);
        assert!(record.is_file);
        assert!(!record.is_dir);
    }

    #[tokio::test]
    async fn test_read_without_encoding_returns_bytes() {
        let fs = fs();
        fs.write("a.bin", &[0u8, 159, 146, 150][..], WriteOptions::new())
            .await
            .unwrap();
        let record = fs.read("a.bin", ReadOptions::new()).await.unwrap();
        assert_eq!(record.contents, &[0u8, 159, 146, 150][..]);
        assert_eq!(record.mimetype, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_read_errors() {
        let fs = fs();
        assert!(fs.read("missing.txt", ReadOptions::new()).await.unwrap_err().is_not_found());

        fs.write("dir/file.txt", "x", WriteOptions::new()).await.unwrap();
        assert!(matches!(
            fs.read("dir", ReadOptions::new()).await,
            Err(VfsError::IsADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_write_text_with_encoding() {
        let fs = fs();
        fs.write("b64.txt", "SGVsbG8=", WriteOptions::new().with_encoding(Encoding::Base64))
            .await
            .unwrap();
        let record = fs
            .read("b64.txt", ReadOptions::new().with_encoding(Encoding::Utf8))
            .await
            .unwrap();
        assert_eq!(record.contents, "Hello");

        let record = fs
            .read("b64.txt", ReadOptions::new().with_encoding(Encoding::Hex))
            .await
            .unwrap();
        assert_eq!(record.contents, "48656c6c6f");
    }

    #[tokio::test]
    async fn test_default_encoding_and_visibility() {
        let config = FilesystemConfig::default()
            .with_default_encoding(Encoding::Utf8)
            .with_default_visibility(Visibility::Private);
        let fs = Filesystem::with_config(MemoryBackend::new(), config).unwrap();

        fs.write("a.txt", "abc", WriteOptions::new()).await.unwrap();
        let record = fs.read("a.txt", ReadOptions::new()).await.unwrap();
        assert_eq!(record.contents, "abc");
        assert_eq!(record.visibility, Visibility::Private);
    }

    #[tokio::test]
    async fn test_root_prefix_isolates() {
        let adapter: Arc<dyn Adapter> = Arc::new(MemoryBackend::new());
        let a = Filesystem::from_arc(
            adapter.clone(),
            FilesystemConfig::default().with_root_prefix("tenant-a"),
        )
        .unwrap();
        let b = Filesystem::from_arc(
            adapter.clone(),
            FilesystemConfig::default().with_root_prefix("tenant-b"),
        )
        .unwrap();

        a.write("shared.txt", "from a", WriteOptions::new()).await.unwrap();
        assert!(!b.exists("shared.txt").await.unwrap());

        let record = a.read("shared.txt", ReadOptions::new()).await.unwrap();
        assert_eq!(record.path, "shared.txt");

        b.write("other.txt", "from b", WriteOptions::new()).await.unwrap();
        a.delete_dir("/").await.unwrap();
        assert!(!a.exists("shared.txt").await.unwrap());
        assert!(b.exists("other.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_errors_name_caller_paths() {
        let config = FilesystemConfig::default().with_root_prefix("tenant");
        let fs = Filesystem::with_config(MemoryBackend::new(), config).unwrap();

        match fs.read("docs/missing.txt", ReadOptions::new()).await {
            Err(VfsError::NotFound(path)) => assert_eq!(path, "docs/missing.txt"),
            other => panic!("unexpected result: {other:?}"),
        }
        match fs.delete("/gone.txt").await {
            Err(VfsError::NotFound(path)) => assert_eq!(path, "gone.txt"),
            other => panic!("unexpected result: {other:?}"),
        }

        fs.write("docs/a.txt", "x", WriteOptions::new()).await.unwrap();
        match fs.read("docs", ReadOptions::new()).await {
            Err(VfsError::IsADirectory(path)) => assert_eq!(path, "docs"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_dir_is_idempotent() {
        let fs = fs();
        fs.delete_dir("never/existed").await.unwrap();
        fs.write("d/f.txt", "x", WriteOptions::new()).await.unwrap();
        fs.delete_dir("d").await.unwrap();
        fs.delete_dir("d").await.unwrap();
        assert!(!fs.exists("d/f.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_visibility_validates_first() {
        let fs = fs();
        let err = fs.set_visibility("missing.txt", 13i32).await.unwrap_err();
        assert!(matches!(err, VfsError::InvalidVisibility(ref v) if v == "13"));

        let err = fs.set_visibility("missing.txt", "private").await.unwrap_err();
        assert!(err.is_not_found());

        fs.write("f.txt", "x", WriteOptions::new()).await.unwrap();
        fs.set_visibility("f.txt", 1u8).await.unwrap();
        assert_eq!(fs.get_visibility("f.txt").await.unwrap(), Visibility::Private);
    }

    #[tokio::test]
    async fn test_write_stream_text_chunks_split_units() {
        let fs = fs();
        // "Hello world" in base64, split mid-group
        let chunks = vec![Ok("SGVs"), Ok("bG8gd2"), Ok("9y"), Ok("bGQ=")];
        fs.write_stream(
            "s.txt",
            stream::iter(chunks),
            WriteOptions::new().with_encoding(Encoding::Base64),
        )
        .await
        .unwrap();

        let record = fs
            .read("s.txt", ReadOptions::new().with_encoding(Encoding::Utf8))
            .await
            .unwrap();
        assert_eq!(record.contents, "Hello world");
    }

    #[tokio::test]
    async fn test_write_stream_rejects_bytes_inside_text_unit() {
        let fs = fs();
        let chunks: Vec<VfsResult<WriteContent>> = vec![
            Ok("6".into()),
            Ok(Bytes::from_static(b"x").into()),
            Ok("1".into()),
        ];
        let err = fs
            .write_stream("h.bin", stream::iter(chunks), WriteOptions::new().with_encoding(Encoding::Hex))
            .await
            .unwrap_err();
        assert!(matches!(err, VfsError::Stream { .. }));
        assert!(!fs.exists("h.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_stream_text_across_chunks() {
        let fs = Filesystem::new(MemoryBackend::new().with_chunk_size(1));
        fs.write("u.txt", "héllo → wörld", WriteOptions::new()).await.unwrap();

        let stream = fs
            .read_stream("u.txt", ReadOptions::new().with_encoding(Encoding::Utf8))
            .await
            .unwrap();
        let meta = stream.metadata.clone().unwrap();
        assert_eq!(meta.info.name, "u.txt");
        assert_eq!(stream.visibility, Some(Visibility::Public));
        assert_eq!(stream.collect().await.unwrap(), "héllo → wörld");
    }

    #[tokio::test]
    async fn test_read_stream_sniffs_first_chunk() {
        let fs = fs();
        let png = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
        fs.write("img", &png[..], WriteOptions::new()).await.unwrap();

        let stream = fs.read_stream("img", ReadOptions::new()).await.unwrap();
        assert_eq!(stream.metadata.as_ref().unwrap().mimetype, "image/png");
        assert_eq!(stream.collect().await.unwrap(), &png[..]);
    }

    #[tokio::test]
    async fn test_read_stream_uses_stat_when_adapter_omits_attr() {
        let fs = Filesystem::new(ObjectStoreBackend::new());
        fs.write("doc.txt", "plain", WriteOptions::new()).await.unwrap();

        let stream = fs.read_stream("doc.txt", ReadOptions::new()).await.unwrap();
        let meta = stream.metadata.as_ref().unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.mimetype, "text/plain");
    }

    #[tokio::test]
    async fn test_move_and_copy() {
        let fs = fs();
        fs.write("a.txt", "original", WriteOptions::new()).await.unwrap();

        fs.copy("a.txt", "b.txt").await.unwrap();
        fs.move_file("a.txt", "moved/c.txt").await.unwrap();

        assert!(!fs.exists("a.txt").await.unwrap());
        for path in ["b.txt", "moved/c.txt"] {
            let record = fs
                .read(path, ReadOptions::new().with_encoding(Encoding::Utf8))
                .await
                .unwrap();
            assert_eq!(record.contents, "original");
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = FilesystemConfig {
            sniff_len: 0,
            ..FilesystemConfig::default()
        };
        assert!(Filesystem::with_config(MemoryBackend::new(), config).is_err());
    }
}
