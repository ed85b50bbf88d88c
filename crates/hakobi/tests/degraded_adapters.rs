//! Façade behaviour over adapters that misbehave in controlled ways.
//!
//! `Flaky` wraps a memory backend and can cut streams short or refuse to
//! stat, which is how remote stores fail in practice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use hakobi::backends::MemoryBackend;
use hakobi::{
    Adapter, ByteStream, Contents, Encoding, FileAttr, Filesystem, ReadOptions, VfsError,
    VfsPath, VfsResult, Visibility, WriteOptions,
};

#[derive(Default)]
struct Flaky {
    inner: MemoryBackend,
    cut_streams: AtomicBool,
    no_stat: AtomicBool,
}

#[async_trait]
impl Adapter for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn exists(&self, path: &VfsPath) -> VfsResult<bool> {
        self.inner.exists(path).await
    }

    async fn stat(&self, path: &VfsPath) -> VfsResult<FileAttr> {
        if self.no_stat.load(Ordering::SeqCst) {
            return Err(VfsError::other("stat not supported"));
        }
        self.inner.stat(path).await
    }

    async fn read(&self, path: &VfsPath) -> VfsResult<(Bytes, FileAttr)> {
        self.inner.read(path).await
    }

    async fn read_stream(&self, path: &VfsPath) -> VfsResult<(ByteStream, Option<FileAttr>)> {
        let (stream, _) = self.inner.read_stream(path).await?;
        let stream = if self.cut_streams.load(Ordering::SeqCst) {
            let key = path.as_key();
            stream
                .take(2)
                .chain(stream::once(async move {
                    Err(VfsError::stream(key, "connection reset"))
                }))
                .boxed()
        } else {
            stream
        };
        Ok((stream, None))
    }

    async fn get_visibility(&self, path: &VfsPath) -> VfsResult<Visibility> {
        self.inner.get_visibility(path).await
    }

    async fn write(&self, path: &VfsPath, data: Bytes, visibility: Visibility) -> VfsResult<()> {
        self.inner.write(path, data, visibility).await
    }

    async fn write_stream(
        &self,
        path: &VfsPath,
        stream: ByteStream,
        visibility: Visibility,
    ) -> VfsResult<()> {
        self.inner.write_stream(path, stream, visibility).await
    }

    async fn delete(&self, path: &VfsPath) -> VfsResult<()> {
        self.inner.delete(path).await
    }

    async fn delete_dir(&self, path: &VfsPath) -> VfsResult<()> {
        self.inner.delete_dir(path).await
    }

    async fn rename(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        self.inner.rename(from, to).await
    }

    async fn copy(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        self.inner.copy(from, to).await
    }

    async fn set_visibility(&self, path: &VfsPath, visibility: Visibility) -> VfsResult<()> {
        self.inner.set_visibility(path, visibility).await
    }
}

fn setup() -> (Arc<Flaky>, Filesystem) {
    let flaky = Arc::new(Flaky {
        inner: MemoryBackend::new().with_chunk_size(4),
        ..Flaky::default()
    });
    let fs = Filesystem::from_arc(flaky.clone(), Default::default()).unwrap();
    (flaky, fs)
}

#[tokio::test]
async fn test_stream_without_stat_degrades() {
    let (flaky, fs) = setup();
    fs.write("a.txt", "some text", WriteOptions::new()).await.unwrap();
    flaky.no_stat.store(true, Ordering::SeqCst);

    let stream = fs
        .read_stream("a.txt", ReadOptions::new().with_encoding(Encoding::Utf8))
        .await
        .unwrap();
    assert!(stream.metadata.is_none());
    assert_eq!(stream.info.ext, ".txt");
    assert_eq!(stream.visibility, Some(Visibility::Public));
    assert_eq!(stream.collect().await.unwrap(), "some text");
}

#[tokio::test]
async fn test_stream_failure_keeps_delivered_chunks() {
    let (flaky, fs) = setup();
    fs.write("a.bin", &b"0123456789abcdef"[..], WriteOptions::new())
        .await
        .unwrap();
    flaky.cut_streams.store(true, Ordering::SeqCst);

    let mut stream = fs.read_stream("a.bin", ReadOptions::new()).await.unwrap().stream;
    let mut delivered = Vec::new();
    let mut failure = None;
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(Contents::Bytes(b)) => delivered.extend_from_slice(&b),
            Ok(Contents::Text(_)) => panic!("no encoding was requested"),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    assert_eq!(delivered, b"01234567");
    assert!(matches!(failure, Some(VfsError::Stream { .. })));
}

#[tokio::test]
async fn test_failed_write_stream_keeps_previous_contents() {
    let (_flaky, fs) = setup();
    fs.write("a.txt", "before", WriteOptions::new()).await.unwrap();

    let source = stream::iter(vec![
        Ok(Bytes::from_static(b"after, but")),
        Err(VfsError::other("producer died")),
    ]);
    let err = fs
        .write_stream("a.txt", source, WriteOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, VfsError::Stream { .. }));

    let record = fs
        .read("a.txt", ReadOptions::new().with_encoding(Encoding::Utf8))
        .await
        .unwrap();
    assert_eq!(record.contents, "before");
}

#[tokio::test]
async fn test_invalid_visibility_never_reaches_adapter() {
    let (_flaky, fs) = setup();
    fs.write("a.txt", "x", WriteOptions::new()).await.unwrap();

    for bad in ["13", "protected", ""] {
        let err = fs.set_visibility("a.txt", bad).await.unwrap_err();
        assert!(err.to_string().contains(bad), "{err}");
    }
    let err = fs.set_visibility("a.txt", 13u64).await.unwrap_err();
    assert!(err.to_string().contains("13"));
    assert_eq!(fs.get_visibility("a.txt").await.unwrap(), Visibility::Public);
}

#[tokio::test]
async fn test_delete_ancestor_removes_descendants() {
    let (_flaky, fs) = setup();
    for path in ["a/b/c.txt", "a/d.txt", "e.txt"] {
        fs.write(path, "x", WriteOptions::new()).await.unwrap();
    }

    fs.delete_dir("a").await.unwrap();
    assert!(!fs.exists("a/b/c.txt").await.unwrap());
    assert!(!fs.exists("a/d.txt").await.unwrap());
    assert!(fs.exists("e.txt").await.unwrap());

    fs.delete_dir("").await.unwrap();
    assert!(!fs.exists("e.txt").await.unwrap());
}
