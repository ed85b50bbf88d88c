//! Behavioural checks every adapter must pass.
//!
//! [`run`] drives a [`Filesystem`] through the full operation set and
//! fails on the first contract violation. Adapter crates call it from
//! their own tests:
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use hakobi::{Filesystem, FilesystemConfig, backends::MemoryBackend};
//!
//! let config = FilesystemConfig::default()
//!     .with_root_prefix(uuid::Uuid::new_v4().to_string());
//! let fs = Filesystem::with_config(MemoryBackend::new(), config)?;
//! hakobi::conformance::run(&fs).await?;
//! # Ok(())
//! # }
//! ```
//!
//! The suite clears the filesystem root between groups, so bind it to a
//! throwaway adapter or a random root prefix.

use anyhow::{Context, Result, ensure};
use bytes::Bytes;
use futures::stream;

use crate::encoding::Encoding;
use crate::error::{VfsError, VfsResult};
use crate::filesystem::Filesystem;
use crate::types::{Contents, ReadOptions, WriteOptions};
use crate::visibility::Visibility;

/// Run every check against `fs`.
pub async fn run(fs: &Filesystem) -> Result<()> {
    tracing::info!(adapter = fs.adapter_name(), "running conformance suite");
    fs.delete_dir("/").await?;

    basics(fs).await.context("basics")?;

    rename(fs).await.context("rename")?;
    reset(fs).await?;
    copy(fs).await.context("copy")?;
    reset(fs).await?;
    metadata(fs).await.context("metadata")?;
    reset(fs).await?;
    streams(fs).await.context("streams")?;
    reset(fs).await?;
    large_stream(fs).await.context("large stream")?;
    reset(fs).await?;
    visibility(fs).await.context("visibility")?;
    reset(fs).await?;
    invalid_visibility(fs).await.context("invalid visibility")?;
    reset(fs).await?;
    overwrite(fs).await.context("overwrite")?;
    reset(fs).await?;
    encodings(fs).await.context("encodings")?;
    reset(fs).await?;
    delete(fs).await.context("delete")?;
    reset(fs).await?;

    tracing::info!(adapter = fs.adapter_name(), "conformance suite passed");
    Ok(())
}

/// Clear the root and check that it took.
async fn reset(fs: &Filesystem) -> Result<()> {
    fs.delete_dir("/").await.context("clearing root")?;
    ensure!(!fs.exists("path").await?, "root delete left `path` behind");
    Ok(())
}

fn utf8() -> ReadOptions {
    ReadOptions::new().with_encoding(Encoding::Utf8)
}

async fn read_text(fs: &Filesystem, path: &str) -> Result<String> {
    let record = fs.read(path, utf8()).await?;
    record
        .contents
        .as_text()
        .map(str::to_string)
        .with_context(|| format!("{path}: expected text contents"))
}

async fn basics(fs: &Filesystem) -> Result<()> {
    fs.write("test.txt", "Hello, friend!", WriteOptions::new()).await?;
    ensure!(fs.exists("test.txt").await?, "written file does not exist");
    ensure!(read_text(fs, "test.txt").await? == "Hello, friend!");

    fs.delete("test.txt").await?;
    ensure!(!fs.exists("test.txt").await?, "deleted file still exists");

    fs.write("path/to/test.txt", "Test", WriteOptions::new()).await?;
    ensure!(
        fs.exists("path/to/test.txt").await?,
        "intermediate directories were not created"
    );
    ensure!(fs.exists("path/to").await?, "directories should exist");

    fs.delete_dir("path").await?;
    ensure!(!fs.exists("path/to/test.txt").await?, "delete_dir left a descendant");
    fs.delete_dir("path").await.context("second delete_dir must succeed")?;
    Ok(())
}

async fn rename(fs: &Filesystem) -> Result<()> {
    fs.write("path/to/test1.txt", "Test", WriteOptions::new()).await?;
    fs.move_file("path/to/test1.txt", "path/to/test2.txt").await?;

    ensure!(!fs.exists("path/to/test1.txt").await?, "source survived move");
    ensure!(fs.exists("path/to/test2.txt").await?, "destination missing after move");
    ensure!(read_text(fs, "path/to/test2.txt").await? == "Test");
    Ok(())
}

async fn copy(fs: &Filesystem) -> Result<()> {
    fs.write("path/to/test1.txt", "Test", WriteOptions::new()).await?;
    fs.copy("path/to/test1.txt", "path/to/test2.txt").await?;

    ensure!(fs.exists("path/to/test1.txt").await?, "source missing after copy");
    ensure!(fs.exists("path/to/test2.txt").await?, "destination missing after copy");
    ensure!(read_text(fs, "path/to/test1.txt").await? == "Test");
    ensure!(read_text(fs, "path/to/test2.txt").await? == "Test");

    let missing = fs.copy("path/to/nope.txt", "path/to/test3.txt").await;
    ensure!(
        matches!(missing, Err(ref e) if e.is_not_found()),
        "copy of a missing file: {missing:?}"
    );
    ensure!(
        !fs.exists("path/to/test3.txt").await?,
        "failed copy left a destination behind"
    );
    Ok(())
}

async fn metadata(fs: &Filesystem) -> Result<()> {
    fs.write("path/to/test1.txt", "Test", WriteOptions::new()).await?;
    let file = fs.read("path/to/test1.txt", utf8()).await?;

    ensure!(file.contents == "Test", "contents: {:?}", file.contents);
    ensure!(file.name == "test1.txt", "name: {}", file.name);
    ensure!(file.ext == ".txt", "ext: {}", file.ext);
    ensure!(file.path == "path/to/test1.txt", "path: {}", file.path);
    ensure!(file.parent_dir == "path/to", "parent_dir: {}", file.parent_dir);
    ensure!(file.visibility == Visibility::Public, "visibility: {}", file.visibility);
    ensure!(file.size == 4, "size: {}", file.size);
    ensure!(file.is_file && !file.is_dir, "kind flags");
    ensure!(file.mimetype == "text/plain", "mimetype: {}", file.mimetype);

    let missing = fs.read("path/to/missing.txt", utf8()).await;
    ensure!(
        matches!(missing, Err(ref e) if e.is_not_found()),
        "read of a missing file: {missing:?}"
    );
    let through_file = fs.read("path/to/test1.txt/x", utf8()).await;
    ensure!(
        matches!(through_file, Err(ref e) if e.is_not_found()),
        "read below a file: {through_file:?}"
    );
    Ok(())
}

async fn streams(fs: &Filesystem) -> Result<()> {
    let source = stream::iter(vec![Ok::<_, VfsError>("Test Stream")]);
    fs.write_stream("path/to/test1.txt", source, WriteOptions::new())
        .await?;

    let stream = fs.read_stream("path/to/test1.txt", utf8()).await?;
    ensure!(stream.info.name == "test1.txt");
    let contents = stream.collect().await?;
    ensure!(contents == "Test Stream", "streamed contents: {contents:?}");
    Ok(())
}

async fn large_stream(fs: &Filesystem) -> Result<()> {
    let payload: Vec<u8> = (0..200_003u32).map(|i| (i * 31 % 251) as u8).collect();
    let chunks: Vec<VfsResult<Bytes>> = payload
        .chunks(7_001)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    fs.write_stream("path/big.bin", stream::iter(chunks), WriteOptions::new())
        .await?;

    let stream = fs.read_stream("path/big.bin", ReadOptions::new()).await?;
    match stream.collect().await? {
        Contents::Bytes(bytes) => ensure!(
            bytes[..] == payload[..],
            "stream round trip changed {} bytes into {}",
            payload.len(),
            bytes.len()
        ),
        Contents::Text(_) => anyhow::bail!("expected raw bytes without an encoding"),
    }
    Ok(())
}

async fn visibility(fs: &Filesystem) -> Result<()> {
    fs.write("path/to/test.txt", "Test", WriteOptions::new()).await?;
    ensure!(fs.get_visibility("path/to/test.txt").await? == Visibility::Public);

    fs.set_visibility("path/to/test.txt", Visibility::Private)
        .await?;
    ensure!(fs.get_visibility("path/to/test.txt").await? == Visibility::Private);

    fs.write(
        "path/to/private.txt",
        "Test",
        WriteOptions::new().with_visibility(Visibility::Private),
    )
    .await?;
    ensure!(fs.get_visibility("path/to/private.txt").await? == Visibility::Private);
    Ok(())
}

async fn invalid_visibility(fs: &Filesystem) -> Result<()> {
    fs.write(
        "path/to/test.txt",
        "Test",
        WriteOptions::new().with_visibility(Visibility::Private),
    )
    .await?;

    let err = fs
        .set_visibility("path/to/test.txt", 13i32)
        .await
        .err()
        .context("visibility 13 was accepted")?;
    ensure!(
        matches!(err, VfsError::InvalidVisibility(_)) && err.to_string().contains("13"),
        "unexpected error: {err}"
    );
    ensure!(fs.get_visibility("path/to/test.txt").await? == Visibility::Private);
    ensure!(read_text(fs, "path/to/test.txt").await? == "Test");
    Ok(())
}

async fn overwrite(fs: &Filesystem) -> Result<()> {
    fs.write("path/over.txt", "a much longer first version", WriteOptions::new())
        .await?;
    fs.write("path/over.txt", "second", WriteOptions::new()).await?;
    let text = read_text(fs, "path/over.txt").await?;
    ensure!(text == "second", "overwrite produced {text:?}");
    Ok(())
}

async fn encodings(fs: &Filesystem) -> Result<()> {
    let samples = [
        (Encoding::Utf8, "héllo, wörld 🌍"),
        (Encoding::Ascii, "plain ascii text"),
        (Encoding::Latin1, "café crème"),
        (Encoding::Utf16Le, "héllo, wörld 🌍"),
        (Encoding::Base64, "SGVsbG8sIGZyaWVuZCE="),
        (Encoding::Hex, "48656c6c6f2c20667269656e6421"),
    ];
    for (encoding, text) in samples {
        let path = format!("path/enc/{encoding}.txt");
        fs.write(&path, text, WriteOptions::new().with_encoding(encoding))
            .await?;
        let record = fs
            .read(&path, ReadOptions::new().with_encoding(encoding))
            .await?;
        ensure!(
            record.contents == text,
            "{encoding} round trip gave {:?}",
            record.contents
        );
    }
    Ok(())
}

async fn delete(fs: &Filesystem) -> Result<()> {
    fs.write("path/to/a.txt", "a", WriteOptions::new()).await?;
    fs.write("path/to/deeper/b.txt", "b", WriteOptions::new()).await?;

    let refused = fs.delete("path/to").await;
    ensure!(refused.is_err(), "delete accepted a directory");
    ensure!(fs.exists("path/to/a.txt").await?, "refused delete removed data");

    let missing = fs.delete("path/to/none.txt").await;
    ensure!(
        matches!(missing, Err(ref e) if e.is_not_found()),
        "delete of a missing file: {missing:?}"
    );

    let through_file = fs.delete("path/to/a.txt/x").await;
    ensure!(
        matches!(through_file, Err(ref e) if e.is_not_found()),
        "delete below a file: {through_file:?}"
    );
    fs.delete_dir("path/to/a.txt/x")
        .await
        .context("delete_dir below a file must succeed")?;
    ensure!(fs.exists("path/to/a.txt").await?, "delete_dir below a file removed the file");

    fs.delete_dir("path/to").await?;
    ensure!(!fs.exists("path/to/a.txt").await?);
    ensure!(!fs.exists("path/to/deeper/b.txt").await?);
    Ok(())
}
