//! Storage adapters.
//!
//! Backends implement [`Adapter`](crate::Adapter) for different storage types.

mod local;
mod memory;
mod object;

pub use local::{LocalBackend, LocalConfig};
pub use memory::MemoryBackend;
pub use object::ObjectStoreBackend;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream;

use crate::error::{VfsError, VfsResult};
use crate::path::VfsPath;
use crate::types::ByteStream;

/// Default chunk size for streams served from memory.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Drain a stream into one buffer, reporting source errors as stream failures.
async fn collect_stream(path: &VfsPath, mut stream: ByteStream) -> VfsResult<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| VfsError::stream(path.as_key(), e.to_string()))?;
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Serve an in-memory buffer as a stream of `chunk_size` slices.
fn chunked(data: Bytes, chunk_size: usize) -> ByteStream {
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<VfsResult<Bytes>> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
        .collect();
    stream::iter(chunks).boxed()
}
