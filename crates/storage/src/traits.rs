//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use huzi_core::ByteRange;
use std::pin::Pin;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Chunk size for streaming reads (64 KiB).
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Read-only access to named binary resources.
///
/// Streams are lazy: bytes are read from the backend as the consumer polls,
/// so memory use is bounded by [`STREAM_CHUNK_SIZE`] regardless of resource size.
#[async_trait]
pub trait ResourceStore: Send + Sync + 'static {
    /// Open a resource.
    ///
    /// The returned metadata and the bytes later streamed from it come from
    /// the same handle, so a concurrent replacement of the resource cannot
    /// make them disagree.
    async fn open(&self, key: &str) -> StorageResult<OpenResource>;

    /// Get the name of this storage backend.
    ///
    /// Used for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is usable.
    ///
    /// The default implementation returns Ok(()).
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Backend-specific byte source behind an [`OpenResource`].
pub trait ResourceReader: Send {
    /// Consume the reader, streaming `len` bytes starting at `start`.
    ///
    /// Callers guarantee `start + len <= size`.
    fn into_stream(self: Box<Self>, start: u64, len: u64) -> ByteStream;
}

/// An opened resource: its metadata plus a one-shot reader.
pub struct OpenResource {
    pub meta: ObjectMeta,
    reader: Box<dyn ResourceReader>,
}

impl OpenResource {
    pub fn new(meta: ObjectMeta, reader: Box<dyn ResourceReader>) -> Self {
        Self { meta, reader }
    }

    /// Stream the whole resource.
    pub fn stream(self) -> ByteStream {
        let size = self.meta.size;
        self.reader.into_stream(0, size)
    }

    /// Stream the inclusive span `range`.
    ///
    /// The span must already be validated against the resource length; a span
    /// past the end fails with [`StorageError::InvalidRange`].
    pub fn stream_range(self, range: ByteRange) -> StorageResult<ByteStream> {
        if range.end < range.start {
            return Err(StorageError::InvalidRange(format!(
                "end ({}) < start ({})",
                range.end, range.start
            )));
        }
        if range.end >= self.meta.size {
            return Err(StorageError::InvalidRange(format!(
                "end ({}) is past the last byte of a {}-byte resource",
                range.end, self.meta.size
            )));
        }
        Ok(self.reader.into_stream(range.start, range.len()))
    }
}

impl std::fmt::Debug for OpenResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenResource")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Metadata about a stored resource.
#[derive(Clone, Debug)]
pub struct ObjectMeta {
    /// Resource size in bytes.
    pub size: u64,
    /// Content type (if available).
    pub content_type: Option<String>,
}
