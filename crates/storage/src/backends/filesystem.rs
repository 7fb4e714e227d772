//! Local filesystem storage backend.

use crate::content_type::content_type_for;
use crate::error::{StorageError, StorageResult};
use crate::traits::{
    ByteStream, ObjectMeta, OpenResource, ResourceReader, ResourceStore, STREAM_CHUNK_SIZE,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::instrument;

/// Read-only store over a directory on local disk.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a backend rooted at `root`.
    ///
    /// The directory is not required to exist yet; lookups against a missing
    /// root report [`StorageError::NotFound`].
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the full path for a key, with path traversal protection.
    ///
    /// `canonicalize` and `symlink_metadata` block, so validation runs on the
    /// blocking pool.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Resolve `key` under `root`, rejecting anything that escapes it,
    /// including through symlinks.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key:?}"
            )));
        }

        for component in Path::new(key).components() {
            if !matches!(component, std::path::Component::Normal(_)) {
                return Err(StorageError::InvalidKey(format!(
                    "contains unsafe path component: {key}"
                )));
            }
        }

        let path = root.join(key);

        let root_canonical = root
            .canonicalize()
            .map_err(|e| StorageError::from_io(key, e))?;

        let meta = std::fs::symlink_metadata(&path).map_err(|e| StorageError::from_io(key, e))?;

        let canonical = path.canonicalize().map_err(|e| {
            if meta.file_type().is_symlink() {
                StorageError::InvalidKey(format!("symlink target missing or invalid: {key}"))
            } else {
                StorageError::from_io(key, e)
            }
        })?;

        if !canonical.starts_with(&root_canonical) {
            return Err(StorageError::InvalidKey(format!(
                "resolved path escapes storage root: {key}"
            )));
        }

        Ok(canonical)
    }
}

/// An open file, read lazily in [`STREAM_CHUNK_SIZE`] chunks.
struct FileReader {
    file: fs::File,
}

impl ResourceReader for FileReader {
    fn into_stream(self: Box<Self>, start: u64, len: u64) -> ByteStream {
        read_span(self.file, start, len)
    }
}

/// Stream `len` bytes of `file` starting at offset `start`.
///
/// A file that ends before `len` bytes are read yields an `UnexpectedEof`
/// error instead of a short body.
fn read_span(mut file: fs::File, start: u64, len: u64) -> ByteStream {
    let stream = async_stream::try_stream! {
        if start > 0 {
            file.seek(std::io::SeekFrom::Start(start)).await?;
        }
        let mut remaining = len;
        let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
        while remaining > 0 {
            let want = usize::try_from(remaining).map_or(STREAM_CHUNK_SIZE, |r| r.min(STREAM_CHUNK_SIZE));
            let n = file.read(&mut buf[..want]).await?;
            if n == 0 {
                Err::<(), _>(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("resource ended with {remaining} bytes outstanding"),
                ))?;
            }
            remaining -= n as u64;
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    };
    Box::pin(stream)
}

#[async_trait]
impl ResourceStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn open(&self, key: &str) -> StorageResult<OpenResource> {
        let path = self.key_path(key).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| StorageError::from_io(key, e))?;
        // Size comes from the handle, not the path.
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let meta = ObjectMeta {
            size: metadata.len(),
            content_type: Some(content_type_for(key).to_string()),
        };
        Ok(OpenResource::new(meta, Box::new(FileReader { file })))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::other(format!(
                "storage root is not a directory: {}",
                self.root.display()
            ))));
        }
        Ok(())
    }
}
