//! Read-only resource storage for huzi.
//!
//! This crate provides:
//! - A [`ResourceStore`] abstraction over named binary resources
//! - Lazy, chunked byte streams for whole resources and inclusive byte ranges
//! - A local filesystem backend with path traversal protection

pub mod backends;
pub mod content_type;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use content_type::content_type_for;
pub use error::{StorageError, StorageResult};
pub use traits::{
    ByteStream, ObjectMeta, OpenResource, ResourceReader, ResourceStore, STREAM_CHUNK_SIZE,
};
