//! Downward interfaces to the per-file I/O engine and the on-disk block
//! cache. Both are external collaborators; the orchestrator only drives
//! them and reconciles entry sizes afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::fs::Inode;

#[derive(Debug, Error)]
pub enum FileIoError {
    #[error("file i/o failed: {0}")]
    Failed(String),
}

/// A single open file's streaming engine: buffered reads, buffered writes
/// and the multipart upload that happens behind them.
#[async_trait]
pub trait FileIo: Send + Sync {
    async fn read_buffer(&self, size: u32, off: u64) -> Result<Bytes, FileIoError>;

    /// Write `buf` at `off`; returns the number of bytes accepted.
    async fn write_buffer(&self, buf: Bytes, off: u64) -> Result<usize, FileIoError>;

    /// Dispose of the handle, flushing any pending upload.
    async fn release(&self);
}

/// Creates [`FileIo`] engines and performs the one-shot transfers used
/// for symlink bodies.
#[async_trait]
pub trait FileIoFactory: Send + Sync {
    /// `new_object` selects the new-upload path over read-existing.
    fn create(&self, fullpath: &str, ino: Inode, new_object: bool) -> Arc<dyn FileIo>;

    async fn simple_upload(
        &self,
        fullpath: &str,
        body: Bytes,
        mode: u32,
    ) -> Result<(), FileIoError>;

    async fn simple_download(&self, fullpath: &str) -> Result<Bytes, FileIoError>;
}

/// The on-disk content cache, keyed by inode. Queried after writes for
/// the authoritative file length.
pub trait CacheManager: Send + Sync {
    /// Returns 0 when the cache is disabled or does not hold the file.
    fn get_file_length(&self, ino: Inode) -> u64;

    fn remove_file(&self, ino: Inode);
}
