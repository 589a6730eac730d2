//! File lifecycle: create, open, release, read and write.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, instrument, trace, warn};

use crate::fs::entry::EntryKind;
use crate::fs::tree::AddEntryError;
use crate::fs::{EntryAttr, FileHandle, Inode};
use crate::io::FileIo;

use super::errors::{CreateError, OpenError, ReadError, ReleaseError, WriteError};
use super::FsCore;

impl FsCore {
    /// Create a file entry under `parent_ino` and open an upload engine
    /// for it. A tombstoned entry with the same name is revived in place.
    #[instrument(name = "FsCore::file_create", skip(self))]
    pub async fn file_create(
        &self,
        parent_ino: Inode,
        name: &str,
        mode: u32,
    ) -> Result<(EntryAttr, FileHandle), CreateError> {
        let (attr, fullpath) = {
            let mut tree = self.tree().lock();

            let parent = tree.get(parent_ino).ok_or_else(|| {
                warn!(parent_ino, "file_create with an unknown parent");
                CreateError::ParentNotFound
            })?;
            if !parent.is_dir() {
                warn!(parent_ino, "file_create parent is not a directory");
                return Err(CreateError::NotADirectory);
            }
            let parent_age = parent.age;

            let ino = match tree.child_ino(parent_ino, name) {
                Some(ino) => {
                    let entry = tree.get_mut(ino).ok_or(CreateError::ParentNotFound)?;
                    entry.removed = false;
                    entry.access_time = SystemTime::now();
                    entry.age = parent_age;
                    tree.entry_modified(parent_ino);
                    ino
                }
                None => tree
                    .add_entry(name, mode, EntryKind::File, parent_ino, 0, SystemTime::now())
                    .map_err(|e| match e {
                        AddEntryError::TypeMismatch => CreateError::TypeClash,
                        AddEntryError::ParentNotFound => CreateError::ParentNotFound,
                        AddEntryError::ParentNotADirectory => CreateError::NotADirectory,
                    })?,
            };

            let entry = tree.get_mut(ino).ok_or(CreateError::ParentNotFound)?;
            entry.is_modified = true;
            (entry.attr(), entry.fullpath.clone())
        };

        let io = self.fileio().create(&fullpath, attr.ino, true);
        let fh = self.stash_file_handle(io);

        debug!(ino = attr.ino, name, fh, "new file entry created");
        Ok((attr, fh))
    }

    /// Open an existing file for reading or rewriting.
    #[instrument(name = "FsCore::file_open", skip(self))]
    pub async fn file_open(&self, ino: Inode) -> Result<FileHandle, OpenError> {
        let fullpath = {
            let tree = self.tree().lock();
            let entry = tree.get(ino).ok_or_else(|| {
                warn!(ino, "file_open on unknown inode");
                OpenError::EntryNotFound
            })?;
            entry.fullpath.clone()
        };

        let io = self.fileio().create(&fullpath, ino, false);
        let fh = self.stash_file_handle(io);
        trace!(ino, fh, "file handle opened");
        Ok(fh)
    }

    /// Close a file handle; disposal flushes any pending upload.
    #[instrument(name = "FsCore::file_release", skip(self))]
    pub async fn file_release(&self, ino: Inode, fh: FileHandle) -> Result<(), ReleaseError> {
        let io = self.handles().lock().files.remove(&fh).ok_or_else(|| {
            warn!(ino, fh, "file_release on unknown handle");
            ReleaseError::HandleNotOpen
        })?;

        io.release().await;
        trace!(ino, fh, "file handle released");
        Ok(())
    }

    #[instrument(name = "FsCore::file_read", skip(self))]
    pub async fn file_read(
        &self,
        ino: Inode,
        fh: FileHandle,
        size: u32,
        off: u64,
    ) -> Result<Bytes, ReadError> {
        if !self.tree().lock().contains(ino) {
            warn!(ino, "file_read on unknown inode");
            return Err(ReadError::EntryNotFound);
        }
        let io = self.file_handle(fh).ok_or_else(|| {
            warn!(ino, fh, "file_read on unknown handle");
            ReadError::HandleNotOpen
        })?;

        let data = io.read_buffer(size, off).await?;
        trace!(ino, fh, len = data.len(), "buffer read");
        Ok(data)
    }

    /// Write through the upload engine, then reconcile the entry's size
    /// against the block cache (which may hold more of the file than this
    /// write covered).
    #[instrument(name = "FsCore::file_write", skip(self, buf))]
    pub async fn file_write(
        &self,
        ino: Inode,
        fh: FileHandle,
        buf: Bytes,
        off: u64,
    ) -> Result<usize, WriteError> {
        {
            let mut tree = self.tree().lock();
            let entry = tree.get_mut(ino).ok_or_else(|| {
                warn!(ino, "file_write on unknown inode");
                WriteError::EntryNotFound
            })?;
            entry.updated_time = Some(SystemTime::now());
            tree.inc_write_ops();
        }

        let io = match self.file_handle(fh) {
            Some(io) => io,
            None => {
                warn!(ino, fh, "file_write on unknown handle");
                self.tree().lock().dec_write_ops();
                return Err(WriteError::HandleNotOpen);
            }
        };

        let written = io.write_buffer(buf, off).await;

        let mut tree = self.tree().lock();
        tree.dec_write_ops();
        let count = written?;

        // The engine may only have buffered part of the file locally; the
        // block cache knows the authoritative length when it is enabled.
        if let Some(entry) = tree.get_mut(ino) {
            let mut len = self.cache_mng().get_file_length(ino);
            if len == 0 {
                len = off + count as u64;
                trace!(ino, len, "recalculated file size from the write window");
            }
            entry.size = len;
        } else {
            warn!(ino, "entry vanished while its write was in flight");
        }

        trace!(ino, fh, count, "buffer written");
        Ok(count)
    }

    fn stash_file_handle(&self, io: Arc<dyn FileIo>) -> FileHandle {
        let mut handles = self.handles().lock();
        let fh = handles.allocate();
        handles.files.insert(fh, io);
        fh
    }

    fn file_handle(&self, fh: FileHandle) -> Option<Arc<dyn FileIo>> {
        self.handles().lock().files.get(&fh).cloned()
    }
}
