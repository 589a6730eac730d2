//! Symlinks: files whose object body is the target path and whose mode
//! carries the link type bit.

use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::fs::entry::EntryKind;
use crate::fs::tree::AddEntryError;
use crate::fs::{EntryAttr, Inode};

use super::errors::{ReadlinkError, SymlinkError};
use super::FsCore;

const SYMLINK_MODE: u32 = libc::S_IFLNK | 0o777;

impl FsCore {
    /// Create a symlink entry and upload its target as the object body.
    #[instrument(name = "FsCore::create_symlink", skip(self))]
    pub async fn create_symlink(
        &self,
        parent_ino: Inode,
        name: &str,
        target: &str,
    ) -> Result<EntryAttr, SymlinkError> {
        let (ino, fullpath) = {
            let mut tree = self.tree().lock();

            let parent = tree.get(parent_ino).ok_or_else(|| {
                warn!(parent_ino, "create_symlink with an unknown parent");
                SymlinkError::ParentNotFound
            })?;
            if !parent.is_dir() {
                warn!(parent_ino, "create_symlink parent is not a directory");
                return Err(SymlinkError::NotADirectory);
            }
            let parent_age = parent.age;

            let ino = match tree.child_ino(parent_ino, name) {
                Some(ino) => {
                    let entry = tree.get_mut(ino).ok_or(SymlinkError::ParentNotFound)?;
                    entry.removed = false;
                    entry.access_time = SystemTime::now();
                    entry.age = parent_age;
                    tree.entry_modified(parent_ino);
                    ino
                }
                None => tree
                    .add_entry(
                        name,
                        SYMLINK_MODE,
                        EntryKind::File,
                        parent_ino,
                        0,
                        SystemTime::now(),
                    )
                    .map_err(|e| match e {
                        AddEntryError::TypeMismatch => SymlinkError::TypeClash,
                        AddEntryError::ParentNotFound => SymlinkError::ParentNotFound,
                        AddEntryError::ParentNotADirectory => SymlinkError::NotADirectory,
                    })?,
            };

            let entry = tree.get_mut(ino).ok_or(SymlinkError::ParentNotFound)?;
            entry.is_modified = true;
            entry.mode = SYMLINK_MODE;
            (ino, entry.fullpath.clone())
        };

        self.fileio()
            .simple_upload(&fullpath, Bytes::copy_from_slice(target.as_bytes()), SYMLINK_MODE)
            .await?;

        let tree = self.tree().lock();
        let entry = tree
            .get(ino)
            .filter(|entry| entry.kind == EntryKind::File)
            .ok_or_else(|| {
                warn!(ino, "symlink entry vanished during upload");
                SymlinkError::EntryNotFound
            })?;

        debug!(ino, name, target, "symlink created");
        Ok(entry.attr())
    }

    /// Download a symlink's object body and return it as the target path.
    #[instrument(name = "FsCore::readlink", skip(self))]
    pub async fn readlink(&self, ino: Inode) -> Result<String, ReadlinkError> {
        let fullpath = {
            let tree = self.tree().lock();
            let entry = tree
                .get(ino)
                .filter(|entry| entry.kind == EntryKind::File)
                .ok_or_else(|| {
                    warn!(ino, "readlink on a missing or non-file inode");
                    ReadlinkError::EntryNotFound
                })?;
            entry.fullpath.clone()
        };

        let body = self.fileio().simple_download(&fullpath).await?;
        String::from_utf8(body.to_vec()).map_err(|_| ReadlinkError::InvalidTarget)
    }
}
