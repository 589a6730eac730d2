//! Directory creation and removal. Both are local-tree operations: S3
//! directories are virtual, so no backend request is issued here.

use std::time::SystemTime;

use tracing::{debug, instrument, warn};

use crate::fs::entry::{DirState, EntryKind};
use crate::fs::tree::AddEntryError;
use crate::fs::{EntryAttr, Inode};

use super::errors::{MkdirError, RmdirError};
use super::FsCore;

impl FsCore {
    /// Create a directory entry. A name lookup may already have planted a
    /// file-typed tombstone for it; that entry is converted in place.
    #[instrument(name = "FsCore::dir_create", skip(self))]
    pub async fn dir_create(
        &self,
        parent_ino: Inode,
        name: &str,
        _mode: u32,
    ) -> Result<EntryAttr, MkdirError> {
        let mut tree = self.tree().lock();
        let dmode = tree.dmode();

        let parent = tree.get(parent_ino).ok_or_else(|| {
            warn!(parent_ino, "dir_create with an unknown parent");
            MkdirError::ParentNotFound
        })?;
        if !parent.is_dir() {
            warn!(parent_ino, "dir_create parent is not a directory");
            return Err(MkdirError::NotADirectory);
        }
        let parent_age = parent.age;

        let ino = match tree.child_ino(parent_ino, name) {
            Some(ino) => {
                // Lookup created it as a default file entry; make it a
                // directory without reallocating the inode.
                let entry = tree.get_mut(ino).ok_or(MkdirError::ParentNotFound)?;
                entry.kind = EntryKind::Directory;
                if entry.dir.is_none() {
                    entry.dir = Some(DirState::default());
                }
                entry.invalidate_dir_cache();
                entry.access_time = SystemTime::now();
                ino
            }
            None => tree
                // Directories report a small nominal size rather than 0.
                .add_entry(name, dmode, EntryKind::Directory, parent_ino, 10, SystemTime::now())
                .map_err(|e| match e {
                    AddEntryError::TypeMismatch => MkdirError::TypeClash,
                    AddEntryError::ParentNotFound => MkdirError::ParentNotFound,
                    AddEntryError::ParentNotADirectory => MkdirError::NotADirectory,
                })?,
        };

        if let Some(parent) = tree.get_mut(parent_ino) {
            parent.is_modified = true;
        }

        let entry = tree.get_mut(ino).ok_or(MkdirError::ParentNotFound)?;
        entry.is_modified = false;
        entry.removed = false;
        entry.mode = dmode;
        entry.age = parent_age;

        debug!(ino, name, parent_ino, "directory created");
        Ok(entry.attr())
    }

    /// Remove a directory. It counts as empty only when every remaining
    /// child is a tombstone. No DELETE is sent; the prefix disappears
    /// from listings once its objects are gone.
    #[instrument(name = "FsCore::dir_remove", skip(self))]
    pub async fn dir_remove(&self, parent_ino: Inode, name: &str) -> Result<(), RmdirError> {
        let mut tree = self.tree().lock();

        if !tree.get(parent_ino).is_some_and(|p| p.is_dir()) {
            warn!(parent_ino, "dir_remove with an unknown parent");
            return Err(RmdirError::EntryNotFound);
        }

        let ino = tree.child_ino(parent_ino, name).ok_or_else(|| {
            warn!(parent_ino, name, "dir_remove on unknown entry");
            RmdirError::EntryNotFound
        })?;

        let entry = tree.get(ino).ok_or(RmdirError::EntryNotFound)?;
        let dir = entry.dir().ok_or_else(|| {
            warn!(ino, "dir_remove on a non-directory");
            RmdirError::NotADirectory
        })?;

        let occupied = dir
            .children
            .values()
            .any(|&child| tree.get(child).is_some_and(|en| !en.removed));
        if occupied {
            debug!(ino, name, "directory still has live entries");
            return Err(RmdirError::NotEmpty);
        }

        let entry = tree.get_mut(ino).ok_or(RmdirError::EntryNotFound)?;
        entry.removed = true;
        entry.age = 0;
        tree.entry_modified(parent_ino);

        debug!(ino, name, "directory removed");
        Ok(())
    }
}
