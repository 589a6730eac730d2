//! The operation orchestrator.
//!
//! Every public operation follows the same shape: resolve the target
//! entry through the inode index, serve from cache when possible, and
//! otherwise check out an HTTP client, perform the round-trip, then
//! re-resolve the inode and mutate the tree before returning. The tree
//! lock is never held across an `.await`; anything may have changed while
//! a request was in flight, so continuations always start from the index
//! again.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::client::{ClientPool, ObjectLister};
use crate::config::Config;
use crate::io::{CacheManager, FileIo, FileIoFactory};

use super::dirbuf::DirBufFormat;
use super::entry::EntryKind;
use super::tree::Tree;
use super::{FileHandle, Inode, TreeStats};

pub mod errors;

mod attr;
mod dir;
mod file;
mod link;
mod lookup;
mod readdir;
mod remove;
mod rename;
mod xattr;

/// Per-open directory state: a snapshot of the listing buffer, so the
/// kernel's paged reads all see the same bytes.
#[derive(Default)]
pub(crate) struct DirHandle {
    pub(crate) snapshot: Option<Bytes>,
}

/// Open-handle bookkeeping, shared by directory and file opens.
#[derive(Default)]
pub(crate) struct HandleTable {
    next_fh: FileHandle,
    pub(crate) dirs: HashMap<FileHandle, DirHandle>,
    pub(crate) files: HashMap<FileHandle, Arc<dyn FileIo>>,
}

impl HandleTable {
    pub(crate) fn allocate(&mut self) -> FileHandle {
        self.next_fh += 1;
        self.next_fh
    }
}

/// The filesystem core: tree, index, configuration and the collaborator
/// handles, all reachable from this single root.
pub struct FsCore {
    config: Arc<Config>,
    tree: Mutex<Tree>,
    pool: Arc<dyn ClientPool>,
    lister: Arc<dyn ObjectLister>,
    fileio: Arc<dyn FileIoFactory>,
    cache_mng: Arc<dyn CacheManager>,
    dirbuf: Arc<dyn DirBufFormat>,
    handles: Mutex<HandleTable>,
}

impl FsCore {
    pub fn new(
        config: Arc<Config>,
        pool: Arc<dyn ClientPool>,
        lister: Arc<dyn ObjectLister>,
        fileio: Arc<dyn FileIoFactory>,
        cache_mng: Arc<dyn CacheManager>,
        dirbuf: Arc<dyn DirBufFormat>,
    ) -> Self {
        let tree = Tree::new(&config);
        Self {
            config,
            tree: Mutex::new(tree),
            pool,
            lister,
            fileio,
            cache_mng,
            dirbuf,
            handles: Mutex::new(HandleTable::default()),
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn pool(&self) -> &Arc<dyn ClientPool> {
        &self.pool
    }

    pub(crate) fn lister(&self) -> &Arc<dyn ObjectLister> {
        &self.lister
    }

    pub(crate) fn fileio(&self) -> &Arc<dyn FileIoFactory> {
        &self.fileio
    }

    pub(crate) fn cache_mng(&self) -> &Arc<dyn CacheManager> {
        &self.cache_mng
    }

    pub(crate) fn dirbuf(&self) -> &Arc<dyn DirBufFormat> {
        &self.dirbuf
    }

    pub(crate) fn handles(&self) -> &Mutex<HandleTable> {
        &self.handles
    }

    /// The tree behind its lock. The kernel adapter and tests may
    /// introspect entries through this; the lock must not be held across
    /// suspension points.
    pub fn tree(&self) -> &Mutex<Tree> {
        &self.tree
    }

    // ── Stats and maintenance ───────────────────────────────────────────

    pub fn get_stats(&self) -> TreeStats {
        self.tree.lock().stats()
    }

    pub fn get_inode_count(&self) -> usize {
        self.tree.lock().inode_count()
    }

    /// Outstanding write operations, for graceful shutdown.
    pub fn current_write_ops(&self) -> u64 {
        self.tree.lock().write_ops()
    }

    /// Clear the tombstone flag on a file entry once its object is known
    /// to exist remotely (the upload engine reports this on first flush).
    pub fn set_entry_exist(&self, ino: Inode) {
        let mut tree = self.tree.lock();
        match tree.get_mut(ino) {
            Some(entry) if entry.kind == EntryKind::File => {
                entry.removed = false;
                debug!(ino, "entry marked as existing");
            }
            _ => warn!(ino, "set_entry_exist on a missing or non-file inode"),
        }
    }
}
