//! Directory listing: opendir/releasedir and the readdir state machine.

use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, instrument, trace, warn};

use crate::fs::dirbuf;
use crate::fs::entry::Entry;
use crate::fs::{FileHandle, Inode};

use super::errors::{OpendirError, ReaddirError, ReleaseError};
use super::{DirHandle, FsCore};

/// How a listing request will be satisfied, decided under the tree lock.
enum RefreshPlan {
    /// A refresh is in flight or happened recently; rebuild the buffer
    /// from the local tree without touching the network.
    LocalRebuild,
    /// This caller owns the refresh; the latch is already set.
    Fetch { fullpath: String },
}

impl FsCore {
    /// Allocate per-open directory state. The snapshot starts empty and
    /// is filled by the first readdir on this handle.
    #[instrument(name = "FsCore::opendir", skip(self))]
    pub async fn opendir(&self, ino: Inode) -> Result<FileHandle, OpendirError> {
        if !self.tree().lock().contains(ino) {
            warn!(ino, "opendir on unknown inode");
            return Err(OpendirError::EntryNotFound);
        }
        let mut handles = self.handles().lock();
        let fh = handles.allocate();
        handles.dirs.insert(fh, DirHandle::default());
        trace!(ino, fh, "directory handle opened");
        Ok(fh)
    }

    #[instrument(name = "FsCore::releasedir", skip(self))]
    pub async fn releasedir(&self, ino: Inode, fh: FileHandle) -> Result<(), ReleaseError> {
        match self.handles().lock().dirs.remove(&fh) {
            Some(_) => Ok(()),
            None => {
                warn!(ino, fh, "releasedir on unknown handle");
                Err(ReleaseError::HandleNotOpen)
            }
        }
    }

    /// Return the serialized listing buffer for a directory. The adapter
    /// slices the returned bytes by the kernel's `size`/`off` window; a
    /// non-zero offset therefore must be served from the per-open
    /// snapshot so pagination stays consistent.
    #[instrument(name = "FsCore::readdir", skip(self))]
    pub async fn readdir(
        &self,
        ino: Inode,
        size: u32,
        off: u64,
        fh: FileHandle,
    ) -> Result<Bytes, ReaddirError> {
        {
            let tree = self.tree().lock();
            let entry = tree.get(ino).ok_or_else(|| {
                warn!(ino, "readdir on unknown inode");
                ReaddirError::EntryNotFound
            })?;
            if !entry.is_dir() {
                warn!(ino, "readdir on a non-directory");
                return Err(ReaddirError::NotADirectory);
            }
        }

        // The kernel is paging through a previously returned buffer; a
        // second listing here would tear the pagination apart.
        if off > 0 {
            return self
                .snapshot_of(fh)
                .ok_or(ReaddirError::SnapshotMissing);
        }

        if let Some(snapshot) = self.snapshot_of(fh) {
            trace!(ino, fh, "serving per-open snapshot");
            return Ok(snapshot);
        }

        let buf = self.fill_dir_listing(ino).await?;
        self.store_snapshot(fh, buf.clone());
        Ok(buf)
    }

    fn snapshot_of(&self, fh: FileHandle) -> Option<Bytes> {
        self.handles()
            .lock()
            .dirs
            .get(&fh)
            .and_then(|handle| handle.snapshot.clone())
    }

    fn store_snapshot(&self, fh: FileHandle, buf: Bytes) {
        if let Some(handle) = self.handles().lock().dirs.get_mut(&fh) {
            handle.snapshot = Some(buf);
        }
    }

    /// Produce the current listing buffer for a directory, refreshing
    /// from the backend when the cache has expired. Shared by readdir and
    /// by lookup when it needs to repopulate a parent.
    pub(crate) async fn fill_dir_listing(&self, ino: Inode) -> Result<Bytes, ReaddirError> {
        let plan = {
            let mut tree = self.tree().lock();
            let expired = tree.is_cache_expired(ino);
            let entry = tree.get_mut(ino).ok_or(ReaddirError::EntryNotFound)?;
            let dir = entry.dir.as_mut().ok_or(ReaddirError::NotADirectory)?;

            if !expired {
                if let Some(cache) = dir.cache.clone() {
                    trace!(ino, "serving directory buffer from cache");
                    return Ok(cache);
                }
            }

            // The cache is stale; drop the serialized bytes. The tree
            // children stay as the fallback truth.
            dir.cache = None;

            let now = SystemTime::now();
            let refresh_due = dir.cache_created.is_none_or(|created| {
                now.duration_since(created)
                    .is_ok_and(|elapsed| elapsed > self.config().dir_cache_max_time())
            });

            if !dir.cache_updating && refresh_due {
                dir.cache_updating = true;
                RefreshPlan::Fetch {
                    fullpath: entry.fullpath.clone(),
                }
            } else {
                RefreshPlan::LocalRebuild
            }
        };

        match plan {
            RefreshPlan::LocalRebuild => {
                trace!(ino, "rebuilding directory buffer from the local tree");
                self.rebuild_from_tree(ino)
            }
            RefreshPlan::Fetch { fullpath } => {
                debug!(ino, %fullpath, "directory cache expired, fetching a fresh listing");
                self.refresh_from_backend(ino, fullpath).await
            }
        }
    }

    /// Assemble the buffer from whatever the tree currently holds and
    /// stamp it as the directory's cache. No network traffic. The
    /// in-flight latch, if some other caller owns it, is left alone.
    fn rebuild_from_tree(&self, ino: Inode) -> Result<Bytes, ReaddirError> {
        let mut tree = self.tree().lock();
        let buf = dirbuf::assemble(&tree, ino, self.dirbuf().as_ref())
            .ok_or(ReaddirError::NotADirectory)?;

        let entry = tree.get_mut(ino).ok_or(ReaddirError::EntryNotFound)?;
        entry.is_modified = false;
        let dir = entry.dir.as_mut().ok_or(ReaddirError::NotADirectory)?;
        dir.cache = Some(buf.clone());
        dir.cache_created = Some(SystemTime::now());
        Ok(buf)
    }

    /// The network path: list the directory, reconcile the tree against
    /// the rows, evict what the listing no longer shows, and serialize
    /// the survivors. The caller has already taken the in-flight latch.
    async fn refresh_from_backend(
        &self,
        ino: Inode,
        fullpath: String,
    ) -> Result<Bytes, ReaddirError> {
        let client = match self.pool().get_client().await {
            Ok(client) => client,
            Err(e) => {
                warn!(ino, error = %e, "failed to get an http client for the listing");
                self.clear_listing_latch(ino);
                return Err(ReaddirError::Backend(e));
            }
        };

        {
            let mut tree = self.tree().lock();
            if !tree.contains(ino) {
                return Err(ReaddirError::EntryNotFound);
            }
            tree.start_update(ino);
        }

        let rows = self
            .lister()
            .get_directory_listing(client, &fullpath, ino)
            .await;

        let mut tree = self.tree().lock();
        if !tree.contains(ino) {
            warn!(ino, "directory vanished during the listing refresh");
            return Err(ReaddirError::EntryNotFound);
        }

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                warn!(ino, error = %e, "directory listing failed");
                if let Some(dir) = tree.get_mut(ino).and_then(Entry::dir_mut) {
                    dir.cache_updating = false;
                }
                return Err(ReaddirError::Backend(e));
            }
        };

        for row in &rows {
            tree.update_entry(ino, &row.name, row.kind, row.size, row.mtime);
        }
        tree.stop_update(ino, SystemTime::now());

        let buf = dirbuf::assemble(&tree, ino, self.dirbuf().as_ref())
            .ok_or(ReaddirError::NotADirectory)?;

        let entry = tree.get_mut(ino).ok_or(ReaddirError::EntryNotFound)?;
        entry.is_modified = false;
        let dir = entry.dir.as_mut().ok_or(ReaddirError::NotADirectory)?;
        dir.cache = Some(buf.clone());
        dir.cache_created = Some(SystemTime::now());
        dir.cache_updating = false;

        debug!(ino, rows = rows.len(), len = buf.len(), "directory cache updated");
        Ok(buf)
    }

    fn clear_listing_latch(&self, ino: Inode) {
        let mut tree = self.tree().lock();
        if let Some(dir) = tree.get_mut(ino).and_then(Entry::dir_mut) {
            dir.cache_updating = false;
        }
    }
}
