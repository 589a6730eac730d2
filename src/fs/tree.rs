//! Parent/child composition of entries, the process-wide inode index and
//! the age-based reconciliation of listing refreshes.
//!
//! Entries are owned by the flat inode index; a directory's `children` map
//! holds basenames and inode numbers, and the parent edge is an inode
//! number resolved back through the index. Destroying a directory destroys
//! its subtree.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::Config;

use super::entry::{DirState, Entry, EntryKind, XattrMirror};
use super::{Inode, TreeStats, ROOT_INO};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddEntryError {
    #[error("parent inode not found")]
    ParentNotFound,

    #[error("parent is not a directory")]
    ParentNotADirectory,

    #[error("name already exists with a different type")]
    TypeMismatch,
}

/// The directory tree and its inode index.
pub struct Tree {
    inodes: HashMap<Inode, Entry>,
    /// Next inode to hand out; never reused within a process lifetime.
    max_ino: Inode,
    fmode: u32,
    dmode: u32,
    dir_cache_max_time: Duration,
    /// Outstanding write operations, for graceful shutdown.
    write_ops: u64,
}

impl Tree {
    pub fn new(config: &Config) -> Self {
        let mut tree = Self {
            inodes: HashMap::new(),
            max_ino: ROOT_INO,
            fmode: config.fmode(),
            dmode: config.dmode(),
            dir_cache_max_time: config.dir_cache_max_time(),
            write_ops: 0,
        };

        let dmode = tree.dmode;
        let root = tree
            .add_entry("/", dmode, EntryKind::Directory, 0, 0, SystemTime::now())
            .unwrap_or_else(|e| unreachable!("root entry creation cannot fail: {e}"));
        debug_assert_eq!(root, ROOT_INO);

        debug!("directory tree created");
        tree
    }

    // ── Index access ────────────────────────────────────────────────────

    pub fn get(&self, ino: Inode) -> Option<&Entry> {
        self.inodes.get(&ino)
    }

    pub fn get_mut(&mut self, ino: Inode) -> Option<&mut Entry> {
        self.inodes.get_mut(&ino)
    }

    pub fn contains(&self, ino: Inode) -> bool {
        self.inodes.contains_key(&ino)
    }

    /// Resolve a child inode by basename.
    pub fn child_ino(&self, parent_ino: Inode, name: &str) -> Option<Inode> {
        self.inodes
            .get(&parent_ino)
            .and_then(Entry::dir)
            .and_then(|dir| dir.children.get(name).copied())
    }

    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    pub fn fmode(&self) -> u32 {
        self.fmode
    }

    pub fn dmode(&self) -> u32 {
        self.dmode
    }

    // ── Entry construction ──────────────────────────────────────────────

    /// Create a new entry under `parent_ino` and wire it into both the
    /// index and the parent's child map. New entries are born with their
    /// parent's current age. `parent_ino == 0` creates the root.
    pub fn add_entry(
        &mut self,
        basename: &str,
        mode: u32,
        kind: EntryKind,
        parent_ino: Inode,
        size: u64,
        ctime: SystemTime,
    ) -> Result<Inode, AddEntryError> {
        let (fullpath, age) = if parent_ino == 0 {
            (String::new(), 0)
        } else {
            let parent = self
                .inodes
                .get(&parent_ino)
                .ok_or(AddEntryError::ParentNotFound)?;
            let parent_dir = parent.dir().ok_or(AddEntryError::ParentNotADirectory)?;

            if let Some(&existing) = parent_dir.children.get(basename) {
                if self.inodes.get(&existing).is_some_and(|en| en.kind != kind) {
                    debug!(parent_ino, basename, "name exists with a different type");
                    return Err(AddEntryError::TypeMismatch);
                }
            }

            let fullpath = if parent_ino == ROOT_INO {
                basename.to_owned()
            } else {
                format!("{}/{}", parent.fullpath, basename)
            };
            let age = parent.age;

            self.entry_modified(parent_ino);
            (fullpath, age)
        };

        let ino = self.max_ino;
        self.max_ino += 1;

        let entry = Entry {
            ino,
            parent_ino,
            basename: basename.to_owned(),
            fullpath,
            kind,
            mode,
            size,
            ctime,
            age,
            removed: false,
            is_modified: false,
            is_updating: false,
            access_time: SystemTime::now(),
            updated_time: None,
            xattrs: XattrMirror::default(),
            dir: (kind == EntryKind::Directory).then(DirState::default),
        };

        trace!(ino, basename, fullpath = %entry.fullpath, mode, "creating entry");

        self.inodes.insert(ino, entry);

        if parent_ino != 0 {
            if let Some(parent_dir) = self.inodes.get_mut(&parent_ino).and_then(Entry::dir_mut) {
                parent_dir.children.insert(basename.to_owned(), ino);
            }
            // Callers may have interposed on the parent since the first
            // invalidation; do it again now that the child is linked.
            self.entry_modified(parent_ino);
        }

        Ok(ino)
    }

    /// Apply one listing row. An existing child is refreshed to the
    /// parent's age and unmarked as removed; a missing one is created with
    /// the default mode for its kind. Returns the child's inode.
    pub fn update_entry(
        &mut self,
        parent_ino: Inode,
        name: &str,
        kind: EntryKind,
        size: u64,
        mtime: SystemTime,
    ) -> Option<Inode> {
        let parent = self.inodes.get(&parent_ino)?;
        if !parent.is_dir() {
            warn!(parent_ino, "update_entry on a non-directory");
            return None;
        }
        let parent_age = parent.age;

        if let Some(ino) = self.child_ino(parent_ino, name) {
            let entry = self.inodes.get_mut(&ino)?;
            entry.age = parent_age;
            entry.size = size;
            // The server reported it, so it exists.
            entry.removed = false;
            trace!(ino, name, size, "refreshed entry from listing");
            return Some(ino);
        }

        let mode = match kind {
            EntryKind::File => self.fmode,
            EntryKind::Directory => self.dmode,
        };
        match self.add_entry(name, mode, kind, parent_ino, size, mtime) {
            Ok(ino) => Some(ino),
            Err(e) => {
                warn!(parent_ino, name, error = %e, "failed to add listing entry");
                None
            }
        }
    }

    // ── Cache invalidation ──────────────────────────────────────────────

    /// Record that an entry changed: a directory drops its serialized
    /// listing, a file forwards the invalidation to its parent.
    pub fn entry_modified(&mut self, ino: Inode) {
        let mut current = ino;
        loop {
            let Some(entry) = self.inodes.get_mut(&current) else {
                warn!(ino = current, "entry_modified on unknown inode");
                return;
            };
            if entry.is_dir() {
                trace!(ino = current, basename = %entry.basename, "invalidating directory cache");
                entry.invalidate_dir_cache();
                return;
            }
            if entry.parent_ino == 0 {
                return;
            }
            current = entry.parent_ino;
        }
    }

    /// Whether a directory's serialized listing can still be served.
    pub fn is_cache_expired(&self, ino: Inode) -> bool {
        let Some(entry) = self.inodes.get(&ino) else {
            return true;
        };
        let Some(dir) = entry.dir() else {
            return true;
        };

        let (Some(cache), Some(created)) = (dir.cache.as_ref(), dir.cache_created) else {
            return true;
        };
        if cache.is_empty() {
            return true;
        }

        // Tolerate clock steps: a cache stamped in the future is fresh.
        match SystemTime::now().duration_since(created) {
            Err(_) => false,
            Ok(elapsed) if elapsed > self.dir_cache_max_time => true,
            Ok(_) => entry.is_modified,
        }
    }

    // ── Age-based reconciliation ────────────────────────────────────────

    /// Begin a listing refresh: bump the directory's generation so rows
    /// observed during the refresh can be told apart from stale children.
    pub fn start_update(&mut self, ino: Inode) {
        if let Some(entry) = self.inodes.get_mut(&ino) {
            entry.age += 1;
            trace!(ino, age = entry.age, "directory age advanced");
        }
    }

    /// Finish a listing refresh: evict children that were not observed
    /// this round, have no pending local change, and have not been touched
    /// within the listing TTL. Only files are evicted this way;
    /// directories are removed explicitly. Returns the eviction count.
    pub fn stop_update(&mut self, parent_ino: Inode, now: SystemTime) -> usize {
        let Some(parent) = self.inodes.get(&parent_ino) else {
            warn!(parent_ino, "stop_update on unknown inode");
            return 0;
        };
        let Some(parent_dir) = parent.dir() else {
            warn!(parent_ino, "stop_update on a non-directory");
            return 0;
        };
        let parent_age = parent.age;

        let stale: Vec<(String, Inode)> = parent_dir
            .children
            .iter()
            .filter_map(|(name, &ino)| {
                let child = self.inodes.get(&ino)?;
                let idle = now
                    .duration_since(child.access_time)
                    .is_ok_and(|d| d >= self.dir_cache_max_time);
                (child.age < parent_age
                    && !child.is_modified
                    && idle
                    && child.kind == EntryKind::File)
                    .then(|| (name.clone(), ino))
            })
            .collect();

        for (name, ino) in &stale {
            trace!(ino, name = %name, "evicting stale entry");
            self.inodes.remove(ino);
            if let Some(dir) = self.inodes.get_mut(&parent_ino).and_then(Entry::dir_mut) {
                dir.children.remove(name);
            }
        }

        if !stale.is_empty() {
            debug!(parent_ino, evicted = stale.len(), "stale entries removed");
        }
        stale.len()
    }

    // ── Destruction ─────────────────────────────────────────────────────

    /// Remove an entry and, post-order, everything beneath it, detaching
    /// it from its parent's child map.
    pub fn remove_subtree(&mut self, ino: Inode) {
        let Some(entry) = self.inodes.get(&ino) else {
            return;
        };
        let parent_ino = entry.parent_ino;
        let basename = entry.basename.clone();

        if let Some(dir) = entry.dir() {
            let children: Vec<Inode> = dir.children.values().copied().collect();
            for child in children {
                self.remove_subtree(child);
            }
        }

        self.inodes.remove(&ino);
        if let Some(dir) = self.inodes.get_mut(&parent_ino).and_then(Entry::dir_mut) {
            dir.children.remove(&basename);
        }
    }

    // ── Bookkeeping ─────────────────────────────────────────────────────

    pub fn inc_write_ops(&mut self) {
        self.write_ops += 1;
    }

    pub fn dec_write_ops(&mut self) {
        self.write_ops = self.write_ops.saturating_sub(1);
    }

    pub fn write_ops(&self) -> u64 {
        self.write_ops
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            total_inodes: self.inodes.len() as u64,
            ..TreeStats::default()
        };
        for entry in self.inodes.values() {
            match entry.kind {
                EntryKind::File => stats.file_count += 1,
                EntryKind::Directory => stats.dir_count += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Tree {
        Tree::new(&Config::default())
    }

    fn add_file(tree: &mut Tree, parent: Inode, name: &str) -> Inode {
        let fmode = tree.fmode();
        tree.add_entry(name, fmode, EntryKind::File, parent, 0, SystemTime::now())
            .expect("add file")
    }

    fn add_dir(tree: &mut Tree, parent: Inode, name: &str) -> Inode {
        let dmode = tree.dmode();
        tree.add_entry(name, dmode, EntryKind::Directory, parent, 0, SystemTime::now())
            .expect("add dir")
    }

    #[test]
    fn root_is_created_with_reserved_inode() {
        let tree = tree();
        let root = tree.get(ROOT_INO).expect("root present");
        assert!(root.is_dir());
        assert_eq!(root.fullpath, "");
        assert_eq!(root.parent_ino, 0);
    }

    #[test]
    fn fullpath_composition_elides_root_prefix() {
        let mut tree = tree();
        let sub = add_dir(&mut tree, ROOT_INO, "sub");
        let leaf = add_file(&mut tree, sub, "leaf.txt");

        assert_eq!(tree.get(sub).expect("sub").fullpath, "sub");
        assert_eq!(tree.get(leaf).expect("leaf").fullpath, "sub/leaf.txt");
    }

    #[test]
    fn add_entry_rejects_type_change() {
        let mut tree = tree();
        add_file(&mut tree, ROOT_INO, "x");
        let dmode = tree.dmode();
        let err = tree
            .add_entry("x", dmode, EntryKind::Directory, ROOT_INO, 0, SystemTime::now())
            .expect_err("type clash must be rejected");
        assert_eq!(err, AddEntryError::TypeMismatch);
    }

    #[test]
    fn inodes_are_never_reused() {
        let mut tree = tree();
        let a = add_file(&mut tree, ROOT_INO, "a");
        tree.remove_subtree(a);
        let b = add_file(&mut tree, ROOT_INO, "b");
        assert!(b > a, "inode {b} must not reuse {a}");
    }

    #[test]
    fn children_point_back_at_their_parent() {
        let mut tree = tree();
        let sub = add_dir(&mut tree, ROOT_INO, "sub");
        let leaf = add_file(&mut tree, sub, "leaf");
        assert_eq!(tree.get(leaf).expect("leaf").parent_ino, sub);
        assert_eq!(tree.child_ino(sub, "leaf"), Some(leaf));
    }

    #[test]
    fn update_entry_refreshes_age_and_clears_removed() {
        let mut tree = tree();
        let ino = add_file(&mut tree, ROOT_INO, "a");
        tree.get_mut(ino).expect("entry").removed = true;

        tree.start_update(ROOT_INO);
        let refreshed = tree
            .update_entry(ROOT_INO, "a", EntryKind::File, 7, SystemTime::now())
            .expect("update");

        assert_eq!(refreshed, ino);
        let entry = tree.get(ino).expect("entry");
        assert!(!entry.removed);
        assert_eq!(entry.size, 7);
        assert_eq!(entry.age, tree.get(ROOT_INO).expect("root").age);
    }

    #[test]
    fn stop_update_evicts_stale_idle_files_only() {
        let mut tree = tree();
        let stale_file = add_file(&mut tree, ROOT_INO, "old.txt");
        let stale_dir = add_dir(&mut tree, ROOT_INO, "olddir");
        let fresh = add_file(&mut tree, ROOT_INO, "fresh.txt");

        tree.start_update(ROOT_INO);
        tree.update_entry(ROOT_INO, "fresh.txt", EntryKind::File, 1, SystemTime::now());

        // Pretend the stale entries were last touched long ago.
        let long_ago = SystemTime::now() - Duration::from_secs(3600);
        tree.get_mut(stale_file).expect("file").access_time = long_ago;
        tree.get_mut(stale_dir).expect("dir").access_time = long_ago;

        let evicted = tree.stop_update(ROOT_INO, SystemTime::now());

        assert_eq!(evicted, 1);
        assert!(!tree.contains(stale_file));
        assert!(tree.contains(stale_dir), "directories are never evicted here");
        assert!(tree.contains(fresh));
        assert_eq!(tree.child_ino(ROOT_INO, "old.txt"), None);
    }

    #[test]
    fn stop_update_spares_modified_and_recently_accessed_entries() {
        let mut tree = tree();
        let modified = add_file(&mut tree, ROOT_INO, "dirty.txt");
        let touched = add_file(&mut tree, ROOT_INO, "hot.txt");

        tree.start_update(ROOT_INO);

        let long_ago = SystemTime::now() - Duration::from_secs(3600);
        let dirty = tree.get_mut(modified).expect("dirty");
        dirty.access_time = long_ago;
        dirty.is_modified = true;
        // "hot.txt" keeps its fresh access_time.

        tree.stop_update(ROOT_INO, SystemTime::now());

        assert!(tree.contains(modified));
        assert!(tree.contains(touched));
    }

    #[test]
    fn entry_modified_on_file_invalidates_parent_listing() {
        let mut tree = tree();
        let sub = add_dir(&mut tree, ROOT_INO, "sub");
        let leaf = add_file(&mut tree, sub, "leaf");

        let dir = tree.get_mut(sub).expect("sub").dir_mut().expect("dir state");
        dir.cache = Some(bytes::Bytes::from_static(b"cached"));
        dir.cache_created = Some(SystemTime::now());

        tree.entry_modified(leaf);

        let dir = tree.get(sub).expect("sub").dir().expect("dir state");
        assert!(dir.cache.is_none(), "listing bytes must be dropped");
        assert!(dir.cache_created.is_some(), "creation stamp survives");
    }

    #[test]
    fn remove_subtree_destroys_recursively() {
        let mut tree = tree();
        let sub = add_dir(&mut tree, ROOT_INO, "sub");
        let leaf = add_file(&mut tree, sub, "leaf");

        tree.remove_subtree(sub);

        assert!(!tree.contains(sub));
        assert!(!tree.contains(leaf));
        assert_eq!(tree.child_ino(ROOT_INO, "sub"), None);
        assert_eq!(tree.inode_count(), 1);
    }

    #[test]
    fn stats_count_files_and_directories() {
        let mut tree = tree();
        add_file(&mut tree, ROOT_INO, "a");
        add_dir(&mut tree, ROOT_INO, "d");

        let stats = tree.stats();
        assert_eq!(stats.total_inodes, 3);
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.dir_count, 2);
    }
}
