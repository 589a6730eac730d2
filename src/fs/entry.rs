//! A single filesystem object: attributes, extended-attribute mirror and,
//! for directories, the child map and serialized listing cache.

use std::collections::BTreeMap;
use std::time::SystemTime;

use bytes::Bytes;

use super::{EntryAttr, Inode};

/// What kind of object an [`Entry`] represents. Symlinks are files whose
/// `mode` carries the link type bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// Backend header values mirrored onto an entry, decoded lazily at use.
#[derive(Debug, Clone, Default)]
pub struct XattrMirror {
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub content_type: Option<String>,
    /// When the mirror was last refreshed from response headers.
    pub xattr_time: Option<SystemTime>,
}

/// Directory-only state: the child map and the opaque serialized buffer
/// handed back to the kernel for readdir.
#[derive(Debug, Default)]
pub struct DirState {
    /// Child basename -> inode. Names are unique and case-sensitive.
    pub children: BTreeMap<String, Inode>,
    /// Serialized listing, opaque to this layer.
    pub cache: Option<Bytes>,
    /// When the cache was last (re)built. Deliberately survives
    /// invalidation so refreshes can be rate-limited.
    pub cache_created: Option<SystemTime>,
    /// A listing request is in flight; no second one may be issued.
    pub cache_updating: bool,
}

/// One object in the namespace.
#[derive(Debug)]
pub struct Entry {
    pub ino: Inode,
    /// 0 for the root entry.
    pub parent_ino: Inode,
    /// Final path component, no slashes.
    pub basename: String,
    /// Path relative to the bucket root, no leading slash. Empty for root.
    pub fullpath: String,
    pub kind: EntryKind,
    /// POSIX mode bits, pre-combined with the file-type bit.
    pub mode: u32,
    pub size: u64,
    pub ctime: SystemTime,

    /// Generation counter; children older than their parent are stale
    /// candidates after a listing refresh.
    pub age: u64,
    /// Tombstone: kept briefly for negative-lookup caching.
    pub removed: bool,
    /// Local modifications the backend has not acknowledged yet.
    pub is_modified: bool,
    /// An attribute refresh for this entry is in flight.
    pub is_updating: bool,

    pub access_time: SystemTime,
    /// When attributes were last confirmed against the backend.
    pub updated_time: Option<SystemTime>,

    pub xattrs: XattrMirror,
    /// Present iff `kind == Directory`.
    pub dir: Option<DirState>,
}

impl Entry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn dir(&self) -> Option<&DirState> {
        self.dir.as_ref()
    }

    pub fn dir_mut(&mut self) -> Option<&mut DirState> {
        self.dir.as_mut()
    }

    pub fn attr(&self) -> EntryAttr {
        EntryAttr {
            ino: self.ino,
            mode: self.mode,
            size: self.size,
            ctime: self.ctime,
        }
    }

    /// Drop the serialized listing bytes. `cache_created` is kept so the
    /// next readdir can decide whether a network refresh is due.
    pub fn invalidate_dir_cache(&mut self) {
        if let Some(dir) = self.dir.as_mut() {
            dir.cache = None;
        }
    }

    /// Convert a file entry into a directory in place, as when a HEAD
    /// reveals an `application/x-directory` marker object.
    pub fn promote_to_directory(&mut self, dmode: u32) {
        self.kind = EntryKind::Directory;
        self.mode = dmode;
        if self.dir.is_none() {
            self.dir = Some(DirState::default());
        }
        self.invalidate_dir_cache();
    }
}
