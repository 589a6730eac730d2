//! Attribute queries. Both are served from the cached entry; attribute
//! writes are not pushed to the backend.

use tracing::{instrument, warn};

use crate::fs::{EntryAttr, Inode};

use super::errors::GetAttrError;
use super::FsCore;

impl FsCore {
    #[instrument(name = "FsCore::getattr", skip(self))]
    pub async fn getattr(&self, ino: Inode) -> Result<EntryAttr, GetAttrError> {
        self.tree()
            .lock()
            .get(ino)
            .map(|entry| entry.attr())
            .ok_or_else(|| {
                warn!(ino, "getattr on unknown inode");
                GetAttrError::EntryNotFound
            })
    }

    /// Acknowledge an attribute change by echoing the entry's current
    /// attributes.
    #[instrument(name = "FsCore::setattr", skip(self))]
    pub async fn setattr(&self, ino: Inode) -> Result<EntryAttr, GetAttrError> {
        self.tree()
            .lock()
            .get(ino)
            .map(|entry| entry.attr())
            .ok_or_else(|| {
                warn!(ino, "setattr on unknown inode");
                GetAttrError::EntryNotFound
            })
    }
}
