//! File removal: DELETE against the backend, then tombstone the entry.

use http::Method;
use tracing::{debug, instrument, warn};

use crate::client::{ClientError, HttpRequest};
use crate::fs::entry::EntryKind;
use crate::fs::Inode;

use super::errors::RemoveError;
use super::FsCore;

impl FsCore {
    /// Delete a file's backing object. On success the entry stays in the
    /// tree as a tombstone so immediate re-lookups resolve locally.
    #[instrument(name = "FsCore::file_remove", skip(self))]
    pub async fn file_remove(&self, ino: Inode) -> Result<(), RemoveError> {
        let fullpath = {
            let tree = self.tree().lock();
            let entry = tree.get(ino).ok_or_else(|| {
                warn!(ino, "file_remove on unknown inode");
                RemoveError::EntryNotFound
            })?;
            if entry.kind != EntryKind::File {
                warn!(ino, "file_remove on a non-file entry");
                return Err(RemoveError::NotAFile);
            }
            entry.fullpath.clone()
        };

        // Whatever happens remotely, the local bytes are gone.
        self.cache_mng().remove_file(ino);

        let client = self.pool().get_client().await?;
        let response = client
            .make_request(HttpRequest::new(Method::DELETE, format!("/{fullpath}")))
            .await?;
        if !response.is_success() {
            warn!(ino, status = %response.status, "object deletion failed");
            return Err(RemoveError::Backend(ClientError::Status(response.status)));
        }

        let mut tree = self.tree().lock();
        let Some(entry) = tree.get_mut(ino) else {
            warn!(ino, "entry vanished while its DELETE was in flight");
            return Err(RemoveError::EntryNotFound);
        };
        entry.removed = true;
        entry.age = 0;
        tree.entry_modified(ino);

        debug!(ino, "entry removed");
        Ok(())
    }

    /// Resolve a name in a directory and remove the file it names.
    #[instrument(name = "FsCore::file_unlink", skip(self))]
    pub async fn file_unlink(&self, parent_ino: Inode, name: &str) -> Result<(), RemoveError> {
        let ino = {
            let tree = self.tree().lock();
            if !tree.contains(parent_ino) {
                warn!(parent_ino, "file_unlink with an unknown parent");
                return Err(RemoveError::EntryNotFound);
            }
            tree.child_ino(parent_ino, name).ok_or_else(|| {
                warn!(parent_ino, name, "file_unlink on unknown entry");
                RemoveError::EntryNotFound
            })?
        };

        self.file_remove(ino).await
    }
}
