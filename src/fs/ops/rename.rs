//! Rename as a two-phase server-side copy followed by a delete.
//!
//! S3 has no rename primitive. The object is first copied to its new key
//! with `x-amz-copy-source`, then the old key is deleted. Each phase runs
//! on a freshly checked-out client. A failure between the phases can
//! leave the copied object behind; it is not cleaned up here.

use std::time::SystemTime;

use http::Method;
use tracing::{debug, instrument, warn};

use crate::client::{ClientError, HttpRequest};
use crate::fs::entry::EntryKind;
use crate::fs::{Inode, ROOT_INO};

use super::errors::RenameError;
use super::FsCore;

/// A single-request server-side copy tops out at 5 GiB; larger objects
/// would need the multipart copy API, which this layer does not drive.
const SINGLE_COPY_LIMIT: u64 = 5 * 1024 * 1024 * 1024;

impl FsCore {
    #[instrument(name = "FsCore::rename", skip(self))]
    pub async fn rename(
        &self,
        parent_ino: Inode,
        name: &str,
        newparent_ino: Inode,
        newname: &str,
    ) -> Result<(), RenameError> {
        let (src_fullpath, src_size, src_ctime, dst_fullpath) = {
            let tree = self.tree().lock();

            if !tree.get(parent_ino).is_some_and(|p| p.is_dir()) {
                warn!(parent_ino, "rename source parent is missing or not a directory");
                return Err(RenameError::NotADirectory);
            }
            let newparent = tree.get(newparent_ino).ok_or_else(|| {
                warn!(newparent_ino, "rename target parent not found");
                RenameError::EntryNotFound
            })?;
            if !newparent.is_dir() {
                warn!(newparent_ino, "rename target parent is not a directory");
                return Err(RenameError::NotADirectory);
            }

            let src_ino = tree.child_ino(parent_ino, name).ok_or_else(|| {
                debug!(parent_ino, name, "rename source not found");
                RenameError::EntryNotFound
            })?;
            let source = tree.get(src_ino).ok_or(RenameError::EntryNotFound)?;

            // Renaming a directory would mean copying every object under
            // its prefix.
            if source.kind == EntryKind::Directory {
                warn!(ino = src_ino, "renaming directories is not supported");
                return Err(RenameError::SourceIsDirectory);
            }
            if source.size >= SINGLE_COPY_LIMIT {
                warn!(ino = src_ino, size = source.size, "file too large for a single copy");
                return Err(RenameError::TooLarge);
            }

            let dst_fullpath = if newparent_ino == ROOT_INO {
                newname.to_owned()
            } else {
                format!("{}/{}", newparent.fullpath, newname)
            };

            (
                source.fullpath.clone(),
                source.size,
                source.ctime,
                dst_fullpath,
            )
        };

        self.copy_phase(&src_fullpath, &dst_fullpath).await?;

        {
            let mut tree = self.tree().lock();
            if !tree.get(newparent_ino).is_some_and(|p| p.is_dir()) {
                warn!(newparent_ino, "target parent vanished during the copy");
                return Err(RenameError::EntryNotFound);
            }

            // The kernel may or may not have looked the target name up
            // beforehand; reuse its entry when present, mint one when not.
            let dst_ino = match tree.child_ino(newparent_ino, newname) {
                Some(ino) => ino,
                None => tree
                    .update_entry(newparent_ino, newname, EntryKind::File, src_size, src_ctime)
                    .ok_or(RenameError::EntryNotFound)?,
            };
            let entry = tree.get_mut(dst_ino).ok_or(RenameError::EntryNotFound)?;
            entry.removed = false;
            entry.size = src_size;
            entry.access_time = SystemTime::now();
            tree.entry_modified(newparent_ino);
        }

        self.delete_phase(&src_fullpath).await?;

        {
            let mut tree = self.tree().lock();
            let Some(src_ino) = tree.child_ino(parent_ino, name) else {
                debug!(parent_ino, name, "rename source vanished during the delete");
                return Err(RenameError::EntryNotFound);
            };
            tree.remove_subtree(src_ino);
            tree.entry_modified(parent_ino);
            tree.entry_modified(newparent_ino);
        }

        debug!(name, newname, "rename finished");
        Ok(())
    }

    /// Phase one: server-side copy of the source object to the new key.
    async fn copy_phase(&self, src_fullpath: &str, dst_fullpath: &str) -> Result<(), RenameError> {
        let bucket = &self.config().s3.bucket_name;
        let key_prefix = &self.config().s3.key_prefix;
        let copy_source = if key_prefix.is_empty() {
            format!("{bucket}/{src_fullpath}")
        } else {
            format!("{bucket}{key_prefix}{src_fullpath}")
        };

        let client = self.pool().get_client().await?;
        let request = HttpRequest::new(Method::PUT, format!("/{dst_fullpath}"))
            .header(
                http::header::HeaderName::from_static("x-amz-copy-source"),
                &copy_source,
            )
            .header(
                http::header::HeaderName::from_static("x-amz-storage-class"),
                &self.config().s3.storage_type,
            );

        debug!(src = src_fullpath, dst = dst_fullpath, copy_source, "copying object");
        let response = client.make_request(request).await?;
        if !response.is_success() {
            warn!(status = %response.status, "object copy failed");
            return Err(RenameError::Backend(ClientError::Status(response.status)));
        }
        Ok(())
    }

    /// Phase two: delete the source object.
    async fn delete_phase(&self, src_fullpath: &str) -> Result<(), RenameError> {
        let client = self.pool().get_client().await?;
        let response = client
            .make_request(HttpRequest::new(Method::DELETE, format!("/{src_fullpath}")))
            .await?;
        if !response.is_success() {
            warn!(status = %response.status, "source deletion failed");
            return Err(RenameError::Backend(ClientError::Status(response.status)));
        }
        Ok(())
    }
}
