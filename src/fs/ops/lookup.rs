//! Name resolution: the lookup state machine and its HEAD refreshes.

use std::time::SystemTime;

use http::Method;
use tracing::{debug, instrument, trace, warn};

use crate::client::HttpRequest;
use crate::fs::entry::EntryKind;
use crate::fs::head;
use crate::fs::{EntryAttr, Inode};

use super::errors::{LookupError, ReaddirError};
use super::FsCore;

/// What lookup decided to do while holding the tree lock.
enum LookupAction {
    Reply(EntryAttr),
    NegativeHit,
    RefreshParent,
    /// HEAD an existing entry; the `is_updating` latch is already taken.
    HeadEntry {
        ino: Inode,
        fullpath: String,
    },
    /// HEAD a name the tree has never seen.
    HeadMiss {
        fullpath: String,
    },
}

impl FsCore {
    /// Resolve `name` within a directory and return its attributes.
    ///
    /// Serves from the tree whenever the parent's listing is current;
    /// falls back to a single listing refresh (bounded, to stay sane
    /// against a backend that keeps "forgetting" the name) and to HEAD
    /// requests for entries the tree cannot vouch for.
    #[instrument(name = "FsCore::lookup", skip(self))]
    pub async fn lookup(&self, parent_ino: Inode, name: &str) -> Result<EntryAttr, LookupError> {
        let mut refreshed = false;
        loop {
            let action = self.decide(parent_ino, name, refreshed)?;
            match action {
                LookupAction::Reply(attr) => return Ok(attr),
                LookupAction::NegativeHit => {
                    debug!(parent_ino, name, "negative cache hit");
                    return Err(LookupError::EntryNotFound);
                }
                LookupAction::RefreshParent => {
                    trace!(parent_ino, name, "parent listing expired, refreshing");
                    self.fill_dir_listing(parent_ino)
                        .await
                        .map_err(readdir_to_lookup)?;
                    refreshed = true;
                    // One more pass over the freshly populated tree.
                }
                LookupAction::HeadEntry { ino, fullpath } => {
                    return self.head_refresh_entry(ino, &fullpath).await;
                }
                LookupAction::HeadMiss { fullpath } => {
                    return self.head_unknown_name(parent_ino, name, &fullpath).await;
                }
            }
        }
    }

    /// One pass of the lookup decision tree, entirely under the lock.
    fn decide(
        &self,
        parent_ino: Inode,
        name: &str,
        refreshed: bool,
    ) -> Result<LookupAction, LookupError> {
        let mut tree = self.tree().lock();

        let parent = tree.get(parent_ino).ok_or_else(|| {
            warn!(parent_ino, "lookup with an unknown parent");
            LookupError::EntryNotFound
        })?;
        if !parent.is_dir() {
            warn!(parent_ino, "lookup parent is not a directory");
            return Err(LookupError::NotADirectory);
        }

        if tree.is_cache_expired(parent_ino) && !refreshed {
            return Ok(LookupAction::RefreshParent);
        }

        let Some(ino) = tree.child_ino(parent_ino, name) else {
            let fullpath = if parent_ino == crate::fs::ROOT_INO {
                name.to_owned()
            } else {
                let parent = tree.get(parent_ino).ok_or(LookupError::EntryNotFound)?;
                format!("{}/{}", parent.fullpath, name)
            };
            trace!(parent_ino, name, "entry unknown, asking the server");
            return Ok(LookupAction::HeadMiss { fullpath });
        };

        let dir_cache_max_time = self.config().dir_cache_max_time();
        let file_cache_max_time = self.config().file_cache_max_time();
        let check_empty_files = self.config().s3.check_empty_files;
        let force_head = self.config().s3.force_head_requests_on_lookup;

        let entry = tree.get_mut(ino).ok_or(LookupError::EntryNotFound)?;
        let now = SystemTime::now();

        // Negative cache: a tombstone suppresses the name while either
        // time window is still open.
        if entry.removed {
            let window_backward = now
                .checked_sub(file_cache_max_time)
                .is_none_or(|cutoff| cutoff < entry.access_time);
            let window_forward = now
                .duration_since(entry.access_time)
                .is_ok_and(|elapsed| elapsed < file_cache_max_time);
            if window_backward || window_forward {
                return Ok(LookupAction::NegativeHit);
            }
        }

        entry.access_time = now;

        // A locally modified file that has already been pushed may have a
        // different size on the server; refresh before answering.
        if entry.is_modified
            && !entry.is_updating
            && entry.kind == EntryKind::File
            && entry.updated_time.is_some()
        {
            entry.is_updating = true;
            debug!(ino, name, "entry is modified, refreshing attributes");
            return Ok(LookupAction::HeadEntry {
                ino,
                fullpath: entry.fullpath.clone(),
            });
        }

        // s3fs compatibility: a zero-byte object may really be a
        // directory marker, which only a HEAD can reveal.
        let attrs_stale = entry.updated_time.is_none_or(|updated| {
            now.duration_since(updated)
                .is_ok_and(|elapsed| elapsed >= dir_cache_max_time)
        });
        if !entry.is_updating
            && entry.kind == EntryKind::File
            && attrs_stale
            && ((check_empty_files && entry.size == 0) || force_head)
        {
            entry.is_updating = true;
            debug!(ino, name, "policy forces a HEAD request");
            return Ok(LookupAction::HeadEntry {
                ino,
                fullpath: entry.fullpath.clone(),
            });
        }

        Ok(LookupAction::Reply(entry.attr()))
    }

    /// HEAD an entry the tree already holds and fold the response into
    /// it. The caller set `is_updating`; every exit clears it.
    async fn head_refresh_entry(
        &self,
        ino: Inode,
        fullpath: &str,
    ) -> Result<EntryAttr, LookupError> {
        let client = match self.pool().get_client().await {
            Ok(client) => client,
            Err(e) => {
                self.clear_updating(ino);
                return Err(LookupError::Backend(e));
            }
        };

        let response = client
            .make_request(HttpRequest::new(Method::HEAD, format!("/{fullpath}")))
            .await;

        let mut tree = self.tree().lock();
        let dmode = tree.dmode();
        let Some(entry) = tree.get_mut(ino) else {
            debug!(ino, "entry vanished while its HEAD was in flight");
            return Err(LookupError::EntryNotFound);
        };
        entry.is_updating = false;

        let response = match response {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                debug!(ino, status = %response.status, "attribute refresh failed");
                return Err(LookupError::Backend(
                    crate::client::ClientError::Status(response.status),
                ));
            }
            Err(e) => {
                debug!(ino, error = %e, "attribute refresh failed");
                return Err(LookupError::Backend(e));
            }
        };

        head::apply_head_response(entry, &response.headers, dmode);
        entry.updated_time = Some(SystemTime::now());
        Ok(entry.attr())
    }

    /// HEAD a name the tree has never seen. A 404 plants a tombstone so
    /// repeated lookups stop hammering the backend.
    async fn head_unknown_name(
        &self,
        parent_ino: Inode,
        name: &str,
        fullpath: &str,
    ) -> Result<EntryAttr, LookupError> {
        let client = self.pool().get_client().await?;
        let response = client
            .make_request(HttpRequest::new(Method::HEAD, format!("/{fullpath}")))
            .await?;

        let mut tree = self.tree().lock();
        let fmode = tree.fmode();
        if !tree.get(parent_ino).is_some_and(|p| p.is_dir()) {
            warn!(parent_ino, "parent vanished while a HEAD was in flight");
            return Err(LookupError::EntryNotFound);
        }

        if response.status == http::StatusCode::NOT_FOUND {
            debug!(parent_ino, name, "object does not exist, caching the miss");
            match tree.add_entry(name, fmode, EntryKind::File, parent_ino, 0, SystemTime::now())
            {
                Ok(ino) => {
                    if let Some(entry) = tree.get_mut(ino) {
                        entry.removed = true;
                    }
                }
                Err(e) => {
                    // A racing create may have beaten us to the name;
                    // nothing to cache then.
                    debug!(parent_ino, name, error = %e, "could not plant a tombstone");
                }
            }
            return Err(LookupError::EntryNotFound);
        }

        if !response.is_success() {
            return Err(LookupError::Backend(crate::client::ClientError::Status(
                response.status,
            )));
        }

        let size = crate::client::find_header(&response.headers, "Content-Length")
            .and_then(head::parse_content_length)
            .unwrap_or(0);
        let mtime = crate::client::find_header(&response.headers, "Last-Modified")
            .and_then(head::parse_last_modified)
            .unwrap_or_else(SystemTime::now);

        let ino = tree
            .update_entry(parent_ino, name, EntryKind::File, size, mtime)
            .ok_or(LookupError::EntryNotFound)?;
        let entry = tree.get_mut(ino).ok_or(LookupError::EntryNotFound)?;
        head::update_xattrs(entry, &response.headers);

        trace!(ino, name, size, "entry resolved from the server");
        Ok(entry.attr())
    }

    fn clear_updating(&self, ino: Inode) {
        if let Some(entry) = self.tree().lock().get_mut(ino) {
            entry.is_updating = false;
        }
    }
}

/// Lookup drives the readdir engine for parent refreshes; translate its
/// failures into lookup terms.
fn readdir_to_lookup(e: ReaddirError) -> LookupError {
    match e {
        ReaddirError::Backend(e) => LookupError::Backend(e),
        ReaddirError::NotADirectory => LookupError::NotADirectory,
        ReaddirError::EntryNotFound | ReaddirError::SnapshotMissing => LookupError::EntryNotFound,
    }
}
