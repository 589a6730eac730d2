//! Extended attributes: a read-only mirror of backend object metadata.

use std::time::SystemTime;

use http::Method;
use tracing::{debug, instrument, trace, warn};

use crate::client::{ClientError, HttpRequest};
use crate::fs::entry::Entry;
use crate::fs::head;
use crate::fs::Inode;

use super::errors::XattrError;
use super::FsCore;

/// The attribute names this layer answers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XattrName {
    Etag,
    Version,
    ContentType,
}

impl XattrName {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "user.version" => Some(Self::Version),
            "user.etag" | "user.md5" => Some(Self::Etag),
            "user.content_type" => Some(Self::ContentType),
            _ => None,
        }
    }

    fn read(self, entry: &Entry) -> Option<String> {
        match self {
            Self::Etag => entry.xattrs.etag.clone(),
            Self::Version => entry.xattrs.version_id.clone(),
            Self::ContentType => entry.xattrs.content_type.clone(),
        }
    }
}

impl FsCore {
    /// Return one mirrored attribute, refreshing the mirror with a HEAD
    /// when it has gone stale. Directories carry no attributes.
    #[instrument(name = "FsCore::getxattr", skip(self))]
    pub async fn getxattr(&self, ino: Inode, name: &str) -> Result<Option<String>, XattrError> {
        let attr = XattrName::parse(name).ok_or_else(|| {
            debug!(ino, name, "unsupported xattr name");
            XattrError::Unsupported
        })?;

        let fullpath = {
            let tree = self.tree().lock();
            let entry = tree.get(ino).ok_or_else(|| {
                warn!(ino, "getxattr on unknown inode");
                XattrError::EntryNotFound
            })?;
            if entry.is_dir() {
                debug!(ino, "xattrs are not supported on directories");
                return Err(XattrError::DirectoriesUnsupported);
            }

            let now = SystemTime::now();
            let stale = entry.xattrs.xattr_time.is_none_or(|refreshed| {
                now.duration_since(refreshed)
                    .is_ok_and(|elapsed| elapsed >= self.config().dir_cache_max_time())
            });
            if !stale {
                trace!(ino, name, "serving xattr from the mirror");
                return Ok(attr.read(entry));
            }
            entry.fullpath.clone()
        };

        let client = self.pool().get_client().await?;
        let response = client
            .make_request(HttpRequest::new(Method::HEAD, format!("/{fullpath}")))
            .await?;
        if !response.is_success() {
            warn!(ino, status = %response.status, "xattr refresh failed");
            return Err(XattrError::Backend(ClientError::Status(response.status)));
        }

        let mut tree = self.tree().lock();
        let entry = tree.get_mut(ino).ok_or_else(|| {
            warn!(ino, "entry vanished while its HEAD was in flight");
            XattrError::EntryNotFound
        })?;
        head::update_xattrs(entry, &response.headers);

        trace!(ino, name, "xattr mirror refreshed");
        Ok(attr.read(entry))
    }
}
