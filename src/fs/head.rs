//! Interpretation of HEAD/PUT response headers onto an entry.
//!
//! Header values are decoded at use; only the etag, version id, content
//! type and creation time are retained on the entry.

use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime};
use http::HeaderMap;
use tracing::{debug, warn};

use crate::client::find_header;

use super::entry::Entry;

const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// Merge the extended-attribute mirror from response headers and stamp
/// the refresh time.
pub fn update_xattrs(entry: &mut Entry, headers: &HeaderMap) {
    // For simple PUT-created objects the ETag is the quoted MD5 of the
    // body; for others it is just an opaque token. Quotes are stripped
    // either way.
    if let Some(etag) = find_header(headers, "ETag") {
        let etag = etag.trim_matches('"');
        if entry.xattrs.etag.as_deref() != Some(etag) {
            entry.xattrs.etag = Some(etag.to_owned());
        }
    }

    if let Some(version) = find_header(headers, "x-amz-version-id") {
        if entry.xattrs.version_id.as_deref() != Some(version) {
            entry.xattrs.version_id = Some(version.to_owned());
        }
    }

    if let Some(content_type) = find_header(headers, "Content-Type") {
        if entry.xattrs.content_type.as_deref() != Some(content_type) {
            entry.xattrs.content_type = Some(content_type.to_owned());
        }
    }

    entry.xattrs.xattr_time = Some(SystemTime::now());
}

/// Apply a full HEAD response to an entry: size, directory promotion,
/// mode and creation-time overrides, and the xattr mirror.
pub fn apply_head_response(entry: &mut Entry, headers: &HeaderMap, dmode: u32) {
    if let Some(size) = find_header(headers, "Content-Length") {
        entry.size = parse_content_length(size).unwrap_or_else(|| {
            warn!(ino = entry.ino, size, "header contains an invalid file size");
            0
        });
    }

    update_xattrs(entry, headers);

    // Zero-byte objects with the directory marker content type are
    // virtual directories; convert the entry in place.
    if find_header(headers, "Content-Type")
        .is_some_and(|ct| ct.starts_with(DIRECTORY_CONTENT_TYPE))
    {
        debug!(ino = entry.ino, fullpath = %entry.fullpath, "converting entry to directory");
        entry.promote_to_directory(dmode);
    }

    if let Some(mode) = find_header(headers, "x-amz-meta-mode") {
        if let Ok(mode) = mode.parse::<u32>() {
            if mode > 0 {
                entry.mode = mode;
            }
        }
    }

    if let Some(date) = find_header(headers, "x-amz-meta-date") {
        if let Some(ctime) = parse_rfc1123(date) {
            entry.ctime = ctime;
        }
    }
}

/// `Content-Length`, with negatives clamped to zero.
pub fn parse_content_length(value: &str) -> Option<u64> {
    match value.trim().parse::<i64>() {
        Ok(size) if size >= 0 => Some(size.unsigned_abs()),
        Ok(_) => Some(0),
        Err(_) => None,
    }
}

/// RFC-1123 style timestamps (`Sun, 06 Nov 1994 08:49:37 GMT`), with a
/// numeric-offset fallback.
pub fn parse_rfc1123(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(SystemTime::from)
}

/// Zone-less `Last-Modified` timestamps (`Sun, 1 Jan 2006 12:00:00`),
/// interpreted as UTC. Falls back to the RFC-1123 form.
pub fn parse_last_modified(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%a, %d %b %Y %H:%M:%S") {
        return Some(SystemTime::from(naive.and_utc()));
    }
    parse_rfc1123(value)
}
