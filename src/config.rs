//! Typed application configuration.
//!
//! Mirrors the dotted-key layout of the on-disk configuration file
//! (`filesystem.*`, `s3.*`). All fields carry defaults so a partial
//! configuration deserializes cleanly.

use std::time::Duration;

use serde::Deserialize;

const FILE_DEFAULT_MODE: u32 = libc::S_IFREG | 0o644;
const DIR_DEFAULT_MODE: u32 = libc::S_IFDIR | 0o755;

/// `filesystem.*` keys.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Mode bits for files; `-1` selects the built-in default.
    pub file_mode: i32,
    /// Mode bits for directories; `-1` selects the built-in default.
    pub dir_mode: i32,
    /// Directory-listing TTL in seconds. Also the xattr TTL.
    pub dir_cache_max_time: u64,
    /// Negative-lookup TTL in seconds.
    pub file_cache_max_time: u64,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            file_mode: -1,
            dir_mode: -1,
            dir_cache_max_time: 5,
            file_cache_max_time: 10,
        }
    }
}

/// `s3.*` keys.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket_name: String,
    /// Optional key prefix, including its leading slash when set.
    pub key_prefix: String,
    /// Storage class sent on server-side copies.
    pub storage_type: String,
    /// Send a HEAD for zero-byte files on lookup to detect directory markers.
    pub check_empty_files: bool,
    /// Send a HEAD for every file on lookup.
    pub force_head_requests_on_lookup: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket_name: String::new(),
            key_prefix: String::new(),
            storage_type: "STANDARD".to_owned(),
            check_empty_files: false,
            force_head_requests_on_lookup: false,
        }
    }
}

/// Application configuration, read-only after startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub filesystem: FilesystemConfig,
    pub s3: S3Config,
}

impl Config {
    /// Effective file mode, with the regular-file type bit pre-combined.
    pub fn fmode(&self) -> u32 {
        if self.filesystem.file_mode < 0 {
            FILE_DEFAULT_MODE
        } else {
            self.filesystem.file_mode.unsigned_abs() | libc::S_IFREG
        }
    }

    /// Effective directory mode, with the directory type bit pre-combined.
    pub fn dmode(&self) -> u32 {
        if self.filesystem.dir_mode < 0 {
            DIR_DEFAULT_MODE
        } else {
            self.filesystem.dir_mode.unsigned_abs() | libc::S_IFDIR
        }
    }

    pub fn dir_cache_max_time(&self) -> Duration {
        Duration::from_secs(self.filesystem.dir_cache_max_time)
    }

    pub fn file_cache_max_time(&self) -> Duration {
        Duration::from_secs(self.filesystem.file_cache_max_time)
    }
}
