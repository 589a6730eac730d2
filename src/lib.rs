//! Directory tree and entry cache for an S3-backed userspace filesystem.
//!
//! This crate is the core of a FUSE filesystem that projects an
//! S3-compatible object store as a locally mounted tree. It owns the
//! in-memory, inode-indexed representation of the remote namespace, the
//! population and invalidation policy for cached listings, and the
//! operation state machines (lookup, readdir, create, read/write, remove,
//! rename, xattr, symlink) that bridge synchronous kernel callbacks to
//! asynchronous HTTP round-trips.
//!
//! The kernel adapter, the HTTP client pool, the on-disk block cache and
//! the per-file upload/download engine are external collaborators; their
//! interfaces live in [`client`] and [`io`]. Everything is reachable from
//! a single [`fs::ops::FsCore`] handle.

pub mod client;
pub mod config;
pub mod fs;
pub mod io;

pub use config::Config;
pub use fs::ops::FsCore;
pub use fs::{EntryAttr, FileHandle, Inode, ROOT_INO};
