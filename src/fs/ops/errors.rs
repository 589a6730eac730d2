//! Per-operation error enums and their errno mappings.
//!
//! Every public operation reports through a `Result`; the kernel adapter
//! converts errors to errno via `From<_> for i32`. Structural failures
//! (missing inode, wrong type) never touch the network; backend failures
//! leave entry state unchanged apart from clearing transient latches.

use thiserror::Error;

use crate::client::ClientError;
use crate::io::FileIoError;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("entry not found")]
    EntryNotFound,

    #[error("parent is not a directory")]
    NotADirectory,

    #[error("backend error: {0}")]
    Backend(#[from] ClientError),
}

impl From<LookupError> for i32 {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::EntryNotFound => libc::ENOENT,
            LookupError::NotADirectory => libc::ENOTDIR,
            LookupError::Backend(_) => libc::EIO,
        }
    }
}

#[derive(Debug, Error)]
pub enum GetAttrError {
    #[error("entry not found")]
    EntryNotFound,
}

impl From<GetAttrError> for i32 {
    fn from(e: GetAttrError) -> Self {
        match e {
            GetAttrError::EntryNotFound => libc::ENOENT,
        }
    }
}

#[derive(Debug, Error)]
pub enum OpendirError {
    #[error("directory not found")]
    EntryNotFound,
}

impl From<OpendirError> for i32 {
    fn from(e: OpendirError) -> Self {
        match e {
            OpendirError::EntryNotFound => libc::ENOENT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReaddirError {
    #[error("directory not found")]
    EntryNotFound,

    #[error("inode is not a directory")]
    NotADirectory,

    #[error("no listing snapshot for a paged readdir")]
    SnapshotMissing,

    #[error("backend error: {0}")]
    Backend(#[from] ClientError),
}

impl From<ReaddirError> for i32 {
    fn from(e: ReaddirError) -> Self {
        match e {
            ReaddirError::EntryNotFound => libc::ENOENT,
            ReaddirError::NotADirectory => libc::ENOTDIR,
            ReaddirError::SnapshotMissing => libc::EINVAL,
            ReaddirError::Backend(_) => libc::EIO,
        }
    }
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("parent directory not found")]
    ParentNotFound,

    #[error("parent is not a directory")]
    NotADirectory,

    #[error("name already exists with a different type")]
    TypeClash,
}

impl From<CreateError> for i32 {
    fn from(e: CreateError) -> Self {
        match e {
            CreateError::ParentNotFound => libc::ENOENT,
            CreateError::NotADirectory => libc::ENOTDIR,
            CreateError::TypeClash => libc::EEXIST,
        }
    }
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("entry not found")]
    EntryNotFound,
}

impl From<OpenError> for i32 {
    fn from(e: OpenError) -> Self {
        match e {
            OpenError::EntryNotFound => libc::ENOENT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("handle not open")]
    HandleNotOpen,
}

impl From<ReleaseError> for i32 {
    fn from(e: ReleaseError) -> Self {
        match e {
            ReleaseError::HandleNotOpen => libc::EBADF,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("entry not found")]
    EntryNotFound,

    #[error("handle not open")]
    HandleNotOpen,

    #[error(transparent)]
    Io(#[from] FileIoError),
}

impl From<ReadError> for i32 {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::EntryNotFound => libc::ENOENT,
            ReadError::HandleNotOpen => libc::EBADF,
            ReadError::Io(_) => libc::EIO,
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("entry not found")]
    EntryNotFound,

    #[error("handle not open")]
    HandleNotOpen,

    #[error(transparent)]
    Io(#[from] FileIoError),
}

impl From<WriteError> for i32 {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::EntryNotFound => libc::ENOENT,
            WriteError::HandleNotOpen => libc::EBADF,
            WriteError::Io(_) => libc::EIO,
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoveError {
    #[error("entry not found")]
    EntryNotFound,

    #[error("entry is not a file")]
    NotAFile,

    #[error("backend error: {0}")]
    Backend(#[from] ClientError),
}

impl From<RemoveError> for i32 {
    fn from(e: RemoveError) -> Self {
        match e {
            RemoveError::EntryNotFound => libc::ENOENT,
            RemoveError::NotAFile => libc::EISDIR,
            RemoveError::Backend(_) => libc::EIO,
        }
    }
}

#[derive(Debug, Error)]
pub enum MkdirError {
    #[error("parent directory not found")]
    ParentNotFound,

    #[error("parent is not a directory")]
    NotADirectory,

    #[error("name already exists with a different type")]
    TypeClash,
}

impl From<MkdirError> for i32 {
    fn from(e: MkdirError) -> Self {
        match e {
            MkdirError::ParentNotFound => libc::ENOENT,
            MkdirError::NotADirectory => libc::ENOTDIR,
            MkdirError::TypeClash => libc::EEXIST,
        }
    }
}

#[derive(Debug, Error)]
pub enum RmdirError {
    #[error("entry not found")]
    EntryNotFound,

    #[error("entry is not a directory")]
    NotADirectory,

    #[error("directory not empty")]
    NotEmpty,
}

impl From<RmdirError> for i32 {
    fn from(e: RmdirError) -> Self {
        match e {
            RmdirError::EntryNotFound => libc::ENOENT,
            RmdirError::NotADirectory => libc::ENOTDIR,
            RmdirError::NotEmpty => libc::ENOTEMPTY,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("entry not found")]
    EntryNotFound,

    #[error("parent is not a directory")]
    NotADirectory,

    #[error("renaming directories is not supported")]
    SourceIsDirectory,

    #[error("file exceeds the single-copy size limit")]
    TooLarge,

    #[error("backend error: {0}")]
    Backend(#[from] ClientError),
}

impl From<RenameError> for i32 {
    fn from(e: RenameError) -> Self {
        match e {
            RenameError::EntryNotFound => libc::ENOENT,
            RenameError::NotADirectory => libc::ENOTDIR,
            RenameError::SourceIsDirectory => libc::EPERM,
            RenameError::TooLarge => libc::EFBIG,
            RenameError::Backend(_) => libc::EIO,
        }
    }
}

#[derive(Debug, Error)]
pub enum XattrError {
    #[error("entry not found")]
    EntryNotFound,

    #[error("extended attributes are not supported on directories")]
    DirectoriesUnsupported,

    #[error("unsupported attribute name")]
    Unsupported,

    #[error("backend error: {0}")]
    Backend(#[from] ClientError),
}

impl From<XattrError> for i32 {
    fn from(e: XattrError) -> Self {
        match e {
            XattrError::EntryNotFound => libc::ENOENT,
            XattrError::DirectoriesUnsupported | XattrError::Unsupported => libc::ENODATA,
            XattrError::Backend(_) => libc::EIO,
        }
    }
}

#[derive(Debug, Error)]
pub enum SymlinkError {
    #[error("parent directory not found")]
    ParentNotFound,

    #[error("parent is not a directory")]
    NotADirectory,

    #[error("name already exists with a different type")]
    TypeClash,

    #[error("symlink vanished during upload")]
    EntryNotFound,

    #[error(transparent)]
    Io(#[from] FileIoError),
}

impl From<SymlinkError> for i32 {
    fn from(e: SymlinkError) -> Self {
        match e {
            SymlinkError::ParentNotFound | SymlinkError::EntryNotFound => libc::ENOENT,
            SymlinkError::NotADirectory => libc::ENOTDIR,
            SymlinkError::TypeClash => libc::EEXIST,
            SymlinkError::Io(_) => libc::EIO,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadlinkError {
    #[error("symlink not found")]
    EntryNotFound,

    #[error("link target is not valid utf-8")]
    InvalidTarget,

    #[error(transparent)]
    Io(#[from] FileIoError),
}

impl From<ReadlinkError> for i32 {
    fn from(e: ReadlinkError) -> Self {
        match e {
            ReadlinkError::EntryNotFound => libc::ENOENT,
            ReadlinkError::InvalidTarget | ReadlinkError::Io(_) => libc::EIO,
        }
    }
}
