//! Serializes a directory's children into the opaque byte buffer the
//! kernel adapter returns for readdir.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use super::tree::Tree;
use super::Inode;

/// The kernel adapter's buffer-append primitive. The produced bytes are
/// opaque to this layer; only their length matters here.
pub trait DirBufFormat: Send + Sync {
    fn append(&self, buf: &mut BytesMut, name: &str, ino: Inode, size: u64);
}

/// Build the listing buffer for a directory from its current children.
///
/// Starts with the synthetic `.` and `..` entries (both carrying the
/// directory's own inode; the adapter tolerates this for the immediate
/// parent), then appends every child that was observed in the latest
/// refresh round and is not a tombstone. Returns `None` if `ino` does not
/// name a directory.
pub fn assemble(tree: &Tree, ino: Inode, format: &dyn DirBufFormat) -> Option<Bytes> {
    let entry = tree.get(ino)?;
    let dir = entry.dir()?;

    let mut buf = BytesMut::new();
    format.append(&mut buf, ".", ino, 0);
    format.append(&mut buf, "..", ino, 0);

    let mut items = 0u32;
    for (name, &child_ino) in &dir.children {
        let Some(child) = tree.get(child_ino) else {
            continue;
        };
        if child.age >= entry.age && !child.removed {
            format.append(&mut buf, name, child.ino, child.size);
            items += 1;
        } else {
            trace!(ino = child_ino, name = %name, "skipping stale or removed entry");
        }
    }

    trace!(ino, items, len = buf.len(), "directory buffer assembled");
    Some(buf.freeze())
}
