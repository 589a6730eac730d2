//! Create/open/read/write/release against the mock upload engine, and
//! size reconciliation with the block cache.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::atomic::Ordering;

use bytes::Bytes;

use bucketfs::ROOT_INO;

use common::{file_row, harness};

#[tokio::test]
async fn writes_grow_the_size_when_the_block_cache_is_disabled() {
    let h = harness();
    let (attr, fh) = h
        .fs
        .file_create(ROOT_INO, "n.txt", libc::S_IFREG | 0o644)
        .await
        .unwrap();
    assert_eq!(attr.size, 0);

    let written = h
        .fs
        .file_write(attr.ino, fh, Bytes::from_static(b"hello"), 0)
        .await
        .unwrap();
    assert_eq!(written, 5);
    assert_eq!(h.fs.getattr(attr.ino).await.unwrap().size, 5);

    let written = h
        .fs
        .file_write(attr.ino, fh, Bytes::from_static(b"!"), 5)
        .await
        .unwrap();
    assert_eq!(written, 1);
    assert_eq!(h.fs.getattr(attr.ino).await.unwrap().size, 6);

    assert_eq!(h.fs.current_write_ops(), 0, "write counter drained");
}

#[tokio::test]
async fn block_cache_length_is_authoritative_when_present() {
    let h = harness();
    let (attr, fh) = h
        .fs
        .file_create(ROOT_INO, "n.txt", libc::S_IFREG | 0o644)
        .await
        .unwrap();

    h.cache.lengths.lock().unwrap().insert(attr.ino, 100);
    h.fs.file_write(attr.ino, fh, Bytes::from_static(b"hi"), 0)
        .await
        .unwrap();

    assert_eq!(h.fs.getattr(attr.ino).await.unwrap().size, 100);
}

#[tokio::test]
async fn create_marks_the_entry_modified_and_opens_an_upload() {
    let h = harness();
    let (attr, _fh) = h
        .fs
        .file_create(ROOT_INO, "n.txt", libc::S_IFREG | 0o644)
        .await
        .unwrap();

    let tree = h.fs.tree().lock();
    let entry = tree.get(attr.ino).unwrap();
    assert!(entry.is_modified);
    assert_eq!(entry.fullpath, "n.txt");
}

#[tokio::test]
async fn create_over_a_tombstone_revives_it() {
    let h = harness();
    h.backend.push_listing("", vec![file_row("a.txt", 3)]);
    h.populate(ROOT_INO).await;
    h.fs.file_unlink(ROOT_INO, "a.txt").await.unwrap();

    let before = h.fs.get_inode_count();
    let (attr, _fh) = h
        .fs
        .file_create(ROOT_INO, "a.txt", libc::S_IFREG | 0o644)
        .await
        .unwrap();

    assert_eq!(h.fs.get_inode_count(), before, "inode reused");
    let tree = h.fs.tree().lock();
    assert!(!tree.get(attr.ino).unwrap().removed);
}

#[tokio::test]
async fn reads_are_delegated_to_the_io_engine() {
    let h = harness();
    h.backend.push_listing("", vec![file_row("a.txt", 11)]);
    h.populate(ROOT_INO).await;

    h.fileio
        .read_data
        .lock()
        .unwrap()
        .insert("a.txt".to_owned(), Bytes::from_static(b"hello world"));

    let ino = h.fs.tree().lock().child_ino(ROOT_INO, "a.txt").unwrap();
    let fh = h.fs.file_open(ino).await.unwrap();

    let data = h.fs.file_read(ino, fh, 5, 6).await.unwrap();
    assert_eq!(&data[..], b"world");

    h.fs.file_release(ino, fh).await.unwrap();
    assert_eq!(h.fileio.releases.load(Ordering::Relaxed), 1, "release flushed");
}

#[tokio::test]
async fn stale_handles_are_rejected() {
    let h = harness();
    h.backend.push_listing("", vec![file_row("a.txt", 3)]);
    h.populate(ROOT_INO).await;
    let ino = h.fs.tree().lock().child_ino(ROOT_INO, "a.txt").unwrap();

    let err = h.fs.file_read(ino, 777, 4, 0).await.unwrap_err();
    assert_eq!(i32::from(err), libc::EBADF);

    let err = h.fs.file_release(ino, 777).await.unwrap_err();
    assert_eq!(i32::from(err), libc::EBADF);
}

#[tokio::test]
async fn unlink_issues_a_delete_and_tombstones_the_entry() {
    let h = harness();
    h.backend.push_listing("", vec![file_row("a.txt", 3)]);
    h.populate(ROOT_INO).await;
    let ino = h.fs.tree().lock().child_ino(ROOT_INO, "a.txt").unwrap();

    h.fs.file_unlink(ROOT_INO, "a.txt").await.unwrap();

    let requests = h.backend.recorded();
    let delete = requests
        .iter()
        .find(|r| r.method == http::Method::DELETE)
        .expect("a delete request");
    assert_eq!(delete.path, "/a.txt");

    assert_eq!(h.cache.removed.lock().unwrap().as_slice(), &[ino]);

    let tree = h.fs.tree().lock();
    let entry = tree.get(ino).unwrap();
    assert!(entry.removed);
    assert_eq!(entry.age, 0);
    assert!(tree.get(ROOT_INO).unwrap().dir().unwrap().cache.is_none());
}

#[tokio::test]
async fn removing_a_directory_through_file_remove_is_refused() {
    let h = harness();
    h.backend.push_listing("", vec![common::dir_row("d")]);
    h.populate(ROOT_INO).await;
    let d_ino = h.fs.tree().lock().child_ino(ROOT_INO, "d").unwrap();

    let err = h.fs.file_remove(d_ino).await.unwrap_err();
    assert_eq!(i32::from(err), libc::EISDIR);
}
