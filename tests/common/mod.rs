//! Mock collaborators and a harness for driving `FsCore` end to end.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};

use bucketfs::client::{
    ClientError, ClientPool, HttpClient, HttpRequest, HttpResponse, ListingRow, ObjectLister,
};
use bucketfs::config::Config;
use bucketfs::fs::dirbuf::DirBufFormat;
use bucketfs::fs::entry::EntryKind;
use bucketfs::io::{CacheManager, FileIo, FileIoError, FileIoFactory};
use bucketfs::{FsCore, Inode};

// ── HTTP backend ────────────────────────────────────────────────────────

/// A request the mock backend has seen.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

/// Shared state behind the mock pool, client and lister.
#[derive(Default)]
pub struct BackendState {
    pub requests: Mutex<Vec<RecordedRequest>>,
    head_responses: Mutex<HashMap<String, HttpResponse>>,
    listings: Mutex<HashMap<String, VecDeque<Vec<ListingRow>>>>,
    pub listing_calls: AtomicU64,
}

impl BackendState {
    /// Configure the response for `HEAD <path>` (path includes the
    /// leading slash).
    pub fn set_head(&self, path: &str, status: u16, headers: &[(&str, &str)]) {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                name.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        self.head_responses.lock().unwrap().insert(
            path.to_owned(),
            HttpResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers: map,
                body: Bytes::new(),
            },
        );
    }

    /// Queue a listing for a directory fullpath (root is `""`). The last
    /// queued listing keeps being served once its predecessors are used.
    pub fn push_listing(&self, fullpath: &str, rows: Vec<ListingRow>) {
        self.listings
            .lock()
            .unwrap()
            .entry(fullpath.to_owned())
            .or_default()
            .push_back(rows);
    }

    pub fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn head_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == Method::HEAD)
            .count()
    }

    pub fn listing_count(&self) -> u64 {
        self.listing_calls.load(Ordering::Relaxed)
    }
}

pub struct MockPool(pub Arc<BackendState>);

#[async_trait]
impl ClientPool for MockPool {
    async fn get_client(&self) -> Result<Arc<dyn HttpClient>, ClientError> {
        Ok(Arc::new(MockClient(Arc::clone(&self.0))))
    }
}

pub struct MockClient(Arc<BackendState>);

#[async_trait]
impl HttpClient for MockClient {
    async fn make_request(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        self.0.requests.lock().unwrap().push(RecordedRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            headers: request.headers.clone(),
        });

        if request.method == Method::HEAD {
            let configured = self.0.head_responses.lock().unwrap().get(&request.path).cloned();
            return Ok(configured.unwrap_or(HttpResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            }));
        }

        Ok(HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        })
    }
}

pub struct MockLister(pub Arc<BackendState>);

#[async_trait]
impl ObjectLister for MockLister {
    async fn get_directory_listing(
        &self,
        _client: Arc<dyn HttpClient>,
        fullpath: &str,
        _ino: Inode,
    ) -> Result<Vec<ListingRow>, ClientError> {
        self.0.listing_calls.fetch_add(1, Ordering::Relaxed);
        let mut listings = self.0.listings.lock().unwrap();
        match listings.get_mut(fullpath) {
            Some(queue) if queue.len() > 1 => Ok(queue.pop_front().unwrap()),
            Some(queue) => Ok(queue.front().cloned().unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }
}

pub fn file_row(name: &str, size: u64) -> ListingRow {
    ListingRow {
        name: name.to_owned(),
        kind: EntryKind::File,
        size,
        mtime: SystemTime::now(),
    }
}

pub fn dir_row(name: &str) -> ListingRow {
    ListingRow {
        name: name.to_owned(),
        kind: EntryKind::Directory,
        size: 0,
        mtime: SystemTime::now(),
    }
}

// ── File I/O ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FileIoState {
    /// Object bodies stored via `simple_upload`, keyed by fullpath.
    pub objects: Mutex<HashMap<String, Bytes>>,
    /// Canned data served by `read_buffer`, keyed by fullpath.
    pub read_data: Mutex<HashMap<String, Bytes>>,
    /// Every `(fullpath, off, bytes)` accepted by `write_buffer`.
    pub writes: Mutex<Vec<(String, u64, Bytes)>>,
    pub releases: AtomicU64,
}

pub struct MockFileIoFactory(pub Arc<FileIoState>);

#[async_trait]
impl FileIoFactory for MockFileIoFactory {
    fn create(&self, fullpath: &str, _ino: Inode, _new_object: bool) -> Arc<dyn FileIo> {
        Arc::new(MockFileIo {
            state: Arc::clone(&self.0),
            fullpath: fullpath.to_owned(),
            released: AtomicBool::new(false),
        })
    }

    async fn simple_upload(
        &self,
        fullpath: &str,
        body: Bytes,
        _mode: u32,
    ) -> Result<(), FileIoError> {
        self.0.objects.lock().unwrap().insert(fullpath.to_owned(), body);
        Ok(())
    }

    async fn simple_download(&self, fullpath: &str) -> Result<Bytes, FileIoError> {
        self.0
            .objects
            .lock()
            .unwrap()
            .get(fullpath)
            .cloned()
            .ok_or_else(|| FileIoError::Failed(format!("no object at {fullpath}")))
    }
}

pub struct MockFileIo {
    state: Arc<FileIoState>,
    fullpath: String,
    released: AtomicBool,
}

#[async_trait]
impl FileIo for MockFileIo {
    async fn read_buffer(&self, size: u32, off: u64) -> Result<Bytes, FileIoError> {
        let data = self
            .state
            .read_data
            .lock()
            .unwrap()
            .get(&self.fullpath)
            .cloned()
            .unwrap_or_default();
        let start = usize::try_from(off).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(size as usize).min(data.len());
        Ok(data.slice(start..end))
    }

    async fn write_buffer(&self, buf: Bytes, off: u64) -> Result<usize, FileIoError> {
        let len = buf.len();
        self.state
            .writes
            .lock()
            .unwrap()
            .push((self.fullpath.clone(), off, buf));
        Ok(len)
    }

    async fn release(&self) {
        self.released.store(true, Ordering::Relaxed);
        self.state.releases.fetch_add(1, Ordering::Relaxed);
    }
}

// ── Block cache ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MockCacheManager {
    pub lengths: Mutex<HashMap<Inode, u64>>,
    pub removed: Mutex<Vec<Inode>>,
}

impl CacheManager for MockCacheManager {
    fn get_file_length(&self, ino: Inode) -> u64 {
        self.lengths.lock().unwrap().get(&ino).copied().unwrap_or(0)
    }

    fn remove_file(&self, ino: Inode) {
        self.removed.lock().unwrap().push(ino);
    }
}

// ── Directory buffer format ─────────────────────────────────────────────

/// Readable stand-in for the kernel's dirent packing: `name/ino/size;`.
pub struct TextDirBuf;

impl DirBufFormat for TextDirBuf {
    fn append(&self, buf: &mut BytesMut, name: &str, ino: Inode, size: u64) {
        buf.extend_from_slice(format!("{name}/{ino}/{size};").as_bytes());
    }
}

/// Entry names in buffer order.
pub fn buffer_names(buf: &Bytes) -> Vec<String> {
    String::from_utf8(buf.to_vec())
        .unwrap()
        .split_terminator(';')
        .map(|item| item.split('/').next().unwrap().to_owned())
        .collect()
}

/// Opt-in log output while debugging a failing scenario: set `RUST_LOG`
/// and call this at the top of the test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

// ── Harness ─────────────────────────────────────────────────────────────

pub struct Harness {
    pub fs: FsCore,
    pub backend: Arc<BackendState>,
    pub fileio: Arc<FileIoState>,
    pub cache: Arc<MockCacheManager>,
}

pub fn harness() -> Harness {
    let mut config = Config::default();
    config.s3.bucket_name = "testbucket".to_owned();
    harness_with(config)
}

pub fn harness_with(config: Config) -> Harness {
    let backend = Arc::new(BackendState::default());
    let fileio = Arc::new(FileIoState::default());
    let cache = Arc::new(MockCacheManager::default());

    let fs = FsCore::new(
        Arc::new(config),
        Arc::new(MockPool(Arc::clone(&backend))),
        Arc::new(MockLister(Arc::clone(&backend))),
        Arc::new(MockFileIoFactory(Arc::clone(&fileio))),
        Arc::clone(&cache) as Arc<dyn CacheManager>,
        Arc::new(TextDirBuf),
    );

    Harness {
        fs,
        backend,
        fileio,
        cache,
    }
}

impl Harness {
    /// Run one readdir cycle on a directory to populate its listing
    /// cache. Returns the directory handle.
    pub async fn populate(&self, ino: Inode) -> u64 {
        let fh = self.fs.opendir(ino).await.unwrap();
        self.fs.readdir(ino, 4096, 0, fh).await.unwrap();
        fh
    }
}
