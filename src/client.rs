//! Downward interfaces to the HTTP side of the world.
//!
//! The client pool, the per-request client and the directory-listing
//! fetcher are external collaborators; this module defines the traits the
//! orchestrator drives them through, plus the small request/response
//! vocabulary shared across operations. Paths handed to a client carry a
//! leading slash and are percent-encoded by the transport, not here.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::fs::entry::EntryKind;
use crate::fs::Inode;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no http client available")]
    PoolExhausted,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected status: {0}")]
    Status(StatusCode),
}

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Request path, with leading slash, relative to the bucket endpoint.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Attach an outgoing header, ignoring values the transport could not
    /// carry anyway.
    #[must_use]
    pub fn header(mut self, name: http::header::HeaderName, value: &str) -> Self {
        if let Ok(value) = http::header::HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// A completed round-trip.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// A keep-alive client checked out of the pool for one request sequence.
/// Dropping the handle returns it to the pool.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn make_request(&self, request: HttpRequest) -> Result<HttpResponse, ClientError>;
}

/// The shared pool of keep-alive clients. Acquisition is the first of the
/// orchestrator's suspension points.
#[async_trait]
pub trait ClientPool: Send + Sync {
    async fn get_client(&self) -> Result<Arc<dyn HttpClient>, ClientError>;
}

/// One row of a directory listing, already split into basename and kind.
#[derive(Debug, Clone)]
pub struct ListingRow {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: SystemTime,
}

/// Fetches a complete directory listing, following truncation markers
/// internally, and returns the flattened rows.
#[async_trait]
pub trait ObjectLister: Send + Sync {
    async fn get_directory_listing(
        &self,
        client: Arc<dyn HttpClient>,
        fullpath: &str,
        ino: Inode,
    ) -> Result<Vec<ListingRow>, ClientError>;
}

/// Case-insensitive header lookup, yielding the value as a string slice.
pub fn find_header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
