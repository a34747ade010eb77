//! Seams between the gallery logic and the services that hold its data.
//!
//! Every operation receives its collaborators as explicit `&dyn` handles,
//! built once per process from configuration. Two families implement them:
//! the Supabase REST backend and the self-hosted SQLite + disk backend.

use crate::models::{
    image_record::{ImageRecord, NewImageRecord},
    storage_object::StorageObject,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// One page of a storage listing.
#[derive(Debug, Default)]
pub struct ListPage {
    pub objects: Vec<StorageObject>,
    /// Entries the service returned for this page, including folder entries
    /// that are not in `objects`. Paging advances by this count.
    pub fetched: usize,
}

impl ListPage {
    /// A page where every returned entry is an object.
    pub fn of(objects: Vec<StorageObject>) -> Self {
        Self {
            fetched: objects.len(),
            objects,
        }
    }
}

/// Blob storage for generated images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// One page of the listing under `prefix`, newest first.
    ///
    /// Returned names include `prefix`. A page whose `fetched` count is
    /// below `limit` means the listing is exhausted.
    async fn list_page(
        &self,
        prefix: &str,
        limit: usize,
        offset: usize,
    ) -> BackendResult<ListPage>;

    /// Store `data` at `path`.
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> BackendResult<()>;

    /// Bulk-remove `paths`, returning the names actually removed.
    /// Paths that do not exist are skipped without error.
    async fn remove(&self, paths: &[String]) -> BackendResult<Vec<String>>;

    /// Cheap reachability probe used by readiness checks.
    async fn ping(&self) -> BackendResult<()>;
}

/// Relational table of [`ImageRecord`]s.
#[async_trait]
pub trait ImageTable: Send + Sync {
    async fn insert(&self, record: NewImageRecord) -> BackendResult<ImageRecord>;

    /// Records newest first.
    async fn list_recent(&self, limit: usize, offset: usize) -> BackendResult<Vec<ImageRecord>>;

    /// Every record whose `image_url` contains `marker`, whatever the host.
    async fn select_by_url_marker(&self, marker: &str) -> BackendResult<Vec<ImageRecord>>;

    async fn select_all(&self) -> BackendResult<Vec<ImageRecord>>;

    /// Delete by id; ids that no longer exist are ignored.
    async fn delete_by_ids(&self, ids: &[Uuid]) -> BackendResult<u64>;

    async fn count(&self) -> BackendResult<u64>;
}
