//! Objects held in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The view of a bucket entry that listing returns.
///
/// Only the name (folder prefix included) and the creation time are ever
/// consulted by cleanup.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StorageObject {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Full metadata row kept by the local backend in `storage_objects`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Bucket the object belongs to.
    pub bucket: String,

    /// Path-like name within the bucket, e.g. `generated/ai-vision-1-abcd.png`.
    pub name: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload, hex encoded.
    pub etag: Option<String>,

    /// Upload time.
    pub created_at: DateTime<Utc>,
}

impl StoredObject {
    pub fn listing_entry(&self) -> StorageObject {
        StorageObject {
            name: self.name.clone(),
            created_at: self.created_at,
        }
    }
}
