//! Metadata row describing one generated image.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A generated image as recorded in the `generated_images` table.
///
/// Every field is immutable once inserted. `image_url` usually points into
/// the bucket's public URL space; `storage_path` is the bucket-relative path
/// of the backing object when the generation flow knows it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct ImageRecord {
    /// Row identifier, generated on insert.
    pub id: Uuid,

    /// Prompt exactly as the user typed it (without the style suffix).
    pub prompt: String,

    /// Style tag chosen from the fixed style list.
    pub style: String,

    /// Public URL of the image.
    pub image_url: String,

    /// Bucket-relative path of the backing object, if known.
    #[serde(default)]
    pub storage_path: Option<String>,

    /// Insert time; drives gallery ordering and retention.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`ImageRecord`]. The backend assigns `id` and `created_at`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NewImageRecord {
    pub prompt: String,
    pub style: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
}
