//! Object naming convention and the public URL shape of the bucket.
//!
//! Generated objects are stored as
//! `<folder>/<prefix>-<unix-millis>-<suffix>.<ext>` and served from
//! `<base>/storage/v1/object/public/<bucket>/<path>`. Orphan detection and
//! table reconciliation recover `<path>` by parsing that URL, so both
//! shapes are part of the external contract.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Sentinel object that keeps an otherwise-empty folder alive.
pub const PLACEHOLDER_NAME: &str = ".emptyFolderPlaceholder";

/// Path segment that precedes `<bucket>/` in every public object URL.
pub const PUBLIC_OBJECT_PATH: &str = "/storage/v1/object/public/";

/// True when the last path segment of `name` is the reserved placeholder.
pub fn is_placeholder(name: &str) -> bool {
    name.rsplit('/').next() == Some(PLACEHOLDER_NAME)
}

/// Where generated objects live inside the bucket and how they are named.
#[derive(Debug, Clone)]
pub struct ObjectNaming {
    folder: String,
    prefix: String,
}

impl ObjectNaming {
    pub fn new(folder: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            folder: folder.into().trim_matches('/').to_string(),
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Listing prefix for the tracked folder: `"generated/"`, or `""` when
    /// objects sit at the bucket root.
    pub fn folder_prefix(&self) -> String {
        if self.folder.is_empty() {
            String::new()
        } else {
            format!("{}/", self.folder)
        }
    }

    pub fn placeholder_path(&self) -> String {
        format!("{}{}", self.folder_prefix(), PLACEHOLDER_NAME)
    }

    /// Build a fresh object path for an upload happening at `now`.
    pub fn new_key(&self, now: DateTime<Utc>, extension: &str) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}{}-{}-{}.{}",
            self.folder_prefix(),
            self.prefix,
            now.timestamp_millis(),
            &suffix[..8],
            extension
        )
    }

    /// Whether `name` follows the tracked naming convention: inside the
    /// folder and starting with `<prefix>-`.
    pub fn is_tracked(&self, name: &str) -> bool {
        let Some(file) = name.strip_prefix(&self.folder_prefix()) else {
            return false;
        };
        !file.contains('/') && file.starts_with(&format!("{}-", self.prefix))
    }
}

/// Builds and parses public object URLs for one bucket.
#[derive(Debug, Clone)]
pub struct PublicUrls {
    base_url: String,
    bucket: String,
}

impl PublicUrls {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    /// Common prefix of every public URL in this bucket.
    pub fn prefix(&self) -> String {
        format!("{}{}", self.base_url, self.marker())
    }

    /// Host-independent part of every public URL in this bucket,
    /// `/storage/v1/object/public/<bucket>/`.
    pub fn marker(&self) -> String {
        format!("{}{}/", PUBLIC_OBJECT_PATH, self.bucket)
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.prefix(), path.trim_start_matches('/'))
    }

    /// Recover the bucket-relative object path from a public URL.
    ///
    /// The host is not compared, only the `/storage/v1/object/public/<bucket>/`
    /// marker; any query string or fragment is dropped.
    pub fn path_of<'a>(&self, url: &'a str) -> Option<&'a str> {
        let marker = self.marker();
        let start = url.find(&marker)? + marker.len();
        let rest = &url[start..];
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        let path = &rest[..end];
        (!path.is_empty()).then_some(path)
    }
}
