//! LocalObjectStore - self-hosted bucket backed by SQLite for object
//! metadata and local disk for payloads, sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{name}`.

use crate::{
    models::storage_object::StoredObject,
    services::backend::{BackendError, BackendResult, ListPage, ObjectStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for object metadata.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    bucket: String,
}

impl LocalObjectStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Rejects empty or oversized keys, absolute paths, `..` and control bytes.
    fn ensure_key_safe(&self, key: &str) -> BackendResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(BackendError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard directories from MD5(bucket/key), keeping the file
    /// count per directory small.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_object(&self, key: &str) -> BackendResult<Option<StoredObject>> {
        let row = sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket, name, content_type, size_bytes, etag, created_at
             FROM storage_objects WHERE bucket = ? AND name = ?",
        )
        .bind(&self.bucket)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    /// Write `data` to disk and upsert its metadata row.
    ///
    /// The payload goes to a temp file in the target directory first and is
    /// renamed into place after `fsync`, so readers never see a partial file.
    pub async fn put_object(
        &self,
        key: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> BackendResult<StoredObject> {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            BackendError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = write_synced(&tmp_path, data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BackendError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BackendError::Io(err));
        }

        let etag = format!("{:x}", md5::compute(data));

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO storage_objects (
                id, bucket, name, content_type, size_bytes, etag, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket, name) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                created_at = excluded.created_at
            RETURNING id, bucket, name, content_type, size_bytes, etag, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&self.bucket)
        .bind(key)
        .bind(content_type)
        .bind(data.len() as i64)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => Ok(obj),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(BackendError::Sqlx(err))
            }
        }
    }

    /// Metadata plus an open file handle, or `None` when the object (or its
    /// payload) is missing.
    pub async fn open_object(&self, key: &str) -> BackendResult<Option<(StoredObject, File)>> {
        self.ensure_key_safe(key)?;
        let Some(object) = self.fetch_object(key).await? else {
            return Ok(None);
        };

        match File::open(self.object_path(key)).await {
            Ok(file) => Ok(Some((object, file))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BackendError::Io(err)),
        }
    }

    /// Remove the metadata row and the payload. Returns `false` when the
    /// object did not exist.
    pub async fn delete_object(&self, key: &str) -> BackendResult<bool> {
        self.ensure_key_safe(key)?;

        let result = sqlx::query("DELETE FROM storage_objects WHERE bucket = ? AND name = ?")
            .bind(&self.bucket)
            .bind(key)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(BackendError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root()).await;
        }

        Ok(result.rows_affected() > 0)
    }

    /// Create the folder placeholder object if it is not there yet.
    pub async fn ensure_placeholder(&self, path: &str) -> BackendResult<()> {
        if self.fetch_object(path).await?.is_none() {
            self.put_object(path, b"", Some("text/plain")).await?;
            tracing::info!("Created placeholder object {}/{}", self.bucket, path);
        }
        Ok(())
    }

    /// Remove empty directories from `start` up to, not including, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        limit: usize,
        offset: usize,
    ) -> BackendResult<ListPage> {
        let rows = sqlx::query_as::<_, StoredObject>(
            "SELECT id, bucket, name, content_type, size_bytes, etag, created_at
             FROM storage_objects
             WHERE bucket = ? AND substr(name, 1, length(?)) = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ? OFFSET ?",
        )
        .bind(&self.bucket)
        .bind(prefix)
        .bind(prefix)
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&*self.db)
        .await?;

        Ok(ListPage::of(rows.iter().map(StoredObject::listing_entry).collect()))
    }

    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> BackendResult<()> {
        self.put_object(path, &data, Some(content_type)).await?;
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> BackendResult<Vec<String>> {
        let mut removed = Vec::with_capacity(paths.len());
        for path in paths {
            if self.delete_object(path).await? {
                removed.push(path.clone());
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> BackendResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        fs::create_dir_all(self.bucket_root()).await?;
        Ok(())
    }
}
