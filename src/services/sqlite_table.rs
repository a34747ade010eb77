//! `generated_images` table on the local SQLite database.

use crate::{
    models::image_record::{ImageRecord, NewImageRecord},
    services::backend::{BackendResult, ImageTable},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, prompt, style, image_url, storage_path, created_at \
                              FROM generated_images";

#[derive(Clone)]
pub struct SqliteImageTable {
    pub db: Arc<SqlitePool>,
}

impl SqliteImageTable {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ImageTable for SqliteImageTable {
    async fn insert(&self, record: NewImageRecord) -> BackendResult<ImageRecord> {
        let row = sqlx::query_as::<_, ImageRecord>(
            r#"
            INSERT INTO generated_images (id, prompt, style, image_url, storage_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, prompt, style, image_url, storage_path, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.prompt)
        .bind(&record.style)
        .bind(&record.image_url)
        .bind(&record.storage_path)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;
        Ok(row)
    }

    async fn list_recent(&self, limit: usize, offset: usize) -> BackendResult<Vec<ImageRecord>> {
        let rows = sqlx::query_as::<_, ImageRecord>(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn select_by_url_marker(&self, marker: &str) -> BackendResult<Vec<ImageRecord>> {
        let rows = sqlx::query_as::<_, ImageRecord>(&format!(
            "{SELECT_COLUMNS} WHERE instr(image_url, ?) > 0 \
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(marker)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn select_all(&self) -> BackendResult<Vec<ImageRecord>> {
        let rows = sqlx::query_as::<_, ImageRecord>(&format!(
            "{SELECT_COLUMNS} ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> BackendResult<u64> {
        let mut deleted = 0;
        // Stay well under SQLite's bound-parameter limit.
        for chunk in ids.chunks(500) {
            let mut builder =
                QueryBuilder::<Sqlite>::new("DELETE FROM generated_images WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            deleted += builder.build().execute(&*self.db).await?.rows_affected();
        }
        Ok(deleted)
    }

    async fn count(&self) -> BackendResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generated_images")
            .fetch_one(&*self.db)
            .await?;
        Ok(count.max(0) as u64)
    }
}
