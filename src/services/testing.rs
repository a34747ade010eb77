//! In-memory store and table with failure injection, for tests.

use crate::{
    models::{
        image_record::{ImageRecord, NewImageRecord},
        storage_object::StorageObject,
    },
    services::{
        backend::{BackendError, BackendResult, ImageTable, ListPage, ObjectStore},
        image_generator::{GeneratedImage, ImageGenerator, UpstreamError},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use std::{collections::HashSet, sync::Mutex};
use uuid::Uuid;

/// Fixed instant `n` seconds after an arbitrary epoch.
pub fn at(n: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + n, 0).unwrap()
}

fn unavailable() -> BackendError {
    BackendError::Status {
        status: 503,
        message: "injected failure".into(),
    }
}

#[derive(Default)]
struct StoreState {
    objects: Vec<StorageObject>,
    uploads: Vec<(String, Bytes, String)>,
    list_offsets: Vec<usize>,
    remove_calls: usize,
    removed: Vec<String>,
    failing_removes: HashSet<usize>,
    fail_listing: bool,
    fail_uploads: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn put(&self, name: &str, created_at: DateTime<Utc>) {
        self.state.lock().unwrap().objects.push(StorageObject {
            name: name.to_string(),
            created_at,
        });
    }

    /// Sorted object names currently stored.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .objects
            .iter()
            .map(|o| o.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn uploads(&self) -> Vec<(String, Bytes, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn list_offsets(&self) -> Vec<usize> {
        self.state.lock().unwrap().list_offsets.clone()
    }

    pub fn remove_calls(&self) -> usize {
        self.state.lock().unwrap().remove_calls
    }

    pub fn removed_paths(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    /// Make the `call`-th (0-based) `remove` fail.
    pub fn fail_remove_call(&self, call: usize) {
        self.state.lock().unwrap().failing_removes.insert(call);
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn fail_uploads(&self) {
        self.state.lock().unwrap().fail_uploads = true;
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        prefix: &str,
        limit: usize,
        offset: usize,
    ) -> BackendResult<ListPage> {
        let mut state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(unavailable());
        }
        state.list_offsets.push(offset);
        let mut matching: Vec<StorageObject> = state
            .objects
            .iter()
            .filter(|o| o.name.starts_with(prefix))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ListPage::of(matching.into_iter().skip(offset).take(limit).collect()))
    }

    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> BackendResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_uploads {
            return Err(unavailable());
        }
        state
            .uploads
            .push((path.to_string(), data, content_type.to_string()));
        state.objects.push(StorageObject {
            name: path.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> BackendResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        let call = state.remove_calls;
        state.remove_calls += 1;
        if state.failing_removes.contains(&call) {
            return Err(unavailable());
        }
        let wanted: HashSet<&String> = paths.iter().collect();
        let mut removed = Vec::new();
        state.objects.retain(|o| {
            if wanted.contains(&o.name) {
                removed.push(o.name.clone());
                false
            } else {
                true
            }
        });
        state.removed.extend(removed.iter().cloned());
        Ok(removed)
    }

    async fn ping(&self) -> BackendResult<()> {
        Ok(())
    }
}

#[derive(Default)]
struct TableState {
    rows: Vec<ImageRecord>,
    inserted: i64,
    delete_calls: usize,
    fail_selects: bool,
    fail_inserts: bool,
}

#[derive(Default)]
pub struct MemoryTable {
    state: Mutex<TableState>,
}

impl MemoryTable {
    pub async fn insert_now(&self, record: NewImageRecord) -> ImageRecord {
        self.insert(record).await.unwrap()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    pub fn rows(&self) -> Vec<ImageRecord> {
        self.state.lock().unwrap().rows.clone()
    }

    pub fn delete_calls(&self) -> usize {
        self.state.lock().unwrap().delete_calls
    }

    pub fn fail_selects(&self) {
        self.state.lock().unwrap().fail_selects = true;
    }

    pub fn fail_inserts(&self) {
        self.state.lock().unwrap().fail_inserts = true;
    }

    fn newest_first(rows: &[ImageRecord]) -> Vec<ImageRecord> {
        let mut rows = rows.to_vec();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }
}

#[async_trait]
impl ImageTable for MemoryTable {
    async fn insert(&self, record: NewImageRecord) -> BackendResult<ImageRecord> {
        let mut state = self.state.lock().unwrap();
        if state.fail_inserts {
            return Err(unavailable());
        }
        state.inserted += 1;
        let row = ImageRecord {
            id: Uuid::new_v4(),
            prompt: record.prompt,
            style: record.style,
            image_url: record.image_url,
            storage_path: record.storage_path,
            created_at: at(1_000_000 + state.inserted),
        };
        state.rows.push(row.clone());
        Ok(row)
    }

    async fn list_recent(&self, limit: usize, offset: usize) -> BackendResult<Vec<ImageRecord>> {
        let state = self.state.lock().unwrap();
        if state.fail_selects {
            return Err(unavailable());
        }
        Ok(Self::newest_first(&state.rows)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn select_by_url_marker(&self, marker: &str) -> BackendResult<Vec<ImageRecord>> {
        let state = self.state.lock().unwrap();
        if state.fail_selects {
            return Err(unavailable());
        }
        Ok(Self::newest_first(&state.rows)
            .into_iter()
            .filter(|r| r.image_url.contains(marker))
            .collect())
    }

    async fn select_all(&self) -> BackendResult<Vec<ImageRecord>> {
        let state = self.state.lock().unwrap();
        if state.fail_selects {
            return Err(unavailable());
        }
        Ok(Self::newest_first(&state.rows))
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> BackendResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        let before = state.rows.len();
        state.rows.retain(|r| !ids.contains(&r.id));
        Ok((before - state.rows.len()) as u64)
    }

    async fn count(&self) -> BackendResult<u64> {
        Ok(self.state.lock().unwrap().rows.len() as u64)
    }
}

/// Generator that answers every prompt the same way and remembers prompts.
pub struct StubGenerator {
    answer: Result<GeneratedImage, (u16, String)>,
    prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    pub fn returning(image: GeneratedImage) -> Self {
        Self {
            answer: Ok(image),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16, message: &str) -> Self {
        Self {
            answer: Err((status, message.to_string())),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for StubGenerator {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImage, UpstreamError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.answer {
            Ok(image) => Ok(image.clone()),
            Err((status, message)) => Err(UpstreamError::Api {
                status: *status,
                message: message.clone(),
            }),
        }
    }
}
