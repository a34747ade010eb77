//! Supabase backend: Storage REST for objects, PostgREST for the
//! `generated_images` table.
//!
//! Both halves share one [`SupabaseClient`] built from the project URL and
//! the service-role key; every request carries `apikey` and a bearer token.

use crate::{
    models::{
        image_record::{ImageRecord, NewImageRecord},
        storage_object::StorageObject,
    },
    services::backend::{BackendError, BackendResult, ImageTable, ListPage, ObjectStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, header};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

/// PostgREST caps unbounded selects; page through with this size instead.
const TABLE_PAGE_SIZE: usize = 1000;
/// Ids per `id=in.(...)` filter, keeping the query string short.
const DELETE_CHUNK: usize = 100;

#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(http: Client, base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }
}

/// Turn a non-2xx response into [`BackendError::Status`], pulling the
/// human-readable message out of the JSON body when there is one.
async fn check(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::debug!("supabase error body ({}): {}", status, body);
    Err(BackendError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
            ..
        }) => message,
        Ok(ErrorBody {
            error: Some(error), ..
        }) => error,
        _ if body.trim().is_empty() => "no response body".to_string(),
        _ => body.trim().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SupabaseStorage {
    client: SupabaseClient,
    bucket: String,
}

#[derive(Deserialize)]
struct ListedEntry {
    name: String,
    /// `null` for folders.
    id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RemovedEntry {
    name: String,
}

impl SupabaseStorage {
    pub fn new(client: SupabaseClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn list_page(
        &self,
        prefix: &str,
        limit: usize,
        offset: usize,
    ) -> BackendResult<ListPage> {
        let folder = prefix.trim_end_matches('/');
        let response = self
            .client
            .request(
                Method::POST,
                &format!("/storage/v1/object/list/{}", self.bucket),
            )
            .json(&json!({
                "prefix": folder,
                "limit": limit,
                "offset": offset,
                "sortBy": { "column": "created_at", "order": "desc" },
            }))
            .send()
            .await?;
        let entries: Vec<ListedEntry> = check(response).await?.json().await?;
        let fetched = entries.len();

        let objects = entries
            .into_iter()
            .filter(|entry| entry.id.is_some())
            .map(|entry| StorageObject {
                name: if folder.is_empty() {
                    entry.name
                } else {
                    format!("{}/{}", folder, entry.name)
                },
                created_at: entry.created_at.unwrap_or_default(),
            })
            .collect();
        Ok(ListPage { objects, fetched })
    }

    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> BackendResult<()> {
        let response = self
            .client
            .request(
                Method::POST,
                &format!("/storage/v1/object/{}/{}", self.bucket, path),
            )
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn remove(&self, paths: &[String]) -> BackendResult<Vec<String>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .client
            .request(Method::DELETE, &format!("/storage/v1/object/{}", self.bucket))
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        let removed: Vec<RemovedEntry> = check(response).await?.json().await?;
        Ok(removed.into_iter().map(|entry| entry.name).collect())
    }

    async fn ping(&self) -> BackendResult<()> {
        let response = self
            .client
            .request(Method::GET, &format!("/storage/v1/bucket/{}", self.bucket))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SupabaseTable {
    client: SupabaseClient,
    table: String,
}

impl SupabaseTable {
    pub fn new(client: SupabaseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn path(&self) -> String {
        format!("/rest/v1/{}", self.table)
    }

    async fn select(&self, filters: &[(&str, String)]) -> BackendResult<Vec<ImageRecord>> {
        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("select", "*".into()),
                ("order", "created_at.desc".into()),
                ("limit", TABLE_PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ];
            query.extend(filters.iter().cloned());

            let response = self
                .client
                .request(Method::GET, &self.path())
                .query(&query)
                .send()
                .await?;
            let page: Vec<ImageRecord> = check(response).await?.json().await?;
            let fetched = page.len();
            records.extend(page);
            if fetched < TABLE_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }
        Ok(records)
    }
}

/// Total from a PostgREST `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl ImageTable for SupabaseTable {
    async fn insert(&self, record: NewImageRecord) -> BackendResult<ImageRecord> {
        let response = self
            .client
            .request(Method::POST, &self.path())
            .header("Prefer", "return=representation")
            .json(&record)
            .send()
            .await?;
        let mut rows: Vec<ImageRecord> = check(response).await?.json().await?;
        rows.pop()
            .ok_or_else(|| BackendError::Decode("insert returned no rows".into()))
    }

    async fn list_recent(&self, limit: usize, offset: usize) -> BackendResult<Vec<ImageRecord>> {
        let response = self
            .client
            .request(Method::GET, &self.path())
            .query(&[
                ("select", "*".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn select_by_url_marker(&self, marker: &str) -> BackendResult<Vec<ImageRecord>> {
        self.select(&[("image_url", format!("like.*{}*", marker))])
            .await
    }

    async fn select_all(&self) -> BackendResult<Vec<ImageRecord>> {
        self.select(&[]).await
    }

    async fn delete_by_ids(&self, ids: &[Uuid]) -> BackendResult<u64> {
        let mut deleted = 0;
        for chunk in ids.chunks(DELETE_CHUNK) {
            let list = chunk
                .iter()
                .map(Uuid::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let response = self
                .client
                .request(Method::DELETE, &self.path())
                .query(&[("id", format!("in.({})", list))])
                .header("Prefer", "return=representation")
                .send()
                .await?;
            let rows: Vec<serde_json::Value> = check(response).await?.json().await?;
            deleted += rows.len() as u64;
        }
        Ok(deleted)
    }

    async fn count(&self) -> BackendResult<u64> {
        let response = self
            .client
            .request(Method::HEAD, &self.path())
            .query(&[("select", "id")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = check(response).await?;
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| BackendError::Decode("missing Content-Range total".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::object_key::{ObjectNaming, PublicUrls},
        services::{
            retention::{Cleanup, RetentionOptions},
            testing::MemoryTable,
        },
    };
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, body_partial_json, header as header_eq, method, path, query_param},
    };

    fn client(server: &MockServer) -> SupabaseClient {
        SupabaseClient::new(Client::new(), server.uri(), "service-key")
    }

    #[test]
    fn content_range_total_parses_both_forms() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-24/*"), None);
    }

    #[test]
    fn error_message_prefers_json_fields() {
        assert_eq!(error_message(r#"{"message":"Bucket not found"}"#), "Bucket not found");
        assert_eq!(error_message(r#"{"error":"Unauthorized"}"#), "Unauthorized");
        assert_eq!(error_message("bad gateway"), "bad gateway");
        assert_eq!(error_message(""), "no response body");
    }

    #[tokio::test]
    async fn list_page_joins_folder_and_skips_subfolders() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/education-images"))
            .and(header_eq("apikey", "service-key"))
            .and(body_json(json!({
                "prefix": "generated",
                "limit": 100,
                "offset": 200,
                "sortBy": { "column": "created_at", "order": "desc" },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "name": "ai-vision-2-b.png", "id": "2", "created_at": "2025-01-02T00:00:00Z" },
                { "name": "nested", "id": null, "created_at": null },
                { "name": "ai-vision-1-a.png", "id": "1", "created_at": "2025-01-01T00:00:00Z" }
            ])))
            .mount(&server)
            .await;

        let storage = SupabaseStorage::new(client(&server), "education-images");
        let page = storage.list_page("generated/", 100, 200).await.unwrap();

        assert_eq!(page.fetched, 3);
        let names: Vec<_> = page.objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["generated/ai-vision-2-b.png", "generated/ai-vision-1-a.png"]);
    }

    fn listed_files(range: std::ops::Range<u32>) -> Vec<serde_json::Value> {
        range
            .map(|n| {
                json!({
                    "name": format!("ai-vision-{n}-abcd1234.png"),
                    "id": n.to_string(),
                    "created_at": "2025-01-01T00:00:00Z",
                })
            })
            .collect()
    }

    #[tokio::test]
    async fn full_page_with_a_folder_entry_keeps_paging() {
        let server = MockServer::start().await;
        let mut first = vec![json!({ "name": "nested", "id": null, "created_at": null })];
        first.extend(listed_files(0..99));
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/education-images"))
            .and(body_partial_json(json!({ "offset": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(first))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/list/education-images"))
            .and(body_partial_json(json!({ "offset": 100 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(listed_files(99..149)))
            .expect(1)
            .mount(&server)
            .await;

        let storage = SupabaseStorage::new(client(&server), "education-images");
        let table = MemoryTable::default();
        let naming = ObjectNaming::new("generated", "ai-vision");
        let urls = PublicUrls::new(server.uri(), "education-images");
        let options = RetentionOptions::default();
        let cleanup = Cleanup {
            store: &storage,
            table: &table,
            naming: &naming,
            urls: &urls,
            options: &options,
        };

        let listed = cleanup.list_all().await.unwrap();
        assert_eq!(listed.len(), 149);
        assert!(listed.iter().all(|o| naming.is_tracked(&o.name)));
    }

    #[tokio::test]
    async fn remove_sends_prefixes_and_returns_names() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/storage/v1/object/education-images"))
            .and(body_json(json!({ "prefixes": ["generated/a.png", "generated/b.png"] })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "name": "generated/a.png" }])),
            )
            .mount(&server)
            .await;

        let storage = SupabaseStorage::new(client(&server), "education-images");
        let removed = storage
            .remove(&["generated/a.png".into(), "generated/b.png".into()])
            .await
            .unwrap();
        assert_eq!(removed, vec!["generated/a.png".to_string()]);
    }

    #[tokio::test]
    async fn upload_failure_carries_upstream_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/storage/v1/object/education-images/generated/a.png"))
            .respond_with(
                ResponseTemplate::new(413).set_body_json(json!({ "message": "Payload too large" })),
            )
            .mount(&server)
            .await;

        let storage = SupabaseStorage::new(client(&server), "education-images");
        let err = storage
            .upload("generated/a.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap_err();
        match err {
            BackendError::Status { status, message } => {
                assert_eq!(status, 413);
                assert_eq!(message, "Payload too large");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn insert_returns_representation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/generated_images"))
            .and(header_eq("Prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
                "id": "6f1c2a44-8f0e-4b8f-9a55-3b8c6a1f0d11",
                "prompt": "a lighthouse",
                "style": "watercolor",
                "image_url": "https://x/a.png",
                "storage_path": null,
                "created_at": "2025-01-01T00:00:00+00:00"
            }])))
            .mount(&server)
            .await;

        let table = SupabaseTable::new(client(&server), "generated_images");
        let record = table
            .insert(NewImageRecord {
                prompt: "a lighthouse".into(),
                style: "watercolor".into(),
                image_url: "https://x/a.png".into(),
                storage_path: None,
            })
            .await
            .unwrap();
        assert_eq!(record.prompt, "a lighthouse");
        assert_eq!(record.storage_path, None);
    }

    #[tokio::test]
    async fn select_by_url_marker_uses_like_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/generated_images"))
            .and(query_param("image_url", "like.*/storage/v1/object/public/b/*"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let table = SupabaseTable::new(client(&server), "generated_images");
        let rows = table
            .select_by_url_marker("/storage/v1/object/public/b/")
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn delete_by_ids_counts_returned_rows() {
        let server = MockServer::start().await;
        let id = Uuid::parse_str("6f1c2a44-8f0e-4b8f-9a55-3b8c6a1f0d11").unwrap();
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/generated_images"))
            .and(query_param("id", format!("in.({id})")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": id }])))
            .mount(&server)
            .await;

        let table = SupabaseTable::new(client(&server), "generated_images");
        assert_eq!(table.delete_by_ids(&[id]).await.unwrap(), 1);
        assert_eq!(table.delete_by_ids(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn count_reads_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/rest/v1/generated_images"))
            .and(header_eq("Prefer", "count=exact"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Range", "0-0/42"))
            .mount(&server)
            .await;

        let table = SupabaseTable::new(client(&server), "generated_images");
        assert_eq!(table.count().await.unwrap(), 42);
    }
}
