//! Public object reads for the local backend.
//!
//! `GET|HEAD /storage/v1/object/public/{bucket}/{*path}` mirrors the URL
//! shape of hosted storage so records look the same on either backend.
//! Bodies are streamed from disk.

use crate::{
    errors::AppError, models::storage_object::StoredObject,
    services::local_store::LocalObjectStore, state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::Response,
};
use tokio_util::io::ReaderStream;

fn local_store<'a>(state: &'a AppState, bucket: &str) -> Result<&'a LocalObjectStore, AppError> {
    state
        .local
        .as_ref()
        .filter(|store| store.bucket() == bucket)
        .ok_or_else(|| AppError::not_found(format!("bucket `{}` not found", bucket)))
}

pub async fn get_public_object(
    State(state): State<AppState>,
    method: Method,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let store = local_store(&state, &bucket)?;
    let (meta, file) = store
        .open_object(&key)
        .await?
        .ok_or_else(|| AppError::not_found(format!("object `{}` not found", key)))?;

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from_stream(ReaderStream::new(file))
    };

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject) {
    let content_type = meta
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into());
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.created_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
}
