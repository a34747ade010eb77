//! Gallery browsing and downloads.
//!
//! - `GET  /api/images`         - records newest first (`?limit=&offset=`)
//! - `GET  /api/styles`         - the selectable styles
//! - `POST /api/download-image` - fetch an image and return it as a data URL

use crate::{
    errors::AppError,
    models::{image_record::ImageRecord, style::Style},
    services::download::{download_file_name, fetch_image},
    state::AppState,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 200;

#[derive(Debug, Deserialize)]
pub struct ListImagesQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_images(
    State(state): State<AppState>,
    Query(q): Query<ListImagesQuery>,
) -> Result<Json<Vec<ImageRecord>>, AppError> {
    let limit = q.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let records = state
        .table
        .list_recent(limit, q.offset.unwrap_or(0))
        .await?;
    Ok(Json(records))
}

#[derive(Debug, Serialize)]
pub struct StyleEntry {
    pub value: Style,
    pub prompt: &'static str,
}

pub async fn list_styles() -> Json<Vec<StyleEntry>> {
    Json(
        Style::ALL
            .into_iter()
            .map(|style| StyleEntry {
                value: style,
                prompt: style.prompt_suffix(),
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub image_url: Option<String>,
    /// Used to build a readable file name.
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub image_data: String,
    pub content_type: String,
    pub file_name: String,
}

pub async fn download_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DownloadResponse>, AppError> {
    let request: DownloadRequest = serde_json::from_slice(&body)
        .map_err(|err| AppError::bad_request(format!("invalid JSON body: {}", err)))?;
    let url = request
        .image_url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("imageUrl is required"))?;

    tracing::info!("download proxy request: {}", url);
    let image = fetch_image(&state.http, &url).await?;
    let format = image.format();
    let content_type = image
        .content_type
        .clone()
        .unwrap_or_else(|| format.mime().to_string());

    Ok(Json(DownloadResponse {
        image_data: image.data_url(),
        file_name: download_file_name(
            state.naming.prefix(),
            request.prompt.as_deref(),
            Utc::now(),
            format,
        ),
        content_type,
    }))
}
