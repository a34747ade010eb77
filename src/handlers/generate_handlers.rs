//! `POST /api/generate-image` - prompt in, stored image URL out.

use crate::{errors::AppError, state::AppState};
use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: Option<String>,
    pub style: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub image_url: String,
    pub storage_path: String,
}

/// The body is parsed by hand so malformed JSON answers 400 with the
/// usual `{"error"}` shape instead of axum's rejection text.
pub async fn generate_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GenerateResponse>, AppError> {
    let request: GenerateRequest = serde_json::from_slice(&body)
        .map_err(|err| AppError::bad_request(format!("invalid JSON body: {}", err)))?;

    let outcome = state
        .generation()
        .run(
            request.prompt.as_deref().unwrap_or_default(),
            request.style.as_deref(),
        )
        .await?;

    Ok(Json(GenerateResponse {
        image_url: outcome.image_url,
        storage_path: outcome.storage_path,
    }))
}
