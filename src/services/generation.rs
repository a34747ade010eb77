//! Prompt → image → bucket → table.

use crate::{
    models::{
        image_record::{ImageRecord, NewImageRecord},
        object_key::{ObjectNaming, PublicUrls},
        style::{NO_STYLE, Style, UnknownStyle},
    },
    services::{
        backend::{BackendError, ImageTable, ObjectStore},
        download::{DownloadError, ImageFormat, fetch_image},
        image_generator::{GeneratedImage, ImageGenerator, UpstreamError},
        retention::{Cleanup, RetentionOptions},
    },
};
use chrono::Utc;
use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("prompt is required")]
    MissingPrompt,
    #[error(transparent)]
    UnknownStyle(#[from] UnknownStyle),
    #[error("image generation API key is not configured")]
    MissingApiKey,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error("failed to store generated image: {0}")]
    Upload(#[source] BackendError),
}

#[derive(Debug)]
pub struct GenerationOutcome {
    pub image_url: String,
    pub storage_path: String,
    /// `None` when the upload succeeded but the row insert did not.
    pub record: Option<ImageRecord>,
}

/// One generation request and the collaborators it runs against.
pub struct Generation<'a> {
    /// `None` when no API key is configured.
    pub generator: Option<&'a dyn ImageGenerator>,
    pub http: &'a Client,
    pub store: &'a dyn ObjectStore,
    pub table: &'a dyn ImageTable,
    pub naming: &'a ObjectNaming,
    pub urls: &'a PublicUrls,
    pub retention: &'a RetentionOptions,
}

impl Generation<'_> {
    pub async fn run(
        &self,
        prompt: &str,
        style: Option<&str>,
    ) -> Result<GenerationOutcome, GenerationError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::MissingPrompt);
        }
        let style = style
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<Style>)
            .transpose()?;
        let generator = self.generator.ok_or(GenerationError::MissingApiKey)?;

        let full_prompt = match style {
            Some(style) => style.compose(prompt),
            None => prompt.to_string(),
        };
        info!("generating image for prompt: {}", full_prompt);

        let (data, declared_type) = match generator.generate(&full_prompt).await? {
            GeneratedImage::Url(url) => {
                let fetched = fetch_image(self.http, &url).await?;
                (fetched.data, fetched.content_type)
            }
            GeneratedImage::Inline(bytes) => (bytes, None),
        };

        let format = ImageFormat::sniff(&data, declared_type.as_deref());
        let storage_path = self.naming.new_key(Utc::now(), format.extension());
        let size = data.len();
        self.store
            .upload(&storage_path, data, format.mime())
            .await
            .map_err(GenerationError::Upload)?;
        info!("uploaded {} ({} bytes)", storage_path, size);

        let image_url = self.urls.url_for(&storage_path);
        let record = match self
            .table
            .insert(NewImageRecord {
                prompt: prompt.to_string(),
                style: style.map_or(NO_STYLE, Style::as_str).to_string(),
                image_url: image_url.clone(),
                storage_path: Some(storage_path.clone()),
            })
            .await
        {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("image {} stored but record insert failed: {}", storage_path, err);
                None
            }
        };

        if record.is_some() {
            self.enforce_cap_if_full().await;
        }

        Ok(GenerationOutcome {
            image_url,
            storage_path,
            record,
        })
    }

    /// Run cap enforcement once the table holds `cap` or more rows.
    /// Never fails the request. A zero cap is skipped here, since it would
    /// delete the image just created.
    async fn enforce_cap_if_full(&self) {
        let cap = self.retention.cap;
        if cap == 0 {
            return;
        }
        match self.table.count().await {
            Ok(count) if count >= cap as u64 => {
                info!("{} records at cap {}, enforcing retention", count, cap);
                let cleanup = Cleanup {
                    store: self.store,
                    table: self.table,
                    naming: self.naming,
                    urls: self.urls,
                    options: self.retention,
                };
                if let Err(err) = cleanup.enforce_retention().await {
                    warn!("retention after generation failed: {}", err);
                }
            }
            Ok(_) => {}
            Err(err) => warn!("could not count image records: {}", err),
        }
    }
}
