//! Fetching image bytes from URLs, file-type sniffing and download naming.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, header};
use thiserror::Error;

/// Image formats we recognise when choosing extensions and content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl ImageFormat {
    /// Magic bytes first, then the declared content type; PNG when neither helps.
    pub fn sniff(data: &[u8], content_type: Option<&str>) -> Self {
        Self::from_magic(data)
            .or_else(|| content_type.and_then(Self::from_content_type))
            .unwrap_or(ImageFormat::Png)
    }

    fn from_magic(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else {
            None
        }
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        let lowered = content_type.to_ascii_lowercase();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            Some(ImageFormat::Jpeg)
        } else if lowered.contains("webp") {
            Some(ImageFormat::Webp)
        } else if lowered.contains("gif") {
            Some(ImageFormat::Gif)
        } else if lowered.contains("png") {
            Some(ImageFormat::Png)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
            ImageFormat::Gif => "gif",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Gif => "image/gif",
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("could not fetch image: upstream returned {status}")]
    Status { status: u16 },
    #[error("could not fetch image: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub data: Bytes,
    /// `Content-Type` as declared by the server, if any.
    pub content_type: Option<String>,
}

impl FetchedImage {
    pub fn format(&self) -> ImageFormat {
        ImageFormat::sniff(&self.data, self.content_type.as_deref())
    }

    /// `data:<content-type>;base64,<payload>`, defaulting to `image/png`.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type.as_deref().unwrap_or("image/png"),
            general_purpose::STANDARD.encode(&self.data)
        )
    }
}

pub async fn fetch_image(http: &Client, url: &str) -> Result<FetchedImage, DownloadError> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        tracing::error!("image fetch failed: {} {}", status, url);
        return Err(DownloadError::Status {
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let data = response.bytes().await?;
    tracing::debug!("fetched {} bytes from {}", data.len(), url);

    Ok(FetchedImage { data, content_type })
}

/// Suggested file name for a download:
/// `<prefix>-<first 20 chars of prompt, sanitized>-<unix-millis>.<ext>`.
///
/// Characters outside ASCII alphanumerics and Hangul syllables become `_`.
pub fn download_file_name(
    prefix: &str,
    prompt: Option<&str>,
    now: DateTime<Utc>,
    format: ImageFormat,
) -> String {
    let slug = prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            p.chars()
                .take(20)
                .map(|c| {
                    if c.is_ascii_alphanumeric() || ('가'..='힣').contains(&c) {
                        c
                    } else {
                        '_'
                    }
                })
                .collect::<String>()
        });

    match slug {
        Some(slug) => format!(
            "{}-{}-{}.{}",
            prefix,
            slug,
            now.timestamp_millis(),
            format.extension()
        ),
        None => format!("{}-{}.{}", prefix, now.timestamp_millis(), format.extension()),
    }
}
