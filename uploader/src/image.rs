//! Image upload to the third-party CDN (avatars, cover pictures).
//!
//! `POST {cdn}/{cloudName}/image/upload` with multipart fields `file` and
//! `upload_preset`. Success: `{ "secure_url": "..." }`. Failure:
//! `{ "error": { "message": "..." } }`.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;

use crate::config::Config;
use crate::error::ImageUploadError;

#[derive(Debug, Deserialize)]
struct CdnResponse {
    #[serde(default)]
    secure_url: Option<String>,
    #[serde(default)]
    error: Option<CdnError>,
}

#[derive(Debug, Deserialize)]
struct CdnError {
    message: String,
}

/// Client for unsigned CDN uploads.
#[derive(Clone, Debug)]
pub struct ImageUploader {
    client: reqwest::Client,
    endpoint: String,
    preset: String,
}

impl ImageUploader {
    /// Build from configuration; fails when cloud name or preset is missing.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Result<Self, ImageUploadError> {
        let endpoint = config
            .image_upload_url()
            .ok_or_else(|| ImageUploadError::NotConfigured("UPLOADER_CDN_NAME".to_string()))?;
        let preset = config
            .cdn_preset
            .clone()
            .ok_or_else(|| ImageUploadError::NotConfigured("UPLOADER_CDN_PRESET".to_string()))?;
        Ok(Self {
            client,
            endpoint,
            preset,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Upload an image file; returns its public HTTPS URL.
    pub async fn upload_file(&self, path: &Path) -> Result<String, ImageUploadError> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        self.upload_bytes(&name, data).await
    }

    /// Upload an in-memory image; returns its public HTTPS URL.
    pub async fn upload_bytes(
        &self,
        name: &str,
        data: Vec<u8>,
    ) -> Result<String, ImageUploadError> {
        let form = Form::new()
            .part("file", Part::bytes(data).file_name(name.to_string()))
            .text("upload_preset", self.preset.clone());

        log::info!("Uploading image {} to CDN", name);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ImageUploadError::HttpError(e.to_string()))?;

        let ok = response.status().is_success();
        let status = response.status();
        let body: CdnResponse = response.json().await.map_err(|e| {
            ImageUploadError::HttpError(format!("unreadable CDN response ({}): {}", status, e))
        })?;

        if !ok {
            let message = body
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("upload failed ({})", status));
            log::error!("CDN rejected {}: {}", name, message);
            return Err(ImageUploadError::Rejected(message));
        }

        body.secure_url.ok_or(ImageUploadError::MissingUrl)
    }
}
