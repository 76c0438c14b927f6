//! Application configuration.
//!
//! Values come from the environment (a `.env` file is loaded first if
//! present). Everything has a development default except the CDN
//! credentials, without which image upload is unavailable.

use std::env;
use std::time::Duration;

use reqwest::Url;

use crate::error::ConfigError;

/// Backend API base URL used when `UPLOADER_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Image CDN API base.
pub const DEFAULT_CDN_URL: &str = "https://api.cloudinary.com/v1_1";

/// Display name used when `UPLOADER_PRODUCT_NAME` is unset.
pub const DEFAULT_PRODUCT_NAME: &str = "Session Uploader";

/// Read size for streamed upload bodies (64 KiB).
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// In-flight limit for concurrent batches when none is given.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Buffered notices per subscriber.
pub const NOTICE_CHANNEL_CAPACITY: usize = 100;

/// File name used for downloads without a name.
pub const DEFAULT_DOWNLOAD_NAME: &str = "downloaded_file";

/// Effective configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend base URL, no trailing slash.
    pub api_url: String,
    /// Base for relative `fileUrl` values, no trailing slash.
    pub media_url: String,
    /// Image CDN API base, no trailing slash.
    pub cdn_url: String,
    pub cdn_name: Option<String>,
    pub cdn_preset: Option<String>,
    /// Per-request timeout. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    pub support_facebook: Option<String>,
    pub support_zalo: Option<String>,
    pub product_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            media_url: DEFAULT_API_URL.to_string(),
            cdn_url: DEFAULT_CDN_URL.to_string(),
            cdn_name: None,
            cdn_preset: None,
            request_timeout: None,
            support_facebook: None,
            support_zalo: None,
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
        }
    }
}

impl Config {
    /// Build the configuration from `UPLOADER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_url = get("UPLOADER_API_URL")
            .map(|v| trim_base(&v))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let media_url = get("UPLOADER_MEDIA_URL")
            .map(|v| trim_base(&v))
            .unwrap_or_else(|| api_url.clone());
        let cdn_url = get("UPLOADER_CDN_URL")
            .map(|v| trim_base(&v))
            .unwrap_or_else(|| DEFAULT_CDN_URL.to_string());

        let request_timeout = match get("UPLOADER_TIMEOUT_SECS") {
            None => None,
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    name: "UPLOADER_TIMEOUT_SECS".to_string(),
                    value: raw.clone(),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        Ok(Self {
            api_url,
            media_url,
            cdn_url,
            cdn_name: get("UPLOADER_CDN_NAME"),
            cdn_preset: get("UPLOADER_CDN_PRESET"),
            request_timeout,
            support_facebook: get("UPLOADER_SUPPORT_FACEBOOK"),
            support_zalo: get("UPLOADER_SUPPORT_ZALO"),
            product_name: get("UPLOADER_PRODUCT_NAME")
                .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string()),
        })
    }

    /// Point every backend URL at `base`.
    pub fn with_api_url(mut self, base: &str) -> Self {
        self.api_url = trim_base(base);
        self.media_url = self.api_url.clone();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// `POST` target for material uploads.
    pub fn upload_url(&self) -> String {
        format!("{}/files/upload", self.api_url)
    }

    pub fn download_url(&self, file_id: &str) -> Result<Url, ConfigError> {
        self.api_endpoint(&["files", "download", file_id])
    }

    pub fn session_url(&self, session_id: &str) -> Result<Url, ConfigError> {
        self.api_endpoint(&["sessions", session_id])
    }

    /// `api_url` with `segments` appended, each one percent-encoded.
    fn api_endpoint(&self, segments: &[&str]) -> Result<Url, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            name: "UPLOADER_API_URL".to_string(),
            value: self.api_url.clone(),
        };
        let mut url = Url::parse(&self.api_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Absolute URL of a stored file given its backend-relative `fileUrl`.
    pub fn media_link(&self, file_url: &str) -> String {
        if file_url.starts_with("http://") || file_url.starts_with("https://") {
            file_url.to_string()
        } else if file_url.starts_with('/') {
            format!("{}{}", self.media_url, file_url)
        } else {
            format!("{}/{}", self.media_url, file_url)
        }
    }

    /// CDN image upload endpoint, if a cloud name is configured.
    pub fn image_upload_url(&self) -> Option<String> {
        self.cdn_name
            .as_ref()
            .map(|name| format!("{}/{}/image/upload", self.cdn_url, name))
    }

    /// Build the shared HTTP client.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))
    }
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
