//! Session lookup and stored-file download.
//!
//! | Method | Path                          | Result               |
//! |--------|-------------------------------|----------------------|
//! | GET    | `/sessions/{sessionId}`       | [`SessionDetails`]   |
//! | GET    | `/files/download/{fileId}`    | raw bytes            |

use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};

use crate::config::{Config, DEFAULT_DOWNLOAD_NAME};
use crate::error::{DownloadError, SessionError, SessionResult};
use crate::types::SessionDetails;

/// Anything that can produce a fresh session snapshot.
#[async_trait]
pub trait SessionSource: Send + Sync {
    async fn fetch_session(&self, session_id: &str) -> SessionResult<SessionDetails>;
}

/// HTTP client for the session service and file downloads.
#[derive(Clone, Debug)]
pub struct SessionClient {
    client: reqwest::Client,
    config: Config,
}

impl SessionClient {
    pub fn new(client: reqwest::Client, config: Config) -> Self {
        Self { client, config }
    }

    /// Fetch one session by id.
    pub async fn get_session(&self, session_id: &str) -> SessionResult<SessionDetails> {
        let url = self
            .config
            .session_url(session_id)
            .map_err(|e| SessionError::HttpError(e.to_string()))?;
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SessionError::HttpError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SessionError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<SessionDetails>()
            .await
            .map_err(|e| SessionError::InvalidResponse(e.to_string()))
    }

    /// Download a stored file into memory.
    pub async fn download_bytes(&self, file_id: &str) -> Result<Vec<u8>, DownloadError> {
        let url = self
            .config
            .download_url(file_id)
            .map_err(|e| DownloadError::HttpError(e.to_string()))?;
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::HttpError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Server {
                status: status.as_u16(),
                file_id: file_id.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::HttpError(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Download a stored file into `dir`, named `file_name` or
    /// `downloaded_file`. Returns the written path.
    pub async fn download_to(
        &self,
        file_id: &str,
        file_name: Option<&str>,
        dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let bytes = self.download_bytes(file_id).await?;
        let path = dir.join(download_name(file_name));
        tokio::fs::write(&path, &bytes).await?;
        log::info!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait]
impl SessionSource for SessionClient {
    async fn fetch_session(&self, session_id: &str) -> SessionResult<SessionDetails> {
        self.get_session(session_id).await
    }
}

/// Local file name for a download; path separators in the server-provided
/// name are not allowed to escape the target directory.
pub fn download_name(file_name: Option<&str>) -> String {
    file_name
        .map(|n| n.rsplit(&['/', '\\'][..]).next().unwrap_or("").trim().to_string())
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| DEFAULT_DOWNLOAD_NAME.to_string())
}
