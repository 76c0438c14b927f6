//! Multipart upload to the backend.
//!
//! `POST {api}/files/upload` with fields:
//!
//! | Field       | Content                      |
//! |-------------|------------------------------|
//! | `File`      | file bytes, streamed         |
//! | `SessionId` | target session               |
//! | `Type`      | `file` or `record`           |
//!
//! Response: `{ fileName, sessionId, type, url }`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::config::{Config, UPLOAD_CHUNK_SIZE};
use crate::error::{UploadError, UploadResult};
use crate::progress::{ByteProgress, ProgressFn};
use crate::types::{UploadReceipt, UploadTask};

/// reqwest-backed [`Transport`].
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    upload_url: String,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            upload_url: config.upload_url(),
        }
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    async fn transfer(
        &self,
        task: UploadTask,
        on_progress: ProgressFn,
    ) -> UploadResult<UploadReceipt> {
        let file_name = task.source.file_name();
        let (reader, total) = task.source.open().await?;
        if total == 0 {
            return Err(UploadError::UnknownSize(file_name));
        }

        log::info!(
            "Uploading {} ({} bytes) as {} to session {}",
            file_name,
            total,
            task.kind,
            task.session_id
        );

        let tracker = Arc::new(Mutex::new(ByteProgress::new(total)));
        let counter = Arc::clone(&tracker);
        let tick = Arc::clone(&on_progress);
        let stream = ReaderStream::with_capacity(reader, UPLOAD_CHUNK_SIZE).inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                let advanced = lock(&counter).advance(bytes.len() as u64);
                if let Some(fraction) = advanced {
                    tick(fraction);
                }
            }
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(file_name.clone());
        let form = Form::new()
            .part("File", part)
            .text("SessionId", task.session_id.clone())
            .text("Type", task.kind.as_str());

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(UploadError::from)?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::warn!("Upload of {} rejected ({}): {}", file_name, status, message);
            return Err(UploadError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let receipt = response
            .json::<UploadReceipt>()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        let last = lock(&tracker).finish();
        if let Some(fraction) = last {
            on_progress(fraction);
        }

        log::info!("Uploaded {} -> {}", receipt.file_name, receipt.url);
        Ok(receipt)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        task: UploadTask,
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> UploadResult<UploadReceipt> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Upload cancelled");
                Err(UploadError::Cancelled)
            }
            result = self.transfer(task, on_progress) => result,
        }
    }
}

fn lock(progress: &Mutex<ByteProgress>) -> MutexGuard<'_, ByteProgress> {
    progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
