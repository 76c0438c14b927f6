//! Single-file transfer.
//!
//! The [`Transport`] trait is the seam between the batch coordinator and the
//! network: one call uploads one [`UploadTask`], reporting per-file progress
//! and honoring a cancellation token. No retries happen at this layer.
//!
//! - [`http`] - multipart upload over reqwest

pub mod http;

#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::UploadResult;
use crate::progress::ProgressFn;
use crate::types::{UploadReceipt, UploadTask};

pub use http::HttpTransport;

/// Uploads one file.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `task`, calling `on_progress` with non-decreasing fractions
    /// and a final `1.0` on success.
    async fn send(
        &self,
        task: UploadTask,
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> UploadResult<UploadReceipt>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(
        &self,
        task: UploadTask,
        on_progress: ProgressFn,
        cancel: &CancellationToken,
    ) -> UploadResult<UploadReceipt> {
        (**self).send(task, on_progress, cancel).await
    }
}
