//! Batch upload coordination.
//!
//! Two ways to run a batch:
//!
//! | Method                                  | Order         | On failure                       |
//! |-----------------------------------------|---------------|----------------------------------|
//! | [`BatchCoordinator::upload_batch`]      | one at a time | stop, report failing index       |
//! | [`BatchCoordinator::upload_concurrent`] | up to `limit` | keep going, report every outcome |
//!
//! Uploads are not transactional: files stored before a failure stay on the
//! server. Refreshing the session afterwards is the caller's job.

use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::{BatchError, UploadError, UploadResult};
use crate::progress::{ParallelProgress, PercentFn, ProgressFn, ProgressState};
use crate::transport::Transport;
use crate::types::{UploadReceipt, UploadTask};

/// Result type for batch operations.
pub type BatchResult<T> = Result<T, BatchError>;

/// Outcome of a concurrent batch, one entry per task in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<UploadResult<UploadReceipt>>,
}

impl BatchReport {
    /// Number of tasks stored on the server.
    pub fn uploaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn receipts(&self) -> Vec<&UploadReceipt> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok()).collect()
    }

    /// Failed tasks with their input index.
    pub fn failures(&self) -> Vec<(usize, &UploadError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().err().map(|e| (i, e)))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_ok())
    }
}

/// Drives a [`Transport`] over a batch of tasks.
#[derive(Debug, Clone)]
pub struct BatchCoordinator<T> {
    transport: T,
}

impl<T: Transport> BatchCoordinator<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Upload `tasks` strictly in order, one at a time.
    ///
    /// `on_progress` receives the aggregate percentage, never decreasing,
    /// ending at 100 on success. The first failure stops the batch; later
    /// tasks are never sent. The receipts are returned in input order, so
    /// the uploaded count is `receipts.len()`.
    pub async fn upload_batch(
        &self,
        tasks: Vec<UploadTask>,
        on_progress: PercentFn,
        cancel: &CancellationToken,
    ) -> BatchResult<Vec<UploadReceipt>> {
        if tasks.is_empty() {
            return Err(BatchError::rejected(UploadError::Validation(
                "no files selected".to_string(),
            )));
        }

        let total = tasks.len();
        let state = Arc::new(Mutex::new(ProgressState::new(total)));
        emit(&on_progress, lock(&state).update_fraction(0.0));

        log::info!("Starting batch of {} upload(s)", total);
        let mut receipts = Vec::with_capacity(total);

        for (index, task) in tasks.into_iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("Batch cancelled before task {}", index);
                return Err(BatchError {
                    index,
                    uploaded: receipts.len(),
                    receipts,
                    source: UploadError::Cancelled,
                });
            }

            let file_progress: ProgressFn = {
                let state = Arc::clone(&state);
                let sink = Arc::clone(&on_progress);
                Arc::new(move |fraction: f64| {
                    // emit under the lock so ticks from other threads stay ordered
                    let mut state = lock(&state);
                    // late ticks from a finished file are dropped
                    if state.completed_count == index {
                        emit(&sink, state.update_fraction(fraction));
                    }
                })
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(UploadError::Cancelled),
                result = self.transport.send(task, file_progress, cancel) => result,
            };

            match result {
                Ok(receipt) => {
                    log::debug!("Task {}/{} done: {}", index + 1, total, receipt.file_name);
                    receipts.push(receipt);
                    emit(&on_progress, lock(&state).complete_file());
                }
                Err(source) => {
                    log::error!("Task {}/{} failed: {}", index + 1, total, source);
                    return Err(BatchError {
                        index,
                        uploaded: receipts.len(),
                        receipts,
                        source,
                    });
                }
            }
        }

        log::info!("Batch finished: {} upload(s)", receipts.len());
        Ok(receipts)
    }

    /// Upload a single task as a batch of one.
    pub async fn upload_one(
        &self,
        task: UploadTask,
        on_progress: PercentFn,
        cancel: &CancellationToken,
    ) -> BatchResult<UploadReceipt> {
        let mut receipts = self.upload_batch(vec![task], on_progress, cancel).await?;
        receipts.pop().ok_or_else(|| {
            BatchError::rejected(UploadError::InvalidResponse("no receipt".to_string()))
        })
    }

    /// Upload `tasks` with at most `limit` transfers in flight.
    ///
    /// Every task runs (unless cancelled) and its outcome is reported by
    /// index; one failure does not stop the others.
    pub async fn upload_concurrent(
        &self,
        tasks: Vec<UploadTask>,
        limit: usize,
        on_progress: PercentFn,
        cancel: &CancellationToken,
    ) -> BatchResult<BatchReport> {
        if tasks.is_empty() {
            return Err(BatchError::rejected(UploadError::Validation(
                "no files selected".to_string(),
            )));
        }

        let total = tasks.len();
        let limit = limit.max(1);
        let state = Arc::new(Mutex::new(ParallelProgress::new(total)));
        emit(&on_progress, lock(&state).update(0, 0.0));

        log::info!("Starting concurrent batch of {} upload(s), limit {}", total, limit);

        let mut results: Vec<(usize, UploadResult<UploadReceipt>)> =
            futures::stream::iter(tasks.into_iter().enumerate())
                .map(|(index, task)| {
                    let state = Arc::clone(&state);
                    let sink = Arc::clone(&on_progress);
                    async move {
                        if cancel.is_cancelled() {
                            return (index, Err(UploadError::Cancelled));
                        }

                        let file_progress: ProgressFn = {
                            let state = Arc::clone(&state);
                            let sink = Arc::clone(&sink);
                            Arc::new(move |fraction: f64| {
                                let mut state = lock(&state);
                                emit(&sink, state.update(index, fraction));
                            })
                        };

                        let result = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => Err(UploadError::Cancelled),
                            result = self.transport.send(task, file_progress, cancel) => result,
                        };

                        match &result {
                            Ok(_) => emit(&sink, lock(&state).update(index, 1.0)),
                            Err(e) => log::error!("Task {}/{} failed: {}", index + 1, total, e),
                        }
                        (index, result)
                    }
                })
                .buffer_unordered(limit)
                .collect()
                .await;

        results.sort_by_key(|(index, _)| *index);
        let report = BatchReport {
            outcomes: results.into_iter().map(|(_, result)| result).collect(),
        };

        log::info!(
            "Concurrent batch finished: {}/{} uploaded",
            report.uploaded(),
            total
        );
        Ok(report)
    }
}

fn emit(sink: &PercentFn, pct: Option<u8>) {
    if let Some(pct) = pct {
        sink(pct);
    }
}

fn lock<S>(state: &Mutex<S>) -> MutexGuard<'_, S> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
