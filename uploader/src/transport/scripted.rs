//! In-memory transport for unit tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::Transport;
use crate::error::{UploadError, UploadResult};
use crate::progress::ProgressFn;
use crate::types::{UploadReceipt, UploadTask};

/// What the nth call does.
#[derive(Clone, Debug)]
pub enum Step {
    /// Report these fractions, then succeed.
    Succeed(Vec<f64>),
    /// Report these fractions, then fail.
    Fail(Vec<f64>, UploadError),
    /// Never finish; only cancellation ends it.
    Hang,
}

/// Plays back one [`Step`] per call; calls past the script succeed.
pub struct ScriptedTransport {
    steps: Mutex<Vec<Step>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().rev().collect()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Every call succeeds with a linear 0.25 → 1.0 ramp.
    pub fn succeeding() -> Self {
        Self::new(Vec::new())
    }

    /// Pause between progress ticks, so concurrent calls overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// File names in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if self.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.delay).await;
        }
    }

    async fn play(&self, task: UploadTask, on_progress: ProgressFn) -> UploadResult<UploadReceipt> {
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Step::Succeed(vec![0.25, 0.5, 0.75]));

        match step {
            Step::Succeed(ticks) => {
                for fraction in ticks {
                    on_progress(fraction);
                    self.pause().await;
                }
                on_progress(1.0);
                Ok(UploadReceipt {
                    file_name: task.source.file_name(),
                    session_id: task.session_id.clone(),
                    kind: task.kind,
                    url: format!("/files/{}", task.source.file_name()),
                })
            }
            Step::Fail(ticks, err) => {
                for fraction in ticks {
                    on_progress(fraction);
                    self.pause().await;
                }
                Err(err)
            }
            Step::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        task: UploadTask,
        on_progress: ProgressFn,
        _cancel: &CancellationToken,
    ) -> UploadResult<UploadReceipt> {
        self.calls.lock().unwrap().push(task.source.file_name());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.play(task, on_progress).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
