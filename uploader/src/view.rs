//! Session upload view model.
//!
//! Headless model of the "upload material" page for one session. A renderer
//! (the CLI, or any UI) feeds it user input, reads its fields, and watches
//! the `state` and `progress` channels while an upload runs.
//!
//! ```text
//!            pick files            submit
//!   Idle ───────────────▶ Selecting ───────▶ Uploading
//!    ▲                        ▲                 │
//!    │   clear / remove all   │     Failed ◀────┤
//!    └────────────────────────┼──── (notice)    │
//!    ▲                        └─────────────────┘
//!    │                                          │
//!    └────────── Succeeded (notice, refresh) ◀──┘
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::coordinator::{BatchCoordinator, BatchReport};
use crate::error::{BatchError, UploadError, ViewError, ViewResult};
use crate::notice::{Notice, NoticeBoard};
use crate::progress::PercentFn;
use crate::session::SessionSource;
use crate::transport::Transport;
use crate::types::{SessionDetails, UploadKind, UploadReceipt, UploadSource, UploadTask};

// =============================================================================
// View types
// =============================================================================

/// Which upload the page is for, taken from the `type` query value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadTab {
    Recordings,
    Files,
}

impl UploadTab {
    pub fn kind(&self) -> UploadKind {
        match self {
            UploadTab::Recordings => UploadKind::Record,
            UploadTab::Files => UploadKind::File,
        }
    }
}

impl FromStr for UploadTab {
    type Err = ViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recordings" => Ok(UploadTab::Recordings),
            "files" => Ok(UploadTab::Files),
            other => Err(ViewError::UnknownTab(other.to_string())),
        }
    }
}

/// Page state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewState {
    /// Nothing selected; upload disabled.
    Idle,
    /// At least one file picked; upload enabled.
    Selecting,
    /// Batch running; inputs disabled.
    Uploading,
    Succeeded,
    Failed,
}

/// How the last submit ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Uploaded(Vec<UploadReceipt>),
    /// Sequential batch stopped at `index`; earlier tasks were stored.
    Failed {
        index: usize,
        uploaded: usize,
        error: UploadError,
    },
    /// Concurrent batch with at least one failure, one outcome per task.
    Partial(BatchReport),
}

/// A file picked by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub size: u64,
    pub source: UploadSource,
}

impl SelectedFile {
    /// Read name and size from the source.
    pub async fn inspect(source: UploadSource) -> std::io::Result<Self> {
        let size = source.size().await?;
        Ok(Self {
            name: source.file_name(),
            size,
            source,
        })
    }

    pub fn size_label(&self) -> String {
        format_file_size(self.size)
    }
}

// =============================================================================
// View model
// =============================================================================

/// Upload page for one session.
pub struct SessionUploadView<T, S> {
    class_id: String,
    session_id: String,
    tab: UploadTab,
    coordinator: BatchCoordinator<T>,
    sessions: S,
    notices: NoticeBoard,
    concurrency: Option<usize>,

    state: ViewState,
    state_tx: watch::Sender<ViewState>,
    progress_tx: Arc<watch::Sender<u8>>,
    selected_files: Vec<SelectedFile>,
    selected_recording: Option<SelectedFile>,
    session: Option<SessionDetails>,
    last_outcome: Option<Outcome>,
}

impl<T: Transport, S: SessionSource> SessionUploadView<T, S> {
    pub fn new(
        class_id: impl Into<String>,
        session_id: impl Into<String>,
        tab: UploadTab,
        coordinator: BatchCoordinator<T>,
        sessions: S,
        notices: NoticeBoard,
    ) -> Self {
        let (state_tx, _) = watch::channel(ViewState::Idle);
        let (progress_tx, _) = watch::channel(0u8);
        Self {
            class_id: class_id.into(),
            session_id: session_id.into(),
            tab,
            coordinator,
            sessions,
            notices,
            concurrency: None,
            state: ViewState::Idle,
            state_tx,
            progress_tx: Arc::new(progress_tx),
            selected_files: Vec::new(),
            selected_recording: None,
            session: None,
            last_outcome: None,
        }
    }

    /// Upload files with up to `limit` transfers in flight instead of one
    /// at a time. Values below 2 keep sequential uploads.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = (limit > 1).then_some(limit);
        self
    }

    // -------------------------------------------------------------------------
    // Read side
    // -------------------------------------------------------------------------

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn tab(&self) -> UploadTab {
        self.tab
    }

    pub fn session(&self) -> Option<&SessionDetails> {
        self.session.as_ref()
    }

    pub fn selected_files(&self) -> &[SelectedFile] {
        &self.selected_files
    }

    pub fn selected_recording(&self) -> Option<&SelectedFile> {
        self.selected_recording.as_ref()
    }

    pub fn last_outcome(&self) -> Option<&Outcome> {
        self.last_outcome.as_ref()
    }

    /// Current aggregate percentage.
    pub fn progress(&self) -> u8 {
        *self.progress_tx.borrow()
    }

    pub fn is_uploading(&self) -> bool {
        self.state == ViewState::Uploading
    }

    /// Follow the aggregate percentage while a submit runs.
    pub fn watch_progress(&self) -> watch::Receiver<u8> {
        self.progress_tx.subscribe()
    }

    /// Follow state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ViewState> {
        self.state_tx.subscribe()
    }

    /// True when the recording is already on the server ("Already Uploaded").
    pub fn recording_locked(&self) -> bool {
        self.session.as_ref().is_some_and(SessionDetails::has_recording)
    }

    /// Whether the upload button is enabled.
    pub fn can_submit(&self) -> bool {
        if self.is_uploading() {
            return false;
        }
        match self.tab {
            UploadTab::Files => !self.selected_files.is_empty(),
            UploadTab::Recordings => self.selected_recording.is_some() && !self.recording_locked(),
        }
    }

    // -------------------------------------------------------------------------
    // Session snapshot
    // -------------------------------------------------------------------------

    /// Fetch the session and replace the snapshot wholesale.
    pub async fn refresh(&mut self) -> ViewResult<&SessionDetails> {
        match self.sessions.fetch_session(&self.session_id).await {
            Ok(details) => {
                log::debug!(
                    "Session {} refreshed: {} record(s), {} file(s)",
                    self.session_id,
                    details.records.len(),
                    details.files.len()
                );
                Ok(self.session.insert(details))
            }
            Err(e) => {
                log::error!("Failed to fetch session details: {}", e);
                Err(e.into())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Replace the file selection. An empty pick changes nothing.
    pub fn select_files(&mut self, files: Vec<SelectedFile>) -> ViewResult<()> {
        self.ensure_idle_input(UploadTab::Files)?;
        if files.is_empty() {
            return Ok(());
        }
        self.selected_files = files;
        self.set_state(ViewState::Selecting);
        Ok(())
    }

    pub fn remove_file(&mut self, index: usize) -> ViewResult<Option<SelectedFile>> {
        self.ensure_idle_input(UploadTab::Files)?;
        if index >= self.selected_files.len() {
            return Ok(None);
        }
        let removed = self.selected_files.remove(index);
        if self.selected_files.is_empty() {
            self.set_state(ViewState::Idle);
        }
        Ok(Some(removed))
    }

    pub fn select_recording(&mut self, file: SelectedFile) -> ViewResult<()> {
        self.ensure_idle_input(UploadTab::Recordings)?;
        self.selected_recording = Some(file);
        self.set_state(ViewState::Selecting);
        Ok(())
    }

    pub fn clear_recording(&mut self) -> ViewResult<()> {
        self.ensure_idle_input(UploadTab::Recordings)?;
        self.selected_recording = None;
        self.set_state(ViewState::Idle);
        Ok(())
    }

    fn ensure_idle_input(&self, tab: UploadTab) -> ViewResult<()> {
        if self.is_uploading() {
            return Err(ViewError::NotAllowed("an upload is in progress".to_string()));
        }
        if self.tab != tab {
            return Err(ViewError::NotAllowed(format!(
                "this page uploads {:?}, not {:?}",
                self.tab, tab
            )));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Submit
    // -------------------------------------------------------------------------

    /// Upload the current selection for this page's tab.
    pub async fn submit(&mut self, cancel: &CancellationToken) -> ViewResult<Vec<UploadReceipt>> {
        match self.tab {
            UploadTab::Files => self.submit_files(cancel).await,
            UploadTab::Recordings => self.submit_recording(cancel).await.map(|r| vec![r]),
        }
    }

    async fn submit_files(&mut self, cancel: &CancellationToken) -> ViewResult<Vec<UploadReceipt>> {
        if self.is_uploading() {
            return Err(ViewError::NotAllowed("an upload is in progress".to_string()));
        }
        if self.selected_files.is_empty() {
            self.notices.warning("Please select at least one file to upload.");
            return Err(ViewError::Validation("no files selected".to_string()));
        }

        let tasks: Vec<UploadTask> = self
            .selected_files
            .iter()
            .map(|f| self.task_for(f, UploadKind::File))
            .collect();

        self.begin_upload();
        if let Some(limit) = self.concurrency {
            return self.submit_concurrent(tasks, limit, cancel).await;
        }

        let result = self
            .coordinator
            .upload_batch(tasks, self.progress_sink(), cancel)
            .await;

        match result {
            Ok(receipts) => {
                self.files_uploaded(receipts.clone()).await;
                Ok(receipts)
            }
            Err(err) => {
                self.notices.post(failure_notice(
                    &err,
                    "There was an error uploading your files. Please try again.",
                ));
                self.finish_failure(&err);
                Err(err.into())
            }
        }
    }

    /// Every task runs; on partial failure the report is kept whole and only
    /// the failed files stay selected for a retry.
    async fn submit_concurrent(
        &mut self,
        tasks: Vec<UploadTask>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> ViewResult<Vec<UploadReceipt>> {
        let result = self
            .coordinator
            .upload_concurrent(tasks, limit, self.progress_sink(), cancel)
            .await;

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.notices.post(failure_notice(
                    &err,
                    "There was an error uploading your files. Please try again.",
                ));
                self.finish_failure(&err);
                return Err(err.into());
            }
        };

        if report.is_success() {
            let receipts: Vec<UploadReceipt> = report.receipts().into_iter().cloned().collect();
            self.files_uploaded(receipts.clone()).await;
            return Ok(receipts);
        }

        let failed: Vec<usize> = report.failures().iter().map(|(i, _)| *i).collect();
        self.selected_files = std::mem::take(&mut self.selected_files)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| failed.contains(i))
            .map(|(_, file)| file)
            .collect();

        let cancelled = report
            .failures()
            .iter()
            .all(|(_, e)| **e == UploadError::Cancelled);
        if cancelled {
            self.notices.warning(format!(
                "Upload cancelled after {} file(s).",
                report.uploaded()
            ));
        } else {
            self.notices
                .error("There was an error uploading your files. Please try again.");
        }

        self.set_state(ViewState::Failed);
        self.last_outcome = Some(Outcome::Partial(report.clone()));
        self.settle_after_failure();
        Err(ViewError::Partial(report))
    }

    async fn submit_recording(&mut self, cancel: &CancellationToken) -> ViewResult<UploadReceipt> {
        if self.is_uploading() {
            return Err(ViewError::NotAllowed("an upload is in progress".to_string()));
        }
        if self.recording_locked() {
            return Err(ViewError::NotAllowed("Already Uploaded".to_string()));
        }
        let Some(recording) = self.selected_recording.clone() else {
            self.notices.warning("Please select a video recording to upload.");
            return Err(ViewError::Validation("no recording selected".to_string()));
        };

        let task = self.task_for(&recording, UploadKind::Record);
        self.begin_upload();
        let result = self
            .coordinator
            .upload_one(task, self.progress_sink(), cancel)
            .await;

        match result {
            Ok(receipt) => {
                self.notices
                    .success(format!("{} has been uploaded.", recording.name));
                self.selected_recording = None;
                self.finish_success(vec![receipt.clone()]).await;
                Ok(receipt)
            }
            Err(err) => {
                self.notices.post(failure_notice(
                    &err,
                    "There was an error uploading your recording. Please try again.",
                ));
                self.finish_failure(&err);
                Err(err.into())
            }
        }
    }

    fn task_for(&self, file: &SelectedFile, kind: UploadKind) -> UploadTask {
        UploadTask::new(
            file.source.clone(),
            self.class_id.clone(),
            self.session_id.clone(),
            kind,
        )
    }

    fn progress_sink(&self) -> PercentFn {
        let tx = Arc::clone(&self.progress_tx);
        Arc::new(move |pct: u8| {
            tx.send_replace(pct);
        })
    }

    fn begin_upload(&mut self) {
        self.progress_tx.send_replace(0);
        self.last_outcome = None;
        self.set_state(ViewState::Uploading);
    }

    async fn files_uploaded(&mut self, receipts: Vec<UploadReceipt>) {
        self.notices
            .success(format!("{} file(s) have been uploaded.", receipts.len()));
        self.selected_files.clear();
        self.finish_success(receipts).await;
    }

    async fn finish_success(&mut self, receipts: Vec<UploadReceipt>) {
        self.progress_tx.send_replace(100);
        self.set_state(ViewState::Succeeded);
        self.last_outcome = Some(Outcome::Uploaded(receipts));
        // the upload stands even if the refresh fails
        let refreshed = self.refresh().await.map(|_| ());
        if let Err(e) = refreshed {
            self.notices.error(format!("Could not refresh session: {}", e));
        }
        self.set_state(ViewState::Idle);
    }

    fn finish_failure(&mut self, err: &BatchError) {
        self.set_state(ViewState::Failed);
        self.last_outcome = Some(Outcome::Failed {
            index: err.index,
            uploaded: err.uploaded,
            error: err.source.clone(),
        });
        self.settle_after_failure();
    }

    fn settle_after_failure(&mut self) {
        let has_selection = match self.tab {
            UploadTab::Files => !self.selected_files.is_empty(),
            UploadTab::Recordings => self.selected_recording.is_some(),
        };
        self.set_state(if has_selection { ViewState::Selecting } else { ViewState::Idle });
    }

    fn set_state(&mut self, next: ViewState) {
        if self.state != next {
            log::debug!("View {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        self.state_tx.send_replace(next);
    }
}

fn failure_notice(err: &BatchError, generic: &str) -> Notice {
    if err.is_cancelled() {
        Notice::warning(format!("Upload cancelled after {} file(s).", err.uploaded))
    } else {
        Notice::error(generic)
    }
}

/// Human-readable size: bytes below 1 KiB, then KB and MB with one decimal.
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1_048_576 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    }
}
