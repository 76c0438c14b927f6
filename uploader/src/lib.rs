//! # Session Uploader - class session material uploads
//!
//! Attaches lecture recordings and course files to a class session on the
//! course-management backend, reporting aggregate progress while it streams.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Upload View │────▶│ Coordinator  │────▶│  Transport  │────▶│   Backend   │
//! │ (selection) │     │ (batch, 0-100│     │ (multipart, │     │ /files/...  │
//! │             │◀────│  progress)   │◀────│  0.0-1.0)   │     │ /sessions/..│
//! └─────────────┘     └──────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use session_uploader::{
//!     AppContext, Config, SelectedFile, SessionUploadView, UploadSource, UploadTab,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctx = AppContext::init(Config::from_env().unwrap()).unwrap();
//!     let mut view = SessionUploadView::new(
//!         "class-1", "session-4", UploadTab::Files,
//!         ctx.coordinator(), ctx.session_client(), ctx.notices().clone(),
//!     );
//!     let file = SelectedFile::inspect(UploadSource::from_path("week4.pdf")).await.unwrap();
//!     view.select_files(vec![file]).unwrap();
//!     view.submit(&CancellationToken::new()).await.unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per component
//! - [`types`] - Upload tasks, receipts and session snapshots
//! - [`config`] - Environment configuration
//! - [`progress`] - Byte and batch progress accounting
//! - [`notice`] - User-facing notifications
//! - [`transport`] - Single-file multipart upload
//! - [`coordinator`] - Batch uploads with aggregate progress
//! - [`session`] - Session lookup and file download
//! - [`image`] - Image upload to the CDN
//! - [`context`] - Process-wide application context
//! - [`view`] - Upload page state machine

// Core modules
pub mod config;
pub mod error;
pub mod types;

// Upload pipeline
pub mod coordinator;
pub mod progress;
pub mod transport;

// Backend services
pub mod image;
pub mod session;

// Application
pub mod context;
pub mod notice;
pub mod view;

// Re-exports for convenience
pub use config::Config;
pub use context::{AppContext, UserProfile};
pub use coordinator::{BatchCoordinator, BatchReport, BatchResult};
pub use error::{
    BatchError, ConfigError, DownloadError, ImageUploadError, SessionError, UploadError,
    UploadResult, ViewError,
};
pub use image::ImageUploader;
pub use notice::{Notice, NoticeBoard, NoticeLevel};
pub use progress::{PercentFn, ProgressFn};
pub use session::{SessionClient, SessionSource};
pub use transport::{HttpTransport, Transport};
pub use types::{SessionDetails, UploadKind, UploadReceipt, UploadSource, UploadTask};
pub use view::{format_file_size, SelectedFile, SessionUploadView, UploadTab, ViewState};
