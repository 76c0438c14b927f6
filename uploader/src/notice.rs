//! User-facing notifications ("toasts").
//!
//! The view publishes a [`Notice`] for every outcome the user should see.
//! Renderers subscribe to the [`NoticeBoard`] and display them however they
//! like; the CLI prints them to stderr.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::config::NOTICE_CHANNEL_CAPACITY;

/// Notice severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NoticeLevel {
    /// Emoji prefix for terminal display.
    pub fn emoji(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "ℹ️",
            NoticeLevel::Success => "✅",
            NoticeLevel::Warning => "⚠️",
            NoticeLevel::Error => "❌",
        }
    }
}

/// A single notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Broadcasts notices to every subscribed renderer.
///
/// Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    sender: broadcast::Sender<Notice>,
}

impl NoticeBoard {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish a notice; it is also written to the log.
    pub fn post(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => log::error!("{}", notice.message),
            NoticeLevel::Warning => log::warn!("{}", notice.message),
            NoticeLevel::Info | NoticeLevel::Success => log::info!("{}", notice.message),
        }
        // no subscribers is fine
        let _ = self.sender.send(notice);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.post(Notice::success(message));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.post(Notice::warning(message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.post(Notice::error(message));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new()
    }
}
