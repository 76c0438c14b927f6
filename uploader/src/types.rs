//! Common types shared by the transport, coordinator and view.
//!
//! # Categories
//!
//! - **Upload Types** - what gets sent and what the backend confirms
//! - **Session Types** - read-only session snapshot from the backend
//! - **Serde helpers** - lenient id/date decoding for backend payloads

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::io::AsyncRead;

// =============================================================================
// Upload Types
// =============================================================================

/// What an upload is attached to the session as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    /// Lecture material (slides, documents, ...)
    #[serde(alias = "File")]
    File,
    /// Video recording of the session
    #[serde(alias = "Record")]
    Record,
}

impl UploadKind {
    /// Value of the multipart `Type` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadKind::File => "file",
            UploadKind::Record => "record",
        }
    }
}

impl fmt::Display for UploadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(UploadKind::File),
            "record" => Ok(UploadKind::Record),
            other => Err(format!("unknown upload kind '{}'", other)),
        }
    }
}

/// Where the bytes of an upload come from.
#[derive(Clone, Debug, PartialEq)]
pub enum UploadSource {
    /// A file on disk.
    Path(PathBuf),
    /// An in-memory buffer with a display name.
    Bytes { name: String, data: Vec<u8> },
}

/// Boxed reader handed to the transport.
pub type SourceReader = Box<dyn AsyncRead + Send + Sync + Unpin>;

impl UploadSource {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        UploadSource::Path(path.into())
    }

    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        UploadSource::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// File name sent in the multipart `File` part.
    pub fn file_name(&self) -> String {
        match self {
            UploadSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            UploadSource::Bytes { name, .. } => name.clone(),
        }
    }

    /// Total size in bytes, as currently known.
    pub async fn size(&self) -> std::io::Result<u64> {
        match self {
            UploadSource::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
            UploadSource::Bytes { data, .. } => Ok(data.len() as u64),
        }
    }

    /// Open the source for streaming, returning the reader and its size.
    pub async fn open(self) -> std::io::Result<(SourceReader, u64)> {
        match self {
            UploadSource::Path(path) => {
                let file = tokio::fs::File::open(&path).await?;
                let len = file.metadata().await?.len();
                Ok((Box::new(file), len))
            }
            UploadSource::Bytes { data, .. } => {
                let len = data.len() as u64;
                Ok((Box::new(Cursor::new(data)), len))
            }
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            UploadSource::Path(path) => Some(path),
            UploadSource::Bytes { .. } => None,
        }
    }
}

/// One file to attach to one session.
///
/// Built at submit time and moved into the transport, which consumes it.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadTask {
    pub source: UploadSource,
    /// Class the session belongs to (routing context, not sent).
    pub class_id: String,
    pub session_id: String,
    pub kind: UploadKind,
}

impl UploadTask {
    pub fn new(
        source: UploadSource,
        class_id: impl Into<String>,
        session_id: impl Into<String>,
        kind: UploadKind,
    ) -> Self {
        Self {
            source,
            class_id: class_id.into(),
            session_id: session_id.into(),
            kind,
        }
    }
}

/// Backend confirmation for one stored file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_name: String,
    #[serde(deserialize_with = "de_id")]
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: UploadKind,
    #[serde(default)]
    pub url: String,
}

// =============================================================================
// Session Types
// =============================================================================

/// Class a session belongs to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInfo {
    pub class_code: String,
    pub class_name: String,
}

/// An uploaded recording.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    #[serde(deserialize_with = "de_id")]
    pub record_id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub created_at: Option<NaiveDateTime>,
}

/// An uploaded material file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    #[serde(deserialize_with = "de_id")]
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub file_url: String,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub created_at: Option<NaiveDateTime>,
}

/// Read-only snapshot of a session, replaced wholesale on refresh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub session_id: Option<String>,
    pub session_number: u32,
    #[serde(rename = "class")]
    pub class_info: ClassInfo,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub slot: Option<String>,
    #[serde(default, deserialize_with = "de_opt_datetime")]
    pub session_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub records: Vec<RecordEntry>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

impl SessionDetails {
    /// Session date as `dd/mm/yyyy`, or `TBD` when unscheduled.
    pub fn date_label(&self) -> String {
        self.session_date
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "TBD".to_string())
    }

    /// True once a recording is attached; a session holds one recording.
    pub fn has_recording(&self) -> bool {
        !self.records.is_empty()
    }
}

// =============================================================================
// Serde helpers
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
    Float(f64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Int(n) => n.to_string(),
            RawId::Float(f) => f.to_string(),
        }
    }
}

/// Ids arrive as strings or numbers depending on the backend version.
fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    RawId::deserialize(d).map(RawId::into_string)
}

fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(d)?.map(RawId::into_string))
}

fn de_opt_datetime<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_datetime(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", s))),
    }
}

/// Accepts RFC 3339, naive ISO date-times and plain dates.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::from_str(s) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
