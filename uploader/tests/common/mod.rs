//! In-process fake of the course backend and the image CDN.
//!
//! | Method | Path                                | Behaviour           |
//! |--------|-------------------------------------|---------------------|
//! | POST   | `/api/files/upload`                 | stores the file     |
//! | GET    | `/api/files/download/{fileId}`      | raw bytes           |
//! | GET    | `/api/sessions/{sessionId}`         | session snapshot    |
//! | POST   | `/cdn/{cloudName}/image/upload`     | `secure_url`        |
//! | POST   | `/slow/api/files/upload`            | answers after 5s    |
//! | POST   | `/garbled/api/files/upload`         | 200 with HTML body  |

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use session_uploader::Config;

/// One multipart upload as the backend saw it.
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub file_name: String,
    pub session_id: String,
    pub kind: String,
    pub size: usize,
}

#[derive(Default)]
struct BackendState {
    sessions: HashMap<String, Value>,
    blobs: HashMap<String, Vec<u8>>,
    uploads: Vec<ReceivedUpload>,
    /// Reject the nth upload (0-based) with a 500.
    fail_at: Option<usize>,
    /// Reject the next upload of these file names with a 500, once each.
    fail_names: Vec<String>,
}

type Shared = Arc<Mutex<BackendState>>;

/// Handle on a running fake backend.
pub struct FakeBackend {
    pub addr: SocketAddr,
    state: Shared,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(BackendState::default()));

        let app = Router::new()
            .route("/api/files/upload", post(upload))
            .route("/api/files/download/{file_id}", get(download))
            .route("/api/sessions/{session_id}", get(session))
            .route("/cdn/{cloud}/image/upload", post(cdn_upload))
            .route("/slow/api/files/upload", post(slow_upload))
            .route("/garbled/api/files/upload", post(garbled_upload))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Client configuration pointing at this backend.
    pub fn config(&self) -> Config {
        let mut config = Config::default().with_api_url(&format!("http://{}/api", self.addr));
        config.cdn_url = format!("http://{}/cdn", self.addr);
        config.cdn_name = Some("demo".to_string());
        config.cdn_preset = Some("avatars".to_string());
        config
    }

    /// Configuration whose API base is `/{prefix}/api` on this backend.
    pub fn config_with_prefix(&self, prefix: &str) -> Config {
        Config::default().with_api_url(&format!("http://{}/{}/api", self.addr, prefix))
    }

    /// Register an empty session.
    pub fn add_session(&self, session_id: &str, number: u32) {
        let body = json!({
            "sessionId": session_id,
            "sessionNumber": number,
            "class": { "classCode": "SE1801", "className": "Software Architecture" },
            "slot": 2,
            "sessionDate": "2024-09-12T07:30:00",
            "records": [],
            "files": []
        });
        self.state
            .lock()
            .unwrap()
            .sessions
            .insert(session_id.to_string(), body);
    }

    pub fn add_blob(&self, file_id: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .blobs
            .insert(file_id.to_string(), data.to_vec());
    }

    pub fn fail_upload_at(&self, index: usize) {
        self.state.lock().unwrap().fail_at = Some(index);
    }

    pub fn fail_file_once(&self, file_name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_names
            .push(file_name.to_string());
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.state.lock().unwrap().uploads.clone()
    }
}

async fn upload(State(state): State<Shared>, mut multipart: Multipart) -> Response {
    let mut file_name = String::new();
    let mut data = Vec::new();
    let mut session_id = String::new();
    let mut kind = String::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or("") {
            "File" => {
                file_name = field.file_name().unwrap_or("").to_string();
                data = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
            }
            "SessionId" => session_id = field.text().await.unwrap_or_default(),
            "Type" => kind = field.text().await.unwrap_or_default(),
            _ => {}
        }
    }

    let mut state = state.lock().unwrap();
    let index = state.uploads.len();
    state.uploads.push(ReceivedUpload {
        file_name: file_name.clone(),
        session_id: session_id.clone(),
        kind: kind.clone(),
        size: data.len(),
    });

    if state.fail_at == Some(index) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "disk full").into_response();
    }
    if let Some(pos) = state.fail_names.iter().position(|n| *n == file_name) {
        state.fail_names.remove(pos);
        return (StatusCode::INTERNAL_SERVER_ERROR, "disk full").into_response();
    }

    let Some(session) = state.sessions.get_mut(&session_id) else {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    let id = uuid::Uuid::new_v4().to_string();
    let url = format!("/uploads/{}/{}", id, file_name);
    if kind == "record" {
        if let Some(records) = session["records"].as_array_mut() {
            records.push(json!({ "recordId": id, "duration": "01:30:00" }));
        }
    } else if let Some(files) = session["files"].as_array_mut() {
        files.push(json!({
            "fileId": id,
            "fileName": file_name,
            "fileSize": data.len(),
            "fileUrl": url,
            "createdAt": "2024-09-12T09:00:00"
        }));
    }
    state.blobs.insert(id, data);

    Json(json!({
        "fileName": file_name,
        "sessionId": session_id,
        "type": kind,
        "url": url
    }))
    .into_response()
}

async fn download(State(state): State<Shared>, Path(file_id): Path<String>) -> Response {
    match state.lock().unwrap().blobs.get(&file_id) {
        Some(data) => Bytes::from(data.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn session(State(state): State<Shared>, Path(session_id): Path<String>) -> Response {
    match state.lock().unwrap().sessions.get(&session_id) {
        Some(body) => Json(body.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "session not found").into_response(),
    }
}

async fn cdn_upload(Path(cloud): Path<String>, mut multipart: Multipart) -> Response {
    let mut preset = String::new();
    let mut size = 0usize;

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or("") {
            "file" => size = field.bytes().await.map(|b| b.len()).unwrap_or(0),
            "upload_preset" => preset = field.text().await.unwrap_or_default(),
            _ => {}
        }
    }

    if preset != "avatars" || size == 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "Upload preset not found" } })),
        )
            .into_response();
    }

    Json(json!({
        "secure_url": format!("https://cdn.test/{}/{}.png", cloud, uuid::Uuid::new_v4())
    }))
    .into_response()
}

/// Holds the request without reading it, past any test timeout.
async fn slow_upload() -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK.into_response()
}

/// Accepts the upload but answers with a maintenance page.
async fn garbled_upload(mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        let _ = field.bytes().await;
    }
    (StatusCode::OK, "<html>maintenance</html>").into_response()
}
