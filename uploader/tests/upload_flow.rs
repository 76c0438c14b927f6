//! End-to-end upload flows against the fake backend.

mod common;

use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use common::FakeBackend;
use session_uploader::view::Outcome;
use session_uploader::{
    AppContext, NoticeBoard, NoticeLevel, ProgressFn, SelectedFile, SessionUploadView, Transport,
    UploadError, UploadKind, UploadSource, UploadTab, UploadTask, ViewError, ViewState,
};

fn recorder() -> (ProgressFn, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (Arc::new(move |f: f64| sink.lock().unwrap().push(f)), seen)
}

#[tokio::test]
async fn test_transport_streams_file_from_disk() {
    let backend = FakeBackend::start().await;
    backend.add_session("s1", 4);
    let ctx = AppContext::init(backend.config()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("week4.pdf");
    std::fs::write(&path, vec![42u8; 300 * 1024]).unwrap();

    let (on_progress, seen) = recorder();
    let task = UploadTask::new(UploadSource::from_path(&path), "c1", "s1", UploadKind::File);
    let receipt = ctx
        .transport()
        .send(task, on_progress, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(receipt.file_name, "week4.pdf");
    assert_eq!(receipt.session_id, "s1");
    assert_eq!(receipt.kind, UploadKind::File);
    assert!(receipt.url.ends_with("/week4.pdf"));

    let uploads = backend.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].size, 300 * 1024);
    assert_eq!(uploads[0].kind, "file");

    let seen = seen.lock().unwrap();
    assert!(seen.len() > 1);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last(), Some(&1.0));
    assert_eq!(seen.iter().filter(|f| **f == 1.0).count(), 1);
}

#[tokio::test]
async fn test_transport_server_error() {
    let backend = FakeBackend::start().await;
    backend.add_session("s1", 4);
    backend.fail_upload_at(0);
    let ctx = AppContext::init(backend.config()).unwrap();

    let (on_progress, seen) = recorder();
    let task = UploadTask::new(
        UploadSource::from_bytes("notes.txt", b"hello".to_vec()),
        "c1",
        "s1",
        UploadKind::File,
    );
    let err = ctx
        .transport()
        .send(task, on_progress, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        UploadError::Server {
            status: 500,
            message: "disk full".to_string(),
        }
    );
    assert!(!seen.lock().unwrap().contains(&1.0));
}

#[tokio::test]
async fn test_transport_unreachable_backend() {
    let config = session_uploader::Config::default().with_api_url("http://127.0.0.1:1/api");
    let ctx = AppContext::init(config).unwrap();
    let (on_progress, _) = recorder();
    let task = UploadTask::new(
        UploadSource::from_bytes("a.txt", b"a".to_vec()),
        "c1",
        "s1",
        UploadKind::File,
    );

    let err = ctx
        .transport()
        .send(task, on_progress, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Network(_)));
}

fn lecture_task(size: usize) -> UploadTask {
    UploadTask::new(
        UploadSource::from_bytes("lecture.mp4", vec![5u8; size]),
        "c1",
        "s1",
        UploadKind::Record,
    )
}

#[tokio::test]
async fn test_transport_timeout() {
    let backend = FakeBackend::start().await;
    let config = backend
        .config_with_prefix("slow")
        .with_timeout(Duration::from_millis(200));
    let ctx = AppContext::init(config).unwrap();

    let (on_progress, seen) = recorder();
    let err = ctx
        .transport()
        .send(lecture_task(1024), on_progress, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, UploadError::Timeout);
    assert!(!seen.lock().unwrap().contains(&1.0));
}

#[tokio::test]
async fn test_transport_unreadable_success_body() {
    let backend = FakeBackend::start().await;
    let ctx = AppContext::init(backend.config_with_prefix("garbled")).unwrap();

    let (on_progress, seen) = recorder();
    let err = ctx
        .transport()
        .send(lecture_task(1024), on_progress, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::InvalidResponse(_)), "{:?}", err);
    assert!(!seen.lock().unwrap().contains(&1.0));
}

#[tokio::test]
async fn test_transport_cancel_while_in_flight() {
    let backend = FakeBackend::start().await;
    let ctx = AppContext::init(backend.config_with_prefix("slow")).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let (on_progress, seen) = recorder();
    let started = Instant::now();
    let err = ctx
        .transport()
        .send(lecture_task(256 * 1024), on_progress, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, UploadError::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(3));
    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(!seen.contains(&1.0));
}

#[tokio::test]
async fn test_view_uploads_files_and_refreshes() {
    let backend = FakeBackend::start().await;
    backend.add_session("s1", 4);
    let ctx = AppContext::init(backend.config()).unwrap();
    let mut notices = ctx.notices().subscribe();

    let mut view = SessionUploadView::new(
        "c1",
        "s1",
        UploadTab::Files,
        ctx.coordinator(),
        ctx.session_client(),
        ctx.notices().clone(),
    );
    assert!(view.refresh().await.unwrap().files.is_empty());

    let files = vec![
        SelectedFile::inspect(UploadSource::from_bytes("a.pdf", vec![1u8; 1000]))
            .await
            .unwrap(),
        SelectedFile::inspect(UploadSource::from_bytes("b.pdf", vec![2u8; 2000]))
            .await
            .unwrap(),
    ];
    view.select_files(files).unwrap();
    let receipts = view.submit(&CancellationToken::new()).await.unwrap();

    assert_eq!(receipts.len(), 2);
    assert_eq!(view.state(), ViewState::Idle);
    assert_eq!(view.progress(), 100);
    let session = view.session().unwrap();
    let names: Vec<_> = session.files.iter().map(|f| f.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    assert_eq!(session.files[1].file_size, 2000);

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(notice.message, "2 file(s) have been uploaded.");
}

#[tokio::test]
async fn test_view_recording_appears_after_refresh() {
    let backend = FakeBackend::start().await;
    backend.add_session("s1", 4);
    let ctx = AppContext::init(backend.config()).unwrap();

    let mut view = SessionUploadView::new(
        "c1",
        "s1",
        UploadTab::Recordings,
        ctx.coordinator(),
        ctx.session_client(),
        ctx.notices().clone(),
    );
    view.refresh().await.unwrap();
    assert!(!view.recording_locked());

    let recording = SelectedFile::inspect(UploadSource::from_bytes("lecture.mp4", vec![9u8; 4096]))
        .await
        .unwrap();
    view.select_recording(recording).unwrap();
    view.submit(&CancellationToken::new()).await.unwrap();

    assert_eq!(backend.uploads()[0].kind, "record");
    assert_eq!(view.session().unwrap().records.len(), 1);
    assert!(view.recording_locked());
    assert!(!view.can_submit());
}

#[tokio::test]
async fn test_view_partial_batch_failure() {
    let backend = FakeBackend::start().await;
    backend.add_session("s1", 4);
    backend.fail_upload_at(1);
    let ctx = AppContext::init(backend.config()).unwrap();
    let mut notices = ctx.notices().subscribe();

    let mut view = SessionUploadView::new(
        "c1",
        "s1",
        UploadTab::Files,
        ctx.coordinator(),
        ctx.session_client(),
        ctx.notices().clone(),
    );
    let mut files = Vec::new();
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        files.push(
            SelectedFile::inspect(UploadSource::from_bytes(name, vec![3u8; 512]))
                .await
                .unwrap(),
        );
    }
    view.select_files(files).unwrap();

    let err = view.submit(&CancellationToken::new()).await.unwrap_err();
    let ViewError::Batch(batch) = err else {
        panic!("expected batch error")
    };
    assert_eq!(batch.index, 1);
    assert_eq!(batch.uploaded, 1);

    // c.pdf was never sent
    let sent: Vec<_> = backend.uploads().into_iter().map(|u| u.file_name).collect();
    assert_eq!(sent, vec!["a.pdf", "b.pdf"]);

    assert_eq!(view.state(), ViewState::Selecting);
    assert_eq!(view.selected_files().len(), 3);
    assert!(matches!(view.last_outcome(), Some(Outcome::Failed { index: 1, .. })));

    let notice = notices.recv().await.unwrap();
    assert_eq!(notice.level, NoticeLevel::Error);
    assert_eq!(
        notice.message,
        "There was an error uploading your files. Please try again."
    );

    // a.pdf stays committed on the server
    let committed = ctx.session_client().get_session("s1").await.unwrap();
    assert_eq!(committed.files.len(), 1);
}

#[tokio::test]
async fn test_concurrent_view_upload() {
    let backend = FakeBackend::start().await;
    backend.add_session("s1", 4);
    let ctx = AppContext::init(backend.config()).unwrap();

    let mut view = SessionUploadView::new(
        "c1",
        "s1",
        UploadTab::Files,
        ctx.coordinator(),
        ctx.session_client(),
        ctx.notices().clone(),
    )
    .with_concurrency(3);

    let mut files = Vec::new();
    for i in 0..5 {
        let name = format!("part{}.zip", i);
        files.push(
            SelectedFile::inspect(UploadSource::from_bytes(name, vec![i as u8 + 1; 256]))
                .await
                .unwrap(),
        );
    }
    view.select_files(files).unwrap();
    let receipts = view.submit(&CancellationToken::new()).await.unwrap();

    assert_eq!(receipts.len(), 5);
    assert_eq!(view.session().unwrap().files.len(), 5);
    assert_eq!(view.progress(), 100);
}

#[tokio::test]
async fn test_concurrent_retry_sends_only_failed_files() {
    let backend = FakeBackend::start().await;
    backend.add_session("s1", 4);
    backend.fail_file_once("b.pdf");
    let ctx = AppContext::init(backend.config()).unwrap();

    let mut view = SessionUploadView::new(
        "c1",
        "s1",
        UploadTab::Files,
        ctx.coordinator(),
        ctx.session_client(),
        ctx.notices().clone(),
    )
    .with_concurrency(3);

    let mut files = Vec::new();
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        files.push(
            SelectedFile::inspect(UploadSource::from_bytes(name, vec![4u8; 700]))
                .await
                .unwrap(),
        );
    }
    view.select_files(files).unwrap();

    let err = view.submit(&CancellationToken::new()).await.unwrap_err();
    let ViewError::Partial(report) = err else {
        panic!("expected partial report")
    };
    assert_eq!(report.outcomes.len(), 3);
    assert!(report.outcomes[0].is_ok());
    assert!(matches!(
        report.outcomes[1],
        Err(UploadError::Server { status: 500, .. })
    ));
    assert!(report.outcomes[2].is_ok());

    let left: Vec<_> = view.selected_files().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(left, vec!["b.pdf"]);

    view.submit(&CancellationToken::new()).await.unwrap();

    let mut sent: Vec<_> = backend.uploads().into_iter().map(|u| u.file_name).collect();
    sent.sort();
    assert_eq!(sent, vec!["a.pdf", "b.pdf", "b.pdf", "c.pdf"]);
    assert_eq!(view.session().unwrap().files.len(), 3);
}

#[tokio::test]
async fn test_notice_stream_drains_when_view_dropped() {
    let backend = FakeBackend::start().await;
    backend.add_session("s1", 4);
    let ctx = AppContext::init(backend.config()).unwrap();

    let board = NoticeBoard::new();
    let notices = BroadcastStream::new(board.subscribe());
    let mut view = SessionUploadView::new(
        "c1",
        "s1",
        UploadTab::Files,
        ctx.coordinator(),
        ctx.session_client(),
        board,
    );
    let file = SelectedFile::inspect(UploadSource::from_bytes("a.pdf", vec![5u8; 900]))
        .await
        .unwrap();
    view.select_files(vec![file]).unwrap();
    view.submit(&CancellationToken::new()).await.unwrap();
    drop(view);

    // the stream ends on its own once the last sender is gone
    let received = tokio::time::timeout(Duration::from_secs(2), notices.collect::<Vec<_>>())
        .await
        .unwrap();
    let last = received.last().unwrap().as_ref().unwrap();
    assert_eq!(last.level, NoticeLevel::Success);
    assert_eq!(last.message, "1 file(s) have been uploaded.");
}
