//! Save flow integration tests.
//!
//! Run with: `cargo test -p quire-content --test save_flow_test`

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use quire_content::{
    Block, ContentDocument, EditingSession, EntryState, PendingMediaRegistry, SessionError,
    UploadCoordinator, UploadError,
};
use quire_core::{CropRegion, ProcessingOptions, Rotation, StorageBackend};
use quire_processing::{AdaptiveCompressor, MediaPipeline, MediaValidator, WatermarkStyle};
use quire_storage::{LocalStorage, Storage, StorageError, StorageResult, StoredObject};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const BASE_URL: &str = "http://localhost:8080/media";

/// Local storage that refuses the n-th upload (1-based).
struct FlakyStorage {
    inner: LocalStorage,
    fail_on: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn upload(
        &self,
        folder: &str,
        filename: &str,
        content_type: &str,
        data: Bytes,
    ) -> StorageResult<StoredObject> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(StorageError::UploadFailed("simulated outage".to_string()));
        }
        self.inner.upload(folder, filename, content_type, data).await
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

fn photo_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 200, 255])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn new_session(preview_dir: &Path, storage: Arc<dyn Storage>) -> EditingSession {
    EditingSession::new(
        PendingMediaRegistry::new(preview_dir).unwrap(),
        MediaPipeline::new(
            AdaptiveCompressor::with_defaults(),
            None,
            WatermarkStyle::default(),
        ),
        MediaValidator::default(),
        ProcessingOptions::default(),
        UploadCoordinator::new(storage, "posts"),
    )
}

async fn stage_three(session: &mut EditingSession) -> ContentDocument {
    let cancel = CancellationToken::new();
    let mut blocks = vec![Block::new(
        "header",
        serde_json::json!({ "text": "Field notes", "level": 1 }),
    )];

    for (i, rotation) in [0.0f32, 12.5, -90.0].into_iter().enumerate() {
        let staged = session
            .stage_image(
                &photo_png(200, 150),
                "image/png",
                &CropRegion::new(10 * i as u32, 5, 120, 90),
                Rotation::new(rotation).unwrap(),
                &cancel,
            )
            .await
            .unwrap();
        blocks.push(Block::pending_image(&staged.media));
    }

    ContentDocument::new(blocks)
}

#[tokio::test]
async fn test_save_uploads_and_resolves_every_block() {
    let root = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(root.path().join("store"), BASE_URL.to_string())
        .await
        .unwrap();
    let mut session = new_session(&root.path().join("previews"), Arc::new(storage));

    let doc = stage_three(&mut session).await;
    let previews: Vec<_> = session
        .registry()
        .iter()
        .filter_map(|e| e.preview_path().map(Path::to_path_buf))
        .collect();
    assert_eq!(previews.len(), 3);

    let report = session.save(&doc, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.uploaded, 3);
    assert!(report.warnings.is_empty());
    assert!(report.document.pending_ids().is_empty());
    for (block, pending) in report.document.blocks[1..].iter().zip(doc.pending_ids()) {
        let url = block.file_url().unwrap();
        assert_eq!(url, format!("{}/posts/{}.jpg", BASE_URL, pending));
        let stored = root.path().join("store/posts").join(format!("{}.jpg", pending));
        let bytes = std::fs::read(stored).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
    assert_eq!(report.document.blocks[0], doc.blocks[0]);

    assert!(session.registry().is_empty());
    assert!(previews.iter().all(|p| !p.exists()));
}

#[tokio::test]
async fn test_partial_failure_keeps_registry_intact() {
    let root = tempfile::tempdir().unwrap();
    let storage = FlakyStorage {
        inner: LocalStorage::new(root.path().join("store"), BASE_URL.to_string())
            .await
            .unwrap(),
        fail_on: 2,
        calls: AtomicUsize::new(0),
    };
    let mut session = new_session(&root.path().join("previews"), Arc::new(storage));

    let doc = stage_three(&mut session).await;
    let ids = doc.pending_ids();

    let err = session
        .save(&doc, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SessionError::Upload(UploadError::EntryFailed { id, position, .. }) => {
            assert_eq!(id, ids[1]);
            assert_eq!(position, 2);
        }
        other => panic!("unexpected error: {other}"),
    }

    let registry = session.registry();
    assert_eq!(registry.len(), 3);
    assert!(ids.iter().all(|id| registry.contains(id)));
    assert!(registry.iter().all(|e| e.state == EntryState::Created));
    assert!(registry
        .iter()
        .all(|e| e.preview_path().is_some_and(|p| p.exists())));

    // Retry uploads all three again
    let report = session.save(&doc, &CancellationToken::new()).await.unwrap();
    assert_eq!(report.uploaded, 3);
    assert!(session.registry().is_empty());
}

#[tokio::test]
async fn test_cancelled_save_restores_entries() {
    let root = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(root.path().join("store"), BASE_URL.to_string())
        .await
        .unwrap();
    let mut session = new_session(&root.path().join("previews"), Arc::new(storage));
    let doc = stage_three(&mut session).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = session.save(&doc, &cancel).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Upload(UploadError::Cancelled { position: 1, .. })
    ));
    assert_eq!(session.registry().len(), 3);
    assert!(!root.path().join("store/posts").exists());
}

#[tokio::test]
async fn test_document_without_staged_media_reports_missing_references() {
    let root = tempfile::tempdir().unwrap();
    let storage = LocalStorage::new(root.path().join("store"), BASE_URL.to_string())
        .await
        .unwrap();
    let mut session = new_session(&root.path().join("previews"), Arc::new(storage));

    let doc = ContentDocument::from_json(
        r#"{"blocks":[{"type":"image","data":{"file":{"url":"file:///gone.jpg","pendingId":"0b7e8f4c-96d4-4a57-8a69-3f1c2f7b9d10"}}}]}"#,
    )
    .unwrap();

    let report = session.save(&doc, &CancellationToken::new()).await.unwrap();
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.document, doc);
}
