use std::sync::Arc;
use std::time::Duration;

use garasi_types::StoredObject;

use crate::error::GatewayError;
use crate::storage::{MemoryObjectStore, ObjectStore, StoreError};
use crate::validation::fixtures::{PDF, PNG};
use crate::validation::{default_allowed_mime_types, extension_of, title_from_key, UploadRequest};

use super::UploadWorkflow;

const TTL: Duration = Duration::from_secs(60);

fn request(title: &str, filename: &str, bytes: &[u8]) -> UploadRequest {
    UploadRequest {
        title: title.to_string(),
        file_bytes: bytes.to_vec(),
        declared_size: bytes.len() as u64,
        filename: filename.to_string(),
    }
}

fn workflow_with(store: Arc<dyn ObjectStore>) -> UploadWorkflow {
    UploadWorkflow::new(store, default_allowed_mime_types(), TTL)
}

/// 指定した操作だけを失敗させるテスト用ストア。
#[derive(Default)]
struct Faults {
    put: bool,
    delete: bool,
    presign_key: Option<String>,
}

struct FlakyStore {
    inner: MemoryObjectStore,
    faults: Faults,
}

impl FlakyStore {
    fn new(faults: Faults) -> Self {
        Self {
            inner: MemoryObjectStore::new("flaky"),
            faults,
        }
    }

    fn unavailable(operation: &'static str) -> StoreError {
        StoreError::Unavailable {
            operation,
            message: "connection reset by peer".to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str, length: u64) -> Result<(), StoreError> {
        if self.faults.put {
            return Err(Self::unavailable("put_object"));
        }
        self.inner.put(key, bytes, content_type, length).await
    }

    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.head(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.faults.delete {
            return Err(Self::unavailable("delete_object"));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, url_ttl: Duration) -> Result<Vec<StoredObject>, StoreError> {
        self.inner.list(url_ttl).await
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        if self.faults.presign_key.as_deref() == Some(key) {
            return Err(Self::unavailable("presign_get"));
        }
        self.inner.presign(key, ttl).await
    }

    async fn copy(&self, old_key: &str, new_key: &str) -> Result<(), StoreError> {
        self.inner.copy(old_key, new_key).await
    }

    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_create_returns_refreshed_listing() {
    let store = Arc::new(MemoryObjectStore::new("test"));
    let workflow = workflow_with(store.clone());

    let listed = workflow.create(request("invoice", "a.pdf", PDF)).await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "invoice");
    assert!(listed[0].key.ends_with(".pdf"));
    assert!(!listed[0].url.is_empty());

    let (bytes, content_type) = store.object(&listed[0].key).await.unwrap();
    assert_eq!(bytes, PDF);
    assert_eq!(content_type, "application/pdf");
}

#[tokio::test]
async fn test_upload_then_list_and_preview() {
    let store = Arc::new(MemoryObjectStore::new("test"));
    let workflow = workflow_with(store);

    workflow.create(request("x", "photo.png", PNG)).await.unwrap();
    workflow.create(request("invoice", "a.pdf", PDF)).await.unwrap();

    let listed = workflow.list().await.unwrap();
    let entry = listed.iter().find(|o| o.title == "x").expect("uploaded entry");
    assert_eq!(extension_of(&entry.key), ".png");

    let url = workflow.preview(&entry.key).await.unwrap();
    assert!(!url.is_empty());
}

#[tokio::test]
async fn test_disallowed_type_never_mutates_store() {
    let store = Arc::new(MemoryObjectStore::new("test"));
    store.put("old_1.png", PNG, "image/png", PNG.len() as u64).await.unwrap();
    let baseline = store.mutations();
    let workflow = workflow_with(store.clone());

    let err = workflow
        .create(request("notes", "notes.pdf", b"just some text"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));

    let err = workflow
        .update("old_1.png", request("notes", "notes.pdf", b"just some text"))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));

    assert_eq!(store.mutations(), baseline);
    assert!(store.head("old_1.png").await.unwrap());
}

#[tokio::test]
async fn test_delete_missing_is_not_found_twice_without_side_effects() {
    let store = Arc::new(MemoryObjectStore::new("test"));
    let workflow = workflow_with(store.clone());

    for _ in 0..2 {
        let err = workflow.delete("ghost_1.pdf").await.unwrap_err();
        assert!(err.is_not_found());
    }
    assert_eq!(store.mutations(), 0);
}

#[tokio::test]
async fn test_update_replaces_object() {
    let store = Arc::new(MemoryObjectStore::new("test"));
    let workflow = workflow_with(store.clone());
    let created = workflow.create(request("invoice", "a.pdf", PDF)).await.unwrap();
    let old_key = created[0].key.clone();

    let new_key = workflow
        .update(&old_key, request("photo", "b.png", PNG))
        .await
        .unwrap();

    assert!(!store.head(&old_key).await.unwrap());
    assert!(store.head(&new_key).await.unwrap());
    assert_eq!(title_from_key(&new_key), "photo");
    assert!(new_key.ends_with(".png"));
}

#[tokio::test]
async fn test_update_missing_old_key_is_not_found() {
    let store = Arc::new(MemoryObjectStore::new("test"));
    let workflow = workflow_with(store.clone());

    let err = workflow
        .update("ghost_1.pdf", request("invoice", "a.pdf", PDF))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.mutations(), 0);
}

#[tokio::test]
async fn test_update_put_failure_after_delete_leaves_nothing() {
    // 削除を先に行うため、put失敗時は旧キーも新キーも残らない
    let store = Arc::new(FlakyStore::new(Faults {
        put: true,
        ..Faults::default()
    }));
    store.inner.put("invoice_1.pdf", PDF, "application/pdf", PDF.len() as u64).await.unwrap();
    let workflow = workflow_with(store.clone());

    let err = workflow
        .update("invoice_1.pdf", request("invoice", "a.pdf", PDF))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Store(StoreError::Unavailable { .. })));
    assert!(store.inner.list(TTL).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rename_moves_object_and_keeps_extension() {
    let store = Arc::new(MemoryObjectStore::new("test"));
    let workflow = workflow_with(store.clone());
    store.put("invoice_1.pdf", PDF, "application/pdf", PDF.len() as u64).await.unwrap();

    let target = workflow.rename("invoice_1.pdf", "receipt").await.unwrap();

    assert_eq!(target, "receipt.pdf");
    assert!(!store.head("invoice_1.pdf").await.unwrap());
    assert!(store.head("receipt.pdf").await.unwrap());
}

#[tokio::test]
async fn test_rename_delete_failure_leaves_both_keys() {
    let store = Arc::new(FlakyStore::new(Faults {
        delete: true,
        ..Faults::default()
    }));
    store.inner.put("invoice_1.pdf", PDF, "application/pdf", PDF.len() as u64).await.unwrap();
    let workflow = workflow_with(store.clone());

    let err = workflow.rename("invoice_1.pdf", "receipt").await.unwrap_err();
    assert!(matches!(err, GatewayError::Store(StoreError::Unavailable { .. })));
    assert!(store.head("invoice_1.pdf").await.unwrap());
    assert!(store.head("receipt.pdf").await.unwrap());
}

#[tokio::test]
async fn test_rename_missing_source_is_copy_failure() {
    let store = Arc::new(MemoryObjectStore::new("test"));
    let workflow = workflow_with(store.clone());

    let err = workflow.rename("ghost_1.pdf", "receipt").await.unwrap_err();
    assert!(matches!(err, GatewayError::Store(StoreError::CopyFailed { .. })));
    assert_eq!(store.mutations(), 0);
}

#[tokio::test]
async fn test_create_put_failure_skips_listing() {
    let store = Arc::new(FlakyStore::new(Faults {
        put: true,
        ..Faults::default()
    }));
    let workflow = workflow_with(store.clone());

    let err = workflow.create(request("invoice", "a.pdf", PDF)).await.unwrap_err();
    assert!(matches!(err, GatewayError::Store(StoreError::Unavailable { operation: "put_object", .. })));
}

#[tokio::test]
async fn test_preview_failure_is_store_error() {
    let store = Arc::new(FlakyStore::new(Faults {
        presign_key: Some("broken_1.png".to_string()),
        ..Faults::default()
    }));
    let workflow = workflow_with(store);

    let err = workflow.preview("broken_1.png").await.unwrap_err();
    assert!(matches!(err, GatewayError::Store(StoreError::Unavailable { operation: "presign_get", .. })));
    assert!(workflow.preview("fine_2.png").await.is_ok());
}

#[tokio::test]
async fn test_rename_onto_same_key_keeps_object() {
    let store = Arc::new(MemoryObjectStore::new("test"));
    let workflow = workflow_with(store.clone());
    store.put("invoice_1.pdf", PDF, "application/pdf", PDF.len() as u64).await.unwrap();

    // 移動先 = "invoice_1" + ".pdf" で移動元と同じキーになる
    let err = workflow.rename("invoice_1.pdf", "invoice_1").await.unwrap_err();

    assert!(matches!(err, GatewayError::Store(StoreError::CopyFailed { ref code, .. }) if code == "InvalidRequest"));
    assert!(store.head("invoice_1.pdf").await.unwrap());
}
