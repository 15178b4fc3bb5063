//! # プロセス内 Object Store 実装
//!
//! テストおよび `MOCK_MODE=true` での起動に使う。
//! S3互換実装と同じ契約（NotFound、消滅確認付き削除、サイズ上限）を守る。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use garasi_types::StoredObject;
use tokio::sync::RwLock;

use super::{
    check_object_size, listed_object, wait_until_absent, ObjectStore, StoreError, DELETE_POLL_INTERVAL,
};

const SELF_COPY_MESSAGE: &str = "This copy request is illegal because it is trying to copy an \
object to itself without changing the object's metadata, storage class, website redirect \
location or encryption attributes.";

/// 保存されたオブジェクト本体。
#[derive(Debug, Clone)]
struct MemoryObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// メモリ上のバケット。
pub struct MemoryObjectStore {
    bucket: String,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    /// put/delete/copy が成功した回数
    mutations: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: RwLock::new(BTreeMap::new()),
            mutations: AtomicUsize::new(0),
        }
    }

    fn url_for(&self, key: &str, ttl: Duration) -> String {
        format!("memory://{}/{}?expires_in={}", self.bucket, key, ttl.as_secs())
    }

    /// 変更系操作の成功回数。
    #[cfg(test)]
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// 保存された本体とContent-Type。
    #[cfg(test)]
    pub async fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| (o.bytes.clone(), o.content_type.clone()))
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        length: u64,
    ) -> Result<(), StoreError> {
        check_object_size(length)?;

        self.objects.write().await.insert(
            key.to_string(),
            MemoryObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if self.objects.write().await.remove(key).is_none() {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);

        wait_until_absent(key, Duration::from_secs(1), DELETE_POLL_INTERVAL, || {
            self.head(key)
        })
        .await
    }

    async fn list(&self, url_ttl: Duration) -> Result<Vec<StoredObject>, StoreError> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .map(|key| listed_object(key.clone(), Ok(self.url_for(key, url_ttl))))
            .collect())
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        Ok(self.url_for(key, ttl))
    }

    async fn copy(&self, old_key: &str, new_key: &str) -> Result<(), StoreError> {
        // S3はメタデータを変えない自身へのコピーを拒否する
        if old_key == new_key {
            return Err(StoreError::CopyFailed {
                code: "InvalidRequest".to_string(),
                message: SELF_COPY_MESSAGE.to_string(),
            });
        }

        let mut objects = self.objects.write().await;
        let source = objects.get(old_key).cloned().ok_or_else(|| StoreError::CopyFailed {
            code: "NoSuchKey".to_string(),
            message: "The specified key does not exist.".to_string(),
        })?;
        objects.insert(new_key.to_string(), source);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        tracing::info!(bucket = %self.bucket, "メモリ上のバケットを使用します");
        Ok(())
    }
}
