//! # アップロード処理のオーケストレーション
//!
//! 検証とObject Store操作を組み合わせる薄い調整層。
//!
//! ## 処理フロー
//! - create: 検証 → put → list
//! - update: 検証 → head(旧) → delete(旧) → put(新)
//! - rename: copy(旧 → 新 + 旧の拡張子) → delete(旧)
//!
//! update は新オブジェクトの保存前に旧オブジェクトを削除し、
//! rename はコピー後に削除する。どちらも途中で失敗すると
//! オブジェクトが0個または2個残る。補償処理は行わない。

use std::sync::Arc;
use std::time::Duration;

use garasi_types::StoredObject;

use crate::error::{log_error, GatewayError};
use crate::storage::{ObjectStore, StoreError};
use crate::validation::{prepare_upload, renamed_key, PreparedUpload, UploadRequest};

/// アップロード処理のオーケストレーション。
pub struct UploadWorkflow {
    store: Arc<dyn ObjectStore>,
    allowed_mime_types: Vec<String>,
    /// 署名付きURLの有効期限
    url_ttl: Duration,
}

impl UploadWorkflow {
    pub fn new(store: Arc<dyn ObjectStore>, allowed_mime_types: Vec<String>, url_ttl: Duration) -> Self {
        Self {
            store,
            allowed_mime_types,
            url_ttl,
        }
    }

    fn prepare(&self, operation: &'static str, request: &UploadRequest) -> Result<PreparedUpload, GatewayError> {
        prepare_upload(request, &self.allowed_mime_types).map_err(|e| {
            log_error("workflow", operation, &e);
            GatewayError::from(e)
        })
    }

    async fn put(&self, operation: &'static str, prepared: &PreparedUpload, bytes: &[u8]) -> Result<String, GatewayError> {
        let storage_key = prepared.storage_key();
        self.store
            .put(&storage_key, bytes, &prepared.content_type, prepared.length)
            .await
            .map_err(|e| stage_failed(operation, e))?;

        tracing::info!(
            key = %storage_key,
            content_type = %prepared.content_type,
            extension = %prepared.extension,
            length = prepared.length,
            "オブジェクトを保存しました"
        );
        Ok(storage_key)
    }

    /// 新規アップロード。保存後の一覧を返す。
    pub async fn create(&self, request: UploadRequest) -> Result<Vec<StoredObject>, GatewayError> {
        let prepared = self.prepare("create", &request)?;
        self.put("create.put", &prepared, &request.file_bytes).await?;

        self.store
            .list(self.url_ttl)
            .await
            .map_err(|e| stage_failed("create.list", e))
    }

    /// 既存オブジェクトの差し替え。新しいストレージキーを返す。
    ///
    /// 旧オブジェクトは新オブジェクトの保存前に削除される。
    pub async fn update(&self, old_key: &str, request: UploadRequest) -> Result<String, GatewayError> {
        // ストレージに触れる前に検証を済ませる
        let prepared = self.prepare("update", &request)?;

        let exists = self
            .store
            .head(old_key)
            .await
            .map_err(|e| stage_failed("update.head", e))?;
        if !exists {
            let err = GatewayError::from(StoreError::NotFound {
                key: old_key.to_string(),
            });
            tracing::warn!(layer = "workflow", operation = "update.head", key = old_key, "差し替え対象が存在しません");
            return Err(err);
        }

        self.store
            .delete(old_key)
            .await
            .map_err(|e| stage_failed("update.delete", e))?;

        let new_key = self.put("update.put", &prepared, &request.file_bytes).await?;
        tracing::info!(old_key, new_key = %new_key, "オブジェクトを差し替えました");
        Ok(new_key)
    }

    /// サーバー側コピーによる移動。移動先のキーを返す。
    ///
    /// コピー後の削除に失敗した場合、両方のキーが残る。
    pub async fn rename(&self, old_key: &str, new_key: &str) -> Result<String, GatewayError> {
        let target = renamed_key(old_key, new_key);

        self.store
            .copy(old_key, &target)
            .await
            .map_err(|e| stage_failed("rename.copy", e))?;

        self.store.delete(old_key).await.map_err(|e| {
            tracing::warn!(old_key, new_key = %target, "コピー済みのまま旧オブジェクトが残っています");
            stage_failed("rename.delete", e)
        })?;

        tracing::info!(old_key, new_key = %target, "オブジェクトを移動しました");
        Ok(target)
    }

    /// オブジェクトを削除する。存在しない場合はNotFound。
    pub async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        self.store
            .delete(key)
            .await
            .map_err(|e| stage_failed("delete", e))?;
        tracing::info!(key, "オブジェクトを削除しました");
        Ok(())
    }

    /// 期限付きのダウンロードURLを発行する。
    pub async fn preview(&self, key: &str) -> Result<String, GatewayError> {
        self.store
            .presign(key, self.url_ttl)
            .await
            .map_err(|e| stage_failed("preview", e))
    }

    /// 全オブジェクトの一覧。
    pub async fn list(&self) -> Result<Vec<StoredObject>, GatewayError> {
        self.store
            .list(self.url_ttl)
            .await
            .map_err(|e| stage_failed("list", e))
    }
}

fn stage_failed(operation: &'static str, err: StoreError) -> GatewayError {
    let err = GatewayError::from(err);
    if err.is_not_found() {
        tracing::warn!(layer = "workflow", operation, error = %err, "対象が存在しません");
    } else {
        log_error("workflow", operation, &err);
    }
    err
}

#[cfg(test)]
mod tests;
