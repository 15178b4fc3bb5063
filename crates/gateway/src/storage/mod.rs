//! # Object Store Gateway
//!
//! オブジェクトストレージに対する操作の抽象インターフェース。
//! S3互換ストレージ実装は `s3` サブモジュール、
//! プロセス内実装（テスト・MOCK_MODE用）は `memory` サブモジュールを参照。
//!
//! ## オブジェクトの状態遷移
//! - Absent --put--> Present
//! - Present --delete（消滅確認まで待機）--> Absent
//! - Present --copy--> Present + Present(new)

pub mod memory;
#[cfg(feature = "vendor-aws")]
pub mod s3;

use std::future::Future;
use std::ops::Range;
use std::time::Duration;

use garasi_types::StoredObject;

use crate::validation::title_from_key;

pub use memory::MemoryObjectStore;
#[cfg(feature = "vendor-aws")]
pub use self::s3::S3ObjectStore;

/// 1オブジェクトの最大サイズ（5 TiB）。
pub const MAX_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024 * 1024;

/// multipartアップロードのパートサイズ既定値（10 MiB）。
pub const DEFAULT_PART_SIZE: usize = 10 * 1024 * 1024;

/// S3が受け付ける最小パートサイズ（最終パートを除く）。
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// 1アップロードあたりの最大パート数。
pub const MAX_PARTS: u64 = 10_000;

/// 削除後に存在確認を繰り返す間隔。
pub const DELETE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// ストレージ操作のエラー。
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 対象キーが存在しない
    #[error("file {key} not found")]
    NotFound { key: String },
    /// バケットが存在しない（一覧取得中に消えた場合を含む）
    #[error("bucket {bucket} does not exist")]
    BucketNotFound { bucket: String },
    /// 5 TiBを超えるオブジェクト
    #[error(
        "error uploading. The object is too large ({size} bytes). \
         The maximum size for a multipart upload is 5TB."
    )]
    ObjectTooLarge { size: u64 },
    /// サーバー側コピーの失敗。ストレージが返したコードとメッセージを保持する。
    #[error("failed to copy object: {message}")]
    CopyFailed { code: String, message: String },
    /// 削除後、待機時間内に消滅を確認できなかった
    #[error("error waiting for file deletion: {key} still exists after {waited_secs}s")]
    DeleteTimeout { key: String, waited_secs: u64 },
    /// 操作がタイムアウトした
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },
    /// 通信・認証等の失敗
    #[error("{operation} failed: {message}")]
    Unavailable {
        operation: &'static str,
        message: String,
    },
}

/// オブジェクトストレージの操作セット。
///
/// 本番ではS3互換実装、テストではプロセス内実装に差し替える。
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// `key` に `bytes` を保存する。
    ///
    /// パートサイズを超える場合はmultipartで送信する。
    /// 途中で失敗した場合は部分的な状態を残さない。
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str, length: u64)
        -> Result<(), StoreError>;

    /// `key` の存在を確認する。存在しない場合は `Ok(false)`。
    async fn head(&self, key: &str) -> Result<bool, StoreError>;

    /// `key` を削除し、消滅を確認するまで待機する。
    ///
    /// 存在しない場合は `StoreError::NotFound`。
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// 全オブジェクトを列挙する。
    ///
    /// 各エントリの署名付きURLは `url_ttl` で発行する。
    /// 発行に失敗したエントリは空URLとなり、一覧全体は失敗しない。
    async fn list(&self, url_ttl: Duration) -> Result<Vec<StoredObject>, StoreError>;

    /// 期限付きのダウンロードURLを発行する。
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError>;

    /// 同一バケット内でサーバー側コピーを行う。
    async fn copy(&self, old_key: &str, new_key: &str) -> Result<(), StoreError>;

    /// バケットの存在を確認し、無ければ作成する。
    async fn ensure_bucket(&self) -> Result<(), StoreError>;
}

/// 5 TiBを超えるサイズを拒否する。
pub fn check_object_size(length: u64) -> Result<(), StoreError> {
    if length > MAX_OBJECT_SIZE {
        return Err(StoreError::ObjectTooLarge { size: length });
    }
    Ok(())
}

/// 実際に使うパートサイズ。
///
/// パート数が `MAX_PARTS` を超える場合はパートサイズを引き上げる。
pub fn effective_part_size(length: u64, configured: usize) -> usize {
    let configured = configured.max(MIN_PART_SIZE);
    let required = length.div_ceil(MAX_PARTS);
    configured.max(usize::try_from(required).unwrap_or(usize::MAX))
}

/// 一覧の1エントリを組み立てる。
///
/// URL発行に失敗したエントリは空URLとし、一覧全体は失敗させない。
pub fn listed_object(key: String, url: Result<String, StoreError>) -> StoredObject {
    let url = url.unwrap_or_else(|e| {
        tracing::warn!(key = %key, error = %e, "署名付きURLの発行に失敗");
        String::new()
    });
    StoredObject {
        title: title_from_key(&key).to_string(),
        key,
        url,
    }
}

/// `length` バイトを `part_size` ごとの範囲に分割する。
pub fn plan_parts(length: usize, part_size: usize) -> Vec<Range<usize>> {
    let part_size = part_size.max(1);
    (0..length)
        .step_by(part_size)
        .map(|start| start..(start + part_size).min(length))
        .collect()
}

/// `exists` が `false`（存在しない）を返すまで待機する。
///
/// `window` を過ぎても存在する場合は `StoreError::DeleteTimeout`。
pub async fn wait_until_absent<F, Fut>(
    key: &str,
    window: Duration,
    interval: Duration,
    mut exists: F,
) -> Result<(), StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, StoreError>>,
{
    let deadline = tokio::time::Instant::now() + window;

    loop {
        if !exists().await? {
            return Ok(());
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            tracing::warn!(key, waited_secs = window.as_secs(), "削除後もオブジェクトが残っています");
            return Err(StoreError::DeleteTimeout {
                key: key.to_string(),
                waited_secs: window.as_secs(),
            });
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
