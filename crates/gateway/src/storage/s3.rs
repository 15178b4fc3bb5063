//! # S3互換 Object Store 実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIを使用する実装。
//! 全てのリモート呼び出しは設定されたタイムアウトで打ち切る。再試行はしない。
//!
//! rust-s3は `fail-on-err` 付きで使うため、2xx以外の応答は
//! `S3Error::HttpFailWithBody(status, body)` として返り、
//! ボディのXMLからストレージのエラーコードとメッセージを取り出せる。

use std::future::Future;
use std::time::Duration;

use garasi_types::StoredObject;
use s3::error::S3Error;

use super::{
    check_object_size, effective_part_size, listed_object, plan_parts, wait_until_absent,
    ObjectStore, StoreError, DELETE_POLL_INTERVAL,
};
use crate::config::GatewayConfig;

/// 署名付きURLの最大有効期限（7日）。
const MAX_PRESIGN_SECS: u64 = 7 * 24 * 60 * 60;

/// S3互換ストレージによるObject Store実装。
pub struct S3ObjectStore {
    bucket: Box<s3::Bucket>,
    bucket_name: String,
    /// バケット作成時に使う
    region: s3::Region,
    credentials: s3::creds::Credentials,
    path_style: bool,
    /// 1回のリモート呼び出しの上限、および削除確認の待機時間
    timeout: Duration,
    part_size: usize,
}

impl S3ObjectStore {
    /// 設定からバケットを初期化する。
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let region = build_region(&config.region, config.endpoint.as_deref())?;

        let credentials = s3::creds::Credentials::new(
            Some(&config.access_key_id),
            Some(&config.secret_access_key),
            None,
            None,
            None,
        )?;

        let path_style = config.endpoint.is_some();
        let mut bucket = s3::Bucket::new(&config.bucket_name, region.clone(), credentials.clone())?;
        if path_style {
            // MinIO等のカスタムエンドポイントはパススタイルでアクセスする
            bucket = bucket.with_path_style();
        }

        tracing::info!(
            bucket = %config.bucket_name,
            region = %config.region,
            endpoint = ?config.endpoint,
            "S3バケットを設定"
        );

        Ok(Self {
            bucket,
            bucket_name: config.bucket_name.clone(),
            region,
            credentials,
            path_style,
            timeout: config.timeout,
            part_size: config.part_size,
        })
    }

    /// タイムアウト付きでリモート呼び出しを実行する。
    async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, S3Error>>,
    ) -> Result<Result<T, S3Error>, StoreError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout {
                operation,
                secs: self.timeout.as_secs(),
            })
    }

    async fn put_single(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StoreError> {
        let response = self
            .bounded(
                "put_object",
                self.bucket.put_object_with_content_type(key, bytes, content_type),
            )
            .await?
            .map_err(|e| put_error(e, bytes.len() as u64))?;

        let status = response.status_code();
        if !is_success(status) {
            return Err(put_failure(status, response.as_str().unwrap_or_default(), bytes.len() as u64));
        }
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        part_size: usize,
    ) -> Result<(), StoreError> {
        let upload = self
            .bounded(
                "initiate_multipart_upload",
                self.bucket.initiate_multipart_upload(key, content_type),
            )
            .await?
            .map_err(|e| unavailable("initiate_multipart_upload", e))?;

        let result = self
            .upload_parts(key, &upload.upload_id, bytes, content_type, part_size)
            .await;

        if let Err(err) = &result {
            // 参照されないパートを残さないようアップロードを破棄する
            tracing::warn!(key, upload_id = %upload.upload_id, error = %err, "multipartアップロードを中止します");
            match self
                .bounded("abort_upload", self.bucket.abort_upload(key, &upload.upload_id))
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(key, error = %e, "multipartアップロードの中止に失敗"),
                Err(e) => tracing::error!(key, error = %e, "multipartアップロードの中止に失敗"),
            }
        }
        result
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        bytes: &[u8],
        content_type: &str,
        part_size: usize,
    ) -> Result<(), StoreError> {
        let ranges = plan_parts(bytes.len(), part_size);
        let mut parts = Vec::with_capacity(ranges.len());

        for (index, range) in ranges.into_iter().enumerate() {
            let part_number = u32::try_from(index + 1).map_err(|_| StoreError::ObjectTooLarge {
                size: bytes.len() as u64,
            })?;
            tracing::debug!(key, part_number, len = range.len(), "パートを送信");

            let part = self
                .bounded(
                    "put_multipart_chunk",
                    self.bucket.put_multipart_chunk(
                        bytes[range].to_vec(),
                        key,
                        part_number,
                        upload_id,
                        content_type,
                    ),
                )
                .await?
                .map_err(|e| put_error(e, bytes.len() as u64))?;
            parts.push(part);
        }

        let response = self
            .bounded(
                "complete_multipart_upload",
                self.bucket.complete_multipart_upload(key, upload_id, parts),
            )
            .await?
            .map_err(|e| put_error(e, bytes.len() as u64))?;

        // CompleteMultipartUploadは200でもボディにエラーを返すことがある
        let body = response.as_str().unwrap_or_default();
        if !is_success(response.status_code()) || body.contains("<Error>") {
            return Err(put_failure(response.status_code(), body, bytes.len() as u64));
        }
        Ok(())
    }

    async fn list_error(&self, err: S3Error) -> StoreError {
        if let S3Error::HttpFailWithBody(status, body) = &err {
            if *status == 404 || body.contains("NoSuchBucket") {
                return self.bucket_not_found();
            }
        }
        // エラーボディをListBucketResultとして解釈できなかった場合はバケットの存在を確認する
        if let Ok(Ok(false)) = self.bounded("bucket_exists", self.bucket.exists()).await {
            return self.bucket_not_found();
        }
        unavailable("list_objects", err)
    }

    fn bucket_not_found(&self) -> StoreError {
        tracing::error!(bucket = %self.bucket_name, "バケットが存在しません");
        StoreError::BucketNotFound {
            bucket: self.bucket_name.clone(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        length: u64,
    ) -> Result<(), StoreError> {
        check_object_size(length.max(bytes.len() as u64))?;

        let part_size = effective_part_size(bytes.len() as u64, self.part_size);
        let result = if bytes.len() <= part_size {
            self.put_single(key, bytes, content_type).await
        } else {
            self.put_multipart(key, bytes, content_type, part_size).await
        };

        if let Err(err) = &result {
            tracing::error!(bucket = %self.bucket_name, key, error = %err, "オブジェクトのアップロードに失敗");
        }
        result
    }

    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        match self.bounded("head_object", self.bucket.head_object(key)).await? {
            Ok((_, status)) if is_success(status) => Ok(true),
            Ok((_, 404)) => Ok(false),
            Ok((_, status)) => Err(StoreError::Unavailable {
                operation: "head_object",
                message: format!("HTTP {status}"),
            }),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(unavailable("head_object", e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if !self.head(key).await? {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }

        let response = self
            .bounded("delete_object", self.bucket.delete_object(key))
            .await?
            .map_err(|e| unavailable("delete_object", e))?;
        if !is_success(response.status_code()) {
            return Err(StoreError::Unavailable {
                operation: "delete_object",
                message: format!(
                    "HTTP {}: {}",
                    response.status_code(),
                    response.as_str().unwrap_or_default()
                ),
            });
        }

        wait_until_absent(key, self.timeout, DELETE_POLL_INTERVAL, || self.head(key)).await
    }

    async fn list(&self, url_ttl: Duration) -> Result<Vec<StoredObject>, StoreError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self
                .bounded(
                    "list_objects",
                    self.bucket
                        .list_page(String::new(), None, continuation_token.take(), None, None),
                )
                .await?;

            let (result, status) = match page {
                Ok(page) => page,
                Err(e) => return Err(self.list_error(e).await),
            };
            if status == 404 {
                return Err(self.bucket_not_found());
            }

            for item in result.contents {
                let url = self.presign(&item.key, url_ttl).await;
                objects.push(listed_object(item.key, url));
            }

            match result.next_continuation_token {
                Some(token) if result.is_truncated => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StoreError> {
        let expiry = presign_expiry_secs(ttl);
        self.bounded("presign_get", self.bucket.presign_get(key, expiry, None))
            .await?
            .map_err(|e| {
                tracing::error!(bucket = %self.bucket_name, key, error = %e, "署名付きURLの発行に失敗");
                unavailable("presign_get", e)
            })
    }

    async fn copy(&self, old_key: &str, new_key: &str) -> Result<(), StoreError> {
        match self
            .bounded("copy_object", self.bucket.copy_object_internal(old_key, new_key))
            .await?
        {
            Ok(status) if is_success(status) => Ok(()),
            Ok(status) => Err(StoreError::CopyFailed {
                code: status.to_string(),
                message: format!("HTTP {status}"),
            }),
            Err(S3Error::HttpFailWithBody(status, body)) => {
                let (code, message) = parse_s3_error(&body);
                tracing::error!(old_key, new_key, ?code, ?message, "オブジェクトのコピーに失敗");
                Err(StoreError::CopyFailed {
                    code: code.unwrap_or_else(|| status.to_string()),
                    message: message.unwrap_or(body),
                })
            }
            Err(e) => Err(StoreError::CopyFailed {
                code: "Unknown".to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn ensure_bucket(&self) -> Result<(), StoreError> {
        let exists = self
            .bounded("bucket_exists", self.bucket.exists())
            .await?
            .map_err(|e| unavailable("bucket_exists", e))?;
        if exists {
            return Ok(());
        }

        let config = s3::BucketConfiguration::default();
        let created = if self.path_style {
            self.bounded(
                "create_bucket",
                s3::Bucket::create_with_path_style(
                    &self.bucket_name,
                    self.region.clone(),
                    self.credentials.clone(),
                    config,
                ),
            )
            .await?
        } else {
            self.bounded(
                "create_bucket",
                s3::Bucket::create(
                    &self.bucket_name,
                    self.region.clone(),
                    self.credentials.clone(),
                    config,
                ),
            )
            .await?
        };

        let response = created.map_err(|e| {
            tracing::error!(bucket = %self.bucket_name, error = %e, "バケットを作成できませんでした");
            unavailable("create_bucket", e)
        })?;
        if !response.success() {
            return Err(StoreError::Unavailable {
                operation: "create_bucket",
                message: format!("HTTP {}: {}", response.response_code, response.response_text),
            });
        }

        tracing::info!(bucket = %self.bucket_name, region = %self.region, "バケットを作成しました");
        Ok(())
    }
}

/// リージョンを構築する。エンドポイント指定時はカスタムリージョンとする。
fn build_region(region: &str, endpoint: Option<&str>) -> anyhow::Result<s3::Region> {
    match endpoint {
        Some(endpoint) => Ok(s3::Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        }),
        None => Ok(region.parse()?),
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn presign_expiry_secs(ttl: Duration) -> u32 {
    // clampの上限が7日なのでu32に収まる
    ttl.as_secs().clamp(1, MAX_PRESIGN_SECS) as u32
}

fn unavailable(operation: &'static str, err: S3Error) -> StoreError {
    StoreError::Unavailable {
        operation,
        message: err.to_string(),
    }
}

fn put_error(err: S3Error, size: u64) -> StoreError {
    match err {
        S3Error::HttpFailWithBody(status, body) => put_failure(status, &body, size),
        e => unavailable("put_object", e),
    }
}

fn put_failure(status: u16, body: &str, size: u64) -> StoreError {
    let (code, message) = parse_s3_error(body);
    if code.as_deref() == Some("EntityTooLarge") {
        return StoreError::ObjectTooLarge { size };
    }
    StoreError::Unavailable {
        operation: "put_object",
        message: message.unwrap_or_else(|| format!("HTTP {status}")),
    }
}

/// S3のXMLエラーボディから `<Code>` と `<Message>` を取り出す。
fn parse_s3_error(body: &str) -> (Option<String>, Option<String>) {
    (xml_tag(body, "Code"), xml_tag(body, "Message"))
}

fn xml_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}
