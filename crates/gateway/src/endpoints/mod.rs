//! # Gatewayエンドポイント
//!
//! ## ルート
//! - `POST /upload`: アップロード後の一覧を返す
//! - `GET /preview/{key}`: 期限付きダウンロードURL
//! - `PUT /update`: 既存オブジェクトの差し替え
//! - `GET /list`: 全オブジェクトの一覧
//! - `DELETE /delete/{key}`: 削除
//! - `PUT /update-object`: キーの変更（コピー後に削除）
//!
//! `API_GROUP` が設定されていれば全ルートをその配下に置く。

pub mod delete;
pub mod list;
pub mod preview;
pub mod update;
pub mod update_object;
pub mod upload;

#[cfg(test)]
mod test_helpers;

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;

use crate::config::GatewayState;
use crate::error::{log_error, GatewayError};

pub use delete::handle_delete;
pub use list::handle_list;
pub use preview::handle_preview;
pub use update::handle_update;
pub use update_object::handle_update_object;
pub use upload::handle_upload;

/// 全エンドポイントを束ねたルーターを組み立てる。
///
/// `body_limit` はリクエストボディの上限（バイト）。
pub fn router(state: Arc<GatewayState>, prefix: Option<&str>, body_limit: usize) -> Router {
    let routes = Router::new()
        .route("/upload", post(handle_upload))
        .route("/preview/{key}", get(handle_preview))
        .route("/update", put(handle_update))
        .route("/list", get(handle_list))
        .route("/delete/{key}", axum::routing::delete(handle_delete))
        .route("/update-object", put(handle_update_object))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    match prefix {
        Some(prefix) => Router::new().nest(prefix, routes),
        None => routes,
    }
}

/// multipartで受け取ったアップロードフォーム。
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub title: String,
    pub key: String,
    /// `file` パート（ファイル名, 本体）
    pub file: Option<(String, Vec<u8>)>,
}

/// multipartボディから `title` / `key` / `file` を読み出す。
///
/// 未知のパートは読み捨てる。
pub(crate) async fn read_upload_form(
    operation: &'static str,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadForm, GatewayError> {
    let mut multipart = multipart.map_err(|e| {
        handler_failed(
            operation,
            GatewayError::BadRequest("content-Type header is not valid".to_string()),
            &e,
        )
    })?;

    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_failed(operation, e))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| multipart_failed(operation, e))?;
                form.file = Some((filename, bytes.to_vec()));
            }
            "title" => form.title = field.text().await.map_err(|e| multipart_failed(operation, e))?,
            "key" => form.key = field.text().await.map_err(|e| multipart_failed(operation, e))?,
            _ => {
                tracing::debug!(field = %name, "未知のパートを無視します");
            }
        }
    }

    Ok(form)
}

/// ボディ上限超過は413、それ以外の読み取り失敗は400。
fn multipart_failed(operation: &'static str, err: MultipartError) -> GatewayError {
    let mapped = if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge(err.body_text())
    } else {
        GatewayError::BadRequest(err.body_text())
    };
    handler_failed(operation, mapped, &err)
}

/// ハンドラ層のエラーを記録してそのまま返す。
pub(crate) fn handler_failed(
    operation: &'static str,
    err: GatewayError,
    cause: &dyn std::fmt::Display,
) -> GatewayError {
    log_error("handler", operation, cause);
    err
}

/// 必須フィールドの欠落。
pub(crate) fn missing(operation: &'static str, message: &'static str) -> GatewayError {
    handler_failed(operation, GatewayError::BadRequest(message.to_string()), &message)
}
