//! # PUT /update
//!
//! 既存オブジェクトを新しいファイルで置き換える。
//! 旧オブジェクトは新オブジェクトの保存前に削除されるため、
//! 保存に失敗するとどちらも残らない。

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use garasi_types::ApiResponse;

use super::{missing, read_upload_form};
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::validation::UploadRequest;

/// PUT /update: 差し替え。
///
/// フォーム: `file`, `title`, `key`（旧オブジェクトのストレージキー）
pub async fn handle_update(
    State(state): State<Arc<GatewayState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<()>>, GatewayError> {
    let form = read_upload_form("update", multipart).await?;
    let Some((filename, file_bytes)) = form.file else {
        return Err(missing("update", "file is required"));
    };
    if form.key.trim().is_empty() {
        return Err(missing("update", "key is required"));
    }

    let request = UploadRequest {
        title: form.title,
        declared_size: file_bytes.len() as u64,
        file_bytes,
        filename,
    };
    state.workflow.update(&form.key, request).await?;

    Ok(Json(ApiResponse::empty("success update file")))
}
