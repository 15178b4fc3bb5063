//! # POST /upload
//!
//! multipartで受け取ったファイルを保存し、保存後の一覧を返す。

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use garasi_types::{ApiResponse, StoredObject};

use super::{missing, read_upload_form};
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::validation::UploadRequest;

/// POST /upload: 新規アップロード。
///
/// フォーム: `file`（必須）, `title`（必須）
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ApiResponse<Vec<StoredObject>>>, GatewayError> {
    let form = read_upload_form("upload", multipart).await?;
    let Some((filename, file_bytes)) = form.file else {
        return Err(missing("upload", "request did not contain a file"));
    };

    let request = UploadRequest {
        title: form.title,
        declared_size: file_bytes.len() as u64,
        file_bytes,
        filename,
    };
    let objects = state.workflow.create(request).await?;

    Ok(Json(ApiResponse::success("success upload file", objects)))
}
