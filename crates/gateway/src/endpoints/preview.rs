//! # GET /preview/{key}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use garasi_types::{ApiResponse, PreviewUrl};

use super::missing;
use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /preview/{key}: 期限付きダウンロードURLの発行。
///
/// オブジェクトの存在は確認しない。
pub async fn handle_preview(
    State(state): State<Arc<GatewayState>>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<PreviewUrl>>, GatewayError> {
    if key.trim().is_empty() {
        return Err(missing("preview", "key parameter is required"));
    }

    let url = state.workflow.preview(&key).await?;
    Ok(Json(ApiResponse::success("success get preview url", PreviewUrl { url })))
}
