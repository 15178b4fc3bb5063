//! # DELETE /delete/{key}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use garasi_types::ApiResponse;

use super::missing;
use crate::config::GatewayState;
use crate::error::GatewayError;

/// DELETE /delete/{key}: 削除。存在しないキーは404。
pub async fn handle_delete(
    State(state): State<Arc<GatewayState>>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<()>>, GatewayError> {
    if key.trim().is_empty() {
        return Err(missing("delete", "key parameter is required"));
    }

    state.workflow.delete(&key).await?;
    Ok(Json(ApiResponse::empty("success delete file")))
}
