//! # GET /list

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use garasi_types::{ApiResponse, StoredObject};

use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /list: バケット内の全オブジェクト。
pub async fn handle_list(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<ApiResponse<Vec<StoredObject>>>, GatewayError> {
    let objects = state.workflow.list().await?;
    Ok(Json(ApiResponse::success("success get list files", objects)))
}
