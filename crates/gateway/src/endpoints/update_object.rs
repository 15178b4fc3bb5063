//! # PUT /update-object
//!
//! サーバー側コピーによるキー変更。移動先は `newKey` + 移動元の拡張子。

use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::{Form, Json};
use garasi_types::{ApiResponse, RenameForm};

use super::{handler_failed, missing};
use crate::config::GatewayState;
use crate::error::GatewayError;

/// PUT /update-object: キーの変更。
///
/// フォーム（urlencoded）: `oldKey`, `newKey`
pub async fn handle_update_object(
    State(state): State<Arc<GatewayState>>,
    form: Result<Form<RenameForm>, FormRejection>,
) -> Result<Json<ApiResponse<()>>, GatewayError> {
    let Form(form) = form.map_err(|e| {
        handler_failed("update_object", GatewayError::BadRequest(e.body_text()), &e)
    })?;

    if form.old_key.trim().is_empty() {
        return Err(missing("update_object", "oldKey is required"));
    }
    if form.new_key.trim().is_empty() {
        return Err(missing("update_object", "newKey is required"));
    }

    state.workflow.rename(&form.old_key, &form.new_key).await?;
    Ok(Json(ApiResponse::empty("success update object")))
}
