//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型。
//! バリデーションエラーとストレージエラーを包み、HTTPステータスへ変換する。

use std::fmt::Display;

use axum::http::StatusCode;
use axum::Json;
use garasi_types::ErrorResponse;

use crate::storage::StoreError;
use crate::validation::ValidationError;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 不正なリクエスト（フィールド欠落、multipart形式でない等）
    #[error("{0}")]
    BadRequest(String),
    /// リクエストボディが上限を超えた
    #[error("{0}")]
    PayloadTooLarge(String),
    /// アップロード内容の検証失敗
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// ストレージ操作の失敗
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl GatewayError {
    /// レスポンスに使うHTTPステータス。
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) | GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            GatewayError::Store(StoreError::ObjectTooLarge { .. }) => StatusCode::BAD_REQUEST,
            GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 対象オブジェクトが存在しないことによる失敗か。
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::Store(StoreError::NotFound { .. }))
    }
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

/// レイヤー名と操作名を付けてエラーを記録する。
pub fn log_error(layer: &'static str, operation: &'static str, err: &dyn Display) {
    tracing::error!(layer, operation, error = %err, "操作に失敗");
}
