//! # Garasi 共有型定義
//!
//! HTTP APIで送受信されるデータ構造をRust構造体として提供する。
//!
//! ## レスポンス形式
//! - 成功: `{ "status": "success", "message": ..., "data": ... }`
//! - 失敗: `{ "status": "error", "message": ... }`

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// オブジェクト
// ---------------------------------------------------------------------------

/// ストレージに保存されたオブジェクト。
///
/// `url` はlist/previewのたびに再発行される署名付きURL。
/// 発行に失敗したエントリでは空文字列になる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// ストレージキー（`<title>_<uuid><ext>`）
    pub key: String,
    /// キーの最後の `_` より前の部分
    pub title: String,
    /// 期限付きのダウンロードURL
    pub url: String,
}

/// GET /preview/{key} のレスポンスデータ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewUrl {
    /// 署名付きURL
    pub url: String,
}

/// PUT /update-object のフォーム。
///
/// 欠落したフィールドは空文字列として受け取り、ハンドラ側で検証する。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameForm {
    /// 移動元のキー
    #[serde(default)]
    pub old_key: String,
    /// 移動先のキー（拡張子は移動元から引き継ぐ）
    #[serde(default)]
    pub new_key: String,
}

// ---------------------------------------------------------------------------
// レスポンスエンベロープ
// ---------------------------------------------------------------------------

/// レスポンスの `status` フィールド値。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// 成功レスポンス。`data` が無い場合は `null` として出力する。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: ResponseStatus,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// データ付きの成功レスポンスを構築する。
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: Some(data),
        }
    }

    /// データ無しの成功レスポンスを構築する。
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            data: None,
        }
    }
}

/// エラーレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: ResponseStatus,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_success_serializes_null_data() {
        let resp: ApiResponse<Vec<StoredObject>> = ApiResponse::empty("success update file");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "success update file");
        assert!(json["data"].is_null());
    }

    #[test]
    fn test_error_envelope_has_no_data_field() {
        let json = serde_json::to_value(ErrorResponse::new("title is required")).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_rename_form_uses_camel_case() {
        let form: RenameForm =
            serde_json::from_str(r#"{"oldKey":"a_1.png","newKey":"b"}"#).unwrap();
        assert_eq!(form.old_key, "a_1.png");
        assert_eq!(form.new_key, "b");

        let partial: RenameForm = serde_json::from_str(r#"{"oldKey":"a_1.png"}"#).unwrap();
        assert!(partial.new_key.is_empty());
    }
}
