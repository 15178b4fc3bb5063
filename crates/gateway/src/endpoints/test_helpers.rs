//! # エンドポイントテスト用共通ヘルパー

use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayState;
use crate::storage::ObjectStore;
use crate::validation::default_allowed_mime_types;
use crate::workflow::UploadWorkflow;

/// テストで使う署名付きURLの有効期限。
pub const TEST_URL_TTL: Duration = Duration::from_secs(60);

/// テストで使うボディ上限。
pub const TEST_BODY_LIMIT: usize = 1024 * 1024;

/// 指定したストアでGatewayを起動し、ベースURLを返す。
pub async fn start_gateway(store: Arc<dyn ObjectStore>, prefix: Option<&str>, body_limit: usize) -> String {
    let workflow = UploadWorkflow::new(store, default_allowed_mime_types(), TEST_URL_TTL);
    let state = Arc::new(GatewayState { workflow });
    let app = super::router(state, prefix, body_limit);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}{}", prefix.unwrap_or_default())
}

/// `file` と `title`（と任意で `key`）を持つmultipartフォーム。
pub fn upload_form(title: &str, filename: &str, bytes: &[u8], key: Option<&str>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes.to_vec()).file_name(filename.to_string());
    let mut form = reqwest::multipart::Form::new()
        .text("title", title.to_string())
        .part("file", part);
    if let Some(key) = key {
        form = form.text("key", key.to_string());
    }
    form
}
