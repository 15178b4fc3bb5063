//! # Garasi Gateway
//!
//! S3互換オブジェクトストレージの前段に置くHTTPファサード。
//!
//! ## 役割
//! - multipartで受け取ったファイルの検証（マジックバイトによるContent-Type判定）
//! - `<title>_<uuid><ext>` 形式のキーでの保存
//! - 一覧・期限付きURL発行・差し替え・削除・キー変更
//!
//! ## API エンドポイント
//! - `POST /upload`
//! - `GET /preview/{key}`
//! - `PUT /update`
//! - `GET /list`
//! - `DELETE /delete/{key}`
//! - `PUT /update-object`

mod config;
mod endpoints;
mod error;
mod storage;
mod validation;
mod workflow;

use std::sync::Arc;

use config::{GatewayConfig, GatewayState};
use storage::{MemoryObjectStore, ObjectStore};
use workflow::UploadWorkflow;

/// 設定に応じてObject Storeを選ぶ。
fn build_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    if config.mock_mode {
        tracing::warn!("MOCK_MODE: メモリ上のストレージを使用します（再起動で消えます）");
        return Ok(Arc::new(MemoryObjectStore::new(config.bucket_name.clone())));
    }
    remote_store(config)
}

#[cfg(feature = "vendor-aws")]
fn remote_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    Ok(Arc::new(storage::S3ObjectStore::from_config(config)?))
}

#[cfg(not(feature = "vendor-aws"))]
fn remote_store(_config: &GatewayConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    anyhow::bail!("S3ストレージを使うには vendor-aws feature を有効にしてビルドしてください")
}

async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await
}

/// 停止シグナルを待つ。
///
/// ハンドラを設定できなかった場合は停止せずに動き続ける。
async fn wait_for_shutdown(signal: impl std::future::Future<Output = std::io::Result<()>>) {
    match signal.await {
        Ok(()) => tracing::info!("停止シグナルを受信しました"),
        Err(e) => {
            tracing::error!(error = %e, "シグナルハンドラを設定できませんでした");
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    tracing::debug!(?config, "設定を読み込みました");

    let store = build_store(&config)?;
    store.ensure_bucket().await?;

    let workflow = UploadWorkflow::new(store, config.allowed_mime_types.clone(), config.timeout);
    let state = Arc::new(GatewayState { workflow });
    let prefix = config.route_prefix();
    let app = endpoints::router(state, prefix.as_deref(), config.max_upload_size);

    let addr = config.listen_addr();
    tracing::info!(
        bucket = %config.bucket_name,
        prefix = prefix.as_deref().unwrap_or("/"),
        "Gatewayを {} で起動します",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_on_signal() {
        let received = async { Ok::<(), std::io::Error>(()) };
        let result = tokio::time::timeout(Duration::from_millis(100), wait_for_shutdown(received)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failed_signal_handler_keeps_serving() {
        let failed = async { Err::<(), _>(std::io::Error::other("signal driver unavailable")) };
        let result = tokio::time::timeout(Duration::from_millis(100), wait_for_shutdown(failed)).await;
        assert!(result.is_err());
    }
}
