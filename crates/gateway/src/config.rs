//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。
//! 設定は起動時に一度だけ読み込み、以降は不変の値として各コンストラクタに渡す。

use std::fmt;
use std::time::Duration;

use anyhow::Context;

use crate::storage::DEFAULT_PART_SIZE;
use crate::validation::default_allowed_mime_types;
use crate::workflow::UploadWorkflow;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;
const MOCK_BUCKET: &str = "garasi-local";

/// Gatewayの設定。
#[derive(Clone)]
pub struct GatewayConfig {
    /// ACCESS_KEY_ID
    pub access_key_id: String,
    /// SECRET_ACCESS_KEY
    pub secret_access_key: String,
    /// S3_BUCKET_NAME
    pub bucket_name: String,
    /// REGION
    pub region: String,
    /// S3_ENDPOINT（MinIO等。未設定ならAWS）
    pub endpoint: Option<String>,
    /// TIMEOUT（秒）。リモート呼び出しの上限、削除確認の待機時間、署名付きURLの有効期限に使う。
    pub timeout: Duration,
    /// API_GROUP（ルートのプレフィックス）
    pub api_group: String,
    /// PORT
    pub port: u16,
    /// MAX_UPLOAD_SIZE（リクエストボディの上限、バイト）
    pub max_upload_size: usize,
    /// MULTIPART_PART_SIZE_MIB
    pub part_size: usize,
    /// ALLOWED_MIME_TYPES（カンマ区切り）
    pub allowed_mime_types: Vec<String>,
    /// MOCK_MODE=true ならメモリ上のストレージを使う
    pub mock_mode: bool,
}

impl GatewayConfig {
    /// プロセスの環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から構築する。空文字列は未設定として扱う。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mock_mode = get("MOCK_MODE").is_some_and(|v| v.eq_ignore_ascii_case("true"));

        let required = |name: &str| -> anyhow::Result<String> {
            match get(name) {
                Some(v) => Ok(v),
                None if mock_mode => Ok(String::new()),
                None => anyhow::bail!("{name}が設定されていません"),
            }
        };

        let access_key_id = required("ACCESS_KEY_ID")?;
        let secret_access_key = required("SECRET_ACCESS_KEY")?;
        let bucket_name = match get("S3_BUCKET_NAME") {
            Some(v) => v,
            None if mock_mode => MOCK_BUCKET.to_string(),
            None => anyhow::bail!("S3_BUCKET_NAMEが設定されていません"),
        };

        let timeout_secs: u64 = parse_or(get("TIMEOUT"), "TIMEOUT", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            anyhow::bail!("TIMEOUTは1以上である必要があります");
        }

        let part_size_mib: usize = parse_or(
            get("MULTIPART_PART_SIZE_MIB"),
            "MULTIPART_PART_SIZE_MIB",
            DEFAULT_PART_SIZE / (1024 * 1024),
        )?;

        let allowed_mime_types = match get("ALLOWED_MIME_TYPES") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => default_allowed_mime_types(),
        };

        Ok(Self {
            access_key_id,
            secret_access_key,
            bucket_name,
            region: get("REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint: get("S3_ENDPOINT"),
            timeout: Duration::from_secs(timeout_secs),
            api_group: get("API_GROUP").unwrap_or_default(),
            port: parse_or(get("PORT"), "PORT", DEFAULT_PORT)?,
            max_upload_size: parse_or(get("MAX_UPLOAD_SIZE"), "MAX_UPLOAD_SIZE", DEFAULT_MAX_UPLOAD_SIZE)?,
            part_size: part_size_mib * 1024 * 1024,
            allowed_mime_types,
            mock_mode,
        })
    }

    /// ルートのプレフィックス。`api/v1` → `/api/v1`、空または `/` なら `None`。
    pub fn route_prefix(&self) -> Option<String> {
        let trimmed = self.api_group.trim_matches('/');
        if trimmed.is_empty() {
            None
        } else {
            Some(format!("/{trimmed}"))
        }
    }

    /// 待ち受けアドレス。
    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("api_group", &self.api_group)
            .field("port", &self.port)
            .field("max_upload_size", &self.max_upload_size)
            .field("part_size", &self.part_size)
            .field("allowed_mime_types", &self.allowed_mime_types)
            .field("mock_mode", &self.mock_mode)
            .finish()
    }
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .parse()
            .with_context(|| format!("{name}の値が不正です: {v}")),
        None => Ok(default),
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// アップロード処理のオーケストレーション
    pub workflow: UploadWorkflow,
}
