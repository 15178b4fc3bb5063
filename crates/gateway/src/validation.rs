//! # アップロード検証・正規化
//!
//! ## 処理内容
//! - 必須フィールド（title, file）の確認
//! - 先頭512バイトのマジックバイトからContent-Typeを判定
//! - 許可リストとの照合
//! - ストレージキー（`<uuid><ext>`）とタイトルプレフィックス（`<title>_`）の導出

/// Content-Type判定に使う先頭バイト数。
pub const SNIFF_LEN: usize = 512;

/// タイトルとランダム部分を区切る文字。
pub const TITLE_DELIMITER: char = '_';

/// 許可リストが設定されていない場合に使うMIMEタイプ。
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
];

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// 検証エラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// 必須フィールドの欠落（空のファイルを含む）
    #[error("{0} is required")]
    MissingField(&'static str),
    /// 許可リストに無いContent-Type
    #[error("not valid mime-type: {0}")]
    InvalidContentType(String),
}

/// アップロードリクエスト。1リクエストの間だけ存在する。
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// ユーザーが指定したタイトル
    pub title: String,
    /// ファイル本体
    pub file_bytes: Vec<u8>,
    /// 申告されたサイズ（multipartで受け取ったバイト数）
    pub declared_size: u64,
    /// 元のファイル名
    pub filename: String,
}

/// 検証済みのアップロード。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUpload {
    /// `<uuid><ext>`
    pub key: String,
    /// `<title>_`
    pub prefix: String,
    /// 元のファイル名の拡張子（`.` を含む、無ければ空）
    pub extension: String,
    /// 判定したContent-Type
    pub content_type: String,
    /// 本体のバイト数
    pub length: u64,
}

impl PreparedUpload {
    /// ストレージ上のキー（プレフィックス + キー）。
    pub fn storage_key(&self) -> String {
        format!("{}{}", self.prefix, self.key)
    }
}

/// 先頭バイトからContent-Typeを判定する。
///
/// シグネチャに一致しない場合、制御文字を含まないUTF-8テキストなら
/// `text/plain; charset=utf-8`、それ以外は `application/octet-stream`。
pub fn sniff_content_type(bytes: &[u8]) -> String {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];

    if let Some(kind) = infer::get(head) {
        return kind.mime_type().to_string();
    }

    if looks_like_text(head) {
        TEXT_PLAIN.to_string()
    } else {
        OCTET_STREAM.to_string()
    }
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() {
        return true;
    }
    // 512バイト境界でマルチバイト文字が切れている場合は有効な部分だけを見る
    let valid = match std::str::from_utf8(head) {
        Ok(s) => s,
        Err(e) if e.error_len().is_none() => {
            // valid_up_to() までは必ず有効
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return false,
    };
    !valid
        .bytes()
        .any(|b| b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0C | 0x1B))
}

/// Content-Typeが許可リストに含まれるか確認する。
pub fn validate_content_type(
    content_type: &str,
    allowed: &[String],
) -> Result<(), ValidationError> {
    if allowed.iter().any(|a| a == content_type) {
        Ok(())
    } else {
        Err(ValidationError::InvalidContentType(content_type.to_string()))
    }
}

/// ファイル名の拡張子を返す。
///
/// 最後のパス要素の最後の `.` 以降（`.` を含む）。無ければ空文字列。
pub fn extension_of(filename: &str) -> &str {
    let base_start = filename.rfind(&['/', '\\'][..]).map_or(0, |i| i + 1);
    let base = &filename[base_start..];
    base.rfind('.').map_or("", |i| &base[i..])
}

/// ストレージキーからタイトルを復元する。最後の区切り文字で切り詰める。
pub fn title_from_key(key: &str) -> &str {
    key.rfind(TITLE_DELIMITER).map_or(key, |i| &key[..i])
}

/// リネーム先のキー。移動元の拡張子を引き継ぐ。
pub fn renamed_key(old_key: &str, new_key: &str) -> String {
    format!("{new_key}{}", extension_of(old_key))
}

/// アップロードを検証し、キーとContent-Typeを確定する。
pub fn prepare_upload(
    request: &UploadRequest,
    allowed: &[String],
) -> Result<PreparedUpload, ValidationError> {
    if request.title.is_empty() {
        return Err(ValidationError::MissingField("title"));
    }
    if request.file_bytes.is_empty() {
        return Err(ValidationError::MissingField("file"));
    }

    let content_type = sniff_content_type(&request.file_bytes);
    validate_content_type(&content_type, allowed)?;

    let extension = extension_of(&request.filename).to_string();
    let key = format!("{}{}", uuid::Uuid::new_v4(), extension);

    Ok(PreparedUpload {
        key,
        prefix: format!("{}{}", request.title, TITLE_DELIMITER),
        extension,
        content_type,
        length: request.declared_size,
    })
}

/// 許可リストの既定値を所有型で返す。
pub fn default_allowed_mime_types() -> Vec<String> {
    DEFAULT_ALLOWED_MIME_TYPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// 最小のPDFヘッダ
    pub const PDF: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<<>>\nendobj\n";
    /// PNGシグネチャ + IHDRの先頭
    pub const PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52,
    ];
    /// JPEG SOI + APP0
    pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];
}
