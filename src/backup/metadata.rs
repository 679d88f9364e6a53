//! バックアップの metadata.json の生成と検証
//!
//! 検証は決して失敗で中断させない。不正なメタデータは「メタデータ無し」として
//! 扱われ、リストアは database.json と写真だけで続行する。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 現在のメタデータスキーマバージョン
pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub schema_version: String,
    /// RFC 3339 形式（例: 2024-01-01T00:00:00Z）
    pub created_at: String,
    pub producer_version: String,
    /// UI 表示用の申告値。実際の写真数とは照合されない
    pub photo_count: u64,
}

impl BackupMetadata {
    /// エクスポート時のメタデータを組み立てる
    pub fn for_export(producer_version: &str, photo_count: usize) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            producer_version: producer_version.to_string(),
            photo_count: photo_count as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValidation {
    Valid(BackupMetadata),
    Invalid(Vec<String>),
}

impl MetadataValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// 検証済みメタデータと、エラー一覧に分解する
    pub fn into_parts(self) -> (Option<BackupMetadata>, Vec<String>) {
        match self {
            Self::Valid(metadata) => (Some(metadata), Vec::new()),
            Self::Invalid(errors) => (None, errors),
        }
    }
}

/// metadata.json の生テキストを検証する
///
/// 各エラーは「フィールド名: 違反した制約」の形式。
pub fn validate(raw_json: &str) -> MetadataValidation {
    let value: Value = match serde_json::from_str(raw_json) {
        Ok(v) => v,
        Err(e) => return MetadataValidation::Invalid(vec![format!("metadata: invalid JSON ({e})")]),
    };

    let Some(object) = value.as_object() else {
        return MetadataValidation::Invalid(vec!["metadata: expected object".to_string()]);
    };

    let mut errors = Vec::new();

    let schema_version = require_string(object, "schemaVersion", &mut errors);
    let producer_version = require_string(object, "producerVersion", &mut errors);

    let created_at = require_string(object, "createdAt", &mut errors);
    if let Some(ref ts) = created_at {
        if chrono::DateTime::parse_from_rfc3339(ts).is_err() {
            errors.push("createdAt: expected RFC 3339 timestamp".to_string());
        }
    }

    // 負数・小数・文字列の数値は不可。3.0 のような整数値の浮動小数は受け付ける
    let photo_count = match object.get("photoCount") {
        Some(v) => match non_negative_integer(v) {
            Some(n) => Some(n),
            None => {
                errors.push("photoCount: expected non-negative integer".to_string());
                None
            }
        },
        None => {
            errors.push("photoCount: missing".to_string());
            None
        }
    };

    match (schema_version, created_at, producer_version, photo_count) {
        (Some(schema_version), Some(created_at), Some(producer_version), Some(photo_count))
            if errors.is_empty() =>
        {
            MetadataValidation::Valid(BackupMetadata {
                schema_version,
                created_at,
                producer_version,
                photo_count,
            })
        }
        _ => MetadataValidation::Invalid(errors),
    }
}

fn require_string(
    object: &serde_json::Map<String, Value>,
    field: &str,
    errors: &mut Vec<String>,
) -> Option<String> {
    match object.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            errors.push(format!("{field}: expected non-empty string"));
            None
        }
        Some(_) => {
            errors.push(format!("{field}: expected string"));
            None
        }
        None => {
            errors.push(format!("{field}: missing"));
            None
        }
    }
}

fn non_negative_integer(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}
