//! 旧バージョン（Web ストレージ保存）から SQLite への一回限りのデータ移行
//!
//! 旧データはアプリデータディレクトリの `legacy_storage.json` に
//! `{"respectabullz_dogs": [...], ...}` の形で置かれている。値は配列そのものか、
//! 配列を JSON 文字列化したもの（Web ストレージは文字列しか保存できないため）。
//! 移行に成功したファイルは `legacy_storage.migrated.json` にリネームし、二度と読まない。

use crate::repository::{
    ProgressCallback, RecordRepository, BREEDER_SETTINGS_ID, SETTINGS_COLLECTION,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const LEGACY_FILE_NAME: &str = "legacy_storage.json";
pub const MIGRATED_FILE_NAME: &str = "legacy_storage.migrated.json";

const KEY_PREFIX: &str = "respectabullz_";

/// 移行対象のコレクション（この順で移行する）
pub const COLLECTIONS: &[&str] = &[
    "dogs",
    "litters",
    "heatCycles",
    "clients",
    "sales",
    "waitlist",
    "expenses",
    "transports",
    "geneticTests",
    "contacts",
    "settings",
];

/// 移行進捗（UI にそのまま渡す）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub stage: String,
    pub current: u64,
    pub total: u64,
}

/// 移行結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// 旧データが存在し、1 件以上移行したか
    pub migrated: bool,
    /// コレクション名 → 移行件数（0 件のコレクションは含まない）
    pub migrated_counts: BTreeMap<String, u64>,
}

impl MigrationReport {
    pub fn total(&self) -> u64 {
        self.migrated_counts.values().sum()
    }
}

/// 旧ストレージを移行する
///
/// 全コレクションを先に解析し、1 つでも不正なら何も書き込まずにエラーを返す。
/// 書き込みは upsert なので、途中で失敗しても再実行で重複しない。
pub async fn migrate_legacy_storage(
    dir: &Path,
    repo: &dyn RecordRepository,
    progress: ProgressCallback<'_>,
) -> Result<MigrationReport, String> {
    let path = dir.join(LEGACY_FILE_NAME);
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No legacy storage found, nothing to migrate");
            return Ok(MigrationReport::default());
        }
        Err(e) => return Err(format!("Failed to read legacy storage: {e}")),
    };

    let root: Value = serde_json::from_str(&contents)
        .map_err(|e| format!("Invalid legacy storage file: {e}"))?;
    let storage = root
        .as_object()
        .ok_or("Invalid legacy storage file: expected object")?;

    let mut parsed = Vec::with_capacity(COLLECTIONS.len());
    for collection in COLLECTIONS {
        let key = format!("{KEY_PREFIX}{collection}");
        let records = match storage.get(&key) {
            Some(value) => parse_collection(collection, &key, value)?,
            None => Vec::new(),
        };
        parsed.push((*collection, records));
    }

    let total = COLLECTIONS.len() as u64;
    let mut report = MigrationReport::default();

    for (index, (collection, records)) in parsed.into_iter().enumerate() {
        progress(MigrationProgress {
            stage: format!("Migrating {collection}"),
            current: index as u64 + 1,
            total,
        });
        log::debug!("Migrating {} {} records", records.len(), collection);

        let mut count = 0u64;
        for record in &records {
            let id = record_id(record);
            repo.upsert(collection, &id, record).await?;
            count += 1;
        }
        if count > 0 {
            report.migrated_counts.insert(collection.to_string(), count);
        }
    }

    progress(MigrationProgress {
        stage: "Complete".to_string(),
        current: total,
        total,
    });

    report.migrated = report.total() > 0;
    if report.migrated {
        if let Err(e) = tokio::fs::rename(&path, dir.join(MIGRATED_FILE_NAME)).await {
            log::warn!("Failed to mark legacy storage as migrated: {e}");
        }
        log::info!("Migrated {} legacy records", report.total());
    }

    Ok(report)
}

fn parse_collection(collection: &str, key: &str, value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => {
            if let Some(bad) = items.iter().position(|v| !v.is_object()) {
                return Err(format!("Legacy key {key}: item {bad} is not an object"));
            }
            Ok(items.clone())
        }
        // 旧形式ではブリーダー設定は配列ではなく単一オブジェクト
        Value::Object(_) if collection == SETTINGS_COLLECTION => {
            let mut settings = value.clone();
            if settings.get("id").is_none() {
                settings["id"] = Value::String(BREEDER_SETTINGS_ID.to_string());
            }
            Ok(vec![settings])
        }
        // Web ストレージは文字列で保存されているので一段デコードする
        Value::String(raw) => {
            let inner: Value = serde_json::from_str(raw)
                .map_err(|e| format!("Legacy key {key}: invalid JSON ({e})"))?;
            if inner.is_string() {
                return Err(format!("Legacy key {key}: expected JSON array"));
            }
            parse_collection(collection, key, &inner)
        }
        _ => Err(format!("Legacy key {key}: expected JSON array")),
    }
}

/// 旧レコードの id（数値 id は文字列化、無ければ新規採番）
fn record_id(record: &Value) -> String {
    match record.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}
