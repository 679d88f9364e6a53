//! リポジトリパターンによるDB操作の抽象化
//!
//! バックアップ/初回起動のコアはデータレイヤーをこのトレイト群越しにのみ扱い、
//! データベースドキュメントの中身には立ち入らない。`SqliteDataLayer` はその
//! SQLite 実装（全コレクションを `records` テーブル 1 つに保存する）。

use crate::legacy_migration::{self, MigrationProgress, MigrationReport};
use crate::sample_data;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde_json::{Map, Value};
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;

/// データベースドキュメントのフォーマットバージョン
pub const DOCUMENT_VERSION: u64 = 1;

const INIT_SQL: &str = include_str!("../migrations/001_init.sql");

/// ブリーダー設定が保存されるレコード
pub(crate) const SETTINGS_COLLECTION: &str = "settings";
pub(crate) const BREEDER_SETTINGS_ID: &str = "breeder";

/// 移行進捗のコールバック
pub type ProgressCallback<'a> = &'a (dyn Fn(MigrationProgress) + Send + Sync);

/// バックアップ用のDBエクスポート/インポートを抽象化するトレイト
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BackupDataSource: Send + Sync {
    /// 全レコードを不透明な文字列ドキュメントとして書き出す
    async fn export_database_document(&self) -> Result<String, String>;

    /// ドキュメントで全レコードを置き換える（全件成功か、何も変えないか）
    async fn import_database_document(&self, document: &str) -> Result<(), String>;
}

/// 初回起動フローが使うデータレイヤー操作
#[async_trait]
pub trait OnboardingDataSource: Send + Sync {
    /// 旧ストレージからの一回限りの移行
    async fn run_first_launch_migration(
        &self,
        progress: ProgressCallback<'_>,
    ) -> Result<MigrationReport, String>;

    /// ブリーダー設定が既に存在するか
    async fn has_breeder_settings(&self) -> Result<bool, String>;

    /// サンプルデータを投入
    async fn load_sample_data(&self) -> Result<(), String>;
}

/// コレクション単位のレコード操作を抽象化するトレイト
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// コレクション内の全レコード（id 順）
    async fn list(&self, collection: &str) -> Result<Vec<Value>, String>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, String>;

    /// レコードを作成または更新（data の `id` は引数の id で上書きされる）
    async fn upsert(&self, collection: &str, id: &str, data: &Value) -> Result<(), String>;

    /// 削除した場合 true
    async fn delete(&self, collection: &str, id: &str) -> Result<bool, String>;

    async fn count(&self, collection: &str) -> Result<i64, String>;
}

/// `records` テーブルを作成する（マイグレーション 001 と同等）
pub async fn init_schema(pool: &SqlitePool) -> Result<(), String> {
    sqlx::raw_sql(INIT_SQL)
        .execute(pool)
        .await
        .map_err(|e| format!("Failed to initialize schema: {e}"))?;
    Ok(())
}

/// id を埋め込んだ保存用 JSON を作る
fn with_id(id: &str, data: &Value) -> Result<String, String> {
    let mut object = match data {
        Value::Object(map) => map.clone(),
        _ => return Err(format!("Record {id} must be a JSON object")),
    };
    object.insert("id".to_string(), Value::String(id.to_string()));
    serde_json::to_string(&Value::Object(object))
        .map_err(|e| format!("Failed to serialize record {id}: {e}"))
}

fn parse_record(collection: &str, raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw)
        .map_err(|e| format!("Corrupt record in {collection}: {e}"))
}

/// インポート対象のドキュメントを検証し、(collection, id, data) に展開する
fn parse_document(document: &str) -> Result<Vec<(String, String, String)>, String> {
    let value: Value = serde_json::from_str(document)
        .map_err(|e| format!("Invalid database document: {e}"))?;

    if let Some(version) = value.get("version") {
        match version.as_u64() {
            Some(v) if v <= DOCUMENT_VERSION => {}
            _ => return Err(format!("Unsupported database document version: {version}")),
        }
    }

    let root = value
        .as_object()
        .ok_or("Invalid database document: expected object")?;

    // `{"collections": {...}}` 形式と、コレクション配列をトップレベルに並べた
    // `{"dogs": [...], ...}` 形式の両方を受け付ける
    let collections: Vec<(&String, &Value)> = match root.get("collections") {
        Some(Value::Object(map)) => map.iter().collect(),
        Some(_) => return Err("Invalid database document: collections is not an object".to_string()),
        None => {
            // version / exportedAt などのスカラー値は読み飛ばす
            let found: Vec<_> = root
                .iter()
                .filter(|(_, v)| v.is_array() || v.is_object())
                .collect();
            if found.is_empty() {
                return Err("Invalid database document: no collections found".to_string());
            }
            found
        }
    };

    let mut rows = Vec::new();
    for (collection, records) in collections {
        let records = records
            .as_array()
            .ok_or_else(|| format!("Invalid database document: {collection} is not an array"))?;
        for record in records {
            let id = record
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    format!("Invalid database document: record in {collection} has no string id")
                })?;
            rows.push((collection.to_string(), id.to_string(), with_id(id, record)?));
        }
    }
    Ok(rows)
}

/// SQLiteを使用したデータレイヤーの実装
#[derive(Clone)]
pub struct SqliteDataLayer {
    pool: SqlitePool,
    /// 旧ストレージのダンプを探すディレクトリ（None なら移行対象なし）
    legacy_dir: Option<PathBuf>,
}

impl SqliteDataLayer {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            legacy_dir: None,
        }
    }

    pub fn with_legacy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.legacy_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl RecordRepository for SqliteDataLayer {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, String> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM records WHERE collection = ? ORDER BY id")
                .bind(collection)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| format!("Failed to list {collection}: {e}"))?;

        rows.iter()
            .map(|(raw,)| parse_record(collection, raw))
            .collect()
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, String> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM records WHERE collection = ? AND id = ?")
                .bind(collection)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| format!("Failed to get {collection}/{id}: {e}"))?;

        row.map(|(raw,)| parse_record(collection, &raw)).transpose()
    }

    async fn upsert(&self, collection: &str, id: &str, data: &Value) -> Result<(), String> {
        let raw = with_id(id, data)?;
        sqlx::query(
            r#"
            INSERT INTO records (collection, id, data)
            VALUES (?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                data = excluded.data,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&raw)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save {collection}/{id}: {e}"))?;

        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, String> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to delete {collection}/{id}: {e}"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, collection: &str) -> Result<i64, String> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| format!("Failed to count {collection}: {e}"))?;

        Ok(count)
    }
}

#[async_trait]
impl BackupDataSource for SqliteDataLayer {
    async fn export_database_document(&self) -> Result<String, String> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT collection, data FROM records ORDER BY collection, id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| format!("Failed to export records: {e}"))?;

        let mut collections = Map::new();
        for (collection, raw) in rows {
            let record = parse_record(&collection, &raw)?;
            if let Value::Array(records) = collections
                .entry(collection)
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                records.push(record);
            }
        }

        let document = serde_json::json!({
            "version": DOCUMENT_VERSION,
            "exportedAt": chrono::Utc::now().to_rfc3339(),
            "collections": collections,
        });

        serde_json::to_string(&document)
            .map_err(|e| format!("Failed to serialize database document: {e}"))
    }

    async fn import_database_document(&self, document: &str) -> Result<(), String> {
        // 検証はすべて書き込み前に行う（不正なら既存データに触れない）
        let rows = parse_document(document)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| format!("Failed to start transaction: {e}"))?;

        sqlx::query("DELETE FROM records")
            .execute(&mut *tx)
            .await
            .map_err(|e| format!("Failed to clear records: {e}"))?;

        for (collection, id, data) in &rows {
            sqlx::query("INSERT OR REPLACE INTO records (collection, id, data) VALUES (?, ?, ?)")
                .bind(collection)
                .bind(id)
                .bind(data)
                .execute(&mut *tx)
                .await
                .map_err(|e| format!("Failed to import {collection}/{id}: {e}"))?;
        }

        tx.commit()
            .await
            .map_err(|e| format!("Failed to commit transaction: {e}"))?;

        log::info!("Imported {} records from database document", rows.len());
        Ok(())
    }
}

#[async_trait]
impl OnboardingDataSource for SqliteDataLayer {
    async fn run_first_launch_migration(
        &self,
        progress: ProgressCallback<'_>,
    ) -> Result<MigrationReport, String> {
        match self.legacy_dir {
            Some(ref dir) => legacy_migration::migrate_legacy_storage(dir, self, progress).await,
            None => Ok(MigrationReport::default()),
        }
    }

    async fn has_breeder_settings(&self) -> Result<bool, String> {
        Ok(self
            .get(SETTINGS_COLLECTION, BREEDER_SETTINGS_ID)
            .await?
            .is_some())
    }

    async fn load_sample_data(&self) -> Result<(), String> {
        let inserted = sample_data::load_sample_data(self).await?;
        log::info!("Loaded {inserted} sample records");
        Ok(())
    }
}
