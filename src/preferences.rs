//! ホストの軽量キーバリューストア（初回起動マーカー等）
//!
//! `respectabullz_prefs.json` に `{"key": value}` の形で保存する。
//! 初回起動フローにはトレイトとして注入し、テストで状態を制御できるようにする。

#[cfg(test)]
use mockall::automock;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const PREFERENCES_FILENAME: &str = "respectabullz_prefs.json";

/// 初回起動フロー完了マーカーのキー
pub const FIRST_LAUNCH_COMPLETED_KEY: &str = "respectabullz_first_launch_completed";

/// 真偽値の設定を読み書きするトレイト
#[cfg_attr(test, automock)]
pub trait PreferenceStore: Send + Sync {
    /// 未設定なら None
    fn get_bool(&self, key: &str) -> Result<Option<bool>, String>;

    fn set_bool(&self, key: &str, value: bool) -> Result<(), String>;
}

/// JSON ファイルによる実装
pub struct JsonPreferenceStore {
    path: PathBuf,
    // 読み込み→書き込みの間に他の書き込みが割り込まないようにする
    lock: Mutex<()>,
}

impl JsonPreferenceStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(PREFERENCES_FILENAME),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Map<String, Value>, String> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| format!("Failed to read preferences file: {e}"))?;
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err("Invalid preferences JSON: expected object".to_string()),
            Err(e) => Err(format!("Invalid preferences JSON: {e}")),
        }
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn get_bool(&self, key: &str) -> Result<Option<bool>, String> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| format!("Lock error: {e}"))?;
        Ok(self.read_all()?.get(key).and_then(Value::as_bool))
    }

    fn set_bool(&self, key: &str, value: bool) -> Result<(), String> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| format!("Lock error: {e}"))?;
        let mut map = self.read_all()?;
        map.insert(key.to_string(), Value::Bool(value));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create preferences dir: {e}"))?;
        }
        let contents = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|e| format!("Failed to serialize preferences: {e}"))?;
        fs::write(&self.path, contents).map_err(|e| format!("Failed to write preferences file: {e}"))
    }
}
