//! アプリケーション設定ファイルの管理
//!
//! バックアップの圧縮レベル・ファイル名、写真ディレクトリ名を
//! respectabullz_config.json で管理する。初回起動マーカー等の状態は
//! `preferences` 側に分離する。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILENAME: &str = "respectabullz_config.json";

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub photos: PhotosConfig,
}

/// バックアップ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Deflate 圧縮レベル（1〜9 に丸められる）
    pub compression_level: i64,
    /// 保存ダイアログに提示するファイル名の接頭辞
    pub file_name_prefix: String,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            compression_level: crate::backup::archive::DEFAULT_COMPRESSION_LEVEL,
            file_name_prefix: "respectabullz-backup".to_string(),
        }
    }
}

impl BackupConfig {
    /// 保存ダイアログに提示するファイル名（例: respectabullz-backup-2024-01-01.zip）
    pub fn suggested_file_name(&self, date: chrono::NaiveDate) -> String {
        format!("{}-{}.zip", self.file_name_prefix, date.format("%Y-%m-%d"))
    }
}

/// 写真ディレクトリ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotosConfig {
    /// アプリデータディレクトリ配下のディレクトリ名
    pub dir_name: String,
}

impl Default for PhotosConfig {
    fn default() -> Self {
        Self {
            dir_name: "photos".to_string(),
        }
    }
}

impl PhotosConfig {
    pub fn photos_dir(&self, app_data_dir: &Path) -> PathBuf {
        app_data_dir.join(&self.dir_name)
    }
}

/// 設定を読み込む。ファイルが存在しない場合はデフォルトを返し、保存する。
pub fn load(config_dir: &Path) -> Result<AppConfig, String> {
    let path = config_dir.join(CONFIG_FILENAME);

    if path.exists() {
        let contents = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        serde_json::from_str(&contents).map_err(|e| format!("Invalid config JSON: {e}"))
    } else {
        let config = AppConfig::default();
        save(config_dir, &config)?;
        Ok(config)
    }
}

/// 設定を保存する。
pub fn save(config_dir: &Path, config: &AppConfig) -> Result<(), String> {
    std::fs::create_dir_all(config_dir).map_err(|e| format!("Failed to create config dir: {e}"))?;

    let path = config_dir.join(CONFIG_FILENAME);
    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;

    fs::write(&path, contents).map_err(|e| format!("Failed to write config file: {e}"))
}
