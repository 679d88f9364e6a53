//! 管理写真ディレクトリとのファイル単位の入出力
//!
//! 1 ファイル = 1 単位の処理。1 件の失敗は他のファイルに影響しない
//! （500 枚中 1 枚が壊れていても 499 枚は復元される）。

use crate::backup::archive::PhotoEntry;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::{Component, Path, PathBuf};

/// 書き込み途中の一時ファイルの接頭辞（エクスポート対象外）
const TEMP_PREFIX: &str = ".respectabullz-tmp-";

/// 写真ストアを抽象化するトレイト
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// ディレクトリ内の全写真を読み出す（名前順）
    ///
    /// ディレクトリが存在しない場合は空リスト。個々のファイルの読み出し失敗は
    /// ログに残してスキップする。
    async fn export_all(&self) -> Result<Vec<PhotoEntry>, String>;

    /// 写真 1 枚を書き込む（同名ファイルは上書き）
    async fn import_one(&self, name: &str, data: &[u8]) -> Result<(), String>;
}

/// 写真名として安全か（単一のパス要素のみ許可）
pub fn is_valid_photo_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// ホストアプリのデータディレクトリ配下にある写真ディレクトリ
///
/// ディレクトリのライフサイクルは所有しない（必要時に作成し、削除はしない）。
#[derive(Debug, Clone)]
pub struct PhotoDirectory {
    dir: PathBuf,
}

impl PhotoDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl PhotoStore for PhotoDirectory {
    async fn export_all(&self) -> Result<Vec<PhotoEntry>, String> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "Photo directory does not exist yet: {}",
                    self.dir.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(format!("Failed to read photo directory: {e}")),
        };

        let mut photos = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| format!("Failed to list photo directory: {e}"))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                log::warn!("Skipping photo with non UTF-8 name: {:?}", entry.file_name());
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }

            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("Skipping photo {name}: {e}");
                    continue;
                }
            }

            match tokio::fs::read(entry.path()).await {
                Ok(data) => photos.push(PhotoEntry { name, data }),
                Err(e) => log::warn!("Failed to read photo {name}, omitting from backup: {e}"),
            }
        }

        photos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(photos)
    }

    async fn import_one(&self, name: &str, data: &[u8]) -> Result<(), String> {
        if !is_valid_photo_name(name) {
            return Err(format!("Invalid photo name: {name:?}"));
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("Failed to create photo directory: {e}"))?;

        // 一時ファイルに書いてから置き換える（中断しても壊れた写真を残さない）
        let temp_path = self
            .dir
            .join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()));
        let dest = self.dir.join(name);

        if let Err(e) = tokio::fs::write(&temp_path, data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(format!("Failed to write photo {name}: {e}"));
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &dest).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(format!("Failed to write photo {name}: {e}"));
        }

        Ok(())
    }
}
