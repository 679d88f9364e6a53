//! フルバックアップのエクスポートとリストア
//!
//! エクスポート: DB ドキュメント取得 → 写真列挙 → メタデータ作成 → エンコード
//! → 保存先選択（キャンセルは「未保存」）→ 書き込み。
//!
//! リストア: ファイル選択（キャンセル可能なのはここだけ）→ デコード → メタデータ検証
//! → 写真を 1 枚ずつ書き込み → DB インポート → 結果判定。
//! 写真の失敗とメタデータの不正は非致命で、結果に集計される。

use crate::backup::archive::{self, ArchiveCodec};
use crate::backup::metadata::{self, BackupMetadata};
use crate::backup::photos::PhotoStore;
use crate::config::BackupConfig;
use crate::error::BackupError;
use crate::host::FileDialog;
use crate::repository::BackupDataSource;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// エクスポート結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ExportOutcome {
    /// 保存先選択でキャンセルされた（エラーではない）
    NotSaved,
    Saved {
        path: PathBuf,
        photo_count: usize,
        size_bytes: usize,
    },
}

/// 致命的なリストア失敗の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    ArchiveCorrupt,
    ArchiveInvalid,
    ReadFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&BackupError> for RestoreFailure {
    fn from(e: &BackupError) -> Self {
        let kind = match e {
            BackupError::ArchiveCorrupt(_) => FailureKind::ArchiveCorrupt,
            BackupError::ArchiveInvalid(_) => FailureKind::ArchiveInvalid,
            _ => FailureKind::ReadFailed,
        };
        Self {
            kind,
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullRestore {
    pub metadata: Option<BackupMetadata>,
    pub metadata_warnings: Vec<String>,
    pub restored_photo_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialRestore {
    pub metadata: Option<BackupMetadata>,
    pub metadata_warnings: Vec<String>,
    pub restored_photo_count: usize,
    pub failed_photo_names: BTreeSet<String>,
    /// DB インポートが失敗した場合のエラー（写真とは独立した失敗）
    pub database_error: Option<String>,
}

/// リストア結果。「何も復元されていない」「一部のみ」「完全」を区別する
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "details", rename_all = "camelCase")]
pub enum RestoreOutcome {
    Cancelled,
    Failed(RestoreFailure),
    PartiallyRestored(PartialRestore),
    FullyRestored(FullRestore),
}

impl RestoreOutcome {
    /// 通知に出す文言
    pub fn user_message(&self) -> String {
        match self {
            Self::Cancelled => "Restore cancelled".to_string(),
            Self::Failed(failure) => format!("Nothing was restored: {}", failure.message),
            Self::PartiallyRestored(partial) => match partial.database_error {
                Some(ref e) => format!(
                    "Backup partially restored: database import failed ({e}); {} photo(s) restored",
                    partial.restored_photo_count
                ),
                None => format!(
                    "Backup partially restored: {} photo(s) could not be restored",
                    partial.failed_photo_names.len()
                ),
            },
            Self::FullyRestored(full) => format!(
                "Backup restored successfully ({} photo(s))",
                full.restored_photo_count
            ),
        }
    }
}

/// アーカイブ展開と写真復元までの結果（DB インポート前）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRestore {
    pub database_document: String,
    pub metadata: Option<BackupMetadata>,
    pub metadata_warnings: Vec<String>,
    pub restored_photo_count: usize,
    pub failed_photo_names: BTreeSet<String>,
}

impl ArchiveRestore {
    /// DB インポート結果と合わせて最終結果を決める
    pub fn into_outcome(self, import_result: Result<(), String>) -> RestoreOutcome {
        match import_result {
            Ok(()) if self.failed_photo_names.is_empty() => {
                RestoreOutcome::FullyRestored(FullRestore {
                    metadata: self.metadata,
                    metadata_warnings: self.metadata_warnings,
                    restored_photo_count: self.restored_photo_count,
                })
            }
            result => RestoreOutcome::PartiallyRestored(PartialRestore {
                metadata: self.metadata,
                metadata_warnings: self.metadata_warnings,
                restored_photo_count: self.restored_photo_count,
                failed_photo_names: self.failed_photo_names,
                database_error: result.err(),
            }),
        }
    }
}

/// バックアップ/リストアのオーケストレーター
///
/// 写真ディレクトリのロックは持たない。同時実行の直列化は呼び出し側
/// （`BackupGuard`）の責務。
pub struct BackupOrchestrator<D, P, F>
where
    D: BackupDataSource,
    P: PhotoStore,
    F: FileDialog,
{
    data_source: D,
    photos: P,
    dialog: F,
    codec: ArchiveCodec,
    config: BackupConfig,
    producer_version: String,
}

impl<D, P, F> BackupOrchestrator<D, P, F>
where
    D: BackupDataSource,
    P: PhotoStore,
    F: FileDialog,
{
    pub fn new(data_source: D, photos: P, dialog: F) -> Self {
        let config = BackupConfig::default();
        Self {
            data_source,
            photos,
            dialog,
            codec: ArchiveCodec::new(config.compression_level),
            config,
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_config(mut self, config: BackupConfig) -> Self {
        self.codec = ArchiveCodec::new(config.compression_level);
        self.config = config;
        self
    }

    pub fn with_producer_version(mut self, version: impl Into<String>) -> Self {
        self.producer_version = version.into();
        self
    }

    /// フルバックアップをエクスポートする
    pub async fn export_full_backup(&self) -> Result<ExportOutcome, BackupError> {
        log::info!("Starting full backup export");

        let document = self
            .data_source
            .export_database_document()
            .await
            .map_err(BackupError::DataLayer)?;

        // 個々の写真の読み出し失敗は export_all 内でスキップ済み
        let photos = self.photos.export_all().await.map_err(BackupError::Io)?;

        let metadata = BackupMetadata::for_export(&self.producer_version, photos.len());
        let bytes = self.codec.encode(&document, &photos, &metadata)?;

        let suggested = self
            .config
            .suggested_file_name(chrono::Local::now().date_naive());
        let Some(path) = self.dialog.pick_save_path(&suggested).await else {
            log::info!("Backup export cancelled by user");
            return Ok(ExportOutcome::NotSaved);
        };

        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            BackupError::Io(format!("Failed to write backup to {}: {e}", path.display()))
        })?;

        log::info!(
            "Backup saved to {} ({} photos, {} bytes)",
            path.display(),
            photos.len(),
            bytes.len()
        );

        Ok(ExportOutcome::Saved {
            path,
            photo_count: photos.len(),
            size_bytes: bytes.len(),
        })
    }

    /// ファイルを選ばせてフルリストアする
    pub async fn restore_full_backup(&self) -> RestoreOutcome {
        match self.dialog.pick_open_path().await {
            Some(path) => self.restore_from_path(&path).await,
            None => {
                log::info!("Backup restore cancelled by user");
                RestoreOutcome::Cancelled
            }
        }
    }

    /// 指定ファイルからフルリストアする（DB インポートまで行う）
    pub async fn restore_from_path(&self, path: &Path) -> RestoreOutcome {
        log::info!("Restoring backup from {}", path.display());

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                log::error!("Failed to read backup file: {e}");
                return RestoreOutcome::Failed(RestoreFailure {
                    kind: FailureKind::ReadFailed,
                    message: format!("Failed to read backup file: {e}"),
                });
            }
        };

        let restore = match self.restore_archive(bytes).await {
            Ok(r) => r,
            Err(e) => {
                log::error!("Restore failed: {e}");
                return RestoreOutcome::Failed(RestoreFailure::from(&e));
            }
        };

        let import_result = self
            .data_source
            .import_database_document(&restore.database_document)
            .await;
        if let Err(ref e) = import_result {
            log::error!("Database import failed after photo restore: {e}");
        }

        let outcome = restore.into_outcome(import_result);
        log::info!("{}", outcome.user_message());
        outcome
    }

    /// アーカイブを展開し写真を復元する（DB インポートは行わない）
    ///
    /// 失敗するのはアーカイブ自体が壊れている/database.json が無い場合のみ。
    pub async fn restore_archive(&self, bytes: Vec<u8>) -> Result<ArchiveRestore, BackupError> {
        let decoded = archive::decode(bytes)?;

        let (metadata, mut metadata_warnings) = match decoded.metadata {
            Some(ref raw) => metadata::validate(raw).into_parts(),
            None => {
                log::info!("Backup has no metadata, continuing without it");
                (None, Vec::new())
            }
        };
        for warning in &metadata_warnings {
            log::warn!("Backup metadata invalid: {warning}");
        }

        let mut restored_photo_count = 0usize;
        let mut failed_photo_names = BTreeSet::new();
        let mut seen = 0u64;

        // 1 枚ずつ順番に。どの失敗もループを止めない
        for entry in decoded.photos {
            seen += 1;
            match entry {
                Ok(photo) => match self.photos.import_one(&photo.name, &photo.data).await {
                    Ok(()) => restored_photo_count += 1,
                    Err(e) => {
                        log::warn!("Failed to restore photo {}: {e}", photo.name);
                        failed_photo_names.insert(photo.name);
                    }
                },
                Err(read_error) => {
                    log::warn!(
                        "Failed to extract photo {}: {}",
                        read_error.name,
                        read_error.reason
                    );
                    failed_photo_names.insert(read_error.name);
                }
            }
        }

        if let Some(ref m) = metadata {
            if m.photo_count != seen {
                let warning = format!(
                    "photoCount: declared {} but archive contains {} photos",
                    m.photo_count, seen
                );
                log::warn!("{warning}");
                metadata_warnings.push(warning);
            }
        }

        log::info!(
            "Photo restore finished: {} restored, {} failed",
            restored_photo_count,
            failed_photo_names.len()
        );

        Ok(ArchiveRestore {
            database_document: decoded.database_document,
            metadata,
            metadata_warnings,
            restored_photo_count,
            failed_photo_names,
        })
    }
}
