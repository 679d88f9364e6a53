//! バックアップ/リストアのエラー型
//!
//! 致命的なエラーのみをここで表現する。メタデータ検証エラーや写真ごとの
//! 書き込み失敗は非致命で、リストア結果に蓄積される（`backup::orchestrator` 参照）。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    /// バイト列をアーカイブとして読めない
    #[error("Backup archive is corrupt: {0}")]
    ArchiveCorrupt(String),

    /// アーカイブは読めるが必須の database.json が無い/読めない
    #[error("Backup archive is invalid: {0}")]
    ArchiveInvalid(String),

    /// アーカイブの組み立てに失敗
    #[error("Failed to encode backup archive: {0}")]
    Encode(String),

    #[error("Backup I/O error: {0}")]
    Io(String),

    /// 外部データレイヤー（DBエクスポート/インポート）の失敗
    #[error("Data layer error: {0}")]
    DataLayer(String),
}

impl From<std::io::Error> for BackupError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
