//! バックアップアーカイブ（ZIP）のエンコード/デコード
//!
//! レイアウト:
//! - `metadata.json`  任意。壊れていても読み込みは続行する
//! - `database.json`  必須。中身は外部データレイヤーが所有する不透明な文字列
//! - `photos/<name>`  写真 1 枚につき 1 エントリ

use crate::backup::metadata::BackupMetadata;
use crate::error::BackupError;
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const METADATA_ENTRY: &str = "metadata.json";
pub const DATABASE_ENTRY: &str = "database.json";
pub const PHOTOS_PREFIX: &str = "photos/";

/// Deflate の既定圧縮レベル（速度とサイズの中間）
pub const DEFAULT_COMPRESSION_LEVEL: i64 = 6;

/// アーカイブ内の写真 1 枚
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl PhotoEntry {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// 写真エントリの読み出し失敗（そのエントリだけが失敗扱い）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoReadError {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ArchiveCodec {
    compression_level: i64,
}

impl Default for ArchiveCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl ArchiveCodec {
    /// 圧縮レベルは Deflate の有効範囲 1..=9 に丸める
    pub fn new(compression_level: i64) -> Self {
        Self {
            compression_level: compression_level.clamp(1, 9),
        }
    }

    pub fn compression_level(&self) -> i64 {
        self.compression_level
    }

    /// アーカイブを組み立ててバイト列を返す。写真が 0 枚でも有効なアーカイブになる
    pub fn encode(
        &self,
        database_document: &str,
        photos: &[PhotoEntry],
        metadata: &BackupMetadata,
    ) -> Result<Vec<u8>, BackupError> {
        let mut seen = HashSet::with_capacity(photos.len());
        for photo in photos {
            if photo.name.is_empty() {
                return Err(BackupError::Encode("Photo with empty name".to_string()));
            }
            if !seen.insert(photo.name.as_str()) {
                return Err(BackupError::Encode(format!(
                    "Duplicate photo name: {}",
                    photo.name
                )));
            }
        }

        let metadata_json = serde_json::to_string_pretty(metadata)
            .map_err(|e| BackupError::Encode(format!("Failed to serialize metadata: {e}")))?;

        let mut zip_writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.compression_level))
            .unix_permissions(0o644);

        write_entry(&mut zip_writer, METADATA_ENTRY, options, metadata_json.as_bytes())?;
        write_entry(
            &mut zip_writer,
            DATABASE_ENTRY,
            options,
            database_document.as_bytes(),
        )?;

        for photo in photos {
            let zip_path = format!("{PHOTOS_PREFIX}{}", photo.name);
            write_entry(&mut zip_writer, &zip_path, options, &photo.data)?;
        }

        let cursor = zip_writer
            .finish()
            .map_err(|e| BackupError::Encode(format!("Failed to finish zip: {e}")))?;

        Ok(cursor.into_inner())
    }
}

fn write_entry(
    zip_writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    options: SimpleFileOptions,
    data: &[u8],
) -> Result<(), BackupError> {
    zip_writer
        .start_file(name, options)
        .map_err(|e| BackupError::Encode(format!("Failed to add {name}: {e}")))?;
    zip_writer
        .write_all(data)
        .map_err(|e| BackupError::Encode(format!("Failed to write {name}: {e}")))
}

/// デコード結果
pub struct DecodedArchive {
    /// metadata.json の生テキスト。エントリが無い場合は None
    pub metadata: Option<String>,
    pub database_document: String,
    /// 写真エントリ（遅延・一度きり）
    pub photos: PhotoEntries,
}

/// アーカイブをデコードする
///
/// 失敗するのはバイト列が ZIP として読めない場合（`ArchiveCorrupt`）と
/// database.json が無い場合（`ArchiveInvalid`）のみ。
pub fn decode(bytes: Vec<u8>) -> Result<DecodedArchive, BackupError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| BackupError::ArchiveCorrupt(e.to_string()))?;

    let database_document = read_database_document(&mut archive)?;
    let metadata = read_metadata(&mut archive);

    let names: Vec<String> = archive
        .file_names()
        .filter(|name| name.starts_with(PHOTOS_PREFIX) && !name.ends_with('/'))
        .map(str::to_string)
        .collect();

    Ok(DecodedArchive {
        metadata,
        database_document,
        photos: PhotoEntries {
            archive,
            names: names.into_iter(),
        },
    })
}

fn read_database_document(
    archive: &mut ZipArchive<Cursor<Vec<u8>>>,
) -> Result<String, BackupError> {
    let mut entry = match archive.by_name(DATABASE_ENTRY) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(BackupError::ArchiveInvalid(format!(
                "Missing {DATABASE_ENTRY} in archive"
            )))
        }
        Err(e) => return Err(BackupError::ArchiveCorrupt(e.to_string())),
    };

    let mut data = Vec::new();
    entry
        .read_to_end(&mut data)
        .map_err(|e| BackupError::ArchiveCorrupt(format!("Failed to read {DATABASE_ENTRY}: {e}")))?;

    String::from_utf8(data)
        .map_err(|_| BackupError::ArchiveInvalid(format!("{DATABASE_ENTRY} is not valid UTF-8")))
}

fn read_metadata(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> Option<String> {
    let mut entry = match archive.by_name(METADATA_ENTRY) {
        Ok(entry) => entry,
        Err(e) => {
            log::debug!("No readable {METADATA_ENTRY} in archive: {e}");
            return None;
        }
    };

    let mut data = Vec::new();
    if let Err(e) = entry.read_to_end(&mut data) {
        log::warn!("Failed to read {METADATA_ENTRY}: {e}");
        return None;
    }
    // 検証側でエラー内容を報告できるよう、不正なバイトも置換して渡す
    Some(String::from_utf8_lossy(&data).into_owned())
}

/// 写真エントリを 1 件ずつ展開するイテレータ
///
/// 有限・一度きり。もう一度走査したい場合は再デコードする。
pub struct PhotoEntries {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    names: std::vec::IntoIter<String>,
}

impl PhotoEntries {
    /// 残りのエントリ数
    pub fn remaining(&self) -> usize {
        self.names.len()
    }
}

impl Iterator for PhotoEntries {
    type Item = Result<PhotoEntry, PhotoReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let full_name = self.names.next()?;
        let name = full_name[PHOTOS_PREFIX.len()..].to_string();

        let result = match self.archive.by_name(&full_name) {
            Ok(mut entry) => {
                let mut data = Vec::new();
                match entry.read_to_end(&mut data) {
                    Ok(_) => Ok(PhotoEntry { name, data }),
                    Err(e) => Err(PhotoReadError {
                        name,
                        reason: format!("Failed to read {full_name}: {e}"),
                    }),
                }
            }
            Err(e) => Err(PhotoReadError {
                name,
                reason: format!("Failed to open {full_name}: {e}"),
            }),
        };
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.names.size_hint()
    }
}

impl ExactSizeIterator for PhotoEntries {}
