//! SQLite データレイヤー + 写真ディレクトリ + 実ファイルでのバックアップ/リストア/初回起動の結合テスト

use async_trait::async_trait;
use respectabullz_lib::backup::{
    ArchiveCodec, BackupMetadata, BackupOrchestrator, ExportOutcome, PhotoDirectory,
    RestoreOutcome,
};
use respectabullz_lib::first_launch::{
    FirstLaunchInitializer, FirstLaunchState, LaunchDecision, OnboardingChoice,
};
use respectabullz_lib::host::{FileDialog, LogNotifier};
use respectabullz_lib::legacy_migration::{MigrationProgress, LEGACY_FILE_NAME, MIGRATED_FILE_NAME};
use respectabullz_lib::preferences::{JsonPreferenceStore, PreferenceStore, FIRST_LAUNCH_COMPLETED_KEY};
use respectabullz_lib::repository::{init_schema, RecordRepository, SqliteDataLayer};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// 固定のパスを返すダイアログ（None ならキャンセル扱い）
struct FixedDialog {
    path: Option<PathBuf>,
}

#[async_trait]
impl FileDialog for FixedDialog {
    async fn pick_save_path(&self, _suggested_name: &str) -> Option<PathBuf> {
        self.path.clone()
    }

    async fn pick_open_path(&self) -> Option<PathBuf> {
        self.path.clone()
    }
}

async fn create_data_layer() -> SqliteDataLayer {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    SqliteDataLayer::new(pool)
}

fn write_photo(dir: &Path, name: &str, data: &[u8]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), data).unwrap();
}

#[tokio::test]
async fn test_full_backup_round_trip_between_installations() {
    let tmp = TempDir::new().unwrap();
    let backup_path = tmp.path().join("respectabullz-backup.zip");

    // 旧インストール: レコード 2 件と写真 2 枚
    let source = create_data_layer().await;
    source
        .upsert("dogs", "d1", &json!({"name": "Titan"}))
        .await
        .unwrap();
    source
        .upsert("litters", "l1", &json!({"code": "L-1"}))
        .await
        .unwrap();
    let source_photos = tmp.path().join("old").join("photos");
    write_photo(&source_photos, "dog1.jpg", b"\xFF\xD8first");
    write_photo(&source_photos, "dog2.jpg", b"\xFF\xD8second");

    let exporter = BackupOrchestrator::new(
        source,
        PhotoDirectory::new(&source_photos),
        FixedDialog {
            path: Some(backup_path.clone()),
        },
    );
    let exported = exporter.export_full_backup().await.unwrap();
    assert!(matches!(exported, ExportOutcome::Saved { photo_count: 2, .. }));

    // 新インストール: 既存レコードはバックアップで置き換わる
    let target = create_data_layer().await;
    target
        .upsert("dogs", "stale", &json!({"name": "Stale"}))
        .await
        .unwrap();
    let target_photos = tmp.path().join("new").join("photos");

    let importer = BackupOrchestrator::new(
        target.clone(),
        PhotoDirectory::new(&target_photos),
        FixedDialog {
            path: Some(backup_path),
        },
    );
    let outcome = importer.restore_full_backup().await;

    match outcome {
        RestoreOutcome::FullyRestored(ref full) => {
            assert_eq!(full.restored_photo_count, 2);
            assert!(full.metadata_warnings.is_empty());
            assert_eq!(full.metadata.as_ref().unwrap().photo_count, 2);
        }
        ref other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(target.count("dogs").await.unwrap(), 1);
    assert_eq!(
        target.get("dogs", "d1").await.unwrap().unwrap()["name"],
        "Titan"
    );
    assert!(target.get("dogs", "stale").await.unwrap().is_none());
    assert_eq!(target.count("litters").await.unwrap(), 1);
    assert_eq!(
        std::fs::read(target_photos.join("dog2.jpg")).unwrap(),
        b"\xFF\xD8second"
    );
}

#[tokio::test]
async fn test_restore_bare_collections_document_without_photos() {
    let tmp = TempDir::new().unwrap();
    let backup_path = tmp.path().join("backup.zip");
    let metadata = BackupMetadata {
        schema_version: "1.0".to_string(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
        producer_version: "1.2.3".to_string(),
        photo_count: 0,
    };
    let bytes = ArchiveCodec::default()
        .encode(r#"{"dogs":[]}"#, &[], &metadata)
        .unwrap();
    std::fs::write(&backup_path, bytes).unwrap();

    let target = create_data_layer().await;
    target
        .upsert("dogs", "stale", &json!({"name": "Stale"}))
        .await
        .unwrap();

    let orchestrator = BackupOrchestrator::new(
        target.clone(),
        PhotoDirectory::new(tmp.path().join("photos")),
        FixedDialog {
            path: Some(backup_path),
        },
    );
    let outcome = orchestrator.restore_full_backup().await;

    match outcome {
        RestoreOutcome::FullyRestored(ref full) => {
            assert_eq!(full.restored_photo_count, 0);
            assert_eq!(full.metadata, Some(metadata));
            assert!(full.metadata_warnings.is_empty());
        }
        ref other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(target.count("dogs").await.unwrap(), 0);
}

#[tokio::test]
async fn test_restore_cancel_leaves_everything_untouched() {
    let tmp = TempDir::new().unwrap();
    let target = create_data_layer().await;
    target
        .upsert("dogs", "d1", &json!({"name": "Keep"}))
        .await
        .unwrap();
    let photos = tmp.path().join("photos");

    let orchestrator = BackupOrchestrator::new(
        target.clone(),
        PhotoDirectory::new(&photos),
        FixedDialog { path: None },
    );
    assert_eq!(orchestrator.restore_full_backup().await, RestoreOutcome::Cancelled);
    assert_eq!(target.count("dogs").await.unwrap(), 1);
    assert!(!photos.exists());
}

#[tokio::test]
async fn test_first_launch_migrates_legacy_storage_then_completes() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join(LEGACY_FILE_NAME),
        json!({
            "respectabullz_dogs": [
                {"id": "d1", "name": "A"},
                {"id": "d2", "name": "B"},
                {"id": "d3", "name": "C"},
                {"id": "d4", "name": "D"},
                {"id": "d5", "name": "E"}
            ],
            "respectabullz_litters": [
                {"id": "l1"},
                {"id": "l2"}
            ]
        })
        .to_string(),
    )
    .unwrap();

    let data_layer = create_data_layer().await.with_legacy_dir(tmp.path());
    let config_dir = tmp.path().join("config");
    let initializer = FirstLaunchInitializer::new(
        data_layer.clone(),
        JsonPreferenceStore::new(&config_dir),
        LogNotifier,
    );

    let stages = Mutex::new(Vec::new());
    let on_progress = |p: MigrationProgress| stages.lock().unwrap().push(p.stage);
    let state = initializer.start(&on_progress).await;

    match state {
        FirstLaunchState::Ready(LaunchDecision::ChooseStartMode {
            migration_summary: Some(ref summary),
        }) => assert_eq!(summary.total_records, 7),
        ref other => panic!("unexpected state: {other:?}"),
    }
    assert!(!stages.lock().unwrap().is_empty());
    assert!(tmp.path().join(MIGRATED_FILE_NAME).exists());
    assert_eq!(data_layer.count("dogs").await.unwrap(), 5);

    // 選択前はマーカー未設定
    let prefs = JsonPreferenceStore::new(&config_dir);
    assert_eq!(prefs.get_bool(FIRST_LAUNCH_COMPLETED_KEY).unwrap(), None);

    initializer
        .complete(OnboardingChoice::SampleData)
        .await
        .unwrap();
    assert_eq!(prefs.get_bool(FIRST_LAUNCH_COMPLETED_KEY).unwrap(), Some(true));
    assert!(data_layer.get("settings", "breeder").await.unwrap().is_some());

    // 次回起動では移行もプロンプトも無い
    let next_launch = FirstLaunchInitializer::new(
        data_layer,
        JsonPreferenceStore::new(&config_dir),
        LogNotifier,
    );
    assert_eq!(
        next_launch.start(&|_: MigrationProgress| {}).await,
        FirstLaunchState::Ready(LaunchDecision::AlreadyCompleted)
    );
}
