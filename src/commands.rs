//! フロントエンドから呼ばれる Tauri コマンド
//!
//! コアのロジックは `backup` / `first_launch` にあり、ここでは管理ステートから
//! 依存を組み立てて呼ぶだけ。

use std::path::PathBuf;

use sqlx::sqlite::SqlitePool;
use tauri::{AppHandle, Emitter, Manager, State};

use crate::backup::{BackupOrchestrator, BackupState, ExportOutcome, PhotoDirectory, RestoreOutcome};
use crate::config::BackupConfig;
use crate::first_launch::{FirstLaunchInitializer, FirstLaunchState, LaunchDecision, OnboardingChoice};
use crate::host::{Notifier, TauriFileDialog, TauriNotifier};
use crate::legacy_migration::MigrationProgress;
use crate::preferences::JsonPreferenceStore;
use crate::repository::SqliteDataLayer;

pub const FIRST_LAUNCH_PROGRESS_EVENT: &str = "first-launch-progress";

const NOTIFICATION_TITLE: &str = "Respectabullz";

pub type AppFirstLaunch = FirstLaunchInitializer<SqliteDataLayer, JsonPreferenceStore, TauriNotifier>;

/// バックアップに必要な起動時の設定
pub struct BackupContext {
    pub photos_dir: PathBuf,
    pub config: BackupConfig,
}

fn orchestrator(
    app: &AppHandle,
    pool: &SqlitePool,
    context: &BackupContext,
) -> BackupOrchestrator<SqliteDataLayer, PhotoDirectory, TauriFileDialog> {
    BackupOrchestrator::new(
        SqliteDataLayer::new(pool.clone()),
        PhotoDirectory::new(&context.photos_dir),
        TauriFileDialog::new(app.clone()),
    )
    .with_config(context.config.clone())
    .with_producer_version(app.package_info().version.to_string())
}

#[tauri::command]
pub async fn export_full_backup(
    app: AppHandle,
    pool: State<'_, SqlitePool>,
    context: State<'_, BackupContext>,
    backup_state: State<'_, BackupState>,
) -> Result<ExportOutcome, String> {
    let _guard = backup_state.try_start("export")?;

    let outcome = orchestrator(&app, pool.inner(), context.inner())
        .export_full_backup()
        .await
        .map_err(|e| {
            log::error!("Backup export failed: {e}");
            e.to_string()
        })?;

    if let ExportOutcome::Saved { photo_count, .. } = &outcome {
        TauriNotifier::new(app.clone()).notify(
            NOTIFICATION_TITLE,
            &format!("Backup saved ({photo_count} photo(s))"),
        );
    }
    Ok(outcome)
}

#[tauri::command]
pub async fn restore_full_backup(
    app: AppHandle,
    pool: State<'_, SqlitePool>,
    context: State<'_, BackupContext>,
    backup_state: State<'_, BackupState>,
) -> Result<RestoreOutcome, String> {
    let _guard = backup_state.try_start("restore")?;

    let outcome = orchestrator(&app, pool.inner(), context.inner())
        .restore_full_backup()
        .await;

    if outcome != RestoreOutcome::Cancelled {
        TauriNotifier::new(app.clone()).notify(NOTIFICATION_TITLE, &outcome.user_message());
    }
    Ok(outcome)
}

#[tauri::command]
pub async fn start_first_launch(
    app: AppHandle,
    initializer: State<'_, AppFirstLaunch>,
) -> Result<FirstLaunchState, String> {
    let on_progress = move |progress: MigrationProgress| {
        if let Err(e) = app.emit(FIRST_LAUNCH_PROGRESS_EVENT, progress) {
            log::warn!("Failed to emit migration progress: {e}");
        }
    };
    Ok(initializer.start(&on_progress).await)
}

#[tauri::command]
pub async fn complete_first_launch(
    initializer: State<'_, AppFirstLaunch>,
    choice: OnboardingChoice,
) -> Result<LaunchDecision, String> {
    initializer.complete(choice).await
}
