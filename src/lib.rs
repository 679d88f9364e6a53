use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Mutex;

pub mod backup;
pub mod config;
pub mod error;
pub mod first_launch;
pub mod host;
pub mod legacy_migration;
pub mod preferences;
pub mod repository;
pub mod sample_data;

#[cfg(feature = "desktop")]
mod commands;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

// ログバッファ用グローバルMutex
//
// ロック保持時間はエントリ 1 件の push/pop のみ。
// MAX_LOG_ENTRIES を超えた古いログは先頭から捨てる。
static LOG_BUFFER: Mutex<Option<VecDeque<LogEntry>>> = Mutex::new(None);
const MAX_LOG_ENTRIES: usize = 1000;

/// ログバッファを初期化
///
/// 複数回呼び出しても安全ですが、既存のログは破棄されます。
pub fn init_log_buffer() {
    match LOG_BUFFER.lock() {
        Ok(mut buffer) => {
            *buffer = Some(VecDeque::with_capacity(MAX_LOG_ENTRIES));
        }
        Err(e) => {
            // ログ機能は使えなくなるが、アプリケーションは継続
            eprintln!("Failed to initialize log buffer: {e}");
        }
    }
}

/// ログエントリを追加
///
/// バッファ未初期化の場合は何もしない（起動直後の初期化前ログ）。
pub fn add_log_entry(level: &str, message: &str) {
    match LOG_BUFFER.lock() {
        Ok(mut buffer) => {
            if let Some(ref mut logs) = *buffer {
                logs.push_back(LogEntry {
                    timestamp: chrono::Local::now()
                        .format("%Y-%m-%d %H:%M:%S%.3f")
                        .to_string(),
                    level: level.to_string(),
                    message: message.to_string(),
                });

                if logs.len() > MAX_LOG_ENTRIES {
                    logs.pop_front();
                }
            }
        }
        Err(e) => {
            // ログシステム自体が壊れているので標準エラー出力へ
            eprintln!("Failed to lock log buffer for adding entry: {e}");
        }
    }
}

/// ログエントリを取得
///
/// # パラメータ
/// - `level_filter`: ログレベルでフィルタリング（例: "ERROR", "INFO"）。Noneの場合は全てのレベル
/// - `limit`: 返却する最大件数。フィルタリング後のログに対して適用される
///
/// # 戻り値
/// 新しい順（最新が先頭）
#[cfg_attr(feature = "desktop", tauri::command)]
pub fn get_logs(
    level_filter: Option<String>,
    limit: Option<usize>,
) -> Result<Vec<LogEntry>, String> {
    let buffer = LOG_BUFFER
        .lock()
        .map_err(|e| format!("Failed to lock log buffer: {e}"))?;

    let Some(ref logs) = *buffer else {
        return Ok(Vec::new());
    };

    let mut filtered_logs: Vec<LogEntry> = logs
        .iter()
        .filter(|entry| match level_filter {
            Some(ref filter) => &entry.level == filter,
            None => true,
        })
        .cloned()
        .collect();

    filtered_logs.reverse();

    if let Some(limit) = limit {
        filtered_logs.truncate(limit);
    }

    Ok(filtered_logs)
}

/// ロガーの初期化（コンソールとメモリの両方に出力）
///
/// リリースビルドでは Warn 以上、デバッグビルドでは Info 以上。RUST_LOG があればそちらを優先。
/// 二度目以降の呼び出しは無視される。
pub fn init_logging() {
    #[cfg(debug_assertions)]
    let default_level = log::LevelFilter::Info;
    #[cfg(not(debug_assertions))]
    let default_level = log::LevelFilter::Warn;

    let result = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format(|buf, record| {
            add_log_entry(&record.level().to_string(), &format!("{}", record.args()));

            writeln!(
                buf,
                "[{} {:5} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    if let Err(e) = result {
        eprintln!("Logger already initialized: {e}");
    }
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use crate::backup::BackupState;
    use crate::first_launch::FirstLaunchInitializer;
    use crate::host::TauriNotifier;
    use crate::preferences::JsonPreferenceStore;
    use crate::repository::SqliteDataLayer;
    use tauri::Manager;
    use tauri_plugin_sql::{Migration, MigrationKind};

    let migrations = vec![Migration {
        version: 1,
        description: "init",
        sql: include_str!("../migrations/001_init.sql"),
        kind: MigrationKind::Up,
    }];

    let result = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_notification::init())
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
            // 二重起動が検知された場合、既存のウィンドウを最前面に表示
            if let Some(window) = app.get_webview_window("main") {
                let _ = window.unminimize();
                let _ = window.show();
                let _ = window.set_focus();
                log::info!("Second instance detected - bringing existing window to front");
            }
        }))
        .setup(move |app| {
            init_log_buffer();
            init_logging();

            let app_data_dir = app.path().app_data_dir()?;
            std::fs::create_dir_all(&app_data_dir)?;
            let app_config_dir = app.path().app_config_dir()?;

            let app_config = config::load(&app_config_dir)?;
            log::info!(
                "Config loaded (compression level {}, photos dir '{}')",
                app_config.backup.compression_level,
                app_config.photos.dir_name
            );

            let db_path = app_data_dir.join("respectabullz.db");
            let db_url = format!("sqlite:{}", db_path.to_string_lossy());
            log::info!("Database path: {}", db_path.display());

            // フロントエンド用（マイグレーションも管理）
            app.handle().plugin(
                tauri_plugin_sql::Builder::default()
                    .add_migrations(&db_url, migrations)
                    .build(),
            )?;

            let pool = tauri::async_runtime::block_on(async {
                use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
                use std::str::FromStr;

                let options = SqliteConnectOptions::from_str(&db_url)
                    .map_err(|e| format!("Failed to parse database URL: {e}"))?
                    .create_if_missing(true);
                let pool = SqlitePoolOptions::new()
                    .connect_with(options)
                    .await
                    .map_err(|e| format!("Failed to create sqlx pool: {e}"))?;
                repository::init_schema(&pool).await?;
                Ok::<_, String>(pool)
            })?;
            log::info!("sqlx pool created for backend use");

            let data_layer = SqliteDataLayer::new(pool.clone()).with_legacy_dir(&app_data_dir);
            app.manage(FirstLaunchInitializer::new(
                data_layer,
                JsonPreferenceStore::new(&app_config_dir),
                TauriNotifier::new(app.handle().clone()),
            ));
            app.manage(commands::BackupContext {
                photos_dir: app_config.photos.photos_dir(&app_data_dir),
                config: app_config.backup,
            });
            app.manage(BackupState::new());
            app.manage(pool);

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            get_logs,
            commands::export_full_backup,
            commands::restore_full_backup,
            commands::start_first_launch,
            commands::complete_first_launch,
        ])
        .run(tauri::generate_context!());

    if let Err(e) = result {
        log::error!("Error while running tauri application: {e}");
        eprintln!("Error while running tauri application: {e}");
        std::process::exit(1);
    }
}
