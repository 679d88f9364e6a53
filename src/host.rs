//! UI 側の協調者（ファイルダイアログ・通知）の抽象化
//!
//! コアはこれらのトレイト越しにのみ UI を呼ぶ。Tauri 実装は `desktop` フィーチャー時のみ。

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::path::PathBuf;

/// ファイルダイアログ。ユーザーがキャンセルした場合は None
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FileDialog: Send + Sync {
    /// 保存先を選ばせる
    async fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf>;

    /// 読み込むバックアップファイルを選ばせる
    async fn pick_open_path(&self) -> Option<PathBuf>;
}

/// トースト/通知の出力先
#[cfg_attr(test, automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// ログにだけ書き出す通知先（通知プラグインが使えない環境用）
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        log::info!("[notify] {title}: {body}");
    }
}

#[cfg(feature = "desktop")]
pub use tauri_impl::{TauriFileDialog, TauriNotifier};

#[cfg(feature = "desktop")]
mod tauri_impl {
    use super::{FileDialog, Notifier};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use tauri::AppHandle;
    use tauri_plugin_dialog::{DialogExt, FilePath};
    use tauri_plugin_notification::NotificationExt;

    const BACKUP_FILTER_NAME: &str = "Respectabullz Backup";
    const BACKUP_EXTENSIONS: &[&str] = &["zip"];

    fn into_path(file_path: Option<FilePath>) -> Option<PathBuf> {
        match file_path?.into_path() {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Dialog returned an unusable path: {e}");
                None
            }
        }
    }

    /// tauri-plugin-dialog によるファイルダイアログ
    pub struct TauriFileDialog {
        app: AppHandle,
    }

    impl TauriFileDialog {
        pub fn new(app: AppHandle) -> Self {
            Self { app }
        }
    }

    #[async_trait]
    impl FileDialog for TauriFileDialog {
        async fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf> {
            let (tx, rx) = tokio::sync::oneshot::channel();
            self.app
                .dialog()
                .file()
                .add_filter(BACKUP_FILTER_NAME, BACKUP_EXTENSIONS)
                .set_file_name(suggested_name)
                .save_file(move |file_path| {
                    let _ = tx.send(file_path);
                });
            into_path(rx.await.ok().flatten())
        }

        async fn pick_open_path(&self) -> Option<PathBuf> {
            let (tx, rx) = tokio::sync::oneshot::channel();
            self.app
                .dialog()
                .file()
                .add_filter(BACKUP_FILTER_NAME, BACKUP_EXTENSIONS)
                .pick_file(move |file_path| {
                    let _ = tx.send(file_path);
                });
            into_path(rx.await.ok().flatten())
        }
    }

    /// tauri-plugin-notification による通知
    pub struct TauriNotifier {
        app: AppHandle,
    }

    impl TauriNotifier {
        pub fn new(app: AppHandle) -> Self {
            Self { app }
        }
    }

    impl Notifier for TauriNotifier {
        fn notify(&self, title: &str, body: &str) {
            if let Err(e) = self
                .app
                .notification()
                .builder()
                .title(title)
                .body(body)
                .show()
            {
                log::warn!("Failed to show notification: {e}");
            }
        }
    }
}
