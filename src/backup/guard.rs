//! エクスポート/リストアの多重実行ガード
//!
//! 写真ディレクトリへの同時アクセスを防ぐため、実行中は 2 つ目の操作を拒否する。

use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct BackupState {
    is_running: Arc<Mutex<bool>>,
}

impl BackupState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.lock().map(|r| *r).unwrap_or(false)
    }

    /// 実行中フラグを立てる。返されたガードが drop されるとフラグが下りる
    pub fn try_start(&self, operation: &str) -> Result<BackupGuard<'_>, String> {
        let mut running = self
            .is_running
            .lock()
            .map_err(|e| format!("Lock error: {e}"))?;
        if *running {
            return Err(format!(
                "Cannot start {operation}: another backup or restore is already running"
            ));
        }
        *running = true;
        Ok(BackupGuard { state: self })
    }
}

pub struct BackupGuard<'a> {
    state: &'a BackupState,
}

impl Drop for BackupGuard<'_> {
    fn drop(&mut self) {
        match self.state.is_running.lock() {
            Ok(mut running) => *running = false,
            Err(poisoned) => {
                log::warn!("Backup running flag was poisoned; clearing it anyway");
                *poisoned.into_inner() = false;
            }
        }
    }
}
