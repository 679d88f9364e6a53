//! 初回起動フロー
//!
//! `Uninitialized → Migrating → Ready(decision)` または `ReadyFailed(error)`。
//! マーカーはユーザーが「新規で始める / サンプルデータ」を選んだ後にだけ書く。
//! 選択前に終了した場合は次回起動時にもう一度フローが走る。

use crate::host::Notifier;
use crate::legacy_migration::MigrationReport;
use crate::preferences::{PreferenceStore, FIRST_LAUNCH_COMPLETED_KEY};
use crate::repository::{OnboardingDataSource, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

const NOTIFICATION_TITLE: &str = "Respectabullz";

/// 移行結果の要約（移行件数が 1 件以上のときのみ作られる）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    pub total_records: u64,
    pub counts: BTreeMap<String, u64>,
}

impl MigrationSummary {
    fn from_report(report: &MigrationReport) -> Option<Self> {
        let total_records = report.total();
        if !report.migrated || total_records == 0 {
            return None;
        }
        Some(Self {
            total_records,
            counts: report.migrated_counts.clone(),
        })
    }

    pub fn message(&self) -> String {
        format!(
            "Migrated {} records from previous version",
            self.total_records
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LaunchDecision {
    /// 以前の起動でフローを完了済み
    AlreadyCompleted,
    /// 「新規で始める / サンプルデータ」を選ばせる
    ChooseStartMode {
        migration_summary: Option<MigrationSummary>,
    },
    /// このセッションでフローが完了した
    Completed {
        migration_summary: Option<MigrationSummary>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "camelCase")]
pub enum FirstLaunchState {
    Uninitialized,
    Migrating,
    Ready(LaunchDecision),
    /// このセッションでは終端。再試行はアプリの再起動で行う
    ReadyFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OnboardingChoice {
    FreshStart,
    SampleData,
}

/// 初回起動フローの状態機械
///
/// 依存（データレイヤー・設定ストア・通知）はすべて注入する。
pub struct FirstLaunchInitializer<D, P, N>
where
    D: OnboardingDataSource,
    P: PreferenceStore,
    N: Notifier,
{
    data_source: D,
    preferences: P,
    notifier: N,
    state: Mutex<FirstLaunchState>,
    // start / complete を直列化する
    op_lock: tokio::sync::Mutex<()>,
}

impl<D, P, N> FirstLaunchInitializer<D, P, N>
where
    D: OnboardingDataSource,
    P: PreferenceStore,
    N: Notifier,
{
    pub fn new(data_source: D, preferences: P, notifier: N) -> Self {
        Self {
            data_source,
            preferences,
            notifier,
            state: Mutex::new(FirstLaunchState::Uninitialized),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> FirstLaunchState {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_state(&self, state: FirstLaunchState) -> FirstLaunchState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        state
    }

    fn fail(&self, error: String) -> FirstLaunchState {
        log::error!("First-launch flow failed: {error}");
        self.set_state(FirstLaunchState::ReadyFailed(error))
    }

    /// フローを開始する。終端状態で呼ばれた場合は移行を再実行せず同じ状態を返す
    pub async fn start(&self, progress: ProgressCallback<'_>) -> FirstLaunchState {
        let _op = self.op_lock.lock().await;

        let current = self.state();
        if current != FirstLaunchState::Uninitialized {
            return current;
        }

        match self.preferences.get_bool(FIRST_LAUNCH_COMPLETED_KEY) {
            Ok(Some(true)) => {
                log::debug!("First-launch flow already completed");
                return self.set_state(FirstLaunchState::Ready(LaunchDecision::AlreadyCompleted));
            }
            Ok(_) => {}
            Err(e) => return self.fail(format!("Failed to read first-launch marker: {e}")),
        }

        log::info!("Running first-launch migration");
        self.set_state(FirstLaunchState::Migrating);

        let report = match self.data_source.run_first_launch_migration(progress).await {
            Ok(r) => r,
            Err(e) => return self.fail(format!("Migration failed: {e}")),
        };

        let migration_summary = MigrationSummary::from_report(&report);
        if let Some(ref summary) = migration_summary {
            log::info!("{}", summary.message());
            self.notifier.notify(NOTIFICATION_TITLE, &summary.message());
        }

        let has_settings = match self.data_source.has_breeder_settings().await {
            Ok(v) => v,
            Err(e) => return self.fail(format!("Failed to check breeder settings: {e}")),
        };

        if has_settings {
            // 「明示的な選択の後にだけマーカーを書く」の唯一の例外。
            // 繁殖者設定が既にあれば新規/サンプルの選択肢は意味を持たないので、
            // ここで完了扱いにしてマーカーを書く
            if let Err(e) = self.preferences.set_bool(FIRST_LAUNCH_COMPLETED_KEY, true) {
                return self.fail(format!("Failed to write first-launch marker: {e}"));
            }
            log::info!("Breeder settings found, first-launch flow completed");
            return self.set_state(FirstLaunchState::Ready(LaunchDecision::Completed {
                migration_summary,
            }));
        }

        self.set_state(FirstLaunchState::Ready(LaunchDecision::ChooseStartMode {
            migration_summary,
        }))
    }

    /// ユーザーの選択を反映してフローを完了する
    pub async fn complete(&self, choice: OnboardingChoice) -> Result<LaunchDecision, String> {
        let _op = self.op_lock.lock().await;

        let migration_summary = match self.state() {
            FirstLaunchState::Ready(LaunchDecision::ChooseStartMode { migration_summary }) => {
                migration_summary
            }
            other => {
                return Err(format!(
                    "First-launch choice is not expected in state {other:?}"
                ))
            }
        };

        if choice == OnboardingChoice::SampleData {
            self.data_source
                .load_sample_data()
                .await
                .map_err(|e| format!("Failed to load sample data: {e}"))?;
        }

        self.preferences
            .set_bool(FIRST_LAUNCH_COMPLETED_KEY, true)
            .map_err(|e| format!("Failed to write first-launch marker: {e}"))?;

        log::info!("First-launch flow completed with {choice:?}");
        let decision = LaunchDecision::Completed { migration_summary };
        self.set_state(FirstLaunchState::Ready(decision.clone()));
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockNotifier;
    use crate::legacy_migration::MigrationProgress;
    use crate::preferences::MockPreferenceStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeOnboarding {
        migration: Result<MigrationReport, String>,
        has_breeder_settings: bool,
        sample_data: Result<(), String>,
        migration_calls: AtomicUsize,
        sample_calls: AtomicUsize,
    }

    impl FakeOnboarding {
        fn with_report(counts: &[(&str, u64)]) -> Self {
            Self {
                migration: Ok(MigrationReport {
                    migrated: !counts.is_empty(),
                    migrated_counts: counts.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                }),
                has_breeder_settings: false,
                sample_data: Ok(()),
                migration_calls: AtomicUsize::new(0),
                sample_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OnboardingDataSource for FakeOnboarding {
        async fn run_first_launch_migration(
            &self,
            progress: ProgressCallback<'_>,
        ) -> Result<MigrationReport, String> {
            self.migration_calls.fetch_add(1, Ordering::SeqCst);
            progress(MigrationProgress {
                stage: "dogs".to_string(),
                current: 1,
                total: 2,
            });
            self.migration.clone()
        }

        async fn has_breeder_settings(&self) -> Result<bool, String> {
            Ok(self.has_breeder_settings)
        }

        async fn load_sample_data(&self) -> Result<(), String> {
            self.sample_calls.fetch_add(1, Ordering::SeqCst);
            self.sample_data.clone()
        }
    }

    fn unset_marker() -> MockPreferenceStore {
        let mut prefs = MockPreferenceStore::new();
        prefs.expect_get_bool().returning(|_| Ok(None));
        prefs
    }

    fn silent_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);
        notifier
    }

    fn no_progress(_: MigrationProgress) {}

    #[tokio::test]
    async fn test_migration_summary_is_notified_and_prompt_shown() {
        let data = FakeOnboarding::with_report(&[("dogs", 5), ("litters", 2)]);
        let mut prefs = unset_marker();
        // 選択前なのでマーカーは書かない
        prefs.expect_set_bool().times(0);
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|title, body| {
                title == "Respectabullz" && body == "Migrated 7 records from previous version"
            })
            .times(1)
            .return_const(());

        let progress_events = std::sync::Mutex::new(Vec::new());
        let on_progress = |p: MigrationProgress| progress_events.lock().unwrap().push(p);

        let initializer = FirstLaunchInitializer::new(data, prefs, notifier);
        let state = initializer.start(&on_progress).await;

        match state {
            FirstLaunchState::Ready(LaunchDecision::ChooseStartMode {
                migration_summary: Some(summary),
            }) => {
                assert_eq!(summary.total_records, 7);
                assert_eq!(summary.counts.get("dogs"), Some(&5));
            }
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(progress_events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_marker_set_skips_migration() {
        let data = FakeOnboarding::with_report(&[("dogs", 1)]);
        let mut prefs = MockPreferenceStore::new();
        prefs
            .expect_get_bool()
            .withf(|key| key == FIRST_LAUNCH_COMPLETED_KEY)
            .returning(|_| Ok(Some(true)));

        let initializer = FirstLaunchInitializer::new(data, prefs, silent_notifier());
        assert_eq!(
            initializer.start(&no_progress).await,
            FirstLaunchState::Ready(LaunchDecision::AlreadyCompleted)
        );
        assert_eq!(initializer.data_source.migration_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_existing_breeder_settings_complete_without_prompt() {
        let mut data = FakeOnboarding::with_report(&[]);
        data.has_breeder_settings = true;
        let mut prefs = unset_marker();
        prefs
            .expect_set_bool()
            .withf(|key, value| key == FIRST_LAUNCH_COMPLETED_KEY && *value)
            .times(1)
            .returning(|_, _| Ok(()));

        let initializer = FirstLaunchInitializer::new(data, prefs, silent_notifier());
        assert_eq!(
            initializer.start(&no_progress).await,
            FirstLaunchState::Ready(LaunchDecision::Completed {
                migration_summary: None
            })
        );
        // 選択肢は出していないので complete は拒否される
        assert!(initializer
            .complete(OnboardingChoice::FreshStart)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_migration_failure_is_terminal() {
        let mut data = FakeOnboarding::with_report(&[]);
        data.migration = Err("legacy_storage.json: invalid JSON".to_string());
        let mut prefs = unset_marker();
        prefs.expect_set_bool().times(0);

        let initializer = FirstLaunchInitializer::new(data, prefs, silent_notifier());
        let first = initializer.start(&no_progress).await;
        assert!(matches!(first, FirstLaunchState::ReadyFailed(ref e) if e.contains("invalid JSON")));

        // 自動で再試行しない
        let second = initializer.start(&no_progress).await;
        assert_eq!(first, second);
        assert_eq!(initializer.data_source.migration_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_start_writes_marker() {
        let data = FakeOnboarding::with_report(&[]);
        let mut prefs = unset_marker();
        prefs
            .expect_set_bool()
            .times(1)
            .returning(|_, _| Ok(()));

        let initializer = FirstLaunchInitializer::new(data, prefs, silent_notifier());
        initializer.start(&no_progress).await;
        let decision = initializer
            .complete(OnboardingChoice::FreshStart)
            .await
            .unwrap();

        assert_eq!(
            decision,
            LaunchDecision::Completed {
                migration_summary: None
            }
        );
        assert_eq!(initializer.data_source.sample_calls.load(Ordering::SeqCst), 0);
        assert_eq!(initializer.state(), FirstLaunchState::Ready(decision));
    }

    #[tokio::test]
    async fn test_sample_data_choice_loads_then_writes_marker() {
        let data = FakeOnboarding::with_report(&[]);
        let mut prefs = unset_marker();
        prefs.expect_set_bool().times(1).returning(|_, _| Ok(()));

        let initializer = FirstLaunchInitializer::new(data, prefs, silent_notifier());
        initializer.start(&no_progress).await;
        initializer
            .complete(OnboardingChoice::SampleData)
            .await
            .unwrap();
        assert_eq!(initializer.data_source.sample_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sample_data_failure_keeps_prompt() {
        let mut data = FakeOnboarding::with_report(&[]);
        data.sample_data = Err("disk full".to_string());
        let mut prefs = unset_marker();
        prefs.expect_set_bool().times(0);

        let initializer = FirstLaunchInitializer::new(data, prefs, silent_notifier());
        initializer.start(&no_progress).await;
        let err = initializer
            .complete(OnboardingChoice::SampleData)
            .await
            .unwrap_err();
        assert!(err.contains("disk full"));
        assert!(matches!(
            initializer.state(),
            FirstLaunchState::Ready(LaunchDecision::ChooseStartMode { .. })
        ));
    }

    #[tokio::test]
    async fn test_complete_before_start_is_rejected() {
        let initializer = FirstLaunchInitializer::new(
            FakeOnboarding::with_report(&[]),
            MockPreferenceStore::new(),
            silent_notifier(),
        );
        assert_eq!(initializer.state(), FirstLaunchState::Uninitialized);
        assert!(initializer
            .complete(OnboardingChoice::FreshStart)
            .await
            .is_err());
    }

    #[test]
    fn test_choice_deserializes_from_camel_case() {
        let choice: OnboardingChoice = serde_json::from_str("\"sampleData\"").unwrap();
        assert_eq!(choice, OnboardingChoice::SampleData);
    }
}
