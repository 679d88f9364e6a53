//! フルバックアップ（DB ドキュメント + 写真ディレクトリ）の ZIP エクスポート/リストア

pub mod archive;
pub mod guard;
pub mod metadata;
pub mod orchestrator;
pub mod photos;

pub use archive::{ArchiveCodec, PhotoEntry};
pub use guard::{BackupGuard, BackupState};
pub use metadata::{BackupMetadata, MetadataValidation};
pub use orchestrator::{
    ArchiveRestore, BackupOrchestrator, ExportOutcome, FailureKind, FullRestore, PartialRestore,
    RestoreFailure, RestoreOutcome,
};
pub use photos::{PhotoDirectory, PhotoStore};
