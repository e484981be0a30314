pub mod cancel;
pub mod classify;
pub mod cleanup;
pub mod config;
pub mod disk;
pub mod doctor;
pub mod engine;
pub mod lock;
pub mod markdown;
pub mod merge;
pub mod model;
pub mod perms;
pub mod placement;
pub mod scan;
pub mod transfer;

pub use cancel::CancelToken;
pub use classify::{FileClassifier, FileKind};
pub use cleanup::{deep_clean, maintain_staging, prune_empty_dirs, remove_orphaned_temp_files, PruneStats};
pub use config::{ConsolidatorConfig, FileRules, Ownership, StagingArea};
pub use disk::{list_disks, snapshot_disks, FixedSpaceProbe, SpaceProbe, StatvfsProbe};
pub use doctor::{collect_doctor_info, DoctorDisk, DoctorInfo};
pub use engine::{Consolidator, RunOptions};
pub use lock::{RunError, RunLock};
pub use markdown::{human_bytes, render_markdown_summary};
pub use merge::{merge_item, FailedFile, MergeContext, MergeReport};
pub use model::{
    Category, CategorySummary, ConsolidationDecision, ContentKind, Disk, DiskSnapshot,
    FailedTransfer, FileKindCounts, Fragment, FragmentStats, Item, ItemOutcome, ItemReport,
    MissingMetadata, RunEvent, RunPhase, RunStatus, RunSummary, TransferState, TransferTotals,
    SUMMARY_VERSION,
};
pub use placement::select_target;
pub use scan::{build_item, discover_items, measure_fragment, scan_category, FragmentLocation};
pub use transfer::{TransferEngine, TransferError, TransferOutcome, TransferStage, TransferUnit};
