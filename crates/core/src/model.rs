use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const SUMMARY_VERSION: &str = "1.0.0";

/// One independently mounted volume of the pooled share.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Disk {
    pub id: String,
    pub index: u32,
    pub mount: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[default]
    Movies,
    Series,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub relative_path: PathBuf,
    #[serde(default)]
    pub kind: ContentKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FileKindCounts {
    #[serde(default)]
    pub videos: u64,
    #[serde(default)]
    pub covers: u64,
    #[serde(default)]
    pub metadata: u64,
    #[serde(default)]
    pub subtitles: u64,
    #[serde(default)]
    pub other: u64,
}

impl FileKindCounts {
    pub fn merge(&mut self, other: &FileKindCounts) {
        self.videos = self.videos.saturating_add(other.videos);
        self.covers = self.covers.saturating_add(other.covers);
        self.metadata = self.metadata.saturating_add(other.metadata);
        self.subtitles = self.subtitles.saturating_add(other.subtitles);
        self.other = self.other.saturating_add(other.other);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FragmentStats {
    pub size_bytes: u64,
    pub file_count: u64,
    pub dir_count: u64,
    pub has_cover: bool,
    pub has_metadata: bool,
    #[serde(default)]
    pub kinds: FileKindCounts,
}

/// The directory instance of an item on one disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub disk: Disk,
    pub path: PathBuf,
    pub stats: FragmentStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub category: Category,
    pub name: String,
    pub fragments: Vec<Fragment>,
}

impl Item {
    pub fn is_fragmented(&self) -> bool {
        self.fragments.len() > 1
    }

    pub fn total_size(&self) -> u64 {
        self.fragments
            .iter()
            .fold(0_u64, |acc, fragment| acc.saturating_add(fragment.stats.size_bytes))
    }

    pub fn file_count(&self) -> u64 {
        self.fragments
            .iter()
            .fold(0_u64, |acc, fragment| acc.saturating_add(fragment.stats.file_count))
    }

    pub fn dir_count(&self) -> u64 {
        self.fragments
            .iter()
            .fold(0_u64, |acc, fragment| acc.saturating_add(fragment.stats.dir_count))
    }

    pub fn has_cover(&self) -> bool {
        self.fragments.iter().any(|fragment| fragment.stats.has_cover)
    }

    pub fn has_metadata(&self) -> bool {
        self.fragments
            .iter()
            .any(|fragment| fragment.stats.has_metadata)
    }

    pub fn fragment_on(&self, disk: &Disk) -> Option<&Fragment> {
        self.fragments
            .iter()
            .find(|fragment| fragment.disk.id == disk.id)
    }

    pub fn resident_bytes_on(&self, disk: &Disk) -> u64 {
        self.fragment_on(disk)
            .map(|fragment| fragment.stats.size_bytes)
            .unwrap_or(0)
    }

    pub fn disk_ids(&self) -> Vec<String> {
        let mut ids = self
            .fragments
            .iter()
            .map(|fragment| fragment.disk.id.clone())
            .collect::<Vec<_>>();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn kind_counts(&self) -> FileKindCounts {
        let mut counts = FileKindCounts::default();
        for fragment in &self.fragments {
            counts.merge(&fragment.stats.kinds);
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationDecision {
    /// Zero or one fragment; the resident disk is kept for bookkeeping.
    Unchanged { resident: Option<Disk> },
    Consolidate { target: Disk, bytes_to_move: u64 },
    FailedNoSpace { required_bytes: u64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Pending,
    Copying,
    SizeVerified,
    Committed,
    Failed,
    SkippedIdentical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    LockAcquired,
    Scanning,
    Deciding,
    Merging,
    Reporting,
    Done,
    Cancelling,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    pub seq: u64,
    pub run_id: String,
    pub phase: RunPhase,
    pub detail: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Unchanged,
    Consolidated,
    /// Dry-run: a target was chosen but nothing was moved.
    Planned,
    /// A stop was requested while the item was being merged.
    Interrupted,
    FailedNoSpace,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskSnapshot {
    pub id: String,
    pub mount: String,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemReport {
    pub category: String,
    pub kind: ContentKind,
    pub title: String,
    pub disks: Vec<String>,
    pub target: Option<String>,
    /// Directory count below the item root, only meaningful for series.
    pub seasons: Option<u64>,
    pub file_count: u64,
    pub size_bytes: u64,
    pub has_cover: bool,
    pub has_metadata: bool,
    pub outcome: ItemOutcome,
    #[serde(default)]
    pub bytes_moved: u64,
    #[serde(default)]
    pub failed_files: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MissingMetadata {
    pub category: String,
    pub kind: ContentKind,
    pub title: String,
    pub path: String,
    pub missing_cover: bool,
    pub missing_metadata: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedTransfer {
    pub category: String,
    pub item: String,
    pub source: String,
    pub destination: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CategorySummary {
    pub name: String,
    pub kind: ContentKind,
    pub total_items: u64,
    pub whole_items: u64,
    pub consolidated_items: u64,
    pub failed_no_space_items: u64,
    #[serde(default)]
    pub file_kinds: FileKindCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TransferTotals {
    #[serde(default)]
    pub committed: u64,
    #[serde(default)]
    pub skipped_identical: u64,
    #[serde(default)]
    pub dry_run: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub bytes_moved: u64,
    #[serde(default)]
    pub junk_removed: u64,
    /// In a dry run, the orphaned temp files that would be removed.
    #[serde(default)]
    pub temp_files_removed: u64,
    #[serde(default)]
    pub directories_removed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub summary_version: String,
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub dry_run: bool,
    pub deep_clean: bool,
    pub status: RunStatus,
    pub disks: Vec<DiskSnapshot>,
    pub categories: Vec<CategorySummary>,
    pub items: Vec<ItemReport>,
    pub missing_metadata: Vec<MissingMetadata>,
    pub failed_transfers: Vec<FailedTransfer>,
    pub totals: TransferTotals,
    pub warnings: Vec<String>,
}
