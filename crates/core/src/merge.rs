use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::classify::{FileClassifier, FileKind};
use crate::cleanup::{prune_empty_dirs, remove_dir_if_empty};
use crate::model::{Disk, Item};
use crate::transfer::{TransferEngine, TransferOutcome, TransferUnit};

pub struct MergeContext<'a> {
    pub engine: &'a TransferEngine,
    pub classifier: &'a FileClassifier,
    pub cancel: &'a CancelToken,
    pub dry_run: bool,
    pub cleanup_passes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub committed: u64,
    pub skipped_identical: u64,
    pub dry_run: u64,
    pub bytes_moved: u64,
    pub junk_removed: u64,
    pub directories_removed: u64,
    pub fragments_removed: u64,
    pub failed: Vec<FailedFile>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl MergeReport {
    pub fn transfers(&self) -> u64 {
        self.committed
            .saturating_add(self.skipped_identical)
            .saturating_add(self.dry_run)
            .saturating_add(self.failed.len() as u64)
    }
}

/// Folds every fragment of `item` that is not on `target` into the target
/// fragment, one file at a time.
pub fn merge_item(item: &Item, target: &Disk, ctx: &MergeContext<'_>) -> MergeReport {
    let mut report = MergeReport::default();
    let destination_root = target
        .mount
        .join(&item.category.relative_path)
        .join(&item.name);

    for fragment in &item.fragments {
        if fragment.disk.id == target.id {
            continue;
        }
        if ctx.cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        debug!(
            "merging {} from {} into {}",
            item.name, fragment.disk.id, target.id
        );
        let walker = WalkDir::new(&fragment.path)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir() && ctx.classifier.is_skipped_dir(entry.path()))
            });

        for entry in walker {
            if ctx.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    report.warnings.push(format!(
                        "walk error under {}: {}",
                        fragment.path.display(),
                        err
                    ));
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let source = entry.path().to_path_buf();
            match ctx.classifier.classify(&source) {
                FileKind::Upload | FileKind::Temp => continue,
                FileKind::Junk => {
                    if !ctx.dry_run {
                        match fs::remove_file(&source) {
                            Ok(()) => report.junk_removed += 1,
                            Err(err) => debug!("could not remove junk {}: {}", source.display(), err),
                        }
                    }
                    continue;
                }
                _ => {}
            }

            let relative = match source.strip_prefix(&fragment.path) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };
            let destination = destination_root.join(relative);
            let mut unit = TransferUnit::new(
                fragment.disk.clone(),
                target.clone(),
                source,
                destination,
            );

            match ctx.engine.execute(&mut unit, ctx.dry_run) {
                TransferOutcome::Committed { bytes } => {
                    report.committed += 1;
                    report.bytes_moved = report.bytes_moved.saturating_add(bytes);
                }
                TransferOutcome::SkippedIdentical { .. } => report.skipped_identical += 1,
                TransferOutcome::SkippedDryRun { .. } => report.dry_run += 1,
                TransferOutcome::Failed(err) => report.failed.push(FailedFile {
                    source: unit.source,
                    destination: unit.destination,
                    reason: err.to_string(),
                }),
            }
        }

        if report.cancelled {
            break;
        }
        if ctx.dry_run {
            continue;
        }

        let pruned = prune_empty_dirs(
            std::slice::from_ref(&fragment.path),
            ctx.classifier,
            ctx.cleanup_passes,
        );
        report.directories_removed += pruned.directories_removed;
        report.junk_removed += pruned.junk_removed;
        if remove_dir_if_empty(&fragment.path) {
            report.fragments_removed += 1;
            info!("fragment emptied and removed: {}", fragment.path.display());
        } else if fragment.path.exists() {
            warn!(
                "fragment {} still holds files after merge",
                fragment.path.display()
            );
        }
    }

    report
}
