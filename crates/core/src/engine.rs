use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::classify::FileClassifier;
use crate::cleanup::{deep_clean, maintain_staging, remove_orphaned_temp_files};
use crate::config::ConsolidatorConfig;
use crate::disk::{list_disks, snapshot_disks, SpaceProbe, StatvfsProbe};
use crate::lock::RunLock;
use crate::merge::{merge_item, MergeContext};
use crate::model::{
    CategorySummary, ConsolidationDecision, ContentKind, FailedTransfer, Item, ItemOutcome,
    ItemReport, MissingMetadata, RunEvent, RunPhase, RunStatus, RunSummary, TransferTotals,
    SUMMARY_VERSION,
};
use crate::placement::select_target;
use crate::scan::{build_item, discover_items};
use crate::transfer::TransferEngine;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    pub deep_clean: bool,
}

/// Drives one consolidation run: lock, scan, decide, merge, clean up, report.
pub struct Consolidator<P: SpaceProbe = StatvfsProbe> {
    config: ConsolidatorConfig,
    probe: P,
    cancel: CancelToken,
}

impl Consolidator<StatvfsProbe> {
    pub fn new(config: ConsolidatorConfig) -> Self {
        Self::with_probe(config, StatvfsProbe)
    }
}

impl<P: SpaceProbe> Consolidator<P> {
    pub fn with_probe(config: ConsolidatorConfig, probe: P) -> Self {
        Self {
            config,
            probe,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ConsolidatorConfig {
        &self.config
    }

    pub fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        self.run_with_callback(options, |_| {})
    }

    pub fn run_with_callback<F>(&self, options: &RunOptions, mut on_event: F) -> Result<RunSummary>
    where
        F: FnMut(RunEvent),
    {
        self.config.validate()?;
        let config = &self.config;
        let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let run_id = Uuid::new_v4().to_string();
        let mut seq = 0_u64;

        emit_run_event(&mut on_event, &run_id, &mut seq, RunPhase::Idle, None);
        let _lock = RunLock::acquire(&config.lock_file)?;
        emit_run_event(
            &mut on_event,
            &run_id,
            &mut seq,
            RunPhase::LockAcquired,
            Some(config.lock_file.display().to_string()),
        );
        if options.dry_run {
            info!("dry-run: no file will be moved, removed or created");
        }

        let mut warnings = Vec::new();
        let classifier = FileClassifier::new(&config.files, &mut warnings);
        let disks = list_disks(&config.mount_root, &config.disk_prefix).with_context(|| {
            format!("failed to discover disks under {}", config.mount_root.display())
        })?;
        if disks.is_empty() {
            warnings.push(format!(
                "no {}N disks found under {}",
                config.disk_prefix,
                config.mount_root.display()
            ));
        }
        info!("found {} disk(s)", disks.len());
        let disk_snapshots = snapshot_disks(&disks, &self.probe);

        let mut totals = TransferTotals {
            temp_files_removed: remove_orphaned_temp_files(
                &disks,
                &classifier,
                options.dry_run,
                &self.cancel,
            ),
            ..TransferTotals::default()
        };

        let transfer_engine =
            TransferEngine::new(config.files.temp_suffix.clone(), config.ownership);
        let merge_ctx = MergeContext {
            engine: &transfer_engine,
            classifier: &classifier,
            cancel: &self.cancel,
            dry_run: options.dry_run,
            cleanup_passes: config.cleanup_max_passes,
        };

        let mut categories = Vec::with_capacity(config.categories.len());
        let mut items = Vec::new();
        let mut missing_metadata = Vec::new();
        let mut failed_transfers = Vec::new();

        for category in &config.categories {
            if self.cancel.is_cancelled() {
                break;
            }
            emit_run_event(
                &mut on_event,
                &run_id,
                &mut seq,
                RunPhase::Scanning,
                Some(category.name.clone()),
            );
            let discovered = discover_items(category, &disks, &classifier, &mut warnings);
            info!("{}: {} item(s) found", category.name, discovered.len());

            let mut summary = CategorySummary {
                name: category.name.clone(),
                kind: category.kind,
                ..CategorySummary::default()
            };

            for (name, locations) in &discovered {
                if self.cancel.is_cancelled() {
                    break;
                }
                let Some(item) = build_item(
                    category,
                    name,
                    locations,
                    &classifier,
                    &self.cancel,
                    &mut warnings,
                ) else {
                    break;
                };

                emit_run_event(
                    &mut on_event,
                    &run_id,
                    &mut seq,
                    RunPhase::Deciding,
                    Some(item.name.clone()),
                );
                let decision = select_target(
                    &item,
                    &disks,
                    &self.probe,
                    config.safety_buffer_bytes,
                );

                summary.total_items += 1;
                summary.file_kinds.merge(&item.kind_counts());

                let mut row = item_row(&item);
                let mut home = item.fragments.first().map(|fragment| fragment.path.clone());

                match decision {
                    ConsolidationDecision::Unchanged { resident } => {
                        summary.whole_items += 1;
                        row.target = resident.map(|disk| disk.id);
                    }
                    ConsolidationDecision::FailedNoSpace { required_bytes } => {
                        summary.failed_no_space_items += 1;
                        row.outcome = ItemOutcome::FailedNoSpace;
                        let message = format!(
                            "no disk can hold {} / {} ({} B required incl. buffer); left fragmented on {}",
                            category.name,
                            item.name,
                            required_bytes,
                            row.disks.join(", ")
                        );
                        warn!("{}", message);
                        warnings.push(message);
                    }
                    ConsolidationDecision::Consolidate {
                        target,
                        bytes_to_move,
                    } => {
                        info!(
                            "consolidating {} / {} onto {} ({} B to move)",
                            category.name, item.name, target.id, bytes_to_move
                        );
                        emit_run_event(
                            &mut on_event,
                            &run_id,
                            &mut seq,
                            RunPhase::Merging,
                            Some(format!("{} -> {}", item.name, target.id)),
                        );

                        let report = merge_item(&item, &target, &merge_ctx);
                        totals.committed += report.committed;
                        totals.skipped_identical += report.skipped_identical;
                        totals.dry_run += report.dry_run;
                        totals.failed += report.failed.len() as u64;
                        totals.bytes_moved = totals.bytes_moved.saturating_add(report.bytes_moved);
                        totals.junk_removed += report.junk_removed;
                        totals.directories_removed += report.directories_removed;
                        warnings.extend(report.warnings);

                        row.target = Some(target.id.clone());
                        row.bytes_moved = report.bytes_moved;
                        row.failed_files = report.failed.len() as u64;
                        row.outcome = if report.cancelled {
                            ItemOutcome::Interrupted
                        } else if options.dry_run {
                            ItemOutcome::Planned
                        } else {
                            ItemOutcome::Consolidated
                        };
                        if matches!(
                            row.outcome,
                            ItemOutcome::Consolidated | ItemOutcome::Planned
                        ) {
                            summary.consolidated_items += 1;
                        }

                        for failure in report.failed {
                            failed_transfers.push(FailedTransfer {
                                category: category.name.clone(),
                                item: item.name.clone(),
                                source: failure.source.display().to_string(),
                                destination: failure.destination.display().to_string(),
                                reason: failure.reason,
                            });
                        }

                        home = Some(
                            target
                                .mount
                                .join(&category.relative_path)
                                .join(&item.name),
                        );
                    }
                }

                if !row.has_cover || !row.has_metadata {
                    missing_metadata.push(MissingMetadata {
                        category: category.name.clone(),
                        kind: category.kind,
                        title: item.name.clone(),
                        path: home
                            .map(|path| path.display().to_string())
                            .unwrap_or_default(),
                        missing_cover: !row.has_cover,
                        missing_metadata: !row.has_metadata,
                    });
                }
                items.push(row);
            }

            info!(
                "{}: {} item(s), {} whole, {} consolidated, {} without space",
                summary.name,
                summary.total_items,
                summary.whole_items,
                summary.consolidated_items,
                summary.failed_no_space_items
            );
            categories.push(summary);
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            emit_run_event(&mut on_event, &run_id, &mut seq, RunPhase::Cancelling, None);
            warn!("stop requested; skipping cleanup and writing partial summary");
        } else if options.dry_run {
            if options.deep_clean {
                info!("dry-run: deep clean skipped");
            }
        } else {
            if options.deep_clean {
                let stats = deep_clean(
                    &disks,
                    &config.category_tops(),
                    &classifier,
                    config.cleanup_max_passes,
                );
                totals.directories_removed += stats.directories_removed;
                totals.junk_removed += stats.junk_removed;
            }
            let stats = maintain_staging(
                &disks,
                &config.staging,
                &classifier,
                config.cleanup_max_passes,
                config.ownership.as_ref(),
                &mut warnings,
            );
            totals.directories_removed += stats.directories_removed;
            totals.junk_removed += stats.junk_removed;
        }

        emit_run_event(&mut on_event, &run_id, &mut seq, RunPhase::Reporting, None);
        let summary = RunSummary {
            summary_version: SUMMARY_VERSION.to_string(),
            run_id: run_id.clone(),
            started_at,
            finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            dry_run: options.dry_run,
            deep_clean: options.deep_clean,
            status: if cancelled {
                RunStatus::Cancelled
            } else {
                RunStatus::Completed
            },
            disks: disk_snapshots,
            categories,
            items,
            missing_metadata,
            failed_transfers,
            totals,
            warnings,
        };
        emit_run_event(&mut on_event, &run_id, &mut seq, RunPhase::Done, None);

        Ok(summary)
    }
}

fn item_row(item: &Item) -> ItemReport {
    ItemReport {
        category: item.category.name.clone(),
        kind: item.category.kind,
        title: item.name.clone(),
        disks: item.disk_ids(),
        target: None,
        seasons: match item.category.kind {
            ContentKind::Series => Some(item.dir_count()),
            ContentKind::Movies => None,
        },
        file_count: item.file_count(),
        size_bytes: item.total_size(),
        has_cover: item.has_cover(),
        has_metadata: item.has_metadata(),
        outcome: ItemOutcome::Unchanged,
        bytes_moved: 0,
        failed_files: 0,
    }
}

fn emit_run_event<F>(
    on_event: &mut F,
    run_id: &str,
    seq: &mut u64,
    phase: RunPhase,
    detail: Option<String>,
) where
    F: FnMut(RunEvent),
{
    *seq = seq.saturating_add(1);
    match &detail {
        Some(detail) => info!("phase {:?}: {}", phase, detail),
        None => info!("phase {:?}", phase),
    }
    on_event(RunEvent {
        seq: *seq,
        run_id: run_id.to_string(),
        phase,
        detail,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    });
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{Consolidator, RunOptions};
    use crate::config::ConsolidatorConfig;
    use crate::disk::FixedSpaceProbe;
    use crate::model::{ItemOutcome, RunPhase, RunStatus};

    fn write(path: &Path, bytes: &[u8]) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, bytes).expect("write");
    }

    fn config(root: &Path) -> ConsolidatorConfig {
        ConsolidatorConfig {
            mount_root: root.join("mnt"),
            safety_buffer_bytes: 1_000,
            ownership: None,
            lock_file: root.join("run.lock"),
            report_dir: root.join("reports"),
            log_dir: root.join("logs"),
            ..ConsolidatorConfig::default()
        }
    }

    #[test]
    fn phases_are_reported_in_order() {
        let root = tempfile::tempdir().expect("tempdir");
        let config = config(root.path());
        let disk1 = config.mount_root.join("disk1");
        let disk2 = config.mount_root.join("disk2");
        write(&disk1.join("peliculas/Peliculas HD/Heat/Heat.mkv"), b"movie-body");
        write(&disk2.join("peliculas/Peliculas HD/Heat/Heat.nfo"), b"<movie/>");

        let probe = FixedSpaceProbe::new([("disk1", 1_000_000), ("disk2", 1_000_000)]);
        let consolidator = Consolidator::with_probe(config, probe);
        let mut phases = Vec::new();
        let summary = consolidator
            .run_with_callback(&RunOptions::default(), |event| phases.push(event.phase))
            .expect("run");

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(phases.first(), Some(&RunPhase::Idle));
        assert_eq!(phases.get(1), Some(&RunPhase::LockAcquired));
        assert!(phases.contains(&RunPhase::Merging));
        assert_eq!(phases.last(), Some(&RunPhase::Done));

        let heat = summary
            .items
            .iter()
            .find(|row| row.title == "Heat")
            .expect("heat row");
        assert_eq!(heat.outcome, ItemOutcome::Consolidated);
        assert_eq!(heat.target.as_deref(), Some("disk1"));
        assert!(disk1.join("peliculas/Peliculas HD/Heat/Heat.nfo").exists());
        assert!(!disk2.join("peliculas/Peliculas HD/Heat").exists());
        assert_eq!(summary.missing_metadata.len(), 1);
        assert!(summary.missing_metadata[0].missing_cover);
        assert!(!summary.missing_metadata[0].missing_metadata);
    }
}
