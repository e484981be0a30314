use crate::model::{ContentKind, ItemOutcome, RunStatus, RunSummary};

pub fn render_markdown_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str("# Media Consolidation Summary\n\n");
    out.push_str(&format!(
        "- Summary version: `{}`\n- Run id: `{}`\n- Started: `{}`\n- Finished: `{}`\n- Status: `{}`\n- Dry run: `{}`\n- Deep clean: `{}`\n\n",
        summary.summary_version,
        summary.run_id,
        summary.started_at,
        summary.finished_at,
        status_label(summary.status),
        summary.dry_run,
        summary.deep_clean
    ));

    out.push_str("## Disks\n\n");
    if summary.disks.is_empty() {
        out.push_str("No disks detected.\n\n");
    } else {
        for disk in &summary.disks {
            out.push_str(&format!(
                "- `{}` (`{}`): free {}\n",
                disk.id,
                disk.mount,
                human_bytes(disk.free_bytes)
            ));
        }
        out.push('\n');
    }

    out.push_str("## Categories\n\n");
    out.push_str("| Category | Kind | Items | Whole | Consolidated | No space | Videos | Covers | Metadata | Subtitles |\n");
    out.push_str("|---|---|---|---|---|---|---|---|---|---|\n");
    for category in &summary.categories {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} | {} | {} |\n",
            category.name,
            kind_label(category.kind),
            category.total_items,
            category.whole_items,
            category.consolidated_items,
            category.failed_no_space_items,
            category.file_kinds.videos,
            category.file_kinds.covers,
            category.file_kinds.metadata,
            category.file_kinds.subtitles
        ));
    }
    out.push('\n');

    let touched = summary
        .items
        .iter()
        .filter(|item| item.outcome != ItemOutcome::Unchanged)
        .collect::<Vec<_>>();
    out.push_str("## Fragmented Items\n\n");
    if touched.is_empty() {
        out.push_str("No fragmented items were found.\n\n");
    } else {
        for item in touched {
            out.push_str(&format!(
                "- `{}` / `{}` on {} -> {}: `{}`, {} in {} file(s)",
                item.category,
                item.title,
                item.disks.join(", "),
                item.target.as_deref().unwrap_or("-"),
                outcome_label(item.outcome),
                human_bytes(item.size_bytes),
                item.file_count
            ));
            if item.bytes_moved > 0 {
                out.push_str(&format!(", moved {}", human_bytes(item.bytes_moved)));
            }
            if item.failed_files > 0 {
                out.push_str(&format!(", {} failed file(s)", item.failed_files));
            }
            out.push('\n');
        }
        out.push('\n');
    }

    let totals = &summary.totals;
    let temp_label = if summary.dry_run {
        "Orphaned temp files (would remove)"
    } else {
        "Orphaned temp files removed"
    };
    out.push_str("## Transfers\n\n");
    out.push_str(&format!(
        "- Committed: {}\n- Identical copies resolved: {}\n- Planned (dry run): {}\n- Failed: {}\n- Bytes moved: {}\n- Junk files removed: {}\n- {}: {}\n- Directories removed: {}\n\n",
        totals.committed,
        totals.skipped_identical,
        totals.dry_run,
        totals.failed,
        human_bytes(totals.bytes_moved),
        totals.junk_removed,
        temp_label,
        totals.temp_files_removed,
        totals.directories_removed
    ));

    if !summary.failed_transfers.is_empty() {
        out.push_str("## Failed Transfers\n\n");
        for failure in &summary.failed_transfers {
            out.push_str(&format!(
                "- `{}` -> `{}`: {}\n",
                failure.source, failure.destination, failure.reason
            ));
        }
        out.push('\n');
    }

    if !summary.missing_metadata.is_empty() {
        out.push_str("## Missing Artwork or Metadata\n\n");
        for entry in &summary.missing_metadata {
            let mut missing = Vec::new();
            if entry.missing_cover {
                missing.push("cover");
            }
            if entry.missing_metadata {
                missing.push("metadata");
            }
            out.push_str(&format!(
                "- `{}` / `{}`: missing {}\n",
                entry.category,
                entry.title,
                missing.join(" and ")
            ));
        }
        out.push('\n');
    }

    if !summary.warnings.is_empty() {
        out.push_str("## Warnings\n\n");
        for warning in &summary.warnings {
            out.push_str(&format!("- {}\n", warning));
        }
    }

    out
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Completed => "completed",
        RunStatus::Cancelled => "cancelled",
    }
}

fn kind_label(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Movies => "movies",
        ContentKind::Series => "series",
    }
}

fn outcome_label(outcome: ItemOutcome) -> &'static str {
    match outcome {
        ItemOutcome::Unchanged => "unchanged",
        ItemOutcome::Consolidated => "consolidated",
        ItemOutcome::Planned => "planned",
        ItemOutcome::Interrupted => "interrupted",
        ItemOutcome::FailedNoSpace => "failed_no_space",
    }
}

pub fn human_bytes(value: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if value == 0 {
        return "0 B".to_string();
    }
    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}
