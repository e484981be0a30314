use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::classify::{FileClassifier, FileKind};
use crate::model::{Category, Disk, Fragment, FragmentStats, Item};

/// Where an item directory lives before its contents have been measured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentLocation {
    pub disk: Disk,
    pub path: PathBuf,
}

/// Groups the item directories of one category across every disk, keyed by
/// item name in sorted order.
pub fn discover_items(
    category: &Category,
    disks: &[Disk],
    classifier: &FileClassifier,
    warnings: &mut Vec<String>,
) -> BTreeMap<String, Vec<FragmentLocation>> {
    let mut items: BTreeMap<String, Vec<FragmentLocation>> = BTreeMap::new();

    for disk in disks {
        let search_path = disk.mount.join(&category.relative_path);
        let entries = match fs::read_dir(&search_path) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => {
                warnings.push(format!("failed to list {}: {}", search_path.display(), err));
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warnings.push(format!(
                        "failed to read entry under {}: {}",
                        search_path.display(),
                        err
                    ));
                    continue;
                }
            };
            let is_dir = entry
                .file_type()
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);
            let path = entry.path();
            if !is_dir || classifier.is_skipped_dir(&path) {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            items.entry(name).or_default().push(FragmentLocation {
                disk: disk.clone(),
                path,
            });
        }
    }

    items
}

/// Walks one fragment a single time and aggregates its statistics.
///
/// Junk files are left out of every counter and upload files are ignored
/// entirely. Per-entry errors become warnings.
pub fn measure_fragment(
    root: &Path,
    classifier: &FileClassifier,
    warnings: &mut Vec<String>,
) -> FragmentStats {
    let mut stats = FragmentStats::default();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && classifier.is_skipped_dir(entry.path())));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warnings.push(format!("walk error under {}: {}", root.display(), err));
                continue;
            }
        };

        if entry.file_type().is_dir() {
            stats.dir_count = stats.dir_count.saturating_add(1);
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let kind = classifier.classify(entry.path());
        if !kind.is_media() {
            continue;
        }

        let size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                warnings.push(format!("failed to stat {}: {}", entry.path().display(), err));
                continue;
            }
        };

        stats.size_bytes = stats.size_bytes.saturating_add(size);
        stats.file_count = stats.file_count.saturating_add(1);
        stats.kinds.record(kind);
        match kind {
            FileKind::Cover => stats.has_cover = true,
            FileKind::Metadata => stats.has_metadata = true,
            _ => {}
        }
    }

    stats
}

/// Measures every fragment of a discovered item. Returns `None` when a stop
/// is requested before all fragments were measured.
pub fn build_item(
    category: &Category,
    name: &str,
    locations: &[FragmentLocation],
    classifier: &FileClassifier,
    cancel: &CancelToken,
    warnings: &mut Vec<String>,
) -> Option<Item> {
    let mut fragments = Vec::with_capacity(locations.len());
    for location in locations {
        if cancel.is_cancelled() {
            return None;
        }
        let stats = measure_fragment(&location.path, classifier, warnings);
        debug!(
            "measured {} on {}: {} file(s), {} byte(s)",
            name, location.disk.id, stats.file_count, stats.size_bytes
        );
        fragments.push(Fragment {
            disk: location.disk.clone(),
            path: location.path.clone(),
            stats,
        });
    }

    Some(Item {
        category: category.clone(),
        name: name.to_string(),
        fragments,
    })
}

/// Discovers and measures every item of a category.
pub fn scan_category(
    category: &Category,
    disks: &[Disk],
    classifier: &FileClassifier,
    cancel: &CancelToken,
    warnings: &mut Vec<String>,
) -> Vec<Item> {
    let discovered = discover_items(category, disks, classifier, warnings);
    let mut items = Vec::with_capacity(discovered.len());
    for (name, locations) in &discovered {
        match build_item(category, name, locations, classifier, cancel, warnings) {
            Some(item) => items.push(item),
            None => break,
        }
    }
    items
}
