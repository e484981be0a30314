use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::classify::FileClassifier;
use crate::config::{Ownership, StagingArea};
use crate::model::Disk;
use crate::perms;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneStats {
    pub directories_removed: u64,
    pub junk_removed: u64,
    pub passes: usize,
}

impl PruneStats {
    pub fn absorb(&mut self, other: PruneStats) {
        self.directories_removed = self
            .directories_removed
            .saturating_add(other.directories_removed);
        self.junk_removed = self.junk_removed.saturating_add(other.junk_removed);
        self.passes = self.passes.max(other.passes);
    }
}

/// Deletes temp-suffixed residue of interrupted transfers anywhere on the disks.
///
/// A temp file is never the only copy of its data: the source is removed only
/// after the temp file has been renamed to its final name.
pub fn remove_orphaned_temp_files(
    disks: &[Disk],
    classifier: &FileClassifier,
    dry_run: bool,
    cancel: &CancelToken,
) -> u64 {
    let mut removed = 0_u64;
    for disk in disks {
        if cancel.is_cancelled() {
            break;
        }
        for entry in WalkDir::new(&disk.mount).into_iter().filter_map(|entry| entry.ok()) {
            if !entry.file_type().is_file() || !classifier.is_temp(entry.path()) {
                continue;
            }
            if dry_run {
                info!("[dry-run] would remove orphaned temp file {}", entry.path().display());
                removed = removed.saturating_add(1);
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!("removed orphaned temp file {}", entry.path().display());
                    removed = removed.saturating_add(1);
                }
                Err(err) => warn!(
                    "could not remove orphaned temp file {}: {}",
                    entry.path().display(),
                    err
                ),
            }
        }
    }

    if removed > 0 {
        info!("removed {} orphaned temp file(s)", removed);
    }
    removed
}

/// Removes directories below each base that are empty once junk files are
/// deleted. Runs bottom-up passes until one changes nothing or `max_passes`
/// is reached. The bases themselves are kept.
pub fn prune_empty_dirs(
    bases: &[PathBuf],
    classifier: &FileClassifier,
    max_passes: usize,
) -> PruneStats {
    let mut stats = PruneStats::default();

    for _ in 0..max_passes {
        stats.passes += 1;
        let mut changed = false;

        for base in bases {
            if !base.is_dir() {
                continue;
            }
            let walker = WalkDir::new(base).contents_first(true).into_iter();
            for entry in walker.filter_map(|entry| entry.ok()) {
                let path = entry.path();
                if entry.file_type().is_file() {
                    if classifier.is_junk(path) && remove_junk(path) {
                        stats.junk_removed = stats.junk_removed.saturating_add(1);
                    }
                    continue;
                }
                if !entry.file_type().is_dir() || path == base.as_path() {
                    continue;
                }
                if remove_dir_if_empty(path) {
                    debug!("removed empty directory {}", path.display());
                    stats.directories_removed = stats.directories_removed.saturating_add(1);
                    changed = true;
                }
            }
        }

        if !changed {
            break;
        }
    }

    stats
}

/// Removes `path` when it is an empty directory. Returns whether it was removed.
pub fn remove_dir_if_empty(path: &Path) -> bool {
    match is_dir_empty(path) {
        Ok(true) => match fs::remove_dir(path) {
            Ok(()) => true,
            Err(err) => {
                debug!("could not remove {}: {}", path.display(), err);
                false
            }
        },
        Ok(false) => false,
        Err(err) if err.kind() == ErrorKind::NotFound => false,
        Err(err) => {
            debug!("could not inspect {}: {}", path.display(), err);
            false
        }
    }
}

fn is_dir_empty(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

fn remove_junk(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) => {
            debug!("could not remove junk file {}: {}", path.display(), err);
            false
        }
    }
}

/// Sweeps the top-level category directories of every disk.
pub fn deep_clean(
    disks: &[Disk],
    tops: &[PathBuf],
    classifier: &FileClassifier,
    max_passes: usize,
) -> PruneStats {
    let bases = disks
        .iter()
        .flat_map(|disk| tops.iter().map(|top| disk.mount.join(top)))
        .collect::<Vec<_>>();
    let stats = prune_empty_dirs(&bases, classifier, max_passes);
    info!(
        "deep clean removed {} empty director(ies) and {} junk file(s)",
        stats.directories_removed, stats.junk_removed
    );
    stats
}

/// Staging areas live only on the last disk: emptied copies elsewhere are
/// removed and the expected subfolders are created on the last disk.
pub fn maintain_staging(
    disks: &[Disk],
    areas: &[StagingArea],
    classifier: &FileClassifier,
    max_passes: usize,
    ownership: Option<&Ownership>,
    warnings: &mut Vec<String>,
) -> PruneStats {
    let mut stats = PruneStats::default();
    let Some((last, others)) = disks.split_last() else {
        return stats;
    };

    for disk in others {
        for area in areas {
            let root = disk.mount.join(&area.root);
            stats.absorb(prune_empty_dirs(std::slice::from_ref(&root), classifier, max_passes));
            if remove_dir_if_empty(&root) {
                stats.directories_removed = stats.directories_removed.saturating_add(1);
                info!("removed empty staging folder {}", root.display());
            }
        }
    }

    for area in areas {
        let root = last.mount.join(&area.root);
        let wanted = if area.subdirs.is_empty() {
            vec![root.clone()]
        } else {
            area.subdirs.iter().map(|sub| root.join(sub)).collect()
        };
        for dir in wanted {
            match perms::create_dir_all_owned(&dir, ownership) {
                Ok(()) => perms::normalize(&dir, ownership),
                Err(err) => warnings.push(format!(
                    "failed to create staging folder {}: {}",
                    dir.display(),
                    err
                )),
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use super::{maintain_staging, prune_empty_dirs, remove_orphaned_temp_files};
    use crate::cancel::CancelToken;
    use crate::classify::FileClassifier;
    use crate::config::{FileRules, StagingArea};
    use crate::model::Disk;

    fn classifier() -> FileClassifier {
        FileClassifier::new(&FileRules::default(), &mut Vec::new())
    }

    fn disk(root: &Path, index: u32) -> Disk {
        let mount = root.join(format!("disk{index}"));
        fs::create_dir_all(&mount).expect("mkdir");
        Disk {
            id: format!("disk{index}"),
            index,
            mount,
        }
    }

    #[test]
    fn deeply_nested_empty_tree_is_removed() {
        let root = tempfile::tempdir().expect("tempdir");
        let base = root.path().join("peliculas");
        let mut deepest = base.clone();
        for level in 0..12 {
            deepest = deepest.join(format!("level{level}"));
        }
        fs::create_dir_all(&deepest).expect("mkdir");
        fs::write(deepest.join(".DS_Store"), b"junk").expect("write");
        fs::write(base.join("level0/Thumbs.db"), b"junk").expect("write");

        let stats = prune_empty_dirs(&[base.clone()], &classifier(), 3);

        assert!(base.is_dir());
        assert!(!base.join("level0").exists());
        assert_eq!(stats.directories_removed, 12);
        assert_eq!(stats.junk_removed, 2);
        assert!(stats.passes <= 3);
    }

    #[test]
    fn directories_with_media_survive() {
        let root = tempfile::tempdir().expect("tempdir");
        let base = root.path().join("series");
        fs::create_dir_all(base.join("Show/Season 1")).expect("mkdir");
        fs::create_dir_all(base.join("Show/Extras")).expect("mkdir");
        fs::write(base.join("Show/Season 1/e01.mkv"), b"video").expect("write");
        fs::write(base.join("Show/Season 1/desktop.ini"), b"junk").expect("write");

        prune_empty_dirs(&[base.clone()], &classifier(), 3);

        assert!(base.join("Show/Season 1/e01.mkv").exists());
        assert!(!base.join("Show/Season 1/desktop.ini").exists());
        assert!(!base.join("Show/Extras").exists());
    }

    #[test]
    fn orphaned_temp_files_are_removed_except_in_dry_run() {
        let root = tempfile::tempdir().expect("tempdir");
        let disks = vec![disk(root.path(), 1), disk(root.path(), 2)];
        let orphan = disks[1].mount.join("peliculas/Heat/Heat.mkv.partial");
        fs::create_dir_all(orphan.parent().expect("parent")).expect("mkdir");
        fs::write(&orphan, b"half").expect("write");
        fs::write(disks[1].mount.join("peliculas/Heat/Heat.nfo"), b"meta").expect("write");

        let counted = remove_orphaned_temp_files(&disks, &classifier(), true, &CancelToken::new());
        assert_eq!(counted, 1);
        assert!(orphan.exists());

        let removed = remove_orphaned_temp_files(&disks, &classifier(), false, &CancelToken::new());
        assert_eq!(removed, 1);
        assert!(!orphan.exists());
        assert!(disks[1].mount.join("peliculas/Heat/Heat.nfo").exists());
    }

    #[test]
    fn staging_is_kept_only_on_last_disk() {
        let root = tempfile::tempdir().expect("tempdir");
        let disks = vec![disk(root.path(), 1), disk(root.path(), 2)];
        let areas = vec![StagingArea {
            root: PathBuf::from("peliculas/Uploads"),
            subdirs: vec!["Conciertos".to_string(), "Peliculas HD".to_string()],
        }];
        fs::create_dir_all(disks[0].mount.join("peliculas/Uploads/Conciertos")).expect("mkdir");
        fs::create_dir_all(disks[0].mount.join("peliculas/Uploads/Busy")).expect("mkdir");
        fs::write(disks[0].mount.join("peliculas/Uploads/Busy/new.mkv"), b"x").expect("write");

        let mut warnings = Vec::new();
        maintain_staging(&disks, &areas, &classifier(), 3, None, &mut warnings);

        assert!(!disks[0].mount.join("peliculas/Uploads/Conciertos").exists());
        assert!(disks[0].mount.join("peliculas/Uploads/Busy/new.mkv").exists());
        assert!(disks[1].mount.join("peliculas/Uploads/Conciertos").is_dir());
        assert!(disks[1].mount.join("peliculas/Uploads/Peliculas HD").is_dir());
        assert!(warnings.is_empty());
    }
}
