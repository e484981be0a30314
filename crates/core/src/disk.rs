use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::model::{Disk, DiskSnapshot};

/// Live free-space source. Values are re-read on every call, never cached.
pub trait SpaceProbe {
    fn free_space(&self, disk: &Disk) -> u64;
}

/// Reads available space from the filesystem backing the disk mount.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsProbe;

impl SpaceProbe for StatvfsProbe {
    fn free_space(&self, disk: &Disk) -> u64 {
        match fs2::available_space(&disk.mount) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(
                    "could not stat free space on {} ({}): {}; treating as full",
                    disk.id,
                    disk.mount.display(),
                    err
                );
                0
            }
        }
    }
}

/// Fixed free-space values keyed by disk id. Unknown disks report zero.
#[derive(Debug, Default, Clone)]
pub struct FixedSpaceProbe {
    free: HashMap<String, u64>,
}

impl FixedSpaceProbe {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        Self {
            free: entries
                .into_iter()
                .map(|(id, bytes)| (id.into(), bytes))
                .collect(),
        }
    }
}

impl SpaceProbe for FixedSpaceProbe {
    fn free_space(&self, disk: &Disk) -> u64 {
        self.free.get(&disk.id).copied().unwrap_or(0)
    }
}

/// Lists `<prefix><N>` directories under `mount_root`, ordered by `N`.
pub fn list_disks(mount_root: &Path, prefix: &str) -> Result<Vec<Disk>> {
    let entries = match fs::read_dir(mount_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| {
                format!("failed to list mount root {}", mount_root.display())
            })
        }
    };

    let mut disks = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to read entry under {}", mount_root.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(index) = parse_disk_index(&name, prefix) else {
            continue;
        };
        if !entry.path().is_dir() {
            continue;
        }
        disks.push(Disk {
            id: name,
            index,
            mount: entry.path(),
        });
    }

    disks.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.id.cmp(&b.id)));
    Ok(disks)
}

fn parse_disk_index(name: &str, prefix: &str) -> Option<u32> {
    let suffix = name.strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

pub fn snapshot_disks(disks: &[Disk], probe: &dyn SpaceProbe) -> Vec<DiskSnapshot> {
    disks
        .iter()
        .map(|disk| DiskSnapshot {
            id: disk.id.clone(),
            mount: disk.mount.to_string_lossy().to_string(),
            free_bytes: probe.free_space(disk),
        })
        .collect()
}
