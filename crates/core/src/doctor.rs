use std::env;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sysinfo::Disks;

use crate::config::ConsolidatorConfig;
use crate::disk::{list_disks, SpaceProbe, StatvfsProbe};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorInfo {
    pub os: String,
    pub arch: String,
    pub mount_root: String,
    pub lock_file: String,
    pub report_dir: String,
    pub disks: Vec<DoctorDisk>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorDisk {
    pub id: String,
    pub mount: String,
    pub free_bytes: u64,
    /// Mount point of the filesystem that backs the disk directory, if sysinfo sees one.
    pub backing_mount: Option<String>,
    pub total_bytes: Option<u64>,
    pub file_system: Option<String>,
}

struct MountEntry {
    mount_point: String,
    total_bytes: u64,
    file_system: String,
}

pub fn collect_doctor_info(config: &ConsolidatorConfig) -> Result<DoctorInfo> {
    let found = list_disks(&config.mount_root, &config.disk_prefix)?;
    let mounts = enumerate_mounts();
    let probe = StatvfsProbe;

    let disks = found
        .iter()
        .map(|disk| {
            let backing = backing_mount(&mounts, &disk.mount);
            DoctorDisk {
                id: disk.id.clone(),
                mount: disk.mount.display().to_string(),
                free_bytes: probe.free_space(disk),
                backing_mount: backing.map(|entry| entry.mount_point.clone()),
                total_bytes: backing.map(|entry| entry.total_bytes),
                file_system: backing.map(|entry| entry.file_system.clone()),
            }
        })
        .collect::<Vec<_>>();

    let mut notes = Vec::new();
    if disks.is_empty() {
        notes.push(format!(
            "No {}N directories found under {}; pass --mount-root or set mount_root in the config.",
            config.disk_prefix,
            config.mount_root.display()
        ));
    }
    if disks.len() == 1 {
        notes.push("Only one disk found; nothing can be fragmented.".to_string());
    }
    let shared = disks
        .iter()
        .filter_map(|disk| disk.backing_mount.as_deref())
        .filter(|mount| *mount == "/")
        .count();
    if shared > 1 {
        notes.push(
            "Several disks resolve to the root filesystem; free space is not independent."
                .to_string(),
        );
    }
    if config.ownership.is_none() {
        notes.push("Ownership normalization is disabled.".to_string());
    }

    Ok(DoctorInfo {
        os: env::consts::OS.to_string(),
        arch: env::consts::ARCH.to_string(),
        mount_root: config.mount_root.display().to_string(),
        lock_file: config.lock_file.display().to_string(),
        report_dir: config.report_dir.display().to_string(),
        disks,
        notes,
    })
}

fn enumerate_mounts() -> Vec<MountEntry> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|disk| MountEntry {
            mount_point: disk.mount_point().to_string_lossy().to_string(),
            total_bytes: disk.total_space(),
            file_system: disk.file_system().to_string_lossy().to_string(),
        })
        .collect()
}

fn backing_mount<'a>(mounts: &'a [MountEntry], path: &Path) -> Option<&'a MountEntry> {
    mounts
        .iter()
        .filter(|entry| path.starts_with(&entry.mount_point))
        .max_by_key(|entry| entry.mount_point.len())
}
