use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Category, ContentKind};

pub const DEFAULT_SAFETY_BUFFER_BYTES: u64 = 10 * 1024 * 1024 * 1024;
pub const DEFAULT_CLEANUP_PASSES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsolidatorConfig {
    /// Directory holding the `disk<N>` mounts.
    pub mount_root: PathBuf,
    pub disk_prefix: String,
    pub categories: Vec<Category>,
    pub safety_buffer_bytes: u64,
    pub files: FileRules,
    pub ownership: Option<Ownership>,
    pub cleanup_max_passes: usize,
    pub staging: Vec<StagingArea>,
    pub lock_file: PathBuf,
    pub report_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Default for ConsolidatorConfig {
    fn default() -> Self {
        Self {
            mount_root: PathBuf::from("/mnt"),
            disk_prefix: "disk".to_string(),
            categories: default_categories(),
            safety_buffer_bytes: DEFAULT_SAFETY_BUFFER_BYTES,
            files: FileRules::default(),
            ownership: Some(Ownership::default()),
            cleanup_max_passes: DEFAULT_CLEANUP_PASSES,
            staging: default_staging(),
            lock_file: PathBuf::from("/tmp/media-consolidator.lock"),
            report_dir: PathBuf::from("/mnt/user/appdata/media-manager/datos"),
            log_dir: PathBuf::from("/mnt/user/appdata/media-manager/datos"),
        }
    }
}

/// Name-based rules used to classify every file met during a walk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileRules {
    /// Exact file names (case-insensitive) with no media value.
    pub junk_names: Vec<String>,
    /// Extra glob patterns matched against the file name.
    pub junk_patterns: Vec<String>,
    pub upload_suffix: String,
    pub temp_suffix: String,
    pub skip_dir_names: Vec<String>,
    pub video_extensions: Vec<String>,
    pub cover_extensions: Vec<String>,
    pub metadata_extensions: Vec<String>,
    pub subtitle_extensions: Vec<String>,
}

impl Default for FileRules {
    fn default() -> Self {
        Self {
            junk_names: strings(&[
                ".ds_store",
                "thumbs.db",
                "._.ds_store",
                "desktop.ini",
                ".smbdelete",
            ]),
            junk_patterns: Vec::new(),
            upload_suffix: ".upload".to_string(),
            temp_suffix: ".partial".to_string(),
            skip_dir_names: strings(&[".RecycleBin"]),
            video_extensions: strings(&[
                "mp4", "mkv", "avi", "mov", "wmv", "m2ts", "mpg", "m4v", "vob", "ts", "ogm", "flv",
            ]),
            cover_extensions: strings(&["jpg"]),
            metadata_extensions: strings(&["nfo"]),
            subtitle_extensions: strings(&["srt"]),
        }
    }
}

/// Owner and mode applied to directories and files written by a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
    pub dir_mode: u32,
    pub file_mode: u32,
}

impl Default for Ownership {
    fn default() -> Self {
        Self {
            uid: 99,
            gid: 100,
            dir_mode: 0o777,
            file_mode: 0o666,
        }
    }
}

/// Drop-off folders for incoming uploads. They are kept only on the last disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StagingArea {
    pub root: PathBuf,
    #[serde(default)]
    pub subdirs: Vec<String>,
}

fn default_categories() -> Vec<Category> {
    [
        ("Peliculas HD", "peliculas/Peliculas HD", ContentKind::Movies),
        ("Documentales Cine", "peliculas/Documentales", ContentKind::Movies),
        ("Conciertos", "peliculas/Conciertos", ContentKind::Movies),
        ("Series HD", "series/Series HD", ContentKind::Series),
        ("Dibujos", "series/Dibujos", ContentKind::Series),
        ("Documentales Series", "series/Documentales", ContentKind::Series),
    ]
    .into_iter()
    .map(|(name, path, kind)| Category {
        name: name.to_string(),
        relative_path: PathBuf::from(path),
        kind,
    })
    .collect()
}

fn default_staging() -> Vec<StagingArea> {
    vec![
        StagingArea {
            root: PathBuf::from("peliculas/Uploads"),
            subdirs: strings(&["Conciertos", "Documentales", "Peliculas HD"]),
        },
        StagingArea {
            root: PathBuf::from("series/Uploads"),
            subdirs: strings(&["Series HD", "Dibujos", "Documentales"]),
        },
    ]
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl ConsolidatorConfig {
    /// Loads the config from a JSON file, or returns defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                serde_json::from_str::<ConsolidatorConfig>(&text)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => ConsolidatorConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.categories.is_empty() {
            return Err(anyhow!("at least one category must be configured"));
        }
        if self.disk_prefix.trim().is_empty() {
            return Err(anyhow!("disk_prefix must not be empty"));
        }
        if self.cleanup_max_passes == 0 {
            return Err(anyhow!("cleanup_max_passes must be greater than zero"));
        }
        if self.files.temp_suffix.is_empty() || self.files.upload_suffix.is_empty() {
            return Err(anyhow!("temp_suffix and upload_suffix must not be empty"));
        }
        if self.files.temp_suffix == self.files.upload_suffix {
            return Err(anyhow!("temp_suffix and upload_suffix must differ"));
        }

        let mut seen = HashSet::new();
        for category in &self.categories {
            if category.relative_path.is_absolute() {
                return Err(anyhow!(
                    "category '{}' path must be relative to the disk mount",
                    category.name
                ));
            }
            if !seen.insert(category.relative_path.clone()) {
                return Err(anyhow!(
                    "category path {} is configured twice",
                    category.relative_path.display()
                ));
            }
        }
        for area in &self.staging {
            if area.root.is_absolute() {
                return Err(anyhow!(
                    "staging root {} must be relative to the disk mount",
                    area.root.display()
                ));
            }
        }
        Ok(())
    }

    /// Top-level directories of every category path; deep clean sweeps these.
    pub fn category_tops(&self) -> Vec<PathBuf> {
        let mut tops = Vec::new();
        for category in &self.categories {
            if let Some(first) = category.relative_path.components().next() {
                let top = PathBuf::from(first.as_os_str());
                if !tops.contains(&top) {
                    tops.push(top);
                }
            }
        }
        tops
    }
}
