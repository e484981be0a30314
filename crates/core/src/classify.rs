use std::collections::HashSet;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::FileRules;
use crate::model::FileKindCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// OS or application artifact, always safe to delete.
    Junk,
    /// Still being uploaded; never counted or moved.
    Upload,
    /// Residue of an interrupted transfer.
    Temp,
    Video,
    Cover,
    Metadata,
    Subtitle,
    Other,
}

impl FileKind {
    pub fn is_media(self) -> bool {
        !matches!(self, FileKind::Junk | FileKind::Upload | FileKind::Temp)
    }
}

#[derive(Debug, Clone)]
pub struct FileClassifier {
    junk_names: HashSet<String>,
    junk_globs: Option<GlobSet>,
    upload_suffix: String,
    temp_suffix: String,
    skip_dir_names: HashSet<String>,
    video: HashSet<String>,
    cover: HashSet<String>,
    metadata: HashSet<String>,
    subtitle: HashSet<String>,
}

impl FileClassifier {
    pub fn new(rules: &FileRules, warnings: &mut Vec<String>) -> Self {
        Self {
            junk_names: lowered(&rules.junk_names),
            junk_globs: build_globset(&rules.junk_patterns, warnings),
            upload_suffix: rules.upload_suffix.clone(),
            temp_suffix: rules.temp_suffix.clone(),
            skip_dir_names: rules.skip_dir_names.iter().cloned().collect(),
            video: extensions(&rules.video_extensions),
            cover: extensions(&rules.cover_extensions),
            metadata: extensions(&rules.metadata_extensions),
            subtitle: extensions(&rules.subtitle_extensions),
        }
    }

    pub fn classify(&self, path: &Path) -> FileKind {
        let Some(name) = path.file_name().map(|name| name.to_string_lossy()) else {
            return FileKind::Other;
        };

        if name.ends_with(&self.temp_suffix) {
            return FileKind::Temp;
        }
        if name.ends_with(&self.upload_suffix) {
            return FileKind::Upload;
        }
        if self.is_junk_name(&name) {
            return FileKind::Junk;
        }

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if self.video.contains(&extension) {
            FileKind::Video
        } else if self.cover.contains(&extension) {
            FileKind::Cover
        } else if self.metadata.contains(&extension) {
            FileKind::Metadata
        } else if self.subtitle.contains(&extension) {
            FileKind::Subtitle
        } else {
            FileKind::Other
        }
    }

    pub fn is_junk(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.is_junk_name(&name.to_string_lossy()))
            .unwrap_or(false)
    }

    pub fn is_temp(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().ends_with(&self.temp_suffix))
            .unwrap_or(false)
    }

    pub fn is_skipped_dir(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.skip_dir_names.contains(name.to_string_lossy().as_ref()))
            .unwrap_or(false)
    }

    fn is_junk_name(&self, name: &str) -> bool {
        if self.junk_names.contains(&name.to_lowercase()) {
            return true;
        }
        self.junk_globs
            .as_ref()
            .is_some_and(|globs| globs.is_match(name))
    }
}

impl FileKindCounts {
    pub fn record(&mut self, kind: FileKind) {
        let slot = match kind {
            FileKind::Video => &mut self.videos,
            FileKind::Cover => &mut self.covers,
            FileKind::Metadata => &mut self.metadata,
            FileKind::Subtitle => &mut self.subtitles,
            FileKind::Other => &mut self.other,
            FileKind::Junk | FileKind::Upload | FileKind::Temp => return,
        };
        *slot = slot.saturating_add(1);
    }
}

fn build_globset(patterns: &[String], warnings: &mut Vec<String>) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => warnings.push(format!("invalid junk pattern '{pattern}': {err}; ignored.")),
        }
    }

    match builder.build() {
        Ok(set) => Some(set),
        Err(err) => {
            warnings.push(format!(
                "failed to compile junk pattern set: {err}; junk patterns disabled."
            ));
            None
        }
    }
}

fn lowered(values: &[String]) -> HashSet<String> {
    values.iter().map(|value| value.to_lowercase()).collect()
}

fn extensions(values: &[String]) -> HashSet<String> {
    values
        .iter()
        .map(|value| value.trim_start_matches('.').to_lowercase())
        .collect()
}
