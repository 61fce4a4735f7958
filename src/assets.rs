use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::debug;

use crate::error::{QuoteclipError, QuoteclipResult};

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];
const VIDEO_EXTS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "m4a", "ogg", "flac"];

/// How a background asset is handled by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
    Audio,
}

/// A resolved asset: an existing file plus its extension-derived kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRef {
    pub path: PathBuf,
    pub kind: AssetKind,
}

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn classify_background(path: &Path) -> Option<AssetKind> {
    let ext = extension_lower(path)?;
    if IMAGE_EXTS.contains(&ext.as_str()) {
        Some(AssetKind::Image)
    } else if VIDEO_EXTS.contains(&ext.as_str()) {
        Some(AssetKind::Video)
    } else {
        None
    }
}

fn classify_music(path: &Path) -> Option<AssetKind> {
    let ext = extension_lower(path)?;
    AUDIO_EXTS.contains(&ext.as_str()).then_some(AssetKind::Audio)
}

/// A validated, non-empty pool of media files from one directory.
#[derive(Clone, Debug)]
pub struct AssetPool {
    label: &'static str,
    entries: Vec<AssetRef>,
}

impl AssetPool {
    fn scan(
        dir: &Path,
        label: &'static str,
        classify: fn(&Path) -> Option<AssetKind>,
    ) -> QuoteclipResult<Self> {
        let read = std::fs::read_dir(dir).map_err(|e| {
            QuoteclipError::asset_pool_empty(format!(
                "{label} directory '{}' is missing or unreadable: {e}",
                dir.display()
            ))
        })?;

        let mut entries = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| {
                QuoteclipError::asset_pool_empty(format!(
                    "failed to list {label} directory '{}': {e}",
                    dir.display()
                ))
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(kind) = classify(&path) {
                entries.push(AssetRef { path, kind });
            }
        }

        if entries.is_empty() {
            return Err(QuoteclipError::asset_pool_empty(format!(
                "no usable {label} files in '{}'",
                dir.display()
            )));
        }

        // Directory listing order is filesystem-dependent; sort so seeded
        // selection is reproducible.
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(label, count = entries.len(), dir = %dir.display(), "scanned asset pool");
        Ok(Self { label, entries })
    }

    pub fn backgrounds(dir: &Path) -> QuoteclipResult<Self> {
        Self::scan(dir, "background", classify_background)
    }

    pub fn music(dir: &Path) -> QuoteclipResult<Self> {
        Self::scan(dir, "music", classify_music)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Uniformly sample one asset. The pool is non-empty by construction.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> &AssetRef {
        let idx = rng.gen_range(0..self.entries.len());
        let picked = &self.entries[idx];
        debug!(label = self.label, path = %picked.path.display(), "picked asset");
        picked
    }
}

/// The two fixed pools a run draws from.
#[derive(Clone, Debug)]
pub struct AssetSelector {
    backgrounds: AssetPool,
    music: AssetPool,
}

impl AssetSelector {
    pub fn from_dirs(background_dir: &Path, music_dir: &Path) -> QuoteclipResult<Self> {
        Ok(Self {
            backgrounds: AssetPool::backgrounds(background_dir)?,
            music: AssetPool::music(music_dir)?,
        })
    }

    pub fn pick_background<R: Rng>(&self, rng: &mut R) -> &AssetRef {
        self.backgrounds.pick(rng)
    }

    pub fn pick_music<R: Rng>(&self, rng: &mut R) -> &AssetRef {
        self.music.pick(rng)
    }
}
