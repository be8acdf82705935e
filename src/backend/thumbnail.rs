// Thumbnail lookup following the freedesktop.org thumbnail specification.
// Generating thumbnails is left to an external service; the model only
// picks up what already sits in the cache.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::{FsError, FsErrorKind, FsResult};

/// Thumbnail size variants according to freedesktop.org spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThumbnailSize {
    #[default]
    Normal, // 128x128
    Large, // 256x256
}

impl ThumbnailSize {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ThumbnailSize::Normal => (128, 128),
            ThumbnailSize::Large => (256, 256),
        }
    }

    pub fn directory_name(&self) -> &'static str {
        match self {
            ThumbnailSize::Normal => "normal",
            ThumbnailSize::Large => "large",
        }
    }
}

/// Gets the thumbnail cache directory for a given size
pub fn cache_dir(size: ThumbnailSize) -> FsResult<PathBuf> {
    let cache_home = std::env::var("XDG_CACHE_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| directories::BaseDirs::new().map(|dirs| dirs.cache_dir().to_path_buf()))
        .ok_or_else(|| FsError::new(FsErrorKind::Failed, "Could not determine XDG_CACHE_HOME"))?;

    Ok(cache_home.join("thumbnails").join(size.directory_name()))
}

/// Thumbnails are named after the MD5 digest of the file URI.
pub fn uri_to_thumbnail_name(uri: &str) -> String {
    format!("{:x}.png", md5::compute(uri.as_bytes()))
}

pub fn thumbnail_path_in(cache_dir: &Path, uri: &str) -> PathBuf {
    cache_dir.join(uri_to_thumbnail_name(uri))
}

/// Existing thumbnail for `uri` that is not older than the file itself.
pub fn lookup_in(cache_dir: &Path, uri: &str, file_mtime: u64) -> Option<PathBuf> {
    let path = thumbnail_path_in(cache_dir, uri);
    let modified = std::fs::metadata(&path).ok()?.modified().ok()?;
    let thumb_mtime = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
    (thumb_mtime >= file_mtime).then_some(path)
}

pub fn lookup(uri: &str, size: ThumbnailSize, file_mtime: u64) -> Option<PathBuf> {
    let dir = cache_dir(size).ok()?;
    lookup_in(&dir, uri, file_mtime)
}
