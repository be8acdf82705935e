//! Bookmarks file handling.
//!
//! One bookmark per line: `URI[ SPACE label]`. Order in the file is the
//! display order. Lines that are not valid UTF-8 are skipped.

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use log::{debug, warn};
use tokio::fs;
use tokio::sync::broadcast;

use crate::error::{FsError, FsErrorKind, FsResult};
use crate::path::FilePath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
    pub uri: String,
    pub name: Option<String>,
}

impl Bookmark {
    pub fn new(uri: impl Into<String>, name: Option<String>) -> Self {
        Self {
            uri: uri.into(),
            name,
        }
    }

    fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            return None;
        }
        let (uri, name) = match line.split_once(' ') {
            Some((uri, label)) => {
                let label = label.trim();
                (uri, (!label.is_empty()).then(|| label.to_string()))
            }
            None => (line, None),
        };
        Some(Self::new(uri, name))
    }

    fn to_line(&self) -> String {
        match &self.name {
            Some(name) => format!("{} {}", self.uri, name),
            None => self.uri.clone(),
        }
    }
}

pub struct BookmarksService {
    bookmarks: Vec<Bookmark>,
    bookmarks_path: PathBuf,
    changed_tx: broadcast::Sender<()>,
}

impl BookmarksService {
    pub fn new() -> Self {
        Self::with_path(default_bookmarks_path())
    }

    pub fn with_path(path: PathBuf) -> Self {
        let (changed_tx, _) = broadcast::channel(16);
        Self {
            bookmarks: Vec::new(),
            bookmarks_path: path,
            changed_tx,
        }
    }

    pub fn path(&self) -> &Path {
        &self.bookmarks_path
    }

    /// Notified after every successful mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changed_tx.subscribe()
    }

    /// Loads bookmarks from the file. A missing file is an empty list.
    pub async fn load(&mut self) -> FsResult<()> {
        self.bookmarks.clear();

        let content = match fs::read(&self.bookmarks_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for (index, raw) in content.split(|b| *b == b'\n').enumerate() {
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line,
                Err(_) => {
                    warn!(
                        "BookmarksService: skipping line {} of {}: not valid UTF-8",
                        index + 1,
                        self.bookmarks_path.display()
                    );
                    continue;
                }
            };
            if let Some(bookmark) = Bookmark::parse_line(line) {
                if !self.has_bookmark(&bookmark.uri) {
                    self.bookmarks.push(bookmark);
                }
            }
        }

        debug!(
            "BookmarksService: loaded {} bookmarks from {}",
            self.bookmarks.len(),
            self.bookmarks_path.display()
        );
        Ok(())
    }

    /// Saves bookmarks to the file, creating its directory when needed.
    pub async fn save(&self) -> FsResult<()> {
        if let Some(parent) = self.bookmarks_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut content = self
            .bookmarks
            .iter()
            .map(Bookmark::to_line)
            .collect::<Vec<_>>()
            .join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        fs::write(&self.bookmarks_path, content).await?;
        Ok(())
    }

    pub fn get_bookmarks(&self) -> Vec<Bookmark> {
        self.bookmarks.clone()
    }

    /// Inserts at `position` (end when `None` or out of range).
    /// Fails with `Exists` for a URI that is already bookmarked.
    pub fn insert_bookmark(
        &mut self,
        path: &FilePath,
        name: Option<String>,
        position: Option<usize>,
    ) -> FsResult<()> {
        let uri = path.as_uri();
        if self.has_bookmark(uri) {
            return Err(FsError::new(
                FsErrorKind::Exists,
                format!("{} is already bookmarked", uri),
            ));
        }
        let index = position
            .filter(|p| *p <= self.bookmarks.len())
            .unwrap_or(self.bookmarks.len());
        self.bookmarks.insert(index, Bookmark::new(uri, name));
        self.notify();
        Ok(())
    }

    pub fn add_bookmark(&mut self, path: &FilePath, name: Option<String>) -> FsResult<()> {
        self.insert_bookmark(path, name, None)
    }

    pub fn remove_bookmark(&mut self, path: &FilePath) -> FsResult<()> {
        let before = self.bookmarks.len();
        self.bookmarks.retain(|b| b.uri != path.as_uri());
        if self.bookmarks.len() == before {
            return Err(FsError::not_found(format!("Bookmark {}", path)));
        }
        self.notify();
        Ok(())
    }

    pub fn rename_bookmark(&mut self, path: &FilePath, name: Option<String>) -> FsResult<()> {
        let bookmark = self
            .bookmarks
            .iter_mut()
            .find(|b| b.uri == path.as_uri())
            .ok_or_else(|| FsError::not_found(format!("Bookmark {}", path)))?;
        bookmark.name = name;
        self.notify();
        Ok(())
    }

    pub fn move_bookmark(&mut self, path: &FilePath, position: usize) -> FsResult<()> {
        let from = self
            .bookmarks
            .iter()
            .position(|b| b.uri == path.as_uri())
            .ok_or_else(|| FsError::not_found(format!("Bookmark {}", path)))?;
        let bookmark = self.bookmarks.remove(from);
        let to = position.min(self.bookmarks.len());
        self.bookmarks.insert(to, bookmark);
        self.notify();
        Ok(())
    }

    pub fn has_bookmark(&self, uri: &str) -> bool {
        self.bookmarks.iter().any(|b| b.uri == uri)
    }

    pub fn get_bookmark(&self, uri: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.uri == uri)
    }

    fn notify(&self) {
        let _ = self.changed_tx.send(());
    }
}

impl Default for BookmarksService {
    fn default() -> Self {
        Self::new()
    }
}

/// `$XDG_CONFIG_HOME/gtk-3.0/bookmarks`, shared with other file choosers.
pub fn default_bookmarks_path() -> PathBuf {
    let config_dir = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| ProjectDirs::from("", "", "").map(|dirs| dirs.config_dir().to_path_buf()))
        .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().join(".config")))
        .unwrap_or_else(|| std::env::temp_dir().join(".config"));

    config_dir.join("gtk-3.0").join("bookmarks")
}
