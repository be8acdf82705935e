use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use log::{debug, warn};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::fs;
use tokio::sync::{broadcast, Mutex};

use crate::backend::{BackendEvent, FileSystem};
use crate::cancellable::{self, Cancellable};
use crate::error::{FsError, FsErrorKind, FsResult};
use crate::file_info::{FileInfo, FileType};
use crate::folder::{Folder, FolderSink, ListingFolder};
use crate::metadata::{MimeResolver, FOLDER_MIME_TYPE};
use crate::path::FilePath;
use crate::service::bookmarks::{Bookmark, BookmarksService};
use crate::volume::Volume;

/// Entries published per `FilesAdded` while a directory is being read.
const READ_BATCH: usize = 64;

const DEFAULT_VOLUME_ROOTS: &[&str] = &["/media/", "/run/media/"];

/// `file://` backend over the local disk.
pub struct LocalFileSystem {
    bookmarks: Mutex<BookmarksService>,
    volume_roots: Vec<String>,
    mounts_file: PathBuf,
    event_sender: broadcast::Sender<BackendEvent>,
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self::with_bookmarks(BookmarksService::new())
    }

    pub fn with_bookmarks(bookmarks: BookmarksService) -> Self {
        let (event_sender, _) = broadcast::channel(16);
        Self {
            bookmarks: Mutex::new(bookmarks),
            volume_roots: DEFAULT_VOLUME_ROOTS.iter().map(|s| s.to_string()).collect(),
            mounts_file: PathBuf::from("/proc/self/mounts"),
            event_sender,
        }
    }

    /// Mount points below these prefixes are reported as removable volumes.
    pub fn with_volume_roots(mut self, roots: Vec<String>) -> Self {
        self.volume_roots = roots;
        self
    }

    /// Reads mount points from `path` instead of the process mount table.
    pub fn with_mounts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_file = path.into();
        self
    }

    /// Re-reads the mount table and tells listeners about it.
    pub fn notify_volumes_changed(&self) {
        let _ = self.event_sender.send(BackendEvent::VolumesChanged);
    }

    fn local_path(path: &FilePath) -> FsResult<PathBuf> {
        path.to_local_path().ok_or_else(|| {
            FsError::new(
                FsErrorKind::NotSupported,
                format!("Not a local path: {}", path),
            )
        })
    }

    fn read_mounts(&self) -> Vec<LocalVolume> {
        let content = match std::fs::read_to_string(&self.mounts_file) {
            Ok(content) => content,
            Err(e) => {
                debug!("LocalFileSystem: cannot read {}: {}", self.mounts_file.display(), e);
                return Vec::new();
            }
        };
        content
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .map(unescape_mount_point)
            .filter(|mount_point| self.volume_roots.iter().any(|root| mount_point.starts_with(root.as_str())))
            .filter_map(|mount_point| FilePath::from_local_path(Path::new(&mount_point)).ok())
            .map(LocalVolume::new)
            .collect()
    }
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// `/proc/mounts` escapes blanks as octal sequences.
fn unescape_mount_point(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

/// Stats `path` into a `FileInfo`. Symlinks are followed; dangling ones are
/// reported as links.
pub fn info_for_local_path(path: &Path) -> FsResult<FileInfo> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => std::fs::symlink_metadata(path)?,
    };

    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "/".to_string());
    let file_type = if metadata.is_dir() {
        FileType::Directory
    } else if metadata.is_symlink() {
        FileType::SymbolicLink
    } else if metadata.is_file() {
        FileType::Regular
    } else {
        FileType::Special
    };

    let mut info = FileInfo::for_entry(&name, file_type);
    info.set_size(metadata.len());
    if let Ok(modified) = metadata.modified() {
        if let Ok(duration) = modified.duration_since(UNIX_EPOCH) {
            info.set_modification_time(duration.as_secs());
        }
    }

    let mime_type = if file_type == FileType::Directory {
        FOLDER_MIME_TYPE.to_string()
    } else {
        MimeResolver::guess_mime_type(path)
    };
    info.set_icon(&MimeResolver::get_icon_name(&mime_type));
    info.set_content_type(&mime_type);
    Ok(info)
}

fn watch_folder(dir: PathBuf, sink: FolderSink) -> FsResult<notify::RecommendedWatcher> {
    let watched = dir.clone();
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!("LocalFileSystem: watcher error on {}: {}", watched.display(), e);
                return;
            }
        };
        for path in &event.paths {
            if path == &watched {
                if matches!(event.kind, EventKind::Remove(_)) {
                    sink.deleted();
                }
                continue;
            }
            let Ok(child) = FilePath::from_local_path(path) else {
                continue;
            };
            match event.kind {
                EventKind::Create(_) => {
                    if let Ok(info) = info_for_local_path(path) {
                        sink.add(vec![(child, info)]);
                    }
                }
                EventKind::Modify(_) => match info_for_local_path(path) {
                    Ok(info) if sink.contains(&child) => sink.change(child, info),
                    Ok(info) => sink.add(vec![(child, info)]),
                    Err(_) => sink.remove(vec![child]),
                },
                EventKind::Remove(_) => sink.remove(vec![child]),
                _ => {}
            }
        }
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

async fn read_folder(dir: PathBuf, sink: FolderSink, cancellable: Option<Cancellable>) {
    let mut read_dir = match fs::read_dir(&dir).await {
        Ok(read_dir) => read_dir,
        Err(e) => {
            sink.fail(e.into());
            return;
        }
    };

    let mut batch = Vec::with_capacity(READ_BATCH);
    loop {
        if sink.is_closed() || cancellable.as_ref().is_some_and(|c| c.is_cancelled()) {
            debug!("LocalFileSystem: abandoned listing of {}", dir.display());
            return;
        }
        match read_dir.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                let Ok(child) = FilePath::from_local_path(&path) else {
                    continue;
                };
                match info_for_local_path(&path) {
                    Ok(info) => batch.push((child, info)),
                    Err(e) => debug!("LocalFileSystem: skipping {}: {}", path.display(), e),
                }
                if batch.len() >= READ_BATCH {
                    sink.add(std::mem::take(&mut batch));
                }
            }
            Ok(None) => break,
            Err(e) => {
                sink.fail(e.into());
                return;
            }
        }
    }
    if !batch.is_empty() {
        sink.add(batch);
    }
    sink.finish();
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn get_folder(
        &self,
        path: &FilePath,
        _attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FsResult<Box<dyn Folder>> {
        cancellable::check(cancellable)?;
        let dir = Self::local_path(path)?;
        let metadata = fs::metadata(&dir).await?;
        if !metadata.is_dir() {
            return Err(FsError::new(
                FsErrorKind::NotDirectory,
                format!("{} is not a folder", path),
            ));
        }

        let (mut folder, sink) = ListingFolder::new(path.clone());
        let watcher = watch_folder(dir.clone(), sink.clone())?;
        folder.attach_watcher(Box::new(watcher));

        tokio::spawn(read_folder(dir, sink, cancellable.cloned()));
        Ok(Box::new(folder))
    }

    async fn get_info(
        &self,
        path: &FilePath,
        _attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FsResult<FileInfo> {
        cancellable::check(cancellable)?;
        let local = Self::local_path(path)?;
        tokio::task::spawn_blocking(move || info_for_local_path(&local))
            .await
            .map_err(|e| FsError::new(FsErrorKind::Failed, format!("Join error: {}", e)))?
    }

    async fn create_folder(&self, path: &FilePath, cancellable: Option<&Cancellable>) -> FsResult<()> {
        cancellable::check(cancellable)?;
        let local = Self::local_path(path)?;
        fs::create_dir(&local).await?;
        Ok(())
    }

    fn list_volumes(&self) -> Vec<Arc<dyn Volume>> {
        self.read_mounts()
            .into_iter()
            .map(|volume| Arc::new(volume) as Arc<dyn Volume>)
            .collect()
    }

    async fn list_bookmarks(&self) -> FsResult<Vec<Bookmark>> {
        let mut bookmarks = self.bookmarks.lock().await;
        bookmarks.load().await?;
        Ok(bookmarks.get_bookmarks())
    }

    async fn insert_bookmark(
        &self,
        path: &FilePath,
        label: Option<&str>,
        position: Option<usize>,
    ) -> FsResult<()> {
        let mut bookmarks = self.bookmarks.lock().await;
        bookmarks.load().await?;
        bookmarks.insert_bookmark(path, label.map(str::to_string), position)?;
        bookmarks.save().await?;
        let _ = self.event_sender.send(BackendEvent::BookmarksChanged);
        Ok(())
    }

    async fn remove_bookmark(&self, path: &FilePath) -> FsResult<()> {
        let mut bookmarks = self.bookmarks.lock().await;
        bookmarks.load().await?;
        bookmarks.remove_bookmark(path)?;
        bookmarks.save().await?;
        let _ = self.event_sender.send(BackendEvent::BookmarksChanged);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.event_sender.subscribe()
    }
}

/// A mounted file system found in the mount table.
#[derive(Debug)]
pub struct LocalVolume {
    mount_point: FilePath,
}

impl LocalVolume {
    fn new(mount_point: FilePath) -> Self {
        Self { mount_point }
    }
}

#[async_trait]
impl Volume for LocalVolume {
    fn get_name(&self) -> String {
        self.mount_point.basename()
    }

    fn get_icon(&self) -> String {
        "drive-removable-media".to_string()
    }

    fn get_uuid(&self) -> Option<String> {
        None
    }

    fn get_activation_root(&self) -> FilePath {
        self.mount_point.clone()
    }

    fn is_mounted(&self) -> bool {
        true
    }

    fn is_removable(&self) -> bool {
        true
    }

    fn can_mount(&self) -> bool {
        false
    }

    fn can_eject(&self) -> bool {
        false
    }

    async fn mount(&self, _cancellable: Option<&Cancellable>) -> FsResult<()> {
        Ok(())
    }
}
