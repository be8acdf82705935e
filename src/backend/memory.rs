//! Scriptable in-memory backend.
//!
//! Holds a map of entries keyed by path. Mutations made through the public
//! helpers are published to every folder currently handed out for the
//! affected directory, so tests and demos can drive live changes, failures
//! and slow transports deterministically.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::broadcast;

use crate::backend::{BackendEvent, FileSystem};
use crate::cancellable::{self, Cancellable};
use crate::error::{FsError, FsErrorKind, FsResult};
use crate::file_info::{FileInfo, FileType};
use crate::folder::{Folder, FolderSink, ListingFolder};
use crate::metadata::{MimeResolver, FOLDER_MIME_TYPE};
use crate::path::FilePath;
use crate::service::bookmarks::Bookmark;
use crate::volume::Volume;

#[derive(Debug, Clone)]
struct Entry {
    parent: Option<FilePath>,
    info: FileInfo,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<FilePath, Entry>,
    sinks: HashMap<FilePath, Vec<FolderSink>>,
    failures: HashMap<FilePath, FsErrorKind>,
    delay: Duration,
    streaming: bool,
    volumes: Vec<Arc<MemoryVolume>>,
    bookmarks: Vec<Bookmark>,
    started: usize,
    cancelled: usize,
}

impl MemoryState {
    fn children_of(&self, folder: &FilePath) -> Vec<(FilePath, FileInfo)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.parent.as_ref() == Some(folder))
            .map(|(path, entry)| (path.clone(), entry.info.clone()))
            .collect()
    }

    fn live_sinks(&mut self, folder: &FilePath) -> Vec<FolderSink> {
        match self.sinks.get_mut(folder) {
            Some(sinks) => {
                sinks.retain(|sink| !sink.is_closed());
                sinks.clone()
            }
            None => Vec::new(),
        }
    }

    fn insert(&mut self, parent: Option<FilePath>, path: FilePath, info: FileInfo) {
        let known = self.entries.contains_key(&path);
        self.entries.insert(
            path.clone(),
            Entry {
                parent: parent.clone(),
                info: info.clone(),
            },
        );
        let Some(parent) = parent else {
            return;
        };
        for sink in self.live_sinks(&parent) {
            if known {
                sink.change(path.clone(), info.clone());
            } else {
                sink.add(vec![(path.clone(), info.clone())]);
            }
        }
    }

    fn ensure_folder(&mut self, path: &FilePath) {
        if self.entries.contains_key(path) {
            return;
        }
        let parent = path.parent();
        if let Some(parent) = &parent {
            self.ensure_folder(parent);
        }
        self.insert(parent, path.clone(), folder_info(path));
    }
}

fn folder_info(path: &FilePath) -> FileInfo {
    let mut info = FileInfo::for_entry(&path.basename(), FileType::Directory);
    info.set_content_type(FOLDER_MIME_TYPE);
    info.set_icon(&MimeResolver::get_icon_name(FOLDER_MIME_TYPE));
    info
}

fn file_info(path: &FilePath, size: u64) -> FileInfo {
    let name = path.basename();
    let mime_type = MimeResolver::guess_for_name(&name);
    let mut info = FileInfo::for_entry(&name, FileType::Regular);
    info.set_size(size);
    info.set_icon(&MimeResolver::get_icon_name(&mime_type));
    info.set_content_type(&mime_type);
    info
}

/// In-memory [`FileSystem`] for tests and demos.
#[derive(Clone)]
pub struct MemoryFileSystem {
    state: Arc<Mutex<MemoryState>>,
    event_sender: broadcast::Sender<BackendEvent>,
}

impl MemoryFileSystem {
    /// A backend holding only `file:///`.
    pub fn new() -> Self {
        let (event_sender, _) = broadcast::channel(64);
        let fs = Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            event_sender,
        };
        if let Ok(root) = FilePath::parse("file:///") {
            fs.lock().ensure_folder(&root);
        }
        fs
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(e) => {
                warn!("MemoryFileSystem: recovering poisoned lock: {}", e);
                e.into_inner()
            }
        }
    }

    /// Creates a folder, and any missing parents.
    pub fn add_folder(&self, uri: &str) -> FsResult<FilePath> {
        let path = FilePath::parse(uri)?;
        self.lock().ensure_folder(&path);
        Ok(path)
    }

    pub fn add_file(&self, uri: &str, size: u64) -> FsResult<FilePath> {
        let path = FilePath::parse(uri)?;
        let info = file_info(&path, size);
        self.add_entry_with_info(path.parent(), path.clone(), info);
        Ok(path)
    }

    /// Adds a folder listed under `parent` even when the URIs do not nest,
    /// e.g. a remote device under a protocol root.
    pub fn add_child_folder(&self, parent_uri: &str, uri: &str) -> FsResult<FilePath> {
        let parent = FilePath::parse(parent_uri)?;
        let path = FilePath::parse(uri)?;
        let mut state = self.lock();
        state.ensure_folder(&parent);
        let info = folder_info(&path);
        state.insert(Some(parent), path.clone(), info);
        Ok(path)
    }

    /// Adds or replaces an entry verbatim. Parents are created as folders.
    pub fn add_entry_with_info(&self, parent: Option<FilePath>, path: FilePath, info: FileInfo) {
        let mut state = self.lock();
        if let Some(parent) = &parent {
            state.ensure_folder(parent);
        }
        state.insert(parent, path, info);
    }

    /// Replaces the info of an existing entry and reports the change.
    pub fn modify(&self, uri: &str, info: FileInfo) -> FsResult<()> {
        let path = FilePath::parse(uri)?;
        let mut state = self.lock();
        let parent = match state.entries.get(&path) {
            Some(entry) => entry.parent.clone(),
            None => return Err(FsError::not_found(&path)),
        };
        state.insert(parent, path, info);
        Ok(())
    }

    /// Removes an entry with everything below it. Open folders on removed
    /// directories report `Deleted`.
    pub fn remove(&self, uri: &str) -> FsResult<()> {
        let path = FilePath::parse(uri)?;
        let mut state = self.lock();
        let Some(entry) = state.entries.remove(&path) else {
            return Err(FsError::not_found(&path));
        };

        let mut doomed = vec![path.clone()];
        let mut index = 0;
        while index < doomed.len() {
            let current = doomed[index].clone();
            let below: Vec<FilePath> = state
                .entries
                .iter()
                .filter(|(_, e)| e.parent.as_ref() == Some(&current))
                .map(|(p, _)| p.clone())
                .collect();
            for child in below {
                state.entries.remove(&child);
                doomed.push(child);
            }
            index += 1;
        }

        for gone in &doomed {
            if let Some(sinks) = state.sinks.remove(gone) {
                for sink in sinks {
                    sink.deleted();
                }
            }
        }
        if let Some(parent) = entry.parent {
            for sink in state.live_sinks(&parent) {
                sink.remove(vec![path.clone()]);
            }
        }
        Ok(())
    }

    /// Makes `get_folder` and `get_info` on `uri` fail with `kind`.
    pub fn fail_path(&self, uri: &str, kind: FsErrorKind) -> FsResult<()> {
        let path = FilePath::parse(uri)?;
        self.lock().failures.insert(path, kind);
        Ok(())
    }

    pub fn clear_failure(&self, uri: &str) -> FsResult<()> {
        let path = FilePath::parse(uri)?;
        self.lock().failures.remove(&path);
        Ok(())
    }

    /// Breaks every open listing of `uri` with an error of `kind`.
    pub fn break_folder(&self, uri: &str, kind: FsErrorKind) -> FsResult<()> {
        let path = FilePath::parse(uri)?;
        let mut state = self.lock();
        for sink in state.live_sinks(&path) {
            sink.fail(FsError::new(kind, format!("{} broke down", path)));
        }
        Ok(())
    }

    /// Latency applied to each `get_folder`.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// When set, folders are handed out empty and filled from a task,
    /// the way a slow transport delivers them.
    pub fn set_streaming(&self, streaming: bool) {
        self.lock().streaming = streaming;
    }

    pub fn started_operations(&self) -> usize {
        self.lock().started
    }

    pub fn cancelled_operations(&self) -> usize {
        self.lock().cancelled
    }

    /// Number of folders currently handed out for `uri`.
    pub fn open_folders(&self, uri: &str) -> usize {
        match FilePath::parse(uri) {
            Ok(path) => self.lock().live_sinks(&path).len(),
            Err(_) => 0,
        }
    }

    pub fn add_volume(&self, name: &str, root_uri: &str, mounted: bool) -> FsResult<Arc<MemoryVolume>> {
        let root = FilePath::parse(root_uri)?;
        let volume = Arc::new(MemoryVolume::new(name, root.clone(), mounted));
        {
            let mut state = self.lock();
            state.volumes.retain(|v| v.root != root);
            state.volumes.push(volume.clone());
            if mounted {
                state.ensure_folder(&root);
            }
        }
        let _ = self.event_sender.send(BackendEvent::VolumesChanged);
        Ok(volume)
    }

    /// Unplugs the volume rooted at `root_uri`; its contents disappear.
    pub fn remove_volume(&self, root_uri: &str) -> FsResult<()> {
        let root = FilePath::parse(root_uri)?;
        {
            let mut state = self.lock();
            let before = state.volumes.len();
            state.volumes.retain(|v| v.root != root);
            if state.volumes.len() == before {
                return Err(FsError::not_found(&root));
            }
        }
        if let Err(e) = self.remove(root_uri) {
            debug!("MemoryFileSystem: volume root already gone: {}", e);
        }
        let _ = self.event_sender.send(BackendEvent::VolumesChanged);
        Ok(())
    }

    fn check_failure(&self, path: &FilePath) -> FsResult<()> {
        match self.lock().failures.get(path) {
            Some(kind) => Err(FsError::new(*kind, format!("Injected failure on {}", path))),
            None => Ok(()),
        }
    }

    fn note_cancelled(&self) -> FsError {
        self.lock().cancelled += 1;
        FsError::cancelled()
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn get_folder(
        &self,
        path: &FilePath,
        _attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FsResult<Box<dyn Folder>> {
        let delay = {
            let mut state = self.lock();
            state.started += 1;
            state.delay
        };
        if cancellable::check(cancellable).is_err() {
            return Err(self.note_cancelled());
        }

        if !delay.is_zero() {
            match cancellable {
                Some(c) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = c.cancelled() => return Err(self.note_cancelled()),
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
        self.check_failure(path)?;

        let mut state = self.lock();
        let is_folder = match state.entries.get(path) {
            Some(entry) => entry.info.is_folder(),
            None => return Err(FsError::not_found(path)),
        };
        if !is_folder {
            return Err(FsError::new(
                FsErrorKind::NotDirectory,
                format!("{} is not a folder", path),
            ));
        }

        let (folder, sink) = ListingFolder::new(path.clone());
        let children = state.children_of(path);
        if state.streaming {
            let feeder = sink.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                feeder.add(children);
                feeder.finish();
            });
        } else {
            sink.preload(children, true);
        }
        state.sinks.entry(path.clone()).or_default().push(sink);
        Ok(Box::new(folder))
    }

    async fn get_info(
        &self,
        path: &FilePath,
        _attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FsResult<FileInfo> {
        cancellable::check(cancellable)?;
        self.check_failure(path)?;
        self.lock()
            .entries
            .get(path)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| FsError::not_found(path))
    }

    async fn create_folder(&self, path: &FilePath, cancellable: Option<&Cancellable>) -> FsResult<()> {
        cancellable::check(cancellable)?;
        self.check_failure(path)?;
        let mut state = self.lock();
        if state.entries.contains_key(path) {
            return Err(FsError::new(FsErrorKind::Exists, format!("{} already exists", path)));
        }
        let parent = path
            .parent()
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidArg, "Cannot create a root folder"))?;
        match state.entries.get(&parent) {
            Some(entry) if entry.info.is_folder() => {}
            Some(_) => {
                return Err(FsError::new(
                    FsErrorKind::NotDirectory,
                    format!("{} is not a folder", parent),
                ))
            }
            None => return Err(FsError::not_found(&parent)),
        }
        state.insert(Some(parent), path.clone(), folder_info(path));
        Ok(())
    }

    async fn mount_volume(
        &self,
        volume: &Arc<dyn Volume>,
        cancellable: Option<&Cancellable>,
    ) -> FsResult<()> {
        volume.mount(cancellable).await?;
        self.lock().ensure_folder(&volume.get_activation_root());
        let _ = self.event_sender.send(BackendEvent::VolumesChanged);
        Ok(())
    }

    fn list_volumes(&self) -> Vec<Arc<dyn Volume>> {
        self.lock()
            .volumes
            .iter()
            .map(|v| v.clone() as Arc<dyn Volume>)
            .collect()
    }

    async fn list_bookmarks(&self) -> FsResult<Vec<Bookmark>> {
        Ok(self.lock().bookmarks.clone())
    }

    async fn insert_bookmark(
        &self,
        path: &FilePath,
        label: Option<&str>,
        position: Option<usize>,
    ) -> FsResult<()> {
        {
            let mut state = self.lock();
            if state.bookmarks.iter().any(|b| b.uri == path.as_uri()) {
                return Err(FsError::new(
                    FsErrorKind::Exists,
                    format!("{} is already bookmarked", path),
                ));
            }
            let index = position
                .filter(|p| *p <= state.bookmarks.len())
                .unwrap_or(state.bookmarks.len());
            state
                .bookmarks
                .insert(index, Bookmark::new(path.as_uri(), label.map(str::to_string)));
        }
        let _ = self.event_sender.send(BackendEvent::BookmarksChanged);
        Ok(())
    }

    async fn remove_bookmark(&self, path: &FilePath) -> FsResult<()> {
        {
            let mut state = self.lock();
            let before = state.bookmarks.len();
            state.bookmarks.retain(|b| b.uri != path.as_uri());
            if state.bookmarks.len() == before {
                return Err(FsError::not_found(format!("Bookmark {}", path)));
            }
        }
        let _ = self.event_sender.send(BackendEvent::BookmarksChanged);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.event_sender.subscribe()
    }
}

/// Volume living in a [`MemoryFileSystem`].
#[derive(Debug)]
pub struct MemoryVolume {
    name: String,
    root: FilePath,
    mounted: AtomicBool,
    mount_error: Mutex<Option<FsErrorKind>>,
}

impl MemoryVolume {
    fn new(name: &str, root: FilePath, mounted: bool) -> Self {
        Self {
            name: name.to_string(),
            root,
            mounted: AtomicBool::new(mounted),
            mount_error: Mutex::new(None),
        }
    }

    /// Makes the next mount attempts fail with `kind`.
    pub fn fail_mount(&self, kind: Option<FsErrorKind>) {
        match self.mount_error.lock() {
            Ok(mut slot) => *slot = kind,
            Err(e) => *e.into_inner() = kind,
        }
    }

    fn mount_error(&self) -> Option<FsErrorKind> {
        match self.mount_error.lock() {
            Ok(slot) => *slot,
            Err(e) => *e.into_inner(),
        }
    }
}

#[async_trait]
impl Volume for MemoryVolume {
    fn get_name(&self) -> String {
        self.name.clone()
    }

    fn get_icon(&self) -> String {
        "drive-removable-media".to_string()
    }

    fn get_uuid(&self) -> Option<String> {
        None
    }

    fn get_activation_root(&self) -> FilePath {
        self.root.clone()
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn is_removable(&self) -> bool {
        true
    }

    fn can_mount(&self) -> bool {
        !self.is_mounted()
    }

    fn can_eject(&self) -> bool {
        true
    }

    async fn mount(&self, cancellable: Option<&Cancellable>) -> FsResult<()> {
        cancellable::check(cancellable)?;
        if let Some(kind) = self.mount_error() {
            return Err(FsError::new(kind, format!("Cannot mount {}", self.name)));
        }
        self.mounted.store(true, Ordering::SeqCst);
        Ok(())
    }
}
