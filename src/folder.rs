//! Live per-directory listings handed out by backends.
//!
//! A [`Folder`] answers synchronous questions about what a directory holds
//! right now, and hands out a [`FolderMonitor`] once, through which the
//! backend reports changes. Backends build folders from a
//! [`ListingFolder`]/[`FolderSink`] pair: the sink side mutates the shared
//! listing and publishes the matching [`FolderEvent`].

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::{FsError, FsResult};
use crate::file_info::FileInfo;
use crate::path::FilePath;

#[derive(Debug)]
pub enum FolderEvent {
    FilesAdded(Vec<FilePath>),
    FilesRemoved(Vec<FilePath>),
    FilesChanged(Vec<FilePath>),
    FinishedLoading,
    /// The monitored directory itself went away.
    Deleted,
    /// The listing broke down after the folder was handed out.
    Error(FsError),
}

pub trait Folder: Send + Sync + std::fmt::Debug {
    fn path(&self) -> &FilePath;

    /// Snapshot of the children known so far, in backend order.
    fn list_children(&self) -> FsResult<Vec<FilePath>>;

    /// Cached info of a child of this folder.
    fn get_info(&self, path: &FilePath) -> FsResult<FileInfo>;

    fn is_finished_loading(&self) -> bool;

    /// Hands out the change stream. Only the first call returns `Some`.
    fn take_monitor(&mut self) -> Option<FolderMonitor>;
}

pub struct FolderMonitor {
    receiver: mpsc::UnboundedReceiver<FolderEvent>,
    _watcher: Option<Box<dyn std::any::Any + Send + Sync>>,
}

impl FolderMonitor {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<FolderEvent>,
        watcher: Option<Box<dyn std::any::Any + Send + Sync>>,
    ) -> Self {
        Self {
            receiver,
            _watcher: watcher,
        }
    }

    pub async fn next_event(&mut self) -> Option<FolderEvent> {
        self.receiver.recv().await
    }
}

impl Stream for FolderMonitor {
    type Item = FolderEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FolderEvent>> {
        self.receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for FolderMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderMonitor").finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct ListingState {
    order: Vec<FilePath>,
    infos: HashMap<FilePath, FileInfo>,
    finished: bool,
}

/// Folder backed by a shared in-memory listing.
#[derive(Debug)]
pub struct ListingFolder {
    path: FilePath,
    state: Arc<RwLock<ListingState>>,
    monitor: Option<FolderMonitor>,
}

/// Writer side of a [`ListingFolder`].
#[derive(Debug, Clone)]
pub struct FolderSink {
    path: FilePath,
    state: Arc<RwLock<ListingState>>,
    sender: mpsc::UnboundedSender<FolderEvent>,
}

impl ListingFolder {
    /// Creates a folder and the sink that feeds it.
    pub fn new(path: FilePath) -> (Self, FolderSink) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(ListingState::default()));
        let folder = Self {
            path: path.clone(),
            state: state.clone(),
            monitor: Some(FolderMonitor::new(receiver, None)),
        };
        let sink = FolderSink {
            path,
            state,
            sender,
        };
        (folder, sink)
    }

    /// Keeps `watcher` alive for as long as the monitor is.
    pub fn attach_watcher(&mut self, watcher: Box<dyn std::any::Any + Send + Sync>) {
        if let Some(monitor) = self.monitor.as_mut() {
            monitor._watcher = Some(watcher);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ListingState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(e) => e.into_inner(),
        }
    }
}

impl Folder for ListingFolder {
    fn path(&self) -> &FilePath {
        &self.path
    }

    fn list_children(&self) -> FsResult<Vec<FilePath>> {
        Ok(self.read().order.clone())
    }

    fn get_info(&self, path: &FilePath) -> FsResult<FileInfo> {
        self.read()
            .infos
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::not_found(path))
    }

    fn is_finished_loading(&self) -> bool {
        self.read().finished
    }

    fn take_monitor(&mut self) -> Option<FolderMonitor> {
        self.monitor.take()
    }
}

impl FolderSink {
    pub fn path(&self) -> &FilePath {
        &self.path
    }

    /// True once the folder and its monitor have both been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn write(&self) -> RwLockWriteGuard<'_, ListingState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(e) => e.into_inner(),
        }
    }

    fn send(&self, event: FolderEvent) {
        // A closed channel only means nobody listens any more.
        let _ = self.sender.send(event);
    }

    /// Adds or replaces entries. New paths are reported as added, known
    /// ones as changed.
    pub fn add(&self, entries: Vec<(FilePath, FileInfo)>) {
        let mut added = Vec::new();
        let mut changed = Vec::new();
        {
            let mut state = self.write();
            for (path, info) in entries {
                if state.infos.insert(path.clone(), info).is_some() {
                    changed.push(path);
                } else {
                    state.order.push(path.clone());
                    added.push(path);
                }
            }
        }
        if !added.is_empty() {
            self.send(FolderEvent::FilesAdded(added));
        }
        if !changed.is_empty() {
            self.send(FolderEvent::FilesChanged(changed));
        }
    }

    /// Fills the listing without publishing events; for the state a folder
    /// already has when it is handed out.
    pub fn preload(&self, entries: Vec<(FilePath, FileInfo)>, finished: bool) {
        let mut state = self.write();
        for (path, info) in entries {
            if state.infos.insert(path.clone(), info).is_none() {
                state.order.push(path);
            }
        }
        state.finished = finished;
    }

    pub fn remove(&self, paths: Vec<FilePath>) {
        let removed: Vec<FilePath> = {
            let mut state = self.write();
            let removed: Vec<FilePath> = paths
                .into_iter()
                .filter(|p| state.infos.remove(p).is_some())
                .collect();
            state.order.retain(|p| !removed.contains(p));
            removed
        };
        if !removed.is_empty() {
            self.send(FolderEvent::FilesRemoved(removed));
        }
    }

    pub fn change(&self, path: FilePath, info: FileInfo) {
        let known = {
            let mut state = self.write();
            match state.infos.get_mut(&path) {
                Some(slot) => {
                    *slot = info;
                    true
                }
                None => false,
            }
        };
        if known {
            self.send(FolderEvent::FilesChanged(vec![path]));
        }
    }

    pub fn finish(&self) {
        self.write().finished = true;
        self.send(FolderEvent::FinishedLoading);
    }

    pub fn deleted(&self) {
        self.send(FolderEvent::Deleted);
    }

    pub fn fail(&self, error: FsError) {
        self.send(FolderEvent::Error(error));
    }

    pub fn contains(&self, path: &FilePath) -> bool {
        match self.state.read() {
            Ok(state) => state.infos.contains_key(path),
            Err(e) => e.into_inner().infos.contains_key(path),
        }
    }
}
