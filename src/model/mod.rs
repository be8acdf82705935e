//! Lazily loaded tree model over a [`FileSystem`].
//!
//! The model owns an arena of [`ModelNode`]s mirroring the backend
//! hierarchy. Backend work runs in spawned tasks that only ever post
//! [`ModelMessage`]s to the model's inbox; the tree is mutated solely by
//! the owner through `&mut self`, one message at a time. Each node owns at
//! most one backend operation, tagged with a token: results carrying an
//! outdated token are dropped.
//!
//! Loading is driven by reads: asking for the display name, icon or
//! children of a folder starts listing it. Callers that need a result
//! synchronously use [`FileSystemModel::load_path`],
//! [`FileSystemModel::wait_loaded`] or [`FileSystemModel::run_until`],
//! which process inbox messages until the condition holds or time runs out.

pub mod arena;
pub mod event;
mod hotplug;
mod link;
pub mod naming;
pub mod node;
pub mod tree;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{thumbnail, BackendEvent, FileSystem};
use crate::config::ModelConfig;
use crate::error::{FsError, FsErrorKind, FsResult};
use crate::folder::{Folder, FolderEvent};
use crate::location::{LocationKind, SpecialLocation};
use crate::path::FilePath;
use crate::platform::{PlatformSettings, PlatformState};
use crate::service::bookmarks::Bookmark;
use crate::volume::Volume;

pub use arena::NodeId;
pub use event::{ModelEvent, ObserverId};
pub use node::{ModelNode, NodeState};
pub use tree::{Column, ColumnType, TreeIter, TreeModel, TreePath, Value};

use arena::Arena;
use event::EventHub;

/// Global presentation options. Changing them invalidates every cached
/// column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationSettings {
    pub clock_24h: bool,
    pub icon_theme: Option<String>,
}

impl Default for PresentationSettings {
    fn default() -> Self {
        Self {
            clock_24h: true,
            icon_theme: None,
        }
    }
}

pub(crate) enum ModelMessage {
    FolderReady {
        node: NodeId,
        token: u64,
        result: FsResult<Box<dyn Folder>>,
    },
    Folder {
        node: NodeId,
        token: u64,
        event: FolderEvent,
    },
    /// Deferred part of a batched add.
    ContinueAdds {
        node: NodeId,
        token: u64,
    },
    Backend(BackendEvent),
    PlatformChanged,
}

pub struct FileSystemModel {
    backend: Arc<dyn FileSystem>,
    runtime: Handle,
    config: ModelConfig,
    platform: PlatformSettings,
    presentation: PresentationSettings,
    nodes: Arena<ModelNode>,
    root: NodeId,
    stamp: u64,
    next_token: u64,
    inbox_tx: mpsc::UnboundedSender<ModelMessage>,
    inbox_rx: mpsc::UnboundedReceiver<ModelMessage>,
    events: EventHub,
    volumes: Vec<Arc<dyn Volume>>,
    thumbnail_dir: Option<PathBuf>,
    root_scan_done: bool,
    tasks: Vec<JoinHandle<()>>,
}

impl FileSystemModel {
    /// Model with the default configuration and settings that are
    /// already known. Must be called inside a tokio runtime.
    pub fn new(backend: Arc<dyn FileSystem>) -> FsResult<Self> {
        Self::with_config(
            backend,
            ModelConfig::default(),
            PlatformSettings::ready_with(PlatformState::default()),
        )
    }

    pub fn with_config(
        backend: Arc<dyn FileSystem>,
        config: ModelConfig,
        platform: PlatformSettings,
    ) -> FsResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            FsError::with_source(FsErrorKind::Failed, "FileSystemModel needs a tokio runtime", Box::new(e))
        })?;
        let root_path = config.root_path()?;
        let root_location = SpecialLocation::new(root_path.clone(), LocationKind::Root, platform.clone())
            .with_title(config.root_title.clone());
        let mut root_node = ModelNode::new(root_path, None, None, Some(root_location), false);
        root_node.grafted = true;

        let mut nodes = Arena::new();
        let root = nodes.insert(root_node);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let volumes = backend.list_volumes();

        let mut model = Self {
            backend,
            runtime,
            config,
            platform,
            presentation: PresentationSettings::default(),
            nodes,
            root,
            stamp: 1,
            next_token: 0,
            inbox_tx,
            inbox_rx,
            events: EventHub::new(),
            volumes,
            thumbnail_dir: thumbnail::cache_dir(thumbnail::ThumbnailSize::Normal).ok(),
            root_scan_done: false,
            tasks: Vec::new(),
        };

        for spec in model.config.locations.clone() {
            let path = spec.path()?;
            let mut location = SpecialLocation::from_spec(&spec, path.clone(), model.platform.clone());
            location.volumes_changed(&model.volumes);
            model.graft(path, location);
        }
        model.graft_new_volumes();
        model.spawn_forwarders();

        model.link_node(root);
        let eager: Vec<NodeId> = model.nodes.get(root).map(|n| n.children.clone()).unwrap_or_default();
        for id in eager {
            model.link_if_wanted(id);
        }
        Ok(model)
    }

    fn spawn_forwarders(&mut self) {
        let mut backend_events = self.backend.subscribe();
        let tx = self.inbox_tx.clone();
        self.tasks.push(self.runtime.spawn(async move {
            loop {
                let event = match backend_events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!("FileSystemModel: missed {} backend events, resyncing", missed);
                        BackendEvent::VolumesChanged
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if tx.send(ModelMessage::Backend(event)).is_err() {
                    break;
                }
            }
        }));

        let mut platform_events = self.platform.subscribe();
        let tx = self.inbox_tx.clone();
        self.tasks.push(self.runtime.spawn(async move {
            while platform_events.changed().await.is_ok() {
                if tx.send(ModelMessage::PlatformChanged).is_err() {
                    break;
                }
            }
        }));
    }

    /// Inserts a model-owned child of the root.
    fn graft(&mut self, path: FilePath, location: SpecialLocation) -> Option<NodeId> {
        let root = self.root;
        let mut node = ModelNode::new(path, Some(root), None, Some(location), false);
        node.grafted = true;
        self.insert_child(root, node)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn platform(&self) -> &PlatformSettings {
        &self.platform
    }

    pub fn backend(&self) -> &Arc<dyn FileSystem> {
        &self.backend
    }

    pub fn presentation(&self) -> &PresentationSettings {
        &self.presentation
    }

    /// Where thumbnails are looked up; `None` disables the column.
    pub fn set_thumbnail_dir(&mut self, dir: Option<PathBuf>) {
        self.thumbnail_dir = dir;
        self.invalidate_all();
    }

    pub fn set_presentation(&mut self, settings: PresentationSettings) {
        if settings == self.presentation {
            return;
        }
        debug!("FileSystemModel: presentation settings changed");
        self.presentation = settings;
        self.invalidate_all();
    }

    fn invalidate_all(&mut self) {
        for id in self.preorder(self.root) {
            if let Some(node) = self.nodes.get_mut(id) {
                node.caches.invalidate();
            }
            self.emit_row_changed(id);
        }
    }

    // Observers

    pub fn connect(&mut self, observer: impl FnMut(&ModelEvent) + 'static) -> ObserverId {
        self.events.connect(observer)
    }

    pub fn disconnect(&mut self, id: ObserverId) -> bool {
        self.events.disconnect(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.events.subscribe()
    }

    // Node access

    pub fn root_iter(&self) -> TreeIter {
        self.iter_for(self.root)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, iter: &TreeIter) -> Option<&ModelNode> {
        self.resolve(iter).and_then(|id| self.nodes.get(id))
    }

    pub fn node_state(&self, iter: &TreeIter) -> Option<NodeState> {
        self.node(iter).map(ModelNode::state)
    }

    pub fn node_path(&self, iter: &TreeIter) -> Option<FilePath> {
        self.node(iter).map(|n| n.path.clone())
    }

    pub fn children(&self, iter: &TreeIter) -> Vec<TreeIter> {
        self.node(iter)
            .map(|n| n.children.iter().map(|c| self.iter_for(*c)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn iter_for(&self, id: NodeId) -> TreeIter {
        TreeIter {
            stamp: self.stamp,
            node: id,
        }
    }

    pub(crate) fn resolve(&self, iter: &TreeIter) -> Option<NodeId> {
        (iter.stamp == self.stamp && self.nodes.contains(iter.node)).then_some(iter.node)
    }

    pub(crate) fn tree_path(&self, id: NodeId) -> Option<TreePath> {
        let mut indices = Vec::new();
        let mut current = id;
        loop {
            let node = self.nodes.get(current)?;
            match node.parent {
                Some(parent) => {
                    let siblings = &self.nodes.get(parent)?.children;
                    indices.push(siblings.iter().position(|c| *c == current)?);
                    current = parent;
                }
                None => {
                    indices.push(0);
                    break;
                }
            }
        }
        indices.reverse();
        Some(TreePath::new(indices))
    }

    /// `id` and everything below it, parents first.
    pub(crate) fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.get(current) {
                order.push(current);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    pub(crate) fn emit_row_changed(&mut self, id: NodeId) {
        if let Some(path) = self.tree_path(id) {
            let iter = self.iter_for(id);
            self.events.emit(ModelEvent::RowChanged { path, iter });
        }
    }

    /// Adds `node` as the last child of `parent` and announces it.
    pub(crate) fn insert_child(&mut self, parent: NodeId, node: ModelNode) -> Option<NodeId> {
        if !self.nodes.contains(parent) {
            return None;
        }
        let id = self.nodes.insert(node);
        let first = {
            let parent_node = self.nodes.get_mut(parent)?;
            parent_node.children.push(id);
            parent_node.children.len() == 1
        };
        if let Some(path) = self.tree_path(id) {
            let iter = self.iter_for(id);
            self.events.emit(ModelEvent::RowInserted { path, iter });
        }
        if first {
            if let Some(path) = self.tree_path(parent) {
                let iter = self.iter_for(parent);
                self.events.emit(ModelEvent::RowHasChildToggled { path, iter });
            }
            // Visibility of needs-children locations flips with the first child.
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.caches.invalidate();
            }
            self.emit_row_changed(parent);
        }
        Some(id)
    }

    /// Direct child of `parent` keyed by `path`.
    pub(crate) fn find_child(&self, parent: NodeId, path: &FilePath) -> Option<NodeId> {
        let parent = self.nodes.get(parent)?;
        parent
            .children
            .iter()
            .copied()
            .find(|c| self.nodes.get(*c).is_some_and(|n| &n.path == path))
    }

    /// Child of `parent` on the way to `target`, the most specific first.
    fn child_towards(&self, parent: NodeId, target: &FilePath) -> Option<NodeId> {
        let parent = self.nodes.get(parent)?;
        parent
            .children
            .iter()
            .filter_map(|c| self.nodes.get(*c).map(|n| (*c, n)))
            .filter(|(_, n)| n.path.contains(target))
            .max_by_key(|(_, n)| n.path.as_uri().len())
            .map(|(id, _)| id)
    }

    fn find_node(&self, path: &FilePath) -> Option<NodeId> {
        let mut current = self.root;
        loop {
            if &self.nodes.get(current)?.path == path {
                return Some(current);
            }
            current = self.child_towards(current, path)?;
        }
    }

    /// Looks `path` up among the nodes already in the tree.
    pub fn find_path(&self, path: &FilePath) -> Option<TreeIter> {
        self.find_node(path).map(|id| self.iter_for(id))
    }

    // Synchronous boundaries

    /// Handles inbox messages until `predicate` holds or `timeout` passes.
    /// Returns the final value of `predicate`.
    pub async fn run_until(&mut self, timeout: Duration, mut predicate: impl FnMut(&Self) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(self) {
                return true;
            }
            match tokio::time::timeout_at(deadline, self.inbox_rx.recv()).await {
                Ok(Some(message)) => self.handle_message(message),
                Ok(None) | Err(_) => return predicate(self),
            }
        }
    }

    /// Waits for the next message and handles it.
    pub async fn process_next(&mut self) -> bool {
        match self.inbox_rx.recv().await {
            Some(message) => {
                self.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// Handles whatever is already queued without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.inbox_rx.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Waits until the node finished loading, failed, or went away.
    pub async fn wait_loaded(&mut self, iter: &TreeIter, timeout: Duration) -> bool {
        let Some(id) = self.resolve(iter) else {
            return false;
        };
        self.run_until(timeout, |model| model.nodes.get(id).map_or(true, ModelNode::is_settled))
            .await
    }

    /// Waits for the first listing of the root.
    pub async fn wait_root_scan(&mut self) -> bool {
        let timeout = self.config.root_scan_timeout();
        let done = self.run_until(timeout, |model| model.root_scan_done).await;
        if !done {
            warn!("FileSystemModel: root scan did not finish within {:?}", timeout);
        }
        done
    }

    /// Keeps handling messages until the platform settings were read.
    async fn wait_settings(&mut self) -> bool {
        let platform = self.platform.clone();
        let timeout = self.config.settings_timeout();
        let ready = self.run_until(timeout, |_| platform.is_ready()).await;
        if !ready {
            warn!("FileSystemModel: platform settings not ready after {:?}", timeout);
        }
        ready
    }

    // Imperative operations

    /// Finds `path` in the tree without loading anything beyond the root.
    pub async fn search_path(&mut self, path: &FilePath) -> FsResult<Option<TreeIter>> {
        self.wait_root_scan().await;
        if !path.is_local() {
            self.wait_settings().await;
        }
        Ok(self.find_path(path))
    }

    pub async fn search_uri(&mut self, uri: &str) -> FsResult<Option<TreeIter>> {
        let path = FilePath::parse(uri)?;
        self.search_path(&path).await
    }

    pub async fn search_local_path(&mut self, local: &Path) -> FsResult<Option<TreeIter>> {
        let path = FilePath::from_local_path(local)?;
        self.search_path(&path).await
    }

    /// Loads every folder on the way to `path`, then `path` itself, and
    /// returns its node once it settled.
    pub async fn load_path(&mut self, path: &FilePath) -> FsResult<TreeIter> {
        self.wait_root_scan().await;
        if !path.is_local() {
            self.wait_settings().await;
        }

        let mut current = self.root;
        loop {
            let here = self
                .nodes
                .get(current)
                .map(|n| n.path.clone())
                .ok_or_else(|| FsError::not_found(path))?;
            if &here == path {
                self.ensure_loaded(current).await?;
                return Ok(self.iter_for(current));
            }
            if let Some(next) = self.child_towards(current, path) {
                current = next;
                continue;
            }
            self.ensure_loaded(current).await?;
            current = self
                .child_towards(current, path)
                .ok_or_else(|| FsError::not_found(path))?;
        }
    }

    pub async fn load_uri(&mut self, uri: &str) -> FsResult<TreeIter> {
        let path = FilePath::parse(uri)?;
        self.load_path(&path).await
    }

    pub async fn load_local_path(&mut self, local: &Path) -> FsResult<TreeIter> {
        let path = FilePath::from_local_path(local)?;
        self.load_path(&path).await
    }

    async fn ensure_loaded(&mut self, id: NodeId) -> FsResult<()> {
        let (is_folder, state) = match self.nodes.get_mut(id) {
            Some(node) => {
                node.accessed = true;
                (node.is_folder(), node.state())
            }
            None => return Err(FsError::new(FsErrorKind::NotFound, "Node went away")),
        };
        if !is_folder || state == NodeState::Loaded {
            return Ok(());
        }
        if matches!(state, NodeState::Unlinked | NodeState::Errored) {
            self.link_node(id);
        }

        let iter = self.iter_for(id);
        let timeout = self.config.root_scan_timeout();
        let settled = self.wait_loaded(&iter, timeout).await;
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| FsError::new(FsErrorKind::NotFound, "Node went away while loading"))?;
        if let Some(error) = &node.error {
            return Err(error.detached());
        }
        if !settled {
            return Err(FsError::new(
                FsErrorKind::TimedOut,
                format!("Loading {} took longer than {:?}", node.path, timeout),
            ));
        }
        Ok(())
    }

    /// Starts a listing pass if one is due. Returns whether it started.
    pub fn queue_reload(&mut self, iter: &TreeIter, force: bool) -> bool {
        let Some(id) = self.resolve(iter) else {
            return false;
        };
        let threshold = self.config.reload_threshold();
        let due = self
            .nodes
            .get(id)
            .is_some_and(|n| n.is_folder() && n.needs_reload(Instant::now(), threshold, force));
        if due {
            self.link_node(id);
        }
        due
    }

    /// Records user intent for a requires-access location and loads it.
    pub fn access_node(&mut self, iter: &TreeIter) -> FsResult<()> {
        let id = self
            .resolve(iter)
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidArg, "Stale iterator"))?;
        let loading = match self.nodes.get_mut(id) {
            Some(node) => {
                node.accessed = true;
                node.is_loading()
            }
            None => false,
        };
        if !loading {
            self.link_node(id);
        }
        Ok(())
    }

    /// Mounts the volume behind a volume location and rescans it.
    pub async fn mount_device(&mut self, iter: &TreeIter) -> FsResult<()> {
        let id = self
            .resolve(iter)
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidArg, "Stale iterator"))?;
        let basepath = match self.nodes.get(id).and_then(|n| n.location.as_ref()) {
            Some(location) if matches!(location.kind(), LocationKind::Voldev { .. }) => location.basepath().clone(),
            _ => {
                return Err(FsError::new(
                    FsErrorKind::NotSupported,
                    "Only volume locations can be mounted",
                ))
            }
        };
        let volume = self
            .backend
            .list_volumes()
            .into_iter()
            .find(|v| v.get_activation_root() == basepath)
            .ok_or_else(|| FsError::not_found(format!("Volume at {}", basepath)))?;

        debug!("FileSystemModel: mounting {}", basepath);
        self.backend.mount_volume(&volume, None).await?;
        self.volumes_changed();
        if self.nodes.get(id).is_some_and(|n| !n.is_loading()) {
            self.link_node(id);
        }
        Ok(())
    }

    /// Creates `name` below `parent`. The node shows up through the
    /// folder's change notifications.
    pub async fn create_folder(&mut self, parent: &TreeIter, name: &str) -> FsResult<FilePath> {
        let parent_path = self
            .node_path(parent)
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidArg, "Stale iterator"))?;
        let path = parent_path.child(name)?;
        self.backend.create_folder(&path, None).await?;
        debug!("FileSystemModel: created {}", path);
        Ok(path)
    }

    fn child_names(&self, parent: NodeId) -> Vec<String> {
        let Some(node) = self.nodes.get(parent) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|c| self.nodes.get(*c))
            .map(|n| {
                n.info
                    .as_ref()
                    .and_then(|i| i.get_name())
                    .map(str::to_string)
                    .unwrap_or_else(|| n.path.basename())
            })
            .collect()
    }

    /// Lowest free `stub (N)ext` among the children of `parent`.
    pub fn new_unique_name(&self, parent: &TreeIter, stub: &str, extension: &str) -> FsResult<String> {
        let id = self
            .resolve(parent)
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidArg, "Stale iterator"))?;
        let names = self.child_names(id);
        Ok(naming::unique_name(names.iter().map(String::as_str), stub, extension))
    }

    /// Free sibling path for `path`, loading its folder first.
    pub async fn autoname_uri(&mut self, path: &FilePath) -> FsResult<FilePath> {
        let parent = path
            .parent()
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidArg, format!("{} has no parent", path)))?;
        let parent_iter = self.load_path(&parent).await?;
        let id = self
            .resolve(&parent_iter)
            .ok_or_else(|| FsError::not_found(&parent))?;
        let names = self.child_names(id);
        let name = naming::autoname(names.iter().map(String::as_str), &path.basename());
        parent.child(&name)
    }

    /// Removes the node at `path` and its subtree. The root stays.
    pub fn kick_path(&mut self, path: &FilePath) -> bool {
        match self.find_node(path) {
            Some(id) if id != self.root => {
                self.kick_node(id);
                true
            }
            _ => false,
        }
    }

    /// Invalidates every iterator handed out so far.
    pub fn rebuild(&mut self) {
        self.stamp = self.stamp.wrapping_add(1);
        debug!("FileSystemModel: iterator stamp now {}", self.stamp);
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    // Bookmarks

    pub async fn list_bookmarks(&self) -> FsResult<Vec<Bookmark>> {
        self.backend.list_bookmarks().await
    }

    pub async fn insert_bookmark(&self, path: &FilePath, label: Option<&str>, position: Option<usize>) -> FsResult<()> {
        self.backend.insert_bookmark(path, label, position).await
    }

    pub async fn remove_bookmark(&self, path: &FilePath) -> FsResult<()> {
        self.backend.remove_bookmark(path).await
    }
}

impl Drop for FileSystemModel {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        let ids: Vec<NodeId> = self.nodes.ids().collect();
        for id in ids {
            if let Some(node) = self.nodes.get_mut(id) {
                node.link.release();
            }
        }
    }
}

impl std::fmt::Debug for FileSystemModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemModel")
            .field("root", &self.nodes.get(self.root).map(|n| n.path.clone()))
            .field("nodes", &self.nodes.len())
            .field("stamp", &self.stamp)
            .finish_non_exhaustive()
    }
}
