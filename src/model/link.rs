//! Node linking: acquiring a folder for a node, feeding its children into
//! the tree in batches, and reacting to folder events and failures.

use log::{debug, trace, warn};
use tokio::time::Instant;

use crate::cancellable::Cancellable;
use crate::error::{ErrorDisposition, FsError};
use crate::file_info::{FileInfo, MODEL_ATTRIBUTES};
use crate::folder::{Folder, FolderEvent};
use crate::model::arena::NodeId;
use crate::model::event::ModelEvent;
use crate::model::node::{Link, ModelNode};
use crate::model::{FileSystemModel, ModelMessage};
use crate::path::FilePath;

impl FileSystemModel {
    pub(crate) fn handle_message(&mut self, message: ModelMessage) {
        match message {
            ModelMessage::FolderReady { node, token, result } => {
                if !self.is_current(node, token) {
                    trace!("FileSystemModel: dropping stale folder result for {:?}", node);
                    return;
                }
                match result {
                    Ok(folder) => self.folder_ready(node, token, folder),
                    Err(error) => {
                        if let Some(n) = self.nodes.get_mut(node) {
                            n.link = Link::Unlinked;
                        }
                        self.handle_error(node, error);
                    }
                }
            }
            ModelMessage::Folder { node, token, event } => {
                if self.is_current(node, token) {
                    self.folder_event(node, event);
                }
            }
            ModelMessage::ContinueAdds { node, token } => {
                if !self.is_current(node, token) {
                    return;
                }
                if let Some(n) = self.nodes.get_mut(node) {
                    n.continuation_scheduled = false;
                }
                self.process_adds(node);
            }
            ModelMessage::Backend(event) => self.backend_event(event),
            ModelMessage::PlatformChanged => self.platform_changed(),
        }
    }

    fn is_current(&self, node: NodeId, token: u64) -> bool {
        self.nodes.get(node).and_then(|n| n.link.token()) == Some(token)
    }

    /// Releases whatever the node owned and starts a fresh `get_folder`.
    pub(crate) fn link_node(&mut self, id: NodeId) {
        self.next_token += 1;
        let token = self.next_token;
        let children = match self.nodes.get_mut(id) {
            Some(node) => {
                node.link.release();
                node.loaded = false;
                node.pending_adds.clear();
                node.continuation_scheduled = false;
                node.children.clone()
            }
            None => return,
        };
        for child in children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.present = false;
            }
        }

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        debug!("FileSystemModel: linking {}", node.path);
        let cancellable = Cancellable::new();
        node.link = Link::Linking {
            token,
            cancellable: cancellable.clone(),
        };

        let path = node.path.clone();
        let backend = self.backend.clone();
        let tx = self.inbox_tx.clone();
        self.runtime.spawn(async move {
            let result = backend.get_folder(&path, MODEL_ATTRIBUTES, Some(&cancellable)).await;
            // A closed inbox means the model is gone.
            let _ = tx.send(ModelMessage::FolderReady {
                node: id,
                token,
                result,
            });
        });
    }

    /// Links a node that is allowed to load on its own.
    pub(crate) fn link_if_wanted(&mut self, id: NodeId) {
        let wanted = self.nodes.get(id).is_some_and(|node| {
            node.is_folder()
                && node.access_granted()
                && !node.is_loading()
                && node.location.as_ref().map_or(true, |l| l.is_available())
        });
        if wanted {
            self.link_node(id);
        }
    }

    fn folder_ready(&mut self, id: NodeId, token: u64, mut folder: Box<dyn Folder>) {
        let forwarder = match folder.take_monitor() {
            Some(mut monitor) => {
                let tx = self.inbox_tx.clone();
                self.runtime.spawn(async move {
                    while let Some(event) = monitor.next_event().await {
                        if tx.send(ModelMessage::Folder { node: id, token, event }).is_err() {
                            break;
                        }
                    }
                })
            }
            None => self.runtime.spawn(async {}),
        };
        let snapshot = match folder.list_children() {
            Ok(children) => children,
            Err(error) => {
                warn!("FileSystemModel: cannot list {}: {}", folder.path(), error);
                Vec::new()
            }
        };

        let Some(node) = self.nodes.get_mut(id) else {
            forwarder.abort();
            return;
        };
        trace!("FileSystemModel: {} linked with {} entries", node.path, snapshot.len());
        node.link = Link::Linked {
            token,
            folder,
            forwarder,
        };
        node.pending_adds.extend(snapshot);
        self.process_adds(id);
    }

    /// Adds up to one batch of pending children, deferring the rest.
    pub(crate) fn process_adds(&mut self, id: NodeId) {
        let batch_size = self.config.batch_size;
        let batch: Vec<FilePath> = match self.nodes.get_mut(id) {
            Some(node) => {
                let take = node.pending_adds.len().min(batch_size);
                node.pending_adds.drain(..take).collect()
            }
            None => return,
        };
        for path in batch {
            self.add_child(id, path);
        }

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.pending_adds.is_empty() {
            self.check_finished(id);
            return;
        }
        if !node.continuation_scheduled {
            if let Some(token) = node.link.token() {
                node.continuation_scheduled = true;
                let _ = self.inbox_tx.send(ModelMessage::ContinueAdds { node: id, token });
            }
        }
    }

    fn add_child(&mut self, parent: NodeId, raw: FilePath) {
        let Some(parent_node) = self.nodes.get(parent) else {
            return;
        };
        let path = match &parent_node.location {
            Some(location) => location.rewrite_path(raw.clone()),
            None => raw.clone(),
        };
        let Some(folder) = parent_node.link.folder() else {
            return;
        };
        let info = match folder.get_info(&raw).or_else(|_| folder.get_info(&path)) {
            Ok(info) => info,
            Err(error) => {
                debug!("FileSystemModel: no info for {}: {}", raw, error);
                return;
            }
        };

        if let Some(existing) = self.find_child(parent, &path) {
            if let Some(child) = self.nodes.get_mut(existing) {
                child.info = Some(info);
                child.present = true;
                child.caches.invalidate();
            }
            self.emit_row_changed(existing);
            return;
        }

        let location = parent_node
            .location
            .as_ref()
            .and_then(|l| l.create_child_location(&path, &info, &self.volumes));
        let eager = location
            .as_ref()
            .is_some_and(|l| !l.requires_access() && l.is_available());
        let node = ModelNode::new(path, Some(parent), Some(info), location, parent_node.volatile);
        if let Some(child) = self.insert_child(parent, node) {
            if eager {
                self.link_if_wanted(child);
            }
        }
    }

    pub(crate) fn check_finished(&mut self, id: NodeId) {
        let ready = self.nodes.get(id).is_some_and(|node| {
            !node.loaded
                && node.pending_adds.is_empty()
                && node.link.folder().is_some_and(|f| f.is_finished_loading())
        });
        if ready {
            self.finish_load(id);
        }
    }

    fn finish_load(&mut self, id: NodeId) {
        let children = match self.nodes.get_mut(id) {
            Some(node) => {
                node.loaded = true;
                node.load_time = Some(Instant::now());
                node.error = None;
                node.caches.invalidate();
                node.children.clone()
            }
            None => return,
        };
        let unconfirmed: Vec<NodeId> = children
            .into_iter()
            .filter(|c| self.nodes.get(*c).is_some_and(|n| !n.survives_sweep()))
            .collect();
        for child in unconfirmed {
            self.kick_node(child);
        }
        if id == self.root {
            self.root_scan_done = true;
        }

        let Some(node) = self.nodes.get(id) else {
            return;
        };
        debug!("FileSystemModel: {} loaded, {} children", node.path, node.children.len());
        let uri = node.path.clone();
        let iter = self.iter_for(id);
        self.events.emit(ModelEvent::FinishedLoading { iter, uri });
        self.emit_row_changed(id);
    }

    fn folder_event(&mut self, id: NodeId, event: FolderEvent) {
        match event {
            FolderEvent::FilesAdded(paths) => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.pending_adds.extend(paths);
                }
                self.process_adds(id);
            }
            FolderEvent::FilesRemoved(paths) => {
                for path in paths {
                    let path = self.rewrite_for(id, path);
                    if let Some(child) = self.find_child(id, &path) {
                        if self.is_kickable(child) {
                            self.kick_node(child);
                        }
                    }
                }
            }
            FolderEvent::FilesChanged(paths) => {
                for raw in paths {
                    self.refresh_child(id, raw);
                }
            }
            FolderEvent::FinishedLoading => self.check_finished(id),
            FolderEvent::Deleted => {
                if self.is_kickable(id) {
                    self.kick_node(id);
                } else {
                    let path = self.nodes.get(id).map(|n| n.path.clone());
                    if let Some(node) = self.nodes.get_mut(id) {
                        node.link.release();
                    }
                    if let Some(path) = path {
                        self.set_error(id, FsError::not_found(path));
                    }
                }
            }
            FolderEvent::Error(error) => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.link.release();
                }
                self.handle_error(id, error);
            }
        }
    }

    fn rewrite_for(&self, id: NodeId, path: FilePath) -> FilePath {
        match self.nodes.get(id).and_then(|n| n.location.as_ref()) {
            Some(location) => location.rewrite_path(path),
            None => path,
        }
    }

    fn refresh_child(&mut self, parent: NodeId, raw: FilePath) {
        let path = self.rewrite_for(parent, raw.clone());
        let Some(child) = self.find_child(parent, &path) else {
            return;
        };
        let info: Option<FileInfo> = self
            .nodes
            .get(parent)
            .and_then(|n| n.link.folder())
            .and_then(|f| f.get_info(&raw).or_else(|_| f.get_info(&path)).ok());
        if let Some(node) = self.nodes.get_mut(child) {
            if info.is_some() {
                node.info = info;
            }
            node.caches.invalidate();
        }
        self.emit_row_changed(child);
    }

    fn is_kickable(&self, id: NodeId) -> bool {
        id != self.root
            && self
                .nodes
                .get(id)
                .is_some_and(|n| !n.grafted && !n.is_permanent())
    }

    /// Applies the failure policy for `error` on `id`.
    pub(crate) fn handle_error(&mut self, id: NodeId, error: FsError) {
        let path = match self.nodes.get(id) {
            Some(node) => node.path.clone(),
            None => return,
        };
        match error.disposition() {
            ErrorDisposition::Ignore => {
                trace!("FileSystemModel: {} superseded", path);
            }
            ErrorDisposition::Kick if self.is_kickable(id) => {
                debug!("FileSystemModel: {} is gone: {}", path, error);
                self.kick_node(id);
            }
            ErrorDisposition::EscalateToDevice => match self.owning_device(id) {
                Some(device) => {
                    warn!("FileSystemModel: {} failed, disconnecting its device: {}", path, error);
                    self.disconnect_device(device, Some(error));
                }
                None => self.set_error(id, error),
            },
            ErrorDisposition::Kick | ErrorDisposition::Retain => self.set_error(id, error),
        }
    }

    /// Nearest node at or above `id` whose location is a device.
    fn owning_device(&self, id: NodeId) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            let node = self.nodes.get(candidate)?;
            if node.location.as_ref().is_some_and(|l| l.is_device()) {
                return Some(candidate);
            }
            current = node.parent;
        }
        None
    }

    fn set_error(&mut self, id: NodeId, error: FsError) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        debug!("FileSystemModel: {} unavailable: {}", node.path, error);
        node.error = Some(error);
        node.loaded = false;
        node.load_time = Some(Instant::now());
        node.pending_adds.clear();
        node.caches.invalidate();
        if id == self.root {
            self.root_scan_done = true;
        }
        self.emit_row_changed(id);
    }

    /// Tears down everything below a device node. With an error the node
    /// is marked unavailable; without one it simply loads again on demand.
    pub(crate) fn disconnect_device(&mut self, id: NodeId, error: Option<FsError>) {
        let children = match self.nodes.get_mut(id) {
            Some(node) => {
                node.link.release();
                node.children.clone()
            }
            None => return,
        };
        for child in children {
            self.kick_node(child);
        }
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.load_time = error.as_ref().map(|_| Instant::now());
        node.error = error;
        node.loaded = false;
        node.pending_adds.clear();
        node.continuation_scheduled = false;
        if node.location.as_ref().is_some_and(|l| l.requires_access()) {
            node.accessed = false;
        }
        node.caches.invalidate();
        let uri = node.path.clone();
        let iter = self.iter_for(id);
        self.events.emit(ModelEvent::DeviceDisconnected { iter, uri });
        self.emit_row_changed(id);
    }

    /// Removes `id` and its subtree with a single row-deleted notification.
    pub(crate) fn kick_node(&mut self, id: NodeId) {
        let Some(path) = self.tree_path(id) else {
            return;
        };
        let subtree = self.preorder(id);
        let (uri, parent) = match self.nodes.get(id) {
            Some(node) => (node.path.clone(), node.parent),
            None => return,
        };
        let parent_emptied = match parent.and_then(|p| self.nodes.get_mut(p)) {
            Some(parent_node) => {
                parent_node.children.retain(|c| *c != id);
                parent_node.caches.invalidate();
                parent_node.children.is_empty()
            }
            None => false,
        };

        debug!("FileSystemModel: kicking {} ({} nodes)", uri, subtree.len());
        self.events.emit(ModelEvent::RowDeleted { path, uri });
        for sub in subtree {
            if let Some(mut node) = self.nodes.remove(sub) {
                node.link.release();
            }
        }

        if let (Some(parent), true) = (parent, parent_emptied) {
            if let Some(path) = self.tree_path(parent) {
                let iter = self.iter_for(parent);
                self.events.emit(ModelEvent::RowHasChildToggled { path, iter });
            }
            self.emit_row_changed(parent);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::backend::memory::MemoryFileSystem;
    use crate::config::ModelConfig;
    use crate::model::{FileSystemModel, NodeState};
    use crate::path::FilePath;
    use crate::platform::{PlatformSettings, PlatformState};

    #[tokio::test(start_paused = true)]
    async fn relinking_cancels_the_request_in_flight() {
        let fs = MemoryFileSystem::new();
        fs.add_file("file:///slow/a.txt", 1).unwrap();
        let mut model = FileSystemModel::with_config(
            Arc::new(fs.clone()),
            ModelConfig::bare("file:///"),
            PlatformSettings::ready_with(PlatformState::default()),
        )
        .unwrap();
        assert!(model.wait_root_scan().await);
        fs.set_delay(Duration::from_secs(5));

        let slow = model.find_path(&FilePath::parse("file:///slow").unwrap()).unwrap();
        let id = model.resolve(&slow).unwrap();
        let started = fs.started_operations();

        model.link_node(id);
        model.run_until(Duration::from_millis(10), |_| false).await;
        model.link_node(id);
        assert!(model.wait_loaded(&slow, Duration::from_secs(10)).await);

        assert_eq!(fs.started_operations(), started + 2);
        assert_eq!(fs.cancelled_operations(), 1);
        assert_eq!(model.node_state(&slow), Some(NodeState::Loaded));
        assert_eq!(model.children(&slow).len(), 1);
    }
}
