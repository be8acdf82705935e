//! Reactions to volume, bookmark and platform setting changes.

use log::{debug, info};

use crate::backend::BackendEvent;
use crate::error::{FsError, FsErrorKind, FsResult};
use crate::location::{device, LocationKind, LocationSignals};
use crate::model::arena::NodeId;
use crate::model::event::ModelEvent;
use crate::model::{FileSystemModel, TreeIter};

impl FileSystemModel {
    pub(crate) fn backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::VolumesChanged => self.volumes_changed(),
            BackendEvent::BookmarksChanged => self.events.emit(ModelEvent::BookmarksChanged),
        }
    }

    /// Re-reads the volume list and lets every location react to it.
    pub(crate) fn volumes_changed(&mut self) {
        self.volumes = self.backend.list_volumes();
        let volumes = self.volumes.clone();
        debug!("FileSystemModel: {} volumes", volumes.len());

        for id in self.location_nodes() {
            let signals = match self.nodes.get_mut(id).and_then(|n| n.location.as_mut()) {
                Some(location) => location.volumes_changed(&volumes),
                None => continue,
            };
            self.apply_signals(id, signals);
        }

        let gone: Vec<NodeId> = self
            .location_nodes()
            .into_iter()
            .filter(|id| {
                self.nodes.get(*id).is_some_and(|n| {
                    n.location.as_ref().is_some_and(|l| {
                        !l.is_permanent() && matches!(l.kind(), LocationKind::Voldev { volume: None, .. })
                    })
                })
            })
            .collect();
        for id in gone {
            if self.nodes.contains(id) {
                info!("FileSystemModel: volume at {:?} went away", self.nodes.get(id).map(|n| n.path.clone()));
                self.kick_node(id);
            }
        }

        self.graft_new_volumes();
    }

    /// Adds a node under the root for each removable volume not yet shown.
    pub(crate) fn graft_new_volumes(&mut self) {
        let volumes = self.volumes.clone();
        for volume in volumes.iter().filter(|v| v.is_removable()) {
            let root = volume.get_activation_root();
            if self.find_node(&root).is_some() {
                continue;
            }
            info!("FileSystemModel: new volume {} at {}", volume.get_name(), root);
            let location = device::dynamic_voldev(root.clone(), volume, self.platform.clone());
            if let Some(id) = self.graft(root, location) {
                self.link_if_wanted(id);
            }
        }
    }

    /// Asks a special location to look at its contents again. Returns
    /// whether a new listing pass started.
    pub fn rescan_location(&mut self, iter: &TreeIter) -> FsResult<bool> {
        let id = self
            .resolve(iter)
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidArg, "Stale iterator"))?;
        let node = self
            .nodes
            .get(id)
            .ok_or_else(|| FsError::new(FsErrorKind::InvalidArg, "Stale iterator"))?;
        let Some(location) = node.location.as_ref() else {
            return Err(FsError::new(
                FsErrorKind::NotSupported,
                format!("{} is not a special location", node.path),
            ));
        };
        let signals = location.rescan();
        let before = node.link.token();
        debug!("FileSystemModel: rescanning {} ({:?})", node.path, signals);
        self.apply_signals(id, signals);
        Ok(self.nodes.get(id).and_then(|n| n.link.token()) != before)
    }

    pub(crate) fn platform_changed(&mut self) {
        for id in self.location_nodes() {
            let signals = match self.nodes.get(id).and_then(|n| n.location.as_ref()) {
                Some(location) => location.connection_state_changed(),
                None => continue,
            };
            self.apply_signals(id, signals);
        }
    }

    fn location_nodes(&self) -> Vec<NodeId> {
        self.preorder(self.root)
            .into_iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|n| n.location.is_some()))
            .collect()
    }

    fn apply_signals(&mut self, id: NodeId, signals: LocationSignals) {
        if signals.is_empty() || !self.nodes.contains(id) {
            return;
        }
        if signals.contains(LocationSignals::CONNECTION_STATE) {
            self.disconnect_device(id, None);
        } else if signals.contains(LocationSignals::CHANGED) {
            if let Some(node) = self.nodes.get_mut(id) {
                node.caches.invalidate();
            }
            self.emit_row_changed(id);
        }
        if signals.contains(LocationSignals::RESCAN) {
            let wanted = self.nodes.get(id).is_some_and(|n| {
                !n.is_loading() && n.access_granted() && n.location.as_ref().is_some_and(|l| l.is_available())
            });
            if wanted {
                self.link_node(id);
            }
        }
    }
}
