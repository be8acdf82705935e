use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use once_cell::unsync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cancellable::Cancellable;
use crate::error::FsError;
use crate::file_info::FileInfo;
use crate::folder::Folder;
use crate::location::{LocationKind, SpecialLocation};
use crate::model::arena::NodeId;
use crate::path::FilePath;

/// Observable load state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unlinked,
    /// `get_folder` in flight.
    Linking,
    /// Folder attached, listing still in progress.
    Linked,
    Loaded,
    Errored,
}

/// The one backend operation a node may own.
pub(crate) enum Link {
    Unlinked,
    Linking {
        token: u64,
        cancellable: Cancellable,
    },
    Linked {
        token: u64,
        folder: Box<dyn Folder>,
        forwarder: JoinHandle<()>,
    },
}

impl Link {
    pub(crate) fn token(&self) -> Option<u64> {
        match self {
            Link::Unlinked => None,
            Link::Linking { token, .. } | Link::Linked { token, .. } => Some(*token),
        }
    }

    pub(crate) fn folder(&self) -> Option<&dyn Folder> {
        match self {
            Link::Linked { folder, .. } => Some(folder.as_ref()),
            _ => None,
        }
    }

    /// Drops the operation. Late results for it carry a stale token.
    pub(crate) fn release(&mut self) {
        match std::mem::replace(self, Link::Unlinked) {
            Link::Linking { cancellable, .. } => cancellable.cancel(),
            Link::Linked { forwarder, .. } => forwarder.abort(),
            Link::Unlinked => {}
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Link::Unlinked => f.write_str("Unlinked"),
            Link::Linking { token, .. } => write!(f, "Linking({})", token),
            Link::Linked { token, .. } => write!(f, "Linked({})", token),
        }
    }
}

/// Derived values, computed on first read and dropped together.
#[derive(Debug, Default)]
pub(crate) struct NodeCaches {
    pub(crate) display_name: OnceCell<String>,
    pub(crate) sort_key: OnceCell<String>,
    pub(crate) icon: OnceCell<Option<String>>,
    pub(crate) icon_expanded: OnceCell<Option<String>>,
    pub(crate) thumbnail: OnceCell<Option<PathBuf>>,
    pub(crate) extra_info: OnceCell<Option<String>>,
}

impl NodeCaches {
    pub(crate) fn invalidate(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug)]
pub struct ModelNode {
    pub(crate) path: FilePath,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) info: Option<FileInfo>,
    pub(crate) location: Option<SpecialLocation>,
    pub(crate) link: Link,
    pub(crate) load_time: Option<Instant>,
    pub(crate) error: Option<FsError>,
    pub(crate) loaded: bool,
    /// The user asked for this node; lifts the requires-access gate.
    pub(crate) accessed: bool,
    /// Confirmed by the listing pass in progress.
    pub(crate) present: bool,
    /// Put in place by the model itself rather than a parent listing.
    pub(crate) grafted: bool,
    /// Non-local or on removable media.
    pub(crate) volatile: bool,
    pub(crate) pending_adds: VecDeque<FilePath>,
    pub(crate) continuation_scheduled: bool,
    pub(crate) caches: NodeCaches,
}

impl ModelNode {
    pub(crate) fn new(
        path: FilePath,
        parent: Option<NodeId>,
        info: Option<FileInfo>,
        location: Option<SpecialLocation>,
        parent_volatile: bool,
    ) -> Self {
        let on_volume = matches!(
            location.as_ref().map(SpecialLocation::kind),
            Some(LocationKind::Voldev { .. })
        );
        let volatile = parent_volatile || on_volume || !path.is_local();
        Self {
            path,
            parent,
            children: Vec::new(),
            info,
            location,
            link: Link::Unlinked,
            load_time: None,
            error: None,
            loaded: false,
            accessed: false,
            present: true,
            grafted: false,
            volatile,
            pending_adds: VecDeque::new(),
            continuation_scheduled: false,
            caches: NodeCaches::default(),
        }
    }

    pub fn path(&self) -> &FilePath {
        &self.path
    }

    pub fn info(&self) -> Option<&FileInfo> {
        self.info.as_ref()
    }

    pub fn location(&self) -> Option<&SpecialLocation> {
        self.location.as_ref()
    }

    pub fn error(&self) -> Option<&FsError> {
        self.error.as_ref()
    }

    pub fn state(&self) -> NodeState {
        match &self.link {
            Link::Linking { .. } => NodeState::Linking,
            _ if self.error.is_some() => NodeState::Errored,
            Link::Linked { .. } if self.loaded && self.pending_adds.is_empty() => NodeState::Loaded,
            Link::Linked { .. } => NodeState::Linked,
            Link::Unlinked => NodeState::Unlinked,
        }
    }

    pub fn is_linking(&self) -> bool {
        matches!(self.link, Link::Linking { .. })
    }

    /// A listing pass is under way: the folder is being fetched, or it is
    /// attached and its children are still coming in.
    pub fn is_loading(&self) -> bool {
        match self.link {
            Link::Linking { .. } => true,
            Link::Linked { .. } => !self.loaded,
            Link::Unlinked => false,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.location.is_some() || self.info.as_ref().is_some_and(FileInfo::is_folder)
    }

    pub fn is_permanent(&self) -> bool {
        self.location.as_ref().is_some_and(SpecialLocation::is_permanent)
    }

    /// Whether the requires-access gate is open.
    pub fn access_granted(&self) -> bool {
        self.accessed || !self.location.as_ref().is_some_and(SpecialLocation::requires_access)
    }

    /// Whether a listing pass is due. Nodes mid-load and nodes still behind
    /// the access gate never are; otherwise `force`, a node that never
    /// loaded, or a stale volatile or failed node is.
    pub fn needs_reload(&self, now: Instant, threshold: Duration, force: bool) -> bool {
        if self.is_loading() || !self.access_granted() {
            return false;
        }
        if force {
            return true;
        }
        match self.load_time {
            None => true,
            Some(loaded_at) => {
                now.saturating_duration_since(loaded_at) > threshold && (self.volatile || self.error.is_some())
            }
        }
    }

    /// Sweep candidates are children the last listing did not confirm.
    pub(crate) fn survives_sweep(&self) -> bool {
        self.present || self.grafted || self.is_permanent() || self.is_linking()
    }

    /// Loading finished one way or another.
    pub(crate) fn is_settled(&self) -> bool {
        match self.state() {
            NodeState::Loaded | NodeState::Errored => true,
            NodeState::Unlinked => self.load_time.is_some(),
            _ => false,
        }
    }
}
