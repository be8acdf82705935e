//! Notifications the model sends to the GUI layer.
//!
//! Observers registered with [`EventHub::connect`] run synchronously while
//! the model handles a message and only ever see the event, never the
//! model, so they cannot re-enter it. Asynchronous consumers use
//! [`EventHub::subscribe`] instead.

use log::trace;
use tokio::sync::broadcast;

use crate::model::tree::{TreeIter, TreePath};
use crate::path::FilePath;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    RowInserted {
        path: TreePath,
        iter: TreeIter,
    },
    RowChanged {
        path: TreePath,
        iter: TreeIter,
    },
    /// The row at `path` is gone together with everything below it.
    RowDeleted {
        path: TreePath,
        uri: FilePath,
    },
    RowHasChildToggled {
        path: TreePath,
        iter: TreeIter,
    },
    FinishedLoading {
        iter: TreeIter,
        uri: FilePath,
    },
    DeviceDisconnected {
        iter: TreeIter,
        uri: FilePath,
    },
    BookmarksChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(&ModelEvent)>;

pub struct EventHub {
    observers: Vec<(ObserverId, Observer)>,
    next_id: u64,
    sender: broadcast::Sender<ModelEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            observers: Vec::new(),
            next_id: 0,
            sender,
        }
    }

    pub fn connect(&mut self, observer: impl FnMut(&ModelEvent) + 'static) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn disconnect(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&mut self, event: ModelEvent) {
        trace!("FileSystemModel: {:?}", event);
        for (_, observer) in self.observers.iter_mut() {
            observer(&event);
        }
        // Nobody subscribed is fine.
        let _ = self.sender.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("observers", &self.observers.len())
            .finish()
    }
}
