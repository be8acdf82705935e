pub mod local;
pub mod memory;
pub mod thumbnail;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::cancellable::Cancellable;
use crate::error::FsResult;
use crate::file_info::FileInfo;
use crate::folder::Folder;
use crate::path::FilePath;
use crate::service::bookmarks::Bookmark;
use crate::volume::Volume;

/// Backend wide notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    VolumesChanged,
    BookmarksChanged,
}

/// Pluggable file-system abstraction consumed by the model.
///
/// Every asynchronous operation takes an optional [`Cancellable`];
/// cancelling an operation that already completed is a no-op. The model
/// only ever awaits these from spawned tasks, so implementations may take
/// as long as the transport needs.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Opens a live listing of `path`.
    async fn get_folder(
        &self,
        path: &FilePath,
        attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FsResult<Box<dyn Folder>>;

    async fn get_info(
        &self,
        path: &FilePath,
        attributes: &str,
        cancellable: Option<&Cancellable>,
    ) -> FsResult<FileInfo>;

    /// Fails with `Exists` when something already lives at `path`.
    async fn create_folder(&self, path: &FilePath, cancellable: Option<&Cancellable>) -> FsResult<()>;

    async fn mount_volume(
        &self,
        volume: &Arc<dyn Volume>,
        cancellable: Option<&Cancellable>,
    ) -> FsResult<()> {
        volume.mount(cancellable).await
    }

    fn list_volumes(&self) -> Vec<Arc<dyn Volume>>;

    /// Volume whose activation root is `path` or one of its ancestors.
    fn get_volume_for_path(&self, path: &FilePath) -> Option<Arc<dyn Volume>> {
        self.list_volumes().into_iter().find(|volume| {
            let root = volume.get_activation_root();
            &root == path || root.is_ancestor_of(path)
        })
    }

    async fn list_bookmarks(&self) -> FsResult<Vec<Bookmark>>;

    async fn insert_bookmark(
        &self,
        path: &FilePath,
        label: Option<&str>,
        position: Option<usize>,
    ) -> FsResult<()>;

    async fn remove_bookmark(&self, path: &FilePath) -> FsResult<()>;

    /// Volume and bookmark change notifications.
    fn subscribe(&self) -> broadcast::Receiver<BackendEvent>;
}
