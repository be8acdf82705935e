//! # fsmodel
//!
//! A lazily loaded, asynchronous tree model over a pluggable file-system
//! backend, with special locations (device root, memory cards, Bluetooth,
//! media and file servers) and device hot-plug.
//!
//! ## Overview
//!
//! The model mirrors a backend hierarchy as a tree of nodes. Nothing is
//! listed until somebody looks: reading a folder's display name, icon or
//! children starts loading it, and the rows show up through
//! [`ModelEvent`]s as the backend reports them. Large directories are fed
//! in batches so a single listing never monopolizes the event loop.
//!
//! ## Core Concepts
//!
//! - **FilePath**: canonical URI key of every node
//! - **FileSystem**: the backend contract (folders, info, volumes, bookmarks)
//! - **Folder**: a live directory listing with change notifications
//! - **SpecialLocation**: per-kind title, icon, visibility and access rules
//! - **FileSystemModel**: the tree itself, plus the [`TreeModel`] view of it
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fsmodel::backend::local::LocalFileSystem;
//! use fsmodel::{Column, FileSystemModel, TreeModel};
//!
//! # async fn example() -> fsmodel::FsResult<()> {
//! let backend = Arc::new(LocalFileSystem::new());
//! let mut model = FileSystemModel::new(backend)?;
//!
//! let documents = model.load_uri("file:///home/user/Documents").await?;
//! for child in model.children(&documents) {
//!     let name = model.get_value(&child, Column::DisplayName);
//!     println!("{:?}", name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cancellable;
pub mod config;
pub mod error;
pub mod file_info;
pub mod folder;
pub mod location;
pub mod metadata;
pub mod model;
pub mod path;
pub mod platform;
pub mod service;
pub mod volume;

pub use backend::{BackendEvent, FileSystem};
pub use backend::local::LocalFileSystem;
pub use backend::memory::MemoryFileSystem;
pub use backend::thumbnail::ThumbnailSize;
pub use cancellable::Cancellable;
pub use config::{LocationSpec, ModelConfig};
pub use error::{ErrorDisposition, FsError, FsErrorKind, FsResult};
pub use file_info::{FileAttributeType, FileInfo, FileType};
pub use folder::{Folder, FolderEvent, FolderMonitor, FolderSink, ListingFolder};
pub use location::{LocationFlags, LocationKind, LocationSignals, LocationType, SpecialLocation};
pub use metadata::MimeResolver;
pub use model::{
    Column, ColumnType, FileSystemModel, ModelEvent, NodeState, ObserverId, PresentationSettings, TreeIter,
    TreeModel, TreePath, Value,
};
pub use path::{path_to_uri, uri_to_path, FilePath};
pub use platform::{PlatformSettings, PlatformState};
pub use service::bookmarks::{Bookmark, BookmarksService};
pub use service::settings::ChooserSettings;
pub use volume::{Volume, VolumeState};
