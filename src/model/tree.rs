//! Column-oriented view of the model for tree widgets.
//!
//! Iterators carry the stamp of the tree generation they were made in and
//! stop resolving after [`FileSystemModel::rebuild`]. Reading the display
//! name, the icon or the children of a folder starts loading it.

use chrono::{Local, TimeZone};
use tokio::time::Instant;

use crate::backend::thumbnail;
use crate::error::FsErrorKind;
use crate::location::{LocationKind, LocationType};
use crate::metadata::{MimeResolver, FOLDER_MIME_TYPE};
use crate::model::arena::NodeId;
use crate::model::node::{ModelNode, NodeState};
use crate::model::FileSystemModel;

/// Opaque row handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeIter {
    pub(crate) stamp: u64,
    pub(crate) node: NodeId,
}

/// Row position as child indices from the top level; the root is `[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreePath(Vec<usize>);

impl TreePath {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<usize>> for TreePath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl std::fmt::Display for TreePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.0.iter().map(usize::to_string).collect();
        f.write_str(&parts.join(":"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Uri,
    LocalPath,
    FileName,
    DisplayName,
    SortKey,
    MimeType,
    FileSize,
    FileTime,
    IsFolder,
    IsAvailable,
    HasLocalPath,
    LocationType,
    Icon,
    IconExpanded,
    IconCollapsed,
    Thumbnail,
    LoadReady,
    Title,
    ExtraInfo,
    IsHidden,
    UnavailableReason,
    FailedAccessMessage,
    SortWeight,
    IsDrive,
    IsVisible,
}

impl Column {
    pub const ALL: [Column; 25] = [
        Column::Uri,
        Column::LocalPath,
        Column::FileName,
        Column::DisplayName,
        Column::SortKey,
        Column::MimeType,
        Column::FileSize,
        Column::FileTime,
        Column::IsFolder,
        Column::IsAvailable,
        Column::HasLocalPath,
        Column::LocationType,
        Column::Icon,
        Column::IconExpanded,
        Column::IconCollapsed,
        Column::Thumbnail,
        Column::LoadReady,
        Column::Title,
        Column::ExtraInfo,
        Column::IsHidden,
        Column::UnavailableReason,
        Column::FailedAccessMessage,
        Column::SortWeight,
        Column::IsDrive,
        Column::IsVisible,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Column> {
        Self::ALL.get(index).copied()
    }

    pub fn column_type(self) -> ColumnType {
        match self {
            Column::FileSize => ColumnType::UInt64,
            Column::FileTime => ColumnType::Int64,
            Column::SortWeight => ColumnType::Int,
            Column::LocationType => ColumnType::LocationType,
            Column::IsFolder
            | Column::IsAvailable
            | Column::HasLocalPath
            | Column::LoadReady
            | Column::IsHidden
            | Column::IsDrive
            | Column::IsVisible => ColumnType::Boolean,
            _ => ColumnType::String,
        }
    }

    /// Reading these columns of an unloaded folder starts loading it.
    fn triggers_link(self) -> bool {
        matches!(
            self,
            Column::DisplayName | Column::Icon | Column::IconExpanded | Column::IconCollapsed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Boolean,
    Int,
    UInt64,
    Int64,
    LocationType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(Option<String>),
    Boolean(bool),
    Int(i32),
    UInt64(u64),
    Int64(i64),
    LocationType(LocationType),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => s.as_deref(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// Generic tree-model contract. `None` as parent means the top level,
/// which holds a single row: the root.
pub trait TreeModel {
    fn n_columns(&self) -> usize;
    fn column_type(&self, column: usize) -> Option<ColumnType>;
    fn get_iter(&self, path: &TreePath) -> Option<TreeIter>;
    fn get_path(&self, iter: &TreeIter) -> Option<TreePath>;
    fn get_value(&mut self, iter: &TreeIter, column: Column) -> Option<Value>;
    fn iter_next(&self, iter: &TreeIter) -> Option<TreeIter>;
    fn iter_children(&mut self, parent: Option<&TreeIter>) -> Option<TreeIter>;
    fn iter_has_child(&mut self, iter: &TreeIter) -> bool;
    fn iter_n_children(&mut self, iter: Option<&TreeIter>) -> usize;
    fn iter_nth_child(&mut self, parent: Option<&TreeIter>, n: usize) -> Option<TreeIter>;
    fn iter_parent(&self, child: &TreeIter) -> Option<TreeIter>;
}

const FOLDER_SORT_WEIGHT: i32 = 100;
const FILE_SORT_WEIGHT: i32 = 200;

impl FileSystemModel {
    /// Starts the first load of a folder the view is looking at, or a
    /// reload once it went stale.
    fn maybe_link(&mut self, id: NodeId) {
        let threshold = self.config.reload_threshold();
        let due = self.nodes.get(id).is_some_and(|node| {
            node.is_folder()
                && node.location.as_ref().map_or(true, |l| l.is_available())
                && node.needs_reload(Instant::now(), threshold, false)
        });
        if due {
            self.link_node(id);
        }
    }

    fn display_name(&self, node: &ModelNode) -> String {
        node.caches
            .display_name
            .get_or_init(|| {
                node.location
                    .as_ref()
                    .and_then(|l| l.get_display_name(node.info.as_ref()))
                    .or_else(|| {
                        node.info
                            .as_ref()
                            .and_then(|i| i.get_display_name().or_else(|| i.get_name()))
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| node.path.basename())
            })
            .clone()
    }

    fn mime_type(node: &ModelNode) -> String {
        if let Some(content_type) = node.info.as_ref().and_then(|i| i.get_content_type()) {
            return content_type.to_string();
        }
        if node.is_folder() {
            return FOLDER_MIME_TYPE.to_string();
        }
        MimeResolver::guess_for_name(&node.path.basename())
    }

    fn icon(&self, node: &ModelNode, expanded: bool) -> Option<String> {
        let cell = if expanded {
            &node.caches.icon_expanded
        } else {
            &node.caches.icon
        };
        cell.get_or_init(|| {
            if let Some(icon) = node.location.as_ref().and_then(|l| l.get_icon(expanded)) {
                return Some(icon);
            }
            if node.is_folder() {
                return Some(if expanded { "folder-open" } else { "folder" }.to_string());
            }
            if let Some(icon) = node.info.as_ref().and_then(|i| i.get_icon()) {
                return Some(icon.to_string());
            }
            Some(MimeResolver::get_icon_name(&Self::mime_type(node)))
        })
        .clone()
    }

    fn thumbnail(&self, node: &ModelNode) -> Option<String> {
        node.caches
            .thumbnail
            .get_or_init(|| {
                let dir = self.thumbnail_dir.as_ref()?;
                if node.is_folder() || !MimeResolver::is_thumbnailable(&Self::mime_type(node)) {
                    return None;
                }
                let mtime = node.info.as_ref()?.get_modification_time()?;
                thumbnail::lookup_in(dir, node.path.as_uri(), mtime)
            })
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    }

    fn extra_info(&self, node: &ModelNode) -> Option<String> {
        node.caches
            .extra_info
            .get_or_init(|| {
                if node.is_folder() {
                    return None;
                }
                let info = node.info.as_ref()?;
                let size = format_size(info.get_size());
                let Some(mtime) = info.get_modification_time() else {
                    return Some(size);
                };
                let time = Local.timestamp_opt(mtime as i64, 0).single()?;
                let format = if self.presentation.clock_24h {
                    "%Y-%m-%d %H:%M"
                } else {
                    "%Y-%m-%d %I:%M %p"
                };
                Some(format!("{}, {}", size, time.format(format)))
            })
            .clone()
    }

    fn unavailable_reason(&self, node: &ModelNode) -> Option<String> {
        match &node.error {
            Some(error) => {
                let from_location = node
                    .location
                    .as_ref()
                    .and_then(|l| l.failed_access_message(&self.display_name(node)));
                Some(from_location.unwrap_or_else(|| match error.kind() {
                    FsErrorKind::PermissionDenied => "Access denied".to_string(),
                    _ => error.message().to_string(),
                }))
            }
            None => node.location.as_ref().and_then(|l| l.unavailable_reason()),
        }
    }

    fn value_of(&self, id: NodeId, column: Column) -> Option<Value> {
        let node = self.nodes.get(id)?;
        let value = match column {
            Column::Uri => Value::String(Some(node.path.as_uri().to_string())),
            Column::LocalPath => Value::String(
                node.path
                    .to_local_path()
                    .map(|p| p.to_string_lossy().into_owned()),
            ),
            Column::FileName => Value::String(Some(
                node.info
                    .as_ref()
                    .and_then(|i| i.get_name())
                    .map(str::to_string)
                    .unwrap_or_else(|| node.path.basename()),
            )),
            Column::DisplayName => Value::String(Some(self.display_name(node))),
            Column::SortKey => Value::String(Some(
                node.caches
                    .sort_key
                    .get_or_init(|| self.display_name(node).to_lowercase())
                    .clone(),
            )),
            Column::MimeType => Value::String(Some(Self::mime_type(node))),
            Column::FileSize => Value::UInt64(node.info.as_ref().map_or(0, |i| i.get_size())),
            Column::FileTime => Value::Int64(
                node.info
                    .as_ref()
                    .and_then(|i| i.get_modification_time())
                    .map_or(0, |t| t as i64),
            ),
            Column::IsFolder => Value::Boolean(node.is_folder()),
            Column::IsAvailable => Value::Boolean(self.unavailable_reason(node).is_none()),
            Column::HasLocalPath => Value::Boolean(node.path.is_local()),
            Column::LocationType => Value::LocationType(match &node.location {
                Some(location) => location.location_type(),
                None if node.is_folder() => LocationType::Folder,
                None => LocationType::File,
            }),
            Column::Icon | Column::IconCollapsed => Value::String(self.icon(node, false)),
            Column::IconExpanded => Value::String(self.icon(node, true)),
            Column::Thumbnail => Value::String(self.thumbnail(node)),
            Column::LoadReady => Value::Boolean(!node.is_folder() || node.state() == NodeState::Loaded),
            Column::Title => Value::String(node.info.as_ref().and_then(|i| i.get_title()).map(str::to_string)),
            Column::ExtraInfo => Value::String(self.extra_info(node)),
            Column::IsHidden => Value::Boolean(node.info.as_ref().is_some_and(|i| i.is_hidden())),
            Column::UnavailableReason => Value::String(self.unavailable_reason(node)),
            Column::FailedAccessMessage => Value::String(
                node.location
                    .as_ref()
                    .and_then(|l| l.failed_access_message(&self.display_name(node))),
            ),
            Column::SortWeight => Value::Int(match &node.location {
                Some(location) => location.sort_weight(),
                None if node.is_folder() => FOLDER_SORT_WEIGHT,
                None => FILE_SORT_WEIGHT,
            }),
            Column::IsDrive => Value::Boolean(matches!(
                node.location.as_ref().map(|l| l.kind()),
                Some(LocationKind::Voldev { .. })
            )),
            Column::IsVisible => Value::Boolean(match &node.location {
                Some(location) => location.is_visible(!node.children.is_empty()),
                None => true,
            }),
        };
        Some(value)
    }

    fn top_level(&self) -> NodeId {
        self.root
    }

    fn parent_or_top(&self, parent: Option<&TreeIter>) -> Option<Option<NodeId>> {
        match parent {
            None => Some(None),
            Some(iter) => self.resolve(iter).map(Some),
        }
    }
}

impl TreeModel for FileSystemModel {
    fn n_columns(&self) -> usize {
        Column::ALL.len()
    }

    fn column_type(&self, column: usize) -> Option<ColumnType> {
        Column::from_index(column).map(Column::column_type)
    }

    fn get_iter(&self, path: &TreePath) -> Option<TreeIter> {
        let (first, rest) = path.indices().split_first()?;
        if *first != 0 {
            return None;
        }
        let mut current = self.top_level();
        for index in rest {
            current = *self.nodes.get(current)?.children.get(*index)?;
        }
        Some(self.iter_for(current))
    }

    fn get_path(&self, iter: &TreeIter) -> Option<TreePath> {
        self.resolve(iter).and_then(|id| self.tree_path(id))
    }

    fn get_value(&mut self, iter: &TreeIter, column: Column) -> Option<Value> {
        let id = self.resolve(iter)?;
        if column.triggers_link() {
            self.maybe_link(id);
        }
        self.value_of(id, column)
    }

    fn iter_next(&self, iter: &TreeIter) -> Option<TreeIter> {
        let id = self.resolve(iter)?;
        let parent = self.nodes.get(id)?.parent?;
        let siblings = &self.nodes.get(parent)?.children;
        let position = siblings.iter().position(|c| *c == id)?;
        siblings.get(position + 1).map(|next| self.iter_for(*next))
    }

    fn iter_children(&mut self, parent: Option<&TreeIter>) -> Option<TreeIter> {
        self.iter_nth_child(parent, 0)
    }

    fn iter_has_child(&mut self, iter: &TreeIter) -> bool {
        self.iter_n_children(Some(iter)) > 0
    }

    fn iter_n_children(&mut self, iter: Option<&TreeIter>) -> usize {
        match self.parent_or_top(iter) {
            Some(None) => 1,
            Some(Some(id)) => {
                self.maybe_link(id);
                self.nodes.get(id).map_or(0, |n| n.children.len())
            }
            None => 0,
        }
    }

    fn iter_nth_child(&mut self, parent: Option<&TreeIter>, n: usize) -> Option<TreeIter> {
        match self.parent_or_top(parent)? {
            None => (n == 0).then(|| self.iter_for(self.top_level())),
            Some(id) => {
                self.maybe_link(id);
                let child = *self.nodes.get(id)?.children.get(n)?;
                Some(self.iter_for(child))
            }
        }
    }

    fn iter_parent(&self, child: &TreeIter) -> Option<TreeIter> {
        let id = self.resolve(child)?;
        self.nodes.get(id)?.parent.map(|p| self.iter_for(p))
    }
}

/// Human readable size: bytes below 1 kB, one decimal above.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["kB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
