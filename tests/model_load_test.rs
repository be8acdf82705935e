use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use fsmodel::{
    Bookmark, BackendEvent, Cancellable, FileInfo, FileSystem, FileSystemModel, FileType, FilePath, Folder,
    FolderSink, FsError, FsErrorKind, FsResult, ListingFolder, MemoryFileSystem, ModelConfig, ModelEvent,
    NodeState, PlatformSettings, PlatformState, Volume,
};

fn bare_model(fs: Arc<dyn FileSystem>) -> FileSystemModel {
    FileSystemModel::with_config(
        fs,
        ModelConfig::bare("file:///"),
        PlatformSettings::ready_with(PlatformState::default()),
    )
    .expect("Failed to create model")
}

fn record(model: &mut FileSystemModel) -> Rc<RefCell<Vec<ModelEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    model.connect(move |event| sink.borrow_mut().push(event.clone()));
    events
}

fn path(uri: &str) -> FilePath {
    FilePath::parse(uri).expect("Invalid test URI")
}

#[tokio::test]
async fn test_load_path_lists_folder_once() {
    // 1. Backend: /A holding x.txt and y.txt
    let fs = MemoryFileSystem::new();
    fs.add_file("file:///A/x.txt", 3).unwrap();
    fs.add_file("file:///A/y.txt", 5).unwrap();

    // 2. Model
    let mut model = bare_model(Arc::new(fs.clone()));
    let events = record(&mut model);

    // 3. Load /A
    let a = model.load_uri("file:///A").await.expect("Failed to load /A");

    // 4. Verify
    assert_eq!(model.node_state(&a), Some(NodeState::Loaded));
    let names: Vec<String> = model
        .children(&a)
        .iter()
        .filter_map(|c| model.node_path(c))
        .map(|p| p.basename())
        .collect();
    assert_eq!(names, vec!["x.txt", "y.txt"]);

    let finished = events
        .borrow()
        .iter()
        .filter(|e| matches!(e, ModelEvent::FinishedLoading { uri, .. } if *uri == path("file:///A")))
        .count();
    assert_eq!(finished, 1, "finished-loading must fire exactly once");
}

#[tokio::test]
async fn test_rows_are_inserted_parent_first() {
    let fs = MemoryFileSystem::new();
    fs.add_file("file:///A/x.txt", 3).unwrap();
    let mut model = bare_model(Arc::new(fs.clone()));
    let events = record(&mut model);

    model.load_uri("file:///A").await.expect("Failed to load /A");

    let inserted: Vec<Vec<usize>> = events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            ModelEvent::RowInserted { path, .. } => Some(path.indices().to_vec()),
            _ => None,
        })
        .collect();
    assert_eq!(inserted, vec![vec![0, 0], vec![0, 0, 0]]);
}

#[tokio::test]
async fn test_large_folders_are_added_in_batches() {
    // 1. 45 entries: two full batches and a remainder
    let fs = MemoryFileSystem::new();
    for i in 0..45 {
        fs.add_file(&format!("file:///big/file{:02}.txt", i), 1).unwrap();
    }
    let mut model = bare_model(Arc::new(fs.clone()));
    assert!(model.wait_root_scan().await);
    let big = model.find_path(&path("file:///big")).expect("/big not listed");

    // 2. Start the listing and step through the inbox
    assert!(model.queue_reload(&big, false));
    assert!(model.process_next().await);
    assert_eq!(model.children(&big).len(), 20);
    assert_eq!(model.node_state(&big), Some(NodeState::Linked));

    assert!(model.process_next().await);
    assert_eq!(model.children(&big).len(), 40);
    assert_eq!(model.node_state(&big), Some(NodeState::Linked));

    assert!(model.process_next().await);
    assert_eq!(model.children(&big).len(), 45);
    assert_eq!(model.node_state(&big), Some(NodeState::Loaded));
}

/// Hands out folders prepared by the test.
struct ScriptedFileSystem {
    folders: Mutex<HashMap<FilePath, ListingFolder>>,
    events: broadcast::Sender<BackendEvent>,
}

impl ScriptedFileSystem {
    fn new() -> Self {
        Self {
            folders: Mutex::new(HashMap::new()),
            events: broadcast::channel(4).0,
        }
    }

    fn prepare(&self, uri: &str) -> FolderSink {
        let (folder, sink) = ListingFolder::new(path(uri));
        self.folders.lock().unwrap().insert(path(uri), folder);
        sink
    }
}

#[async_trait]
impl FileSystem for ScriptedFileSystem {
    async fn get_folder(
        &self,
        path: &FilePath,
        _attributes: &str,
        _cancellable: Option<&Cancellable>,
    ) -> FsResult<Box<dyn Folder>> {
        match self.folders.lock().unwrap().remove(path) {
            Some(folder) => Ok(Box::new(folder)),
            None => Err(FsError::not_found(path)),
        }
    }

    async fn get_info(&self, path: &FilePath, _: &str, _: Option<&Cancellable>) -> FsResult<FileInfo> {
        Err(FsError::not_found(path))
    }

    async fn create_folder(&self, _: &FilePath, _: Option<&Cancellable>) -> FsResult<()> {
        Err(FsError::new(FsErrorKind::NotSupported, "read only"))
    }

    fn list_volumes(&self) -> Vec<Arc<dyn Volume>> {
        Vec::new()
    }

    async fn list_bookmarks(&self) -> FsResult<Vec<Bookmark>> {
        Ok(Vec::new())
    }

    async fn insert_bookmark(&self, _: &FilePath, _: Option<&str>, _: Option<usize>) -> FsResult<()> {
        Err(FsError::new(FsErrorKind::NotSupported, "read only"))
    }

    async fn remove_bookmark(&self, _: &FilePath) -> FsResult<()> {
        Err(FsError::new(FsErrorKind::NotSupported, "read only"))
    }

    fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }
}

fn sized(name: &str, size: u64) -> FileInfo {
    let mut info = FileInfo::for_entry(name, FileType::Regular);
    info.set_size(size);
    info
}

#[tokio::test]
async fn test_duplicate_adds_keep_one_node_with_latest_info() {
    // 1. Root listing reports x.txt, then reports it again with new info
    let fs = Arc::new(ScriptedFileSystem::new());
    let root_sink = fs.prepare("file:///");
    let x = path("file:///x.txt");

    let mut model = bare_model(fs.clone());
    root_sink.add(vec![(x.clone(), sized("x.txt", 1))]);
    root_sink.add(vec![(x.clone(), sized("x.txt", 2))]);
    root_sink.finish();

    // 2. Let the model catch up
    assert!(model.wait_root_scan().await);
    model
        .run_until(Duration::from_millis(200), |m| {
            m.find_path(&x)
                .and_then(|it| m.node(&it).and_then(|n| n.info().map(|i| i.get_size())))
                == Some(2)
        })
        .await;

    // 3. Exactly one node, carrying the newest info
    let root = model.root_iter();
    assert_eq!(model.children(&root).len(), 1);
    let node = model.find_path(&x).expect("x.txt missing");
    assert_eq!(model.node(&node).and_then(|n| n.info()).map(|i| i.get_size()), Some(2));
}

#[tokio::test]
async fn test_listing_reporting_a_path_twice_creates_one_node() {
    let fs = Arc::new(ScriptedFileSystem::new());
    let root_sink = fs.prepare("file:///");
    root_sink.preload(vec![(path("file:///a.txt"), sized("a.txt", 1))], true);
    let mut model = bare_model(fs.clone());
    assert!(model.wait_root_scan().await);

    // The same path announced again after loading.
    root_sink.add(vec![(path("file:///a.txt"), sized("a.txt", 7))]);
    model.run_until(Duration::from_millis(100), |_| false).await;

    let root = model.root_iter();
    assert_eq!(model.children(&root).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_nodes_reload_after_threshold() {
    // 1. /locked fails with a permission error
    let fs = MemoryFileSystem::new();
    fs.add_folder("file:///locked").unwrap();
    fs.fail_path("file:///locked", FsErrorKind::PermissionDenied).unwrap();
    let mut model = bare_model(Arc::new(fs.clone()));

    let err = model.load_uri("file:///locked").await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::PermissionDenied);
    let locked = model.find_path(&path("file:///locked")).expect("errored nodes are retained");
    assert_eq!(model.node_state(&locked), Some(NodeState::Errored));

    // 2. Not due yet
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(!model.queue_reload(&locked, false));

    // 3. Stale after the threshold; the reload succeeds once the failure clears
    fs.clear_failure("file:///locked").unwrap();
    tokio::time::advance(Duration::from_secs(21)).await;
    assert!(model.queue_reload(&locked, false));
    assert!(model.wait_loaded(&locked, Duration::from_secs(1)).await);
    assert_eq!(model.node_state(&locked), Some(NodeState::Loaded));
}

#[tokio::test]
async fn test_healthy_local_folders_are_not_reloaded() {
    let fs = MemoryFileSystem::new();
    fs.add_folder("file:///A").unwrap();
    let mut model = bare_model(Arc::new(fs.clone()));
    let a = model.load_uri("file:///A").await.unwrap();

    assert!(!model.queue_reload(&a, false));
    assert!(model.queue_reload(&a, true));
    assert_eq!(model.node_state(&a), Some(NodeState::Linking));
}

#[tokio::test]
async fn test_missing_paths_are_reported() {
    let fs = MemoryFileSystem::new();
    fs.add_folder("file:///A").unwrap();
    let mut model = bare_model(Arc::new(fs.clone()));

    let err = model.load_uri("file:///A/nothing").await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::NotFound);
    let err = model.load_uri("file:").await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::PartialInput);
}

#[tokio::test]
async fn test_search_does_not_load_folders() {
    let fs = MemoryFileSystem::new();
    fs.add_file("file:///A/x.txt", 1).unwrap();
    let mut model = bare_model(Arc::new(fs.clone()));

    let a = model.search_uri("file:///A").await.unwrap().expect("/A is listed by the root");
    assert_eq!(model.node_state(&a), Some(NodeState::Unlinked));
    assert!(model.search_uri("file:///A/x.txt").await.unwrap().is_none());
}

#[tokio::test]
async fn test_batch_size_comes_from_config() {
    let fs = MemoryFileSystem::new();
    for i in 0..12 {
        fs.add_file(&format!("file:///big/file{:02}.txt", i), 1).unwrap();
    }
    let mut config = ModelConfig::bare("file:///");
    config.batch_size = 5;
    let mut model = FileSystemModel::with_config(
        Arc::new(fs.clone()),
        config,
        PlatformSettings::ready_with(PlatformState::default()),
    )
    .expect("Failed to create model");
    assert!(model.wait_root_scan().await);
    let big = model.find_path(&path("file:///big")).unwrap();

    assert!(model.queue_reload(&big, false));
    assert!(model.process_next().await);
    assert_eq!(model.children(&big).len(), 5);
    assert!(model.wait_loaded(&big, Duration::from_secs(1)).await);
    assert_eq!(model.children(&big).len(), 12);
}
