use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use fsmodel::config::LocationCommon;
use fsmodel::{
    FilePath, FileSystemModel, LocationSpec, MemoryFileSystem, ModelConfig, ModelEvent, NodeState, PlatformSettings,
    PlatformState,
};

const DOCS: &str = "file:///home/user/MyDocs";

fn path(uri: &str) -> FilePath {
    FilePath::parse(uri).expect("Invalid test URI")
}

fn model_with_docs(fs: &MemoryFileSystem) -> FileSystemModel {
    let mut config = ModelConfig::bare("file:///");
    config.locations = vec![LocationSpec::LocalDevice {
        common: LocationCommon::new(DOCS, "Documents", 0),
    }];
    FileSystemModel::with_config(
        Arc::new(fs.clone()),
        config,
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

fn deleted(events: &Rc<RefCell<Vec<ModelEvent>>>) -> Vec<FilePath> {
    events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            ModelEvent::RowDeleted { uri, .. } => Some(uri.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_deleted_folder_is_kicked_with_subtree() {
    // 1. /A with two files, fully loaded
    let fs = MemoryFileSystem::new();
    fs.add_file("file:///A/x.txt", 1).unwrap();
    fs.add_file("file:///A/y.txt", 1).unwrap();
    let mut model = model_with_docs(&fs);
    model.load_uri("file:///A").await.expect("Failed to load /A");
    assert!(model.find_path(&path("file:///A/x.txt")).is_some());
    let before = model.node_count();
    let events = record(&mut model);

    // 2. Backend drops /A
    fs.remove("file:///A").unwrap();
    let gone = model
        .run_until(Duration::from_secs(1), |m| m.find_path(&path("file:///A")).is_none())
        .await;
    assert!(gone, "/A was not kicked");

    // 3. One row-deleted for the subtree root, nothing for the files
    assert_eq!(deleted(&events), vec![path("file:///A")]);
    assert_eq!(model.node_count(), before - 3);
    assert!(model.find_path(&path("file:///A/x.txt")).is_none());

    // 4. Late notifications for the kicked folder are ignored
    model.run_until(Duration::from_millis(50), |_| false).await;
    assert_eq!(deleted(&events).len(), 1);
}

#[tokio::test]
async fn test_reload_kicks_unconfirmed_children_only() {
    // 1. /A with x and y; the root also carries the grafted documents node
    let fs = MemoryFileSystem::new();
    fs.add_folder(DOCS).unwrap();
    fs.add_file("file:///A/x.txt", 1).unwrap();
    fs.add_file("file:///A/y.txt", 1).unwrap();
    let mut model = model_with_docs(&fs);
    let a = model.load_uri("file:///A").await.expect("Failed to load /A");
    let events = record(&mut model);

    // 2. Reload, and lose y before the new listing is taken. The old
    //    listing is already released so no removal event reaches the model.
    assert!(model.queue_reload(&a, true));
    fs.remove("file:///A/y.txt").unwrap();
    assert!(model.wait_loaded(&a, Duration::from_secs(1)).await);

    assert_eq!(deleted(&events), vec![path("file:///A/y.txt")]);
    assert!(model.find_path(&path("file:///A/x.txt")).is_some());
}

#[tokio::test]
async fn test_permanent_locations_survive_parent_reloads() {
    let fs = MemoryFileSystem::new();
    fs.add_folder(DOCS).unwrap();
    let mut model = model_with_docs(&fs);
    assert!(model.wait_root_scan().await);

    // The root lists /home, never the documents folder itself.
    let root = model.root_iter();
    let events = record(&mut model);
    assert!(model.queue_reload(&root, true));
    assert!(model.wait_loaded(&root, Duration::from_secs(1)).await);

    assert!(deleted(&events).is_empty());
    let docs = model.find_path(&path(DOCS)).expect("documents node kicked");
    assert!(model.node(&docs).is_some_and(|n| n.is_permanent()));
}

#[tokio::test]
async fn test_deleted_permanent_location_is_marked_unavailable() {
    let fs = MemoryFileSystem::new();
    fs.add_file(&format!("{}/notes.txt", DOCS), 1).unwrap();
    let mut model = model_with_docs(&fs);
    let docs = model.load_uri(DOCS).await.expect("Failed to load documents");
    assert_eq!(model.children(&docs).len(), 1);

    fs.remove(DOCS).unwrap();
    let errored = model
        .run_until(Duration::from_secs(1), |m| m.node_state(&docs) == Some(NodeState::Errored))
        .await;
    assert!(errored);
    assert!(model.find_path(&path(DOCS)).is_some());
}

#[tokio::test]
async fn test_kick_path_removes_subtree_but_never_the_root() {
    let fs = MemoryFileSystem::new();
    fs.add_file("file:///A/B/c.txt", 1).unwrap();
    let mut model = model_with_docs(&fs);
    model.load_uri("file:///A/B").await.expect("Failed to load /A/B");
    let events = record(&mut model);

    assert!(!model.kick_path(&path("file:///")));
    assert!(model.kick_path(&path("file:///A")));
    assert!(!model.kick_path(&path("file:///A")));

    assert_eq!(deleted(&events), vec![path("file:///A")]);
    assert!(model.find_path(&path("file:///A/B/c.txt")).is_none());
}

#[tokio::test]
async fn test_stale_iterators_stop_resolving() {
    let fs = MemoryFileSystem::new();
    fs.add_folder("file:///A").unwrap();
    let mut model = model_with_docs(&fs);
    let a = model.load_uri("file:///A").await.unwrap();

    model.kick_path(&path("file:///A"));
    assert!(model.node(&a).is_none());

    let root = model.root_iter();
    model.rebuild();
    assert!(model.node(&root).is_none());
    assert!(model.node(&model.root_iter()).is_some());
}
