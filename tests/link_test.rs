use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use fsmodel::{
    Column, FilePath, FileSystemModel, MemoryFileSystem, ModelConfig, ModelEvent, NodeState, PlatformSettings,
    PlatformState, TreeModel,
};

fn path(uri: &str) -> FilePath {
    FilePath::parse(uri).expect("Invalid test URI")
}

async fn loaded_model(fs: &MemoryFileSystem) -> FileSystemModel {
    let mut model = FileSystemModel::with_config(
        Arc::new(fs.clone()),
        ModelConfig::bare("file:///"),
        PlatformSettings::ready_with(PlatformState::default()),
    )
    .expect("Failed to create model");
    assert!(model.wait_root_scan().await);
    model
}

#[tokio::test]
async fn test_reading_columns_links_a_folder_once() {
    let fs = MemoryFileSystem::new();
    fs.add_file("file:///A/x.txt", 1).unwrap();
    let mut model = loaded_model(&fs).await;
    let started = fs.started_operations();
    let a = model.find_path(&path("file:///A")).unwrap();

    // Display name and icon both ask for the folder; only one request goes out.
    let name = model.get_value(&a, Column::DisplayName).unwrap();
    assert_eq!(name.as_str(), Some("A"));
    model.get_value(&a, Column::Icon);
    model.iter_n_children(Some(&a));
    assert_eq!(model.node_state(&a), Some(NodeState::Linking));

    assert!(model.wait_loaded(&a, Duration::from_secs(1)).await);
    assert_eq!(fs.started_operations(), started + 1);

    // Reading again after the load does not start another one.
    model.get_value(&a, Column::DisplayName);
    assert_eq!(fs.started_operations(), started + 1);
}

#[tokio::test]
async fn test_files_never_link() {
    let fs = MemoryFileSystem::new();
    fs.add_file("file:///x.txt", 1).unwrap();
    let mut model = loaded_model(&fs).await;
    let started = fs.started_operations();
    let x = model.find_path(&path("file:///x.txt")).unwrap();

    model.get_value(&x, Column::DisplayName);
    assert!(!model.iter_has_child(&x));
    assert_eq!(fs.started_operations(), started);
    assert_eq!(model.get_value(&x, Column::LoadReady).and_then(|v| v.as_bool()), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_kicking_a_linking_node_cancels_its_request() {
    // 1. A slow transport
    let fs = MemoryFileSystem::new();
    fs.add_folder("file:///slow").unwrap();
    let mut model = loaded_model(&fs).await;
    fs.set_delay(Duration::from_secs(5));
    let slow = model.find_path(&path("file:///slow")).unwrap();

    // 2. Start loading, let the request begin waiting
    assert!(model.queue_reload(&slow, false));
    model.run_until(Duration::from_millis(10), |_| false).await;
    assert_eq!(model.node_state(&slow), Some(NodeState::Linking));

    // 3. Kick it: the request is cancelled, its late result is never applied
    assert!(model.kick_path(&path("file:///slow")));
    model.run_until(Duration::from_secs(10), |_| false).await;
    assert_eq!(fs.cancelled_operations(), 1);
    assert!(model.find_path(&path("file:///slow")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_linking_nodes_refuse_reloads() {
    let fs = MemoryFileSystem::new();
    fs.add_folder("file:///slow").unwrap();
    let mut model = loaded_model(&fs).await;
    fs.set_delay(Duration::from_secs(5));
    let slow = model.find_path(&path("file:///slow")).unwrap();
    let started = fs.started_operations();

    assert!(model.queue_reload(&slow, false));
    assert!(!model.queue_reload(&slow, true));
    model.access_node(&slow).unwrap();

    assert!(model.wait_loaded(&slow, Duration::from_secs(10)).await);
    assert_eq!(fs.started_operations(), started + 1);
    assert_eq!(fs.cancelled_operations(), 0);
    assert_eq!(model.node_state(&slow), Some(NodeState::Loaded));
}

#[tokio::test]
async fn test_nodes_still_receiving_batches_refuse_reloads() {
    // 1. More children than fit in one batch
    let fs = MemoryFileSystem::new();
    for i in 0..50 {
        fs.add_file(&format!("file:///big/file{:02}.txt", i), 1).unwrap();
    }
    let mut config = ModelConfig::bare("file:///");
    config.batch_size = 20;
    let mut model = FileSystemModel::with_config(
        Arc::new(fs.clone()),
        config,
        PlatformSettings::ready_with(PlatformState::default()),
    )
    .expect("Failed to create model");
    assert!(model.wait_root_scan().await);
    let big = model.find_path(&path("file:///big")).unwrap();
    let started = fs.started_operations();

    // 2. Folder attached, first batch in, the rest still queued
    assert!(model.queue_reload(&big, false));
    assert!(model.process_next().await);
    assert_eq!(model.node_state(&big), Some(NodeState::Linked));
    assert_eq!(model.children(&big).len(), 20);

    // 3. Nothing restarts the listing in progress
    assert!(!model.queue_reload(&big, false));
    assert!(!model.queue_reload(&big, true));
    model.get_value(&big, Column::DisplayName);
    model.get_value(&big, Column::Icon);
    model.iter_n_children(Some(&big));
    model.access_node(&big).unwrap();
    assert_eq!(model.node_state(&big), Some(NodeState::Linked));

    assert!(model.wait_loaded(&big, Duration::from_secs(1)).await);
    assert_eq!(model.children(&big).len(), 50);
    assert_eq!(fs.started_operations(), started + 1);
    assert_eq!(fs.cancelled_operations(), 0);
}

#[tokio::test]
async fn test_streamed_listing_finishes_after_last_add() {
    // Folders delivered empty and filled from the transport side.
    let fs = MemoryFileSystem::new();
    for i in 0..30 {
        fs.add_file(&format!("file:///stream/{}.txt", i), 1).unwrap();
    }
    fs.set_streaming(true);
    let mut model = loaded_model(&fs).await;
    let events = Rc::new(RefCell::new(0));
    let counter = events.clone();
    model.connect(move |event| {
        if matches!(event, ModelEvent::FinishedLoading { .. }) {
            *counter.borrow_mut() += 1;
        }
    });

    let stream = model.load_uri("file:///stream").await.expect("Failed to load stream");
    assert_eq!(model.children(&stream).len(), 30);
    assert_eq!(model.node_state(&stream), Some(NodeState::Loaded));
    assert_eq!(*events.borrow(), 1);
}
