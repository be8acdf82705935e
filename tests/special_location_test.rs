use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use fsmodel::config::LocationCommon;
use fsmodel::{
    Column, FilePath, FileSystemModel, FsErrorKind, LocationSpec, LocationType, MemoryFileSystem, ModelConfig,
    ModelEvent, NodeState, PlatformSettings, PlatformState, TreeModel, Value,
};

const PHONE: &str = "obex://[00:11:22:33:44:55]/";
const OFFICE: &str = "smb://office/";

fn path(uri: &str) -> FilePath {
    FilePath::parse(uri).expect("Invalid test URI")
}

fn config() -> ModelConfig {
    let mut config = ModelConfig::bare("file:///");
    config.locations = vec![
        LocationSpec::LocalDevice {
            common: LocationCommon::new("file:///home/user/MyDocs", "Documents", 0),
        },
        LocationSpec::Obex {
            common: LocationCommon::new("obex:///", "Bluetooth devices", 40)
                .with_failed_access_message("Cannot connect to {name}"),
        },
        LocationSpec::Smb {
            common: LocationCommon::new("smb:///", "Shared folders", 60)
                .with_failed_access_message("Cannot open {name}"),
        },
    ];
    config
}

fn backend() -> MemoryFileSystem {
    let fs = MemoryFileSystem::new();
    fs.add_folder("file:///home/user/MyDocs").unwrap();
    fs.add_folder("obex:///").unwrap();
    fs.add_folder("smb:///").unwrap();
    fs
}

async fn model(fs: &MemoryFileSystem, platform: PlatformSettings) -> FileSystemModel {
    let mut model = FileSystemModel::with_config(Arc::new(fs.clone()), config(), platform)
        .expect("Failed to create model");
    assert!(model.wait_root_scan().await);
    model
}

fn string(model: &mut FileSystemModel, uri: &str, column: Column) -> Option<String> {
    let iter = model.find_path(&path(uri))?;
    match model.get_value(&iter, column)? {
        Value::String(s) => s,
        other => panic!("{:?} is not a string column: {:?}", column, other),
    }
}

fn boolean(model: &mut FileSystemModel, uri: &str, column: Column) -> Option<bool> {
    let iter = model.find_path(&path(uri))?;
    model.get_value(&iter, column)?.as_bool()
}

#[tokio::test]
async fn test_configured_locations_are_grafted_under_root() {
    let fs = backend();
    let mut model = model(&fs, PlatformSettings::ready_with(PlatformState::default())).await;

    let root = model.root_iter();
    let uris: Vec<String> = model
        .children(&root)
        .iter()
        .filter_map(|c| model.node_path(c))
        .map(|p| p.as_uri().to_string())
        .collect();
    assert!(uris.contains(&"file:///home/user/MyDocs".to_string()));
    assert!(uris.contains(&"obex:///".to_string()));
    assert!(uris.contains(&"smb:///".to_string()));

    assert_eq!(string(&mut model, "file:///", Column::DisplayName).as_deref(), Some("Device"));
    assert_eq!(
        string(&mut model, "file:///home/user/MyDocs", Column::DisplayName).as_deref(),
        Some("Documents")
    );
    let docs = model.find_path(&path("file:///home/user/MyDocs")).unwrap();
    assert_eq!(model.get_value(&docs, Column::SortWeight), Some(Value::Int(0)));
    assert_eq!(
        model.get_value(&docs, Column::LocationType),
        Some(Value::LocationType(LocationType::LocalDevice))
    );
}

#[tokio::test]
async fn test_bluetooth_root_shows_once_a_device_appears() {
    // 1. An empty Bluetooth root stays hidden
    let fs = backend();
    let platform = PlatformSettings::ready_with(PlatformState::default());
    platform.set_bonded_device("00:11:22:33:44:55", "My phone");
    let mut model = model(&fs, platform).await;
    let obex = model.find_path(&path("obex:///")).unwrap();
    assert!(model.wait_loaded(&obex, Duration::from_secs(1)).await);
    assert_eq!(boolean(&mut model, "obex:///", Column::IsVisible), Some(false));

    // 2. A bonded phone shows up
    fs.add_child_folder("obex:///", PHONE).unwrap();
    let appeared = model
        .run_until(Duration::from_secs(1), |m| m.find_path(&path(PHONE)).is_some())
        .await;
    assert!(appeared);
    assert_eq!(boolean(&mut model, "obex:///", Column::IsVisible), Some(true));

    // 3. The phone is named after its alias and waits for the user
    assert_eq!(string(&mut model, PHONE, Column::DisplayName).as_deref(), Some("My phone"));
    let phone = model.find_path(&path(PHONE)).unwrap();
    assert_eq!(model.node_state(&phone), Some(NodeState::Unlinked));
    assert_eq!(
        model.get_value(&phone, Column::LocationType),
        Some(Value::LocationType(LocationType::BluetoothDevice))
    );

    model.access_node(&phone).unwrap();
    assert!(model.wait_loaded(&phone, Duration::from_secs(1)).await);
    assert_eq!(model.node_state(&phone), Some(NodeState::Loaded));
}

#[tokio::test]
async fn test_dot_segments_from_obex_are_collapsed() {
    let fs = backend();
    fs.add_child_folder(PHONE, "obex://[00:11:22:33:44:55]/./Pictures").unwrap();
    fs.add_child_folder("obex:///", PHONE).unwrap();
    let mut model = model(&fs, PlatformSettings::ready_with(PlatformState::default())).await;

    let phone = model.load_uri(PHONE).await.expect("Failed to load phone");
    let children: Vec<String> = model
        .children(&phone)
        .iter()
        .filter_map(|c| model.node_path(c))
        .map(|p| p.as_uri().to_string())
        .collect();
    assert_eq!(children, vec!["obex://[00:11:22:33:44:55]/Pictures"]);
}

#[tokio::test]
async fn test_server_timeout_disconnects_the_server() {
    // 1. A file server below the SMB root
    let fs = backend();
    fs.add_child_folder("smb:///", OFFICE).unwrap();
    fs.add_folder("smb://office/share").unwrap();
    let mut model = model(&fs, PlatformSettings::ready_with(PlatformState::default())).await;
    let office = model.load_uri(OFFICE).await.expect("Failed to load server");
    assert_eq!(model.children(&office).len(), 1);

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    model.connect(move |event| sink.borrow_mut().push(event.clone()));

    // 2. The share times out
    fs.fail_path("smb://office/share", FsErrorKind::TimedOut).unwrap();
    assert!(model.load_uri("smb://office/share").await.is_err());

    // 3. The whole server went down, not just the share
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, ModelEvent::DeviceDisconnected { uri, .. } if *uri == path(OFFICE))));
    assert_eq!(model.node_state(&office), Some(NodeState::Errored));
    assert!(model.children(&office).is_empty());
    assert_eq!(boolean(&mut model, OFFICE, Column::IsAvailable), Some(false));
    assert_eq!(
        string(&mut model, OFFICE, Column::UnavailableReason).as_deref(),
        Some("Cannot open office")
    );

    // 4. The user has to ask again before it reconnects
    assert!(model.node(&office).is_some_and(|n| !n.access_granted()));
}

#[tokio::test(start_paused = true)]
async fn test_rescanning_a_location_lists_it_again() {
    // 1. A loaded SMB root with one server
    let fs = backend();
    fs.add_child_folder("smb:///", OFFICE).unwrap();
    let mut model = model(&fs, PlatformSettings::ready_with(PlatformState::default())).await;
    let smb = model.load_uri("smb:///").await.expect("Failed to load SMB root");
    let started = fs.started_operations();

    // 2. A rescan starts a fresh listing; a second one waits for it
    fs.set_delay(Duration::from_secs(2));
    assert!(model.rescan_location(&smb).unwrap());
    assert!(!model.rescan_location(&smb).unwrap());
    assert!(model.wait_loaded(&smb, Duration::from_secs(10)).await);
    assert_eq!(fs.started_operations(), started + 1);
    assert_eq!(fs.cancelled_operations(), 0);
    assert!(model.find_path(&path(OFFICE)).is_some());

    // 3. Locations with nothing to rescan, and plain folders
    let docs = model.find_path(&path("file:///home/user/MyDocs")).unwrap();
    assert!(!model.rescan_location(&docs).unwrap());
    let home = model.find_path(&path("file:///home")).unwrap();
    let err = model.rescan_location(&home).unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::NotSupported);
}

#[tokio::test]
async fn test_permission_errors_are_retained_and_explained() {
    let fs = backend();
    fs.add_folder("file:///private").unwrap();
    fs.fail_path("file:///private", FsErrorKind::PermissionDenied).unwrap();
    let mut model = model(&fs, PlatformSettings::ready_with(PlatformState::default())).await;

    let err = model.load_uri("file:///private").await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::PermissionDenied);
    assert_eq!(
        string(&mut model, "file:///private", Column::UnavailableReason).as_deref(),
        Some("Access denied")
    );
    assert_eq!(boolean(&mut model, "file:///private", Column::IsAvailable), Some(false));
}

#[tokio::test]
async fn test_flight_mode_takes_network_locations_down() {
    // 1. A phone under the Bluetooth root
    let fs = backend();
    fs.add_child_folder("obex:///", PHONE).unwrap();
    let platform = PlatformSettings::ready_with(PlatformState::default());
    let mut model = model(&fs, platform.clone()).await;
    let obex = model.find_path(&path("obex:///")).unwrap();
    assert!(model.wait_loaded(&obex, Duration::from_secs(1)).await);
    assert_eq!(model.children(&obex).len(), 1);

    // 2. Flight mode on
    platform.set_flight_mode(true);
    let down = model
        .run_until(Duration::from_secs(1), |m| m.children(&obex).is_empty())
        .await;
    assert!(down);
    assert_eq!(boolean(&mut model, "obex:///", Column::IsVisible), Some(false));
    assert_eq!(
        string(&mut model, "obex:///", Column::UnavailableReason).as_deref(),
        Some("Not available in flight mode")
    );
    // Local locations are unaffected.
    assert_eq!(boolean(&mut model, "file:///home/user/MyDocs", Column::IsAvailable), Some(true));

    // 3. Flight mode off: looking at the root lists it again
    platform.set_flight_mode(false);
    model.run_until(Duration::from_millis(50), |_| false).await;
    model.iter_n_children(Some(&obex));
    let back = model
        .run_until(Duration::from_secs(1), |m| m.children(&obex).len() == 1)
        .await;
    assert!(back);
}

#[tokio::test]
async fn test_local_device_follows_bluetooth_name() {
    let fs = backend();
    let platform = PlatformSettings::ready_with(PlatformState::default());
    let mut model = model(&fs, platform.clone()).await;
    assert_eq!(
        string(&mut model, "file:///home/user/MyDocs", Column::DisplayName).as_deref(),
        Some("Documents")
    );

    platform.set_bt_name(Some("Tablet".to_string()));
    model.run_until(Duration::from_millis(100), |_| false).await;
    assert_eq!(
        string(&mut model, "file:///home/user/MyDocs", Column::DisplayName).as_deref(),
        Some("Tablet")
    );
}

#[tokio::test(start_paused = true)]
async fn test_remote_search_waits_for_settings() {
    let fs = backend();
    fs.add_child_folder("obex:///", PHONE).unwrap();
    let platform = PlatformSettings::new();
    let mut model = model(&fs, platform.clone()).await;

    // Settings never arrive: the search gives up after the timeout.
    let found = model.search_uri("obex:///").await.unwrap();
    assert!(found.is_some());
    assert!(!platform.is_ready());

    platform.mark_ready();
    assert!(model.search_uri(PHONE).await.unwrap().is_some());
}
