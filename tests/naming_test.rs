use std::sync::Arc;
use std::time::Duration;

use fsmodel::{
    FilePath, FileSystemModel, FsErrorKind, MemoryFileSystem, ModelConfig, ModelEvent, PlatformSettings,
    PlatformState,
};

fn path(uri: &str) -> FilePath {
    FilePath::parse(uri).expect("Invalid test URI")
}

fn bare_model(fs: &MemoryFileSystem) -> FileSystemModel {
    FileSystemModel::with_config(
        Arc::new(fs.clone()),
        ModelConfig::bare("file:///"),
        PlatformSettings::ready_with(PlatformState::default()),
    )
    .expect("Failed to create model")
}

#[tokio::test]
async fn test_new_unique_name_skips_taken_counters() {
    let fs = MemoryFileSystem::new();
    fs.add_file("file:///Docs/file.txt", 1).unwrap();
    fs.add_file("file:///Docs/File%20(1).TXT", 1).unwrap();
    fs.add_file("file:///Docs/file%20(3).txt", 1).unwrap();
    let mut model = bare_model(&fs);
    let docs = model.load_uri("file:///Docs").await.unwrap();

    assert_eq!(model.new_unique_name(&docs, "file", ".txt").unwrap(), "file (2).txt");
    assert_eq!(model.new_unique_name(&docs, "other", ".txt").unwrap(), "other.txt");
}

#[tokio::test]
async fn test_autoname_uri_loads_the_parent() {
    let fs = MemoryFileSystem::new();
    fs.add_file("file:///Pictures/photo.jpg", 1).unwrap();
    fs.add_file("file:///Pictures/photo%20(1).jpg", 1).unwrap();
    fs.add_file("file:///Pictures/backup.tar.gz", 1).unwrap();
    let mut model = bare_model(&fs);

    // A counter already in the name is replaced, not appended to.
    let free = model.autoname_uri(&path("file:///Pictures/photo%20(1).jpg")).await.unwrap();
    assert_eq!(free, path("file:///Pictures/photo%20(2).jpg"));

    let free = model.autoname_uri(&path("file:///Pictures/backup.tar.gz")).await.unwrap();
    assert_eq!(free, path("file:///Pictures/backup%20(1).tar.gz"));

    let free = model.autoname_uri(&path("file:///Pictures/new.png")).await.unwrap();
    assert_eq!(free, path("file:///Pictures/new.png"));

    let err = model.autoname_uri(&path("file:///Nowhere/a.txt")).await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::NotFound);
}

#[tokio::test]
async fn test_created_folders_show_up_in_the_tree() {
    let fs = MemoryFileSystem::new();
    fs.add_folder("file:///Docs").unwrap();
    let mut model = bare_model(&fs);
    let docs = model.load_uri("file:///Docs").await.unwrap();

    let created = model.create_folder(&docs, "Letters").await.unwrap();
    assert_eq!(created, path("file:///Docs/Letters"));
    let shown = model
        .run_until(Duration::from_secs(1), |m| m.find_path(&created).is_some())
        .await;
    assert!(shown);

    let err = model.create_folder(&docs, "Letters").await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::Exists);
}

#[tokio::test]
async fn test_bookmark_changes_are_announced() {
    let fs = MemoryFileSystem::new();
    fs.add_folder("file:///Docs").unwrap();
    let mut model = bare_model(&fs);
    let mut events = model.subscribe();

    model.insert_bookmark(&path("file:///Docs"), Some("Work"), None).await.unwrap();
    let err = model.insert_bookmark(&path("file:///Docs"), None, None).await.unwrap_err();
    assert_eq!(err.kind(), FsErrorKind::Exists);
    let bookmarks = model.list_bookmarks().await.unwrap();
    assert_eq!(bookmarks.len(), 1);
    assert_eq!(bookmarks[0].uri, "file:///Docs");

    model.run_until(Duration::from_millis(50), |_| false).await;
    let mut announced = false;
    while let Ok(event) = events.try_recv() {
        announced |= matches!(event, ModelEvent::BookmarksChanged);
    }
    assert!(announced);

    model.remove_bookmark(&path("file:///Docs")).await.unwrap();
    assert!(model.list_bookmarks().await.unwrap().is_empty());
}
