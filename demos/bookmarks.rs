//! Example: List, add and remove bookmarks
//!
//! Uses a scratch bookmarks file so the user's own list is left alone.

use fsmodel::service::bookmarks::BookmarksService;
use fsmodel::FilePath;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let file = std::env::temp_dir().join("fsmodel_demo_bookmarks");
    let mut service = BookmarksService::with_path(file);
    service.load().await?;

    let music = FilePath::parse("file:///home/user/Music")?;
    if !service.has_bookmark(music.as_uri()) {
        service.add_bookmark(&music, Some("My music".to_string()))?;
    }
    let share = FilePath::parse("smb://server/share")?;
    if !service.has_bookmark(share.as_uri()) {
        service.insert_bookmark(&share, None, Some(0))?;
    }
    service.save().await?;

    println!("Bookmarks in {}:", service.path().display());
    for bookmark in service.get_bookmarks() {
        println!("  {} ({})", bookmark.name.as_deref().unwrap_or("-"), bookmark.uri);
    }

    service.remove_bookmark(&share)?;
    service.save().await?;
    Ok(())
}
