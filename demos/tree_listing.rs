//! Example: Browse a folder through the tree model
//!
//! Loads a folder (the home directory by default), prints its rows the way
//! a file chooser would show them, then reports changes for a few seconds.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fsmodel::{Column, FileSystemModel, LocalFileSystem, ModelEvent, TreeModel, Value};

fn text(value: Option<Value>) -> String {
    value
        .as_ref()
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let dir = match args.get(1) {
        Some(arg) => PathBuf::from(arg),
        None => PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string())),
    };

    let mut model = FileSystemModel::new(Arc::new(LocalFileSystem::new()))?;
    let folder = model.load_local_path(&dir).await?;

    println!("{}:", text(model.get_value(&folder, Column::DisplayName)));
    for child in model.children(&folder) {
        let kind = if model.get_value(&child, Column::IsFolder).and_then(|v| v.as_bool()) == Some(true) {
            "DIR "
        } else {
            "FILE"
        };
        println!(
            "  [{}] {:<40} {}",
            kind,
            text(model.get_value(&child, Column::DisplayName)),
            text(model.get_value(&child, Column::ExtraInfo)),
        );
    }

    println!("\nWatching for changes...");
    model.connect(|event| match event {
        ModelEvent::RowInserted { path, .. } => println!("  [+] row {}", path),
        ModelEvent::RowDeleted { uri, .. } => println!("  [-] {}", uri),
        ModelEvent::DeviceDisconnected { uri, .. } => println!("  [!] {} disconnected", uri),
        _ => {}
    });
    model.run_until(Duration::from_secs(5), |_| false).await;

    Ok(())
}
