//! File backed services around the model
//!
//! - BookmarksService: user bookmarks file
//! - ChooserSettings: persisted chooser UI state (pane position, sorting, ...)

pub mod bookmarks;
pub mod settings;
