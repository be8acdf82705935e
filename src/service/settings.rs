//! Small key-value store for file chooser UI state.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{FsError, FsErrorKind, FsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    Name,
    Type,
    Modified,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewMode {
    #[default]
    List,
    Thumbnails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChooserSettings {
    pub pane_position: i32,
    pub show_hidden: bool,
    pub sort_key: SortKey,
    pub sort_order: SortOrder,
    pub view_mode: ViewMode,
    pub last_folder: Option<String>,
    pub clock_24h: bool,
}

impl Default for ChooserSettings {
    fn default() -> Self {
        Self {
            pane_position: 250,
            show_hidden: false,
            sort_key: SortKey::Name,
            sort_order: SortOrder::Ascending,
            view_mode: ViewMode::List,
            last_folder: None,
            clock_24h: true,
        }
    }
}

impl ChooserSettings {
    /// Reads settings from `path`; a missing file yields defaults and a
    /// malformed one is logged and ignored.
    pub async fn load(path: &Path) -> FsResult<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        match toml::from_str(&content) {
            Ok(settings) => {
                debug!("ChooserSettings: loaded {}", path.display());
                Ok(settings)
            }
            Err(e) => {
                warn!("ChooserSettings: ignoring malformed {}: {}", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    pub async fn save(&self, path: &Path) -> FsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string(self).map_err(|e| {
            FsError::with_source(FsErrorKind::Failed, "Failed to serialize settings", Box::new(e))
        })?;
        fs::write(path, content).await?;
        Ok(())
    }

    pub async fn load_default() -> FsResult<Self> {
        match default_settings_path() {
            Some(path) => Self::load(&path).await,
            None => Ok(Self::default()),
        }
    }

    pub async fn save_default(&self) -> FsResult<()> {
        let path = default_settings_path()
            .ok_or_else(|| FsError::new(FsErrorKind::Failed, "Could not determine config directory"))?;
        self.save(&path).await
    }
}

pub fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "fsmodel").map(|dirs| dirs.config_dir().join("chooser.toml"))
}
