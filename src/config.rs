//! Model configuration: tree root, timing constants and the special
//! locations grafted onto the tree at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{ProjectDirs, UserDirs};
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{FsError, FsErrorKind, FsResult};
use crate::path::FilePath;

/// Fields every configured location carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCommon {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_weight: i32,
    /// `{name}` is replaced by the node's display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_access_message: Option<String>,
}

impl LocationCommon {
    pub fn new(path: impl Into<String>, title: &str, sort_weight: i32) -> Self {
        Self {
            path: path.into(),
            title: Some(title.to_string()),
            icon: None,
            sort_weight,
            failed_access_message: None,
        }
    }

    pub fn with_failed_access_message(mut self, message: &str) -> Self {
        self.failed_access_message = Some(message.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LocationSpec {
    LocalDevice {
        #[serde(flatten)]
        common: LocationCommon,
    },
    Voldev {
        #[serde(flatten)]
        common: LocationCommon,
        #[serde(default)]
        internal: bool,
    },
    Obex {
        #[serde(flatten)]
        common: LocationCommon,
    },
    Upnp {
        #[serde(flatten)]
        common: LocationCommon,
    },
    Smb {
        #[serde(flatten)]
        common: LocationCommon,
    },
}

impl LocationSpec {
    pub fn common(&self) -> &LocationCommon {
        match self {
            LocationSpec::LocalDevice { common }
            | LocationSpec::Voldev { common, .. }
            | LocationSpec::Obex { common }
            | LocationSpec::Upnp { common }
            | LocationSpec::Smb { common } => common,
        }
    }

    pub fn path(&self) -> FsResult<FilePath> {
        FilePath::parse(&self.common().path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub root: String,
    pub root_title: String,
    /// Children added per step before the rest is deferred.
    pub batch_size: usize,
    pub reload_threshold_secs: u64,
    pub root_scan_timeout_ms: u64,
    pub settings_timeout_ms: u64,
    pub locations: Vec<LocationSpec>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            root: "file:///".to_string(),
            root_title: "Device".to_string(),
            batch_size: 20,
            reload_threshold_secs: 30,
            root_scan_timeout_ms: 5000,
            settings_timeout_ms: 2000,
            locations: default_locations(),
        }
    }
}

fn documents_uri() -> String {
    UserDirs::new()
        .map(|dirs| dirs.home_dir().join("MyDocs"))
        .and_then(|path| FilePath::from_local_path(&path).ok())
        .map(|path| path.as_uri().to_string())
        .unwrap_or_else(|| "file:///home/user/MyDocs".to_string())
}

fn default_locations() -> Vec<LocationSpec> {
    vec![
        LocationSpec::LocalDevice {
            common: LocationCommon::new(documents_uri(), "Documents", 0),
        },
        LocationSpec::Voldev {
            common: LocationCommon::new("file:///media/mmc2", "Internal memory card", 10),
            internal: true,
        },
        LocationSpec::Voldev {
            common: LocationCommon::new("file:///media/mmc1", "Memory card", 20),
            internal: false,
        },
        LocationSpec::Obex {
            common: LocationCommon::new("obex:///", "Bluetooth devices", 40)
                .with_failed_access_message("Cannot connect to {name}"),
        },
        LocationSpec::Upnp {
            common: LocationCommon::new("upnpav:///", "Media servers", 50),
        },
        LocationSpec::Smb {
            common: LocationCommon::new("smb:///", "Shared folders", 60)
                .with_failed_access_message("Cannot open {name}"),
        },
    ]
}

impl ModelConfig {
    /// A bare tree: only the root, no special locations.
    pub fn bare(root: &str) -> Self {
        Self {
            root: root.to_string(),
            locations: Vec::new(),
            ..Self::default()
        }
    }

    pub fn root_path(&self) -> FsResult<FilePath> {
        FilePath::parse(&self.root)
    }

    pub fn reload_threshold(&self) -> Duration {
        Duration::from_secs(self.reload_threshold_secs)
    }

    pub fn root_scan_timeout(&self) -> Duration {
        Duration::from_millis(self.root_scan_timeout_ms)
    }

    pub fn settings_timeout(&self) -> Duration {
        Duration::from_millis(self.settings_timeout_ms)
    }

    /// Reads `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> FsResult<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("ModelConfig: {} missing, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> FsResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            FsError::with_source(FsErrorKind::InvalidArg, "Malformed model configuration", Box::new(e))
        })?;
        if config.batch_size == 0 {
            return Err(FsError::new(FsErrorKind::InvalidArg, "batch_size must be positive"));
        }
        config.root_path()?;
        for location in &config.locations {
            location.path()?;
        }
        Ok(config)
    }

    pub async fn load_default() -> FsResult<Self> {
        match default_config_path() {
            Some(path) => Self::load(&path).await,
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> FsResult<String> {
        toml::to_string(self).map_err(|e| {
            FsError::with_source(FsErrorKind::Failed, "Failed to serialize configuration", Box::new(e))
        })
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "fsmodel").map(|dirs| dirs.config_dir().join("model.toml"))
}
