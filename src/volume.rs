use async_trait::async_trait;

use crate::cancellable::Cancellable;
use crate::error::FsResult;
use crate::path::FilePath;

#[async_trait]
pub trait Volume: Send + Sync + std::fmt::Debug {
    /// Gets the name (filesystem label) of the volume.
    fn get_name(&self) -> String;

    /// Gets the icon name for the volume.
    fn get_icon(&self) -> String;

    /// Gets the UUID of the volume.
    fn get_uuid(&self) -> Option<String>;

    /// Where the contents of the volume appear once mounted.
    fn get_activation_root(&self) -> FilePath;

    fn is_mounted(&self) -> bool;

    /// Checks if the volume sits on removable media (memory card, USB stick).
    fn is_removable(&self) -> bool;

    fn can_mount(&self) -> bool;

    fn can_eject(&self) -> bool;

    /// Mounts the volume.
    async fn mount(&self, cancellable: Option<&Cancellable>) -> FsResult<()>;
}

/// Plain snapshot of a volume, as seen by a special location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeState {
    pub label: String,
    pub icon: String,
    pub mounted: bool,
    pub removable: bool,
}

impl VolumeState {
    pub fn of(volume: &dyn Volume) -> Self {
        Self {
            label: volume.get_name(),
            icon: volume.get_icon(),
            mounted: volume.is_mounted(),
            removable: volume.is_removable(),
        }
    }
}
