//! Special locations: tree nodes that stand for a device, a volume or a
//! protocol root rather than a plain directory.
//!
//! Every kind is a [`LocationKind`] variant. Kind specific behaviour lives
//! in [`device`] (root, local device, volumes) and [`network`] (OBEX, UPnP,
//! SMB); [`SpecialLocation`] dispatches to them.

pub mod device;
pub mod network;

use std::sync::Arc;

use bitflags::bitflags;

use crate::config::LocationSpec;
use crate::file_info::FileInfo;
use crate::path::FilePath;
use crate::platform::{PlatformSettings, PlatformState};
use crate::volume::{Volume, VolumeState};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LocationFlags: u32 {
        /// Not loaded until the user explicitly asks for it.
        const REQUIRES_ACCESS = 1 << 0;
        /// Never removed by a reload that does not list it.
        const PERMANENT = 1 << 1;
        /// Hidden while it has no children.
        const VISIBLE_NEEDS_CHILDREN = 1 << 2;
    }
}

bitflags! {
    /// What a location asks its node to do after re-evaluating itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LocationSignals: u32 {
        /// Title, icon, visibility or availability changed.
        const CHANGED = 1 << 0;
        /// The contents should be listed again.
        const RESCAN = 1 << 1;
        /// The transport went away; the node must be disconnected.
        const CONNECTION_STATE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Upnp,
    Smb,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationKind {
    Root,
    LocalDevice,
    /// Memory card or USB storage.
    Voldev {
        internal: bool,
        volume: Option<VolumeState>,
    },
    ObexRoot,
    ObexDevice {
        address: String,
    },
    UpnpRoot,
    SmbRoot,
    /// Media or file server discovered under a network root.
    DynamicDevice {
        protocol: Protocol,
    },
}

/// Value of the location-type column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    File,
    Folder,
    Root,
    LocalDevice,
    InternalCard,
    RemovableStorage,
    ObexRoot,
    BluetoothDevice,
    UpnpRoot,
    UpnpServer,
    SmbRoot,
    SmbServer,
}

#[derive(Debug, Clone)]
pub struct SpecialLocation {
    basepath: FilePath,
    fixed_title: Option<String>,
    fixed_icon: Option<String>,
    sort_weight: i32,
    flags: LocationFlags,
    failed_access_message: Option<String>,
    kind: LocationKind,
    platform: PlatformSettings,
}

impl SpecialLocation {
    pub fn new(basepath: FilePath, kind: LocationKind, platform: PlatformSettings) -> Self {
        let flags = match &kind {
            LocationKind::ObexDevice { .. } => LocationFlags::REQUIRES_ACCESS,
            LocationKind::ObexRoot | LocationKind::UpnpRoot | LocationKind::SmbRoot => {
                LocationFlags::PERMANENT | LocationFlags::VISIBLE_NEEDS_CHILDREN
            }
            LocationKind::DynamicDevice { protocol: Protocol::Smb } => LocationFlags::REQUIRES_ACCESS,
            LocationKind::DynamicDevice { .. } => LocationFlags::empty(),
            _ => LocationFlags::PERMANENT,
        };
        Self {
            basepath,
            fixed_title: None,
            fixed_icon: None,
            sort_weight: 0,
            flags,
            failed_access_message: None,
            kind,
            platform,
        }
    }

    /// Builds a configured location.
    pub fn from_spec(spec: &LocationSpec, basepath: FilePath, platform: PlatformSettings) -> Self {
        let kind = match spec {
            LocationSpec::LocalDevice { .. } => LocationKind::LocalDevice,
            LocationSpec::Voldev { internal, .. } => LocationKind::Voldev {
                internal: *internal,
                volume: None,
            },
            LocationSpec::Obex { .. } => LocationKind::ObexRoot,
            LocationSpec::Upnp { .. } => LocationKind::UpnpRoot,
            LocationSpec::Smb { .. } => LocationKind::SmbRoot,
        };
        let common = spec.common();
        let mut location = Self::new(basepath, kind, platform)
            .with_sort_weight(common.sort_weight);
        location.fixed_title = common.title.clone();
        location.fixed_icon = common.icon.clone();
        location.failed_access_message = common.failed_access_message.clone();
        location
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.fixed_title = Some(title.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.fixed_icon = Some(icon.into());
        self
    }

    pub fn with_sort_weight(mut self, weight: i32) -> Self {
        self.sort_weight = weight;
        self
    }

    pub fn with_flags(mut self, flags: LocationFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_failed_access_message(mut self, message: impl Into<String>) -> Self {
        self.failed_access_message = Some(message.into());
        self
    }

    pub fn basepath(&self) -> &FilePath {
        &self.basepath
    }

    pub fn kind(&self) -> &LocationKind {
        &self.kind
    }

    pub fn flags(&self) -> LocationFlags {
        self.flags
    }

    pub fn sort_weight(&self) -> i32 {
        self.sort_weight
    }

    pub fn fixed_title(&self) -> Option<&str> {
        self.fixed_title.as_deref()
    }

    pub fn requires_access(&self) -> bool {
        self.flags.contains(LocationFlags::REQUIRES_ACCESS)
    }

    pub fn is_permanent(&self) -> bool {
        self.flags.contains(LocationFlags::PERMANENT)
    }

    /// Nodes of these kinds are disconnected as a whole when a transport
    /// error occurs anywhere below them.
    pub fn is_device(&self) -> bool {
        matches!(
            self.kind,
            LocationKind::Voldev { .. } | LocationKind::ObexDevice { .. } | LocationKind::DynamicDevice { .. }
        )
    }

    fn platform(&self) -> PlatformState {
        self.platform.snapshot()
    }

    /// Title shown for the node, or `None` to use the file-system name.
    pub fn get_display_name(&self, info: Option<&FileInfo>) -> Option<String> {
        let platform = self.platform();
        match &self.kind {
            LocationKind::LocalDevice => device::local_device_name(&platform, self.fixed_title.as_deref()),
            LocationKind::Voldev { volume, .. } => {
                device::volume_display_name(volume.as_ref(), self.fixed_title.as_deref())
            }
            LocationKind::ObexDevice { address } => Some(network::obex_device_name(&platform, address)),
            LocationKind::DynamicDevice { .. } => self
                .fixed_title
                .clone()
                .or_else(|| info.and_then(|i| i.get_display_name()).map(str::to_string)),
            _ => self.fixed_title.clone(),
        }
    }

    pub fn get_icon(&self, expanded: bool) -> Option<String> {
        if let Some(icon) = &self.fixed_icon {
            return Some(icon.clone());
        }
        let icon = match &self.kind {
            LocationKind::Root => "computer",
            LocationKind::LocalDevice => "user-home",
            LocationKind::Voldev { volume: Some(volume), .. } if !volume.icon.is_empty() => {
                return Some(volume.icon.clone())
            }
            LocationKind::Voldev { internal: true, .. } => "media-flash",
            LocationKind::Voldev { .. } => "drive-removable-media",
            LocationKind::ObexRoot | LocationKind::ObexDevice { .. } => "bluetooth",
            LocationKind::UpnpRoot | LocationKind::SmbRoot | LocationKind::DynamicDevice { .. } => {
                if expanded {
                    "network-workgroup"
                } else {
                    "network-server"
                }
            }
        };
        Some(icon.to_string())
    }

    pub fn is_visible(&self, has_children: bool) -> bool {
        let platform = self.platform();
        if network::is_network(&self.kind) && platform.flight_mode {
            return false;
        }
        if let LocationKind::Voldev { volume, .. } = &self.kind {
            return volume.is_some();
        }
        if self.flags.contains(LocationFlags::VISIBLE_NEEDS_CHILDREN) {
            return has_children;
        }
        true
    }

    pub fn is_available(&self) -> bool {
        self.unavailable_reason().is_none()
    }

    /// Why the location cannot be opened right now.
    pub fn unavailable_reason(&self) -> Option<String> {
        let platform = self.platform();
        match &self.kind {
            LocationKind::Voldev { internal, volume } => {
                device::volume_unavailable_reason(&platform, *internal, volume.as_ref())
            }
            kind if network::is_network(kind) && platform.flight_mode => {
                Some("Not available in flight mode".to_string())
            }
            _ => None,
        }
    }

    /// The failed-access message with `{name}` filled in.
    pub fn failed_access_message(&self, display_name: &str) -> Option<String> {
        self.failed_access_message
            .as_ref()
            .map(|template| template.replace("{name}", display_name))
    }

    /// Canonical form of a child path reported by the backend.
    pub fn rewrite_path(&self, path: FilePath) -> FilePath {
        match &self.kind {
            LocationKind::ObexRoot | LocationKind::ObexDevice { .. } => network::collapse_dot_segments(path),
            _ => path,
        }
    }

    /// More specific location for a newly listed child, if it is one.
    pub fn create_child_location(
        &self,
        child: &FilePath,
        info: &FileInfo,
        volumes: &[Arc<dyn Volume>],
    ) -> Option<SpecialLocation> {
        match &self.kind {
            LocationKind::Root => device::child_volume(child, volumes)
                .map(|volume| device::dynamic_voldev(child.clone(), volume, self.platform.clone())),
            LocationKind::ObexRoot => network::obex_child(child, self),
            LocationKind::UpnpRoot if info.is_folder() => Some(network::server_child(child, Protocol::Upnp, self)),
            LocationKind::SmbRoot if info.is_folder() => Some(network::server_child(child, Protocol::Smb, self)),
            _ => None,
        }
    }

    /// Refreshes the cached volume of a voldev location.
    pub fn volumes_changed(&mut self, volumes: &[Arc<dyn Volume>]) -> LocationSignals {
        match &mut self.kind {
            LocationKind::Voldev { volume, .. } => device::refresh_volume(&self.basepath, volume, volumes),
            _ => LocationSignals::empty(),
        }
    }

    /// Asks the location to look at its contents again.
    pub fn rescan(&self) -> LocationSignals {
        match &self.kind {
            LocationKind::Voldev { volume: Some(v), .. } if v.mounted => LocationSignals::RESCAN,
            LocationKind::ObexRoot | LocationKind::UpnpRoot | LocationKind::SmbRoot => LocationSignals::RESCAN,
            _ => LocationSignals::empty(),
        }
    }

    /// Re-evaluates the location after a platform settings change.
    pub fn connection_state_changed(&self) -> LocationSignals {
        let platform = self.platform();
        match &self.kind {
            LocationKind::Root => LocationSignals::empty(),
            kind if network::is_network(kind) && platform.flight_mode => {
                LocationSignals::CHANGED | LocationSignals::CONNECTION_STATE
            }
            _ => LocationSignals::CHANGED,
        }
    }

    pub fn location_type(&self) -> LocationType {
        match &self.kind {
            LocationKind::Root => LocationType::Root,
            LocationKind::LocalDevice => LocationType::LocalDevice,
            LocationKind::Voldev { internal: true, .. } => LocationType::InternalCard,
            LocationKind::Voldev { .. } => LocationType::RemovableStorage,
            LocationKind::ObexRoot => LocationType::ObexRoot,
            LocationKind::ObexDevice { .. } => LocationType::BluetoothDevice,
            LocationKind::UpnpRoot => LocationType::UpnpRoot,
            LocationKind::SmbRoot => LocationType::SmbRoot,
            LocationKind::DynamicDevice { protocol: Protocol::Upnp } => LocationType::UpnpServer,
            LocationKind::DynamicDevice { protocol: Protocol::Smb } => LocationType::SmbServer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(uri: &str) -> FilePath {
        FilePath::parse(uri).unwrap()
    }

    #[test]
    fn default_flags_per_kind() {
        let platform = PlatformSettings::new();
        let root = SpecialLocation::new(path("file:///"), LocationKind::Root, platform.clone());
        assert!(root.is_permanent());
        assert!(!root.requires_access());

        let device = SpecialLocation::new(
            path("obex://[00:11:22:33:44:55]/"),
            LocationKind::ObexDevice {
                address: "00:11:22:33:44:55".into(),
            },
            platform,
        );
        assert!(device.requires_access());
        assert!(!device.is_permanent());
    }

    #[test]
    fn failed_access_template() {
        let location = SpecialLocation::new(path("smb:///"), LocationKind::SmbRoot, PlatformSettings::new())
            .with_failed_access_message("Cannot open {name}");
        assert_eq!(
            location.failed_access_message("Office").as_deref(),
            Some("Cannot open Office")
        );
    }

    #[test]
    fn network_roots_need_children_and_hide_in_flight_mode() {
        let platform = PlatformSettings::new();
        let obex = SpecialLocation::new(path("obex:///"), LocationKind::ObexRoot, platform.clone());
        assert!(!obex.is_visible(false));
        assert!(obex.is_visible(true));
        platform.set_flight_mode(true);
        assert!(!obex.is_visible(true));
        assert!(!obex.is_available());
        assert!(obex
            .connection_state_changed()
            .contains(LocationSignals::CONNECTION_STATE));
    }
}
