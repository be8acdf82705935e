//! Root, local device and volume (memory card, USB storage) locations.

use std::sync::Arc;

use crate::location::{LocationFlags, LocationKind, LocationSignals, SpecialLocation};
use crate::path::FilePath;
use crate::platform::{PlatformSettings, PlatformState};
use crate::volume::{Volume, VolumeState};

/// The local device is called after its Bluetooth name when it has one.
pub(crate) fn local_device_name(platform: &PlatformState, fixed_title: Option<&str>) -> Option<String> {
    platform
        .bt_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| fixed_title.map(str::to_string))
}

/// Cleans up a file-system label for display: trailing blanks go, and
/// an all-uppercase label (as FAT formatters write them) is turned into
/// a capitalized one.
pub fn beautify_label(label: &str) -> String {
    let trimmed = label.trim_end();
    let has_lower = trimmed.chars().any(char::is_lowercase);
    let has_upper = trimmed.chars().any(char::is_uppercase);
    if has_lower || !has_upper {
        return trimmed.to_string();
    }
    let lower = trimmed.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) fn volume_display_name(volume: Option<&VolumeState>, fixed_title: Option<&str>) -> Option<String> {
    if let Some(title) = fixed_title {
        return Some(title.to_string());
    }
    volume
        .map(|v| beautify_label(&v.label))
        .filter(|label| !label.is_empty())
}

pub(crate) fn volume_unavailable_reason(
    platform: &PlatformState,
    internal: bool,
    volume: Option<&VolumeState>,
) -> Option<String> {
    if platform.usb_cable {
        return Some("Not available while the USB cable is connected".to_string());
    }
    if !internal && platform.mmc_cover_open {
        return Some("Memory card cover is open".to_string());
    }
    match volume {
        None => Some("No memory card inserted".to_string()),
        Some(v) if !v.mounted => Some("Not mounted".to_string()),
        Some(_) => None,
    }
}

/// Removable volume mounted exactly at `child`.
pub(crate) fn child_volume<'a>(child: &FilePath, volumes: &'a [Arc<dyn Volume>]) -> Option<&'a Arc<dyn Volume>> {
    volumes
        .iter()
        .find(|volume| volume.is_removable() && &volume.get_activation_root() == child)
}

/// Location for a volume that showed up at runtime.
pub fn dynamic_voldev(root: FilePath, volume: &Arc<dyn Volume>, platform: PlatformSettings) -> SpecialLocation {
    SpecialLocation::new(
        root,
        LocationKind::Voldev {
            internal: false,
            volume: Some(VolumeState::of(volume.as_ref())),
        },
        platform,
    )
    .with_flags(LocationFlags::empty())
    .with_sort_weight(30)
}

pub(crate) fn refresh_volume(
    basepath: &FilePath,
    current: &mut Option<VolumeState>,
    volumes: &[Arc<dyn Volume>],
) -> LocationSignals {
    let fresh = volumes
        .iter()
        .find(|volume| &volume.get_activation_root() == basepath)
        .map(|volume| VolumeState::of(volume.as_ref()));
    if &fresh == current {
        return LocationSignals::empty();
    }

    let was_mounted = current.as_ref().is_some_and(|v| v.mounted);
    let now_mounted = fresh.as_ref().is_some_and(|v| v.mounted);
    *current = fresh;

    let mut signals = LocationSignals::CHANGED;
    if now_mounted && !was_mounted {
        signals |= LocationSignals::RESCAN;
    }
    if was_mounted && !now_mounted {
        signals |= LocationSignals::CONNECTION_STATE;
    }
    signals
}
