//! Bluetooth (OBEX), UPnP and SMB locations.

use crate::location::{LocationFlags, LocationKind, Protocol, SpecialLocation};
use crate::path::FilePath;
use crate::platform::PlatformState;

pub(crate) fn is_network(kind: &LocationKind) -> bool {
    matches!(
        kind,
        LocationKind::ObexRoot
            | LocationKind::ObexDevice { .. }
            | LocationKind::UpnpRoot
            | LocationKind::SmbRoot
            | LocationKind::DynamicDevice { .. }
    )
}

/// Some OBEX transports report `obex://[addr]/./Folder`; the dot segment
/// is dropped so the path matches the one the device root hands out.
pub fn collapse_dot_segments(path: FilePath) -> FilePath {
    let raw = path.path_part();
    if !raw.contains("/./") && !raw.ends_with("/.") {
        return path;
    }
    let cleaned: Vec<&str> = raw.split('/').filter(|segment| *segment != ".").collect();
    match path.with_path_part(&cleaned.join("/")) {
        Ok(rewritten) => rewritten,
        Err(_) => path,
    }
}

/// `[00:11:22:33:44:55]` to `00:11:22:33:44:55`.
pub fn obex_address(path: &FilePath) -> Option<String> {
    let authority = path.authority();
    let address = authority.strip_prefix('[')?.strip_suffix(']')?;
    (!address.is_empty()).then(|| address.to_ascii_uppercase())
}

pub(crate) fn obex_device_name(platform: &PlatformState, address: &str) -> String {
    platform
        .bonded_devices
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(address))
        .map(|(_, alias)| alias.clone())
        .unwrap_or_else(|| address.to_string())
}

pub(crate) fn obex_child(child: &FilePath, parent: &SpecialLocation) -> Option<SpecialLocation> {
    if child.scheme() != "obex" || !child.is_root() {
        return None;
    }
    let address = obex_address(child)?;
    let mut location = SpecialLocation::new(
        child.clone(),
        LocationKind::ObexDevice { address },
        parent.platform.clone(),
    )
    .with_sort_weight(parent.sort_weight());
    location.failed_access_message = parent.failed_access_message.clone();
    Some(location)
}

pub(crate) fn server_child(child: &FilePath, protocol: Protocol, parent: &SpecialLocation) -> SpecialLocation {
    let flags = match protocol {
        Protocol::Smb => LocationFlags::REQUIRES_ACCESS,
        Protocol::Upnp => LocationFlags::empty(),
    };
    let mut location = SpecialLocation::new(
        child.clone(),
        LocationKind::DynamicDevice { protocol },
        parent.platform.clone(),
    )
    .with_flags(flags)
    .with_sort_weight(parent.sort_weight());
    location.failed_access_message = parent.failed_access_message.clone();
    location
}
