//! Platform state the special locations depend on.
//!
//! The values come from outside the library (a D-Bus or settings service
//! in a real session, a test in ours) and are pushed through a
//! [`PlatformSettings`] handle. Every clone shares the same state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformState {
    /// Name the device announces over Bluetooth; shown for the local device.
    pub bt_name: Option<String>,
    pub flight_mode: bool,
    /// Bonded Bluetooth devices, address to alias.
    pub bonded_devices: HashMap<String, String>,
    pub mmc_cover_open: bool,
    /// A USB cable in mass-storage mode makes the cards unavailable.
    pub usb_cable: bool,
    /// Set once the values above have been read at least once.
    pub ready: bool,
}

#[derive(Debug, Clone)]
pub struct PlatformSettings {
    sender: Arc<watch::Sender<PlatformState>>,
}

impl PlatformSettings {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(PlatformState::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Settings that are already known and never change on their own.
    pub fn ready_with(state: PlatformState) -> Self {
        let (sender, _) = watch::channel(PlatformState { ready: true, ..state });
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn snapshot(&self) -> PlatformState {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlatformState> {
        self.sender.subscribe()
    }

    /// Applies `f` and notifies subscribers when something actually changed.
    pub fn update(&self, f: impl FnOnce(&mut PlatformState)) {
        self.sender.send_if_modified(|state| {
            let before = state.clone();
            f(state);
            *state != before
        });
    }

    pub fn set_bt_name(&self, name: Option<String>) {
        self.update(|s| s.bt_name = name);
    }

    pub fn set_flight_mode(&self, on: bool) {
        self.update(|s| s.flight_mode = on);
    }

    pub fn set_bonded_device(&self, address: &str, alias: &str) {
        self.update(|s| {
            s.bonded_devices.insert(address.to_string(), alias.to_string());
        });
    }

    pub fn remove_bonded_device(&self, address: &str) {
        self.update(|s| {
            s.bonded_devices.remove(address);
        });
    }

    pub fn set_usb_cable(&self, connected: bool) {
        self.update(|s| s.usb_cable = connected);
    }

    pub fn set_mmc_cover_open(&self, open: bool) {
        self.update(|s| s.mmc_cover_open = open);
    }

    pub fn mark_ready(&self) {
        self.update(|s| s.ready = true);
    }

    pub fn is_ready(&self) -> bool {
        self.sender.borrow().ready
    }

    /// Waits until the settings have been read, at most `timeout`.
    /// Returns whether they became ready.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut receiver = self.subscribe();
        let ready = matches!(
            tokio::time::timeout(timeout, receiver.wait_for(|s| s.ready)).await,
            Ok(Ok(_))
        );
        if !ready {
            debug!("PlatformSettings: not ready after {:?}", timeout);
        }
        ready
    }
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn updates_only_notify_on_change() {
        let settings = PlatformSettings::new();
        let mut receiver = settings.subscribe();
        settings.set_flight_mode(false);
        assert!(!receiver.has_changed().unwrap());
        settings.set_flight_mode(true);
        assert!(receiver.has_changed().unwrap());
        receiver.borrow_and_update();
        assert!(settings.snapshot().flight_mode);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_ready_times_out() {
        let settings = PlatformSettings::new();
        assert!(!settings.wait_ready(Duration::from_millis(100)).await);
        let waiter = settings.clone();
        let task = tokio::spawn(async move { waiter.wait_ready(Duration::from_secs(1)).await });
        settings.mark_ready();
        assert!(task.await.unwrap());
    }
}
