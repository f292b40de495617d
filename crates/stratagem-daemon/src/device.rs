//! Keyboard discovery under /dev/input

use std::path::{Path, PathBuf};

use anyhow::Result;
use evdev::{Device, SoundType};

use crate::injector::VIRTUAL_DEVICE_NAME;

/// Information about an input device
#[derive(Debug)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub vendor: u16,
    pub product: u16,
    pub keyboard: bool,
}

impl DeviceInfo {
    /// Get vendor:product string (e.g., "3434:0361")
    pub fn vendor_product(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor, self.product)
    }
}

fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("event"))
        .unwrap_or(false)
}

/// Open every readable event node, sorted by path.
fn open_event_devices() -> Result<Vec<(PathBuf, Device)>> {
    let mut devices = Vec::new();

    for entry in std::fs::read_dir("/dev/input")? {
        let path = entry?.path();
        if !is_event_node(&path) {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => devices.push((path, device)),
            Err(e) => {
                tracing::debug!("Could not open {}: {}", path.display(), e);
            }
        }
    }

    devices.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(devices)
}

fn plays_tones(device: &Device) -> bool {
    device
        .supported_sounds()
        .map_or(false, |sounds| sounds.contains(SoundType::SND_TONE))
}

/// The first event node that can play tones (usually "PC Speaker").
///
/// Called once at startup; the daemon keeps the device open for its lifetime.
pub fn find_speaker() -> Option<(PathBuf, Device)> {
    match open_event_devices() {
        Ok(devices) => devices.into_iter().find(|(_, device)| plays_tones(device)),
        Err(e) => {
            tracing::debug!("Could not scan for a speaker: {:#}", e);
            None
        }
    }
}

/// Enumerate all input devices
pub fn enumerate_devices() -> Result<Vec<DeviceInfo>> {
    Ok(open_event_devices()?
        .into_iter()
        .map(|(path, device)| {
            let id = device.input_id();
            DeviceInfo {
                name: device.name().unwrap_or("Unknown").to_string(),
                vendor: id.vendor(),
                product: id.product(),
                keyboard: is_keyboard(&device),
                path,
            }
        })
        .collect())
}

/// Check if a device is a keyboard
pub fn is_keyboard(device: &Device) -> bool {
    device
        .supported_events()
        .contains(evdev::EventType::KEY)
        && device
            .supported_keys()
            .map(|keys| keys.contains(evdev::Key::KEY_A))
            .unwrap_or(false)
}

/// Whether a keyboard named `name` should be listened to.
///
/// Our own virtual device is never selected, so injected keys can't trigger
/// slots.
pub fn matches_filter(name: &str, filter: Option<&str>) -> bool {
    if name == VIRTUAL_DEVICE_NAME {
        return false;
    }
    match filter {
        Some(wanted) => name == wanted,
        None => true,
    }
}

/// Open the keyboards to read triggers from.
///
/// Devices are not grabbed: key presses still reach other applications.
pub fn open_keyboards(filter: Option<&str>) -> Result<Vec<(PathBuf, Device)>> {
    let keyboards: Vec<_> = open_event_devices()?
        .into_iter()
        .filter(|(_, device)| is_keyboard(device))
        .filter(|(_, device)| matches_filter(device.name().unwrap_or(""), filter))
        .collect();

    for (path, device) in &keyboards {
        tracing::info!(
            "Listening on {} ({})",
            device.name().unwrap_or("Unknown"),
            path.display()
        );
    }

    Ok(keyboards)
}
