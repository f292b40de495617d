//! Virtual device injection via uinput
//!
//! Playback talks to a [`KeySink`]; the daemon's sink is a uinput
//! [`VirtualDevice`] shared behind `Arc<Mutex<>>` with the playback task.

use std::sync::Arc;

use anyhow::Result;
use evdev::{uinput::VirtualDeviceBuilder, AttributeSet, InputEvent, Key};
use thiserror::Error;
use tokio::sync::Mutex;

/// Name of the uinput device the daemon creates.
///
/// Keyboard discovery skips devices with this name so injected events are
/// never read back as triggers.
pub const VIRTUAL_DEVICE_NAME: &str = "stratagem-mapper";

#[derive(Error, Debug)]
pub enum InjectError {
    #[error("failed to emit key event: {0}")]
    Io(#[from] std::io::Error),
}

/// Somewhere key presses and releases can be sent.
pub trait KeySink: Send {
    fn press(&mut self, key: Key) -> Result<(), InjectError>;
    fn release(&mut self, key: Key) -> Result<(), InjectError>;
}

/// A key sink shared between the event loop and playback tasks.
pub type SharedSink<S> = Arc<Mutex<S>>;

/// Create the shared virtual keyboard used for playback.
///
/// # Errors
///
/// Returns an error if the virtual device cannot be created (e.g., insufficient
/// permissions to access /dev/uinput).
pub fn create_shared_virtual_device(name: &str) -> Result<SharedSink<VirtualDevice>> {
    let device = VirtualDevice::new_keyboard(name)?;
    Ok(Arc::new(Mutex::new(device)))
}

/// A virtual input device for injecting events
pub struct VirtualDevice {
    device: evdev::uinput::VirtualDevice,
}

impl VirtualDevice {
    /// Create a new virtual keyboard device
    pub fn new_keyboard(name: &str) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();

        for code in 0..256u16 {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()?
            .name(name)
            .with_keys(&keys)?
            .build()?;

        Ok(Self { device })
    }

    fn emit_key(&mut self, key: Key, value: i32) -> Result<(), InjectError> {
        let event = InputEvent::new(evdev::EventType::KEY, key.code(), value);
        let syn = InputEvent::new(evdev::EventType::SYNCHRONIZATION, 0, 0);
        self.device.emit(&[event, syn])?;
        Ok(())
    }
}

impl KeySink for VirtualDevice {
    fn press(&mut self, key: Key) -> Result<(), InjectError> {
        self.emit_key(key, 1)
    }

    fn release(&mut self, key: Key) -> Result<(), InjectError> {
        self.emit_key(key, 0)
    }
}
