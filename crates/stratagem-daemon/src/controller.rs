//! Slot assignment and remapping
//!
//! [`SlotAssignmentController`] owns the slot table and the key bindings. It
//! is driven by the event loop only; playback tasks receive owned
//! [`PlaybackRequest`]s and never touch controller state.
//!
//! Every mutation (assign, clear, swap, remap commit, bind, settings change)
//! hands the resulting [`Profile`] to the registered [`ChangeObserver`].

use std::path::PathBuf;
use std::sync::Arc;

use evdev::Key;
use serde::{Deserialize, Serialize};
use stratagem_config::{
    format_sequence, KeybindMode, Profile, Settings, SlotConfig, SlotLayout, MAX_LATENCY_MS,
    MIN_LATENCY_MS, NUMPAD_LAYOUT,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::binding::{BindingError, KeyBindingStore, SlotId};
use crate::catalog::{CatalogError, MacroCatalog};
use crate::keys::key_label;
use crate::player::PlaybackRequest;

/// Label shown on a slot while it waits for a key.
pub const REMAP_PROMPT: &str = "Press any key...";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Unknown slot: {0}")]
    UnknownSlot(SlotId),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    #[error("No slot is being remapped")]
    NotRemapping,

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    /// Waiting for the next key press to become this slot's key.
    Remapping,
}

/// One numpad position.
#[derive(Debug, Clone)]
pub struct Slot {
    pub id: SlotId,
    pub label: String,
    pub stratagem: Option<String>,
    pub state: SlotState,
    layout: &'static SlotLayout,
}

/// Where a dragged stratagem came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragPayload {
    FromSidebar { name: String },
    FromSlot { slot: SlotId },
}

/// Read-only view of a slot, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub slot_id: SlotId,
    pub key_code: Option<u16>,
    pub label: String,
    pub stratagem: Option<String>,
    /// Arrow rendering of the assigned sequence
    pub sequence: Option<String>,
    pub icon: Option<PathBuf>,
    pub row: u8,
    pub col: u8,
    pub row_span: u8,
    pub col_span: u8,
    pub remapping: bool,
}

/// Partial settings change; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub latency_ms: Option<u64>,
    pub macros_enabled: Option<bool>,
    pub keybind_mode: Option<KeybindMode>,
    pub sound_enabled: Option<bool>,
    pub visual_enabled: Option<bool>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to `settings`, leaving them untouched if a value is out of range.
    pub fn apply(&self, settings: &mut Settings) -> Result<(), ControllerError> {
        if let Some(latency) = self.latency_ms {
            if !(MIN_LATENCY_MS..=MAX_LATENCY_MS).contains(&latency) {
                return Err(ControllerError::InvalidSetting(format!(
                    "latency must be between {} and {} ms, got {}",
                    MIN_LATENCY_MS, MAX_LATENCY_MS, latency
                )));
            }
            settings.latency_ms = latency;
        }
        if let Some(enabled) = self.macros_enabled {
            settings.macros_enabled = enabled;
        }
        if let Some(mode) = self.keybind_mode {
            settings.keybind_mode = mode;
        }
        if let Some(enabled) = self.sound_enabled {
            settings.sound_enabled = enabled;
        }
        if let Some(enabled) = self.visual_enabled {
            settings.visual_enabled = enabled;
        }
        Ok(())
    }
}

/// What the event loop should do with a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not bound to any slot.
    Ignored,
    /// The remapping slot took this key.
    Remapped { slot: SlotId, label: String },
    /// Escape ended the remap without changes.
    RemapCancelled { slot: SlotId },
    /// The key belongs to another slot; still remapping.
    RemapRejected { slot: SlotId, error: ControllerError },
    /// Bound to a slot with a stratagem.
    Activate(PlaybackRequest),
    /// Bound to a slot with nothing assigned.
    Unassigned { slot: SlotId },
}

/// Receives the full profile after every change, for persistence.
pub trait ChangeObserver: Send {
    fn on_change(&mut self, profile: &Profile);
}

impl<F> ChangeObserver for F
where
    F: FnMut(&Profile) + Send,
{
    fn on_change(&mut self, profile: &Profile) {
        (self)(profile)
    }
}

pub struct SlotAssignmentController {
    catalog: Arc<MacroCatalog>,
    slots: Vec<Slot>,
    bindings: KeyBindingStore,
    settings: Settings,
    remapping: Option<SlotId>,
    observer: Option<Box<dyn ChangeObserver>>,
}

impl SlotAssignmentController {
    /// Build the slot table from the numpad layout, overridden by `profile`.
    ///
    /// Stratagems the catalog does not know are dropped with a warning, as are
    /// key codes that clash with an earlier slot.
    pub fn new(catalog: Arc<MacroCatalog>, profile: &Profile) -> Self {
        let mut slots = Vec::with_capacity(NUMPAD_LAYOUT.len());
        let mut bindings = KeyBindingStore::new();

        for layout in NUMPAD_LAYOUT.iter() {
            let saved = profile.slots.iter().find(|s| s.slot_id == layout.slot_id);

            let key_code = saved.and_then(|s| s.key_code).unwrap_or(layout.key_code);
            if let Err(e) = bindings.set_binding(layout.slot_id, key_code) {
                warn!("Slot {} left unbound: {}", layout.slot_id, e);
            }

            let stratagem = saved.and_then(|s| s.stratagem.clone()).filter(|name| {
                let known = catalog.contains(name);
                if !known {
                    warn!(
                        "Slot {}: unknown stratagem '{}' dropped",
                        layout.slot_id, name
                    );
                }
                known
            });

            slots.push(Slot {
                id: layout.slot_id,
                label: saved
                    .and_then(|s| s.label.clone())
                    .unwrap_or_else(|| layout.label.to_string()),
                stratagem,
                state: SlotState::Idle,
                layout,
            });
        }

        Self {
            catalog,
            slots,
            bindings,
            settings: profile.settings.clone(),
            remapping: None,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: impl ChangeObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn catalog(&self) -> &MacroCatalog {
        &self.catalog
    }

    pub fn slot(&self, id: SlotId) -> Result<&Slot, ControllerError> {
        self.slots
            .iter()
            .find(|s| s.id == id)
            .ok_or(ControllerError::UnknownSlot(id))
    }

    fn slot_mut(&mut self, id: SlotId) -> Result<&mut Slot, ControllerError> {
        self.slots
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(ControllerError::UnknownSlot(id))
    }

    pub fn key_for_slot(&self, id: SlotId) -> Option<u16> {
        self.bindings.key_for_slot(id)
    }

    pub fn slot_for_key(&self, key_code: u16) -> Option<SlotId> {
        self.bindings.get_slot_for_key(key_code)
    }

    /// The slot currently waiting for a key, if any.
    pub fn remapping(&self) -> Option<SlotId> {
        self.remapping
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Put `name` on `slot`, replacing whatever was there.
    pub fn assign(&mut self, slot: SlotId, name: &str) -> Result<(), ControllerError> {
        self.slot(slot)?;
        self.catalog.get(name)?;

        let previous = self.slot_mut(slot)?.stratagem.replace(name.to_string());
        debug!("Slot {}: {:?} -> '{}'", slot, previous, name);
        self.notify();
        Ok(())
    }

    /// Unassign `slot`. Notifies even when the slot was already empty.
    pub fn clear(&mut self, slot: SlotId) -> Result<(), ControllerError> {
        let previous = self.slot_mut(slot)?.stratagem.take();
        debug!("Slot {}: cleared {:?}", slot, previous);
        self.notify();
        Ok(())
    }

    /// Exchange the assignments of two slots.
    ///
    /// Moving onto an empty slot leaves the source empty. Swapping a slot with
    /// itself changes nothing and does not notify.
    pub fn swap(&mut self, from: SlotId, to: SlotId) -> Result<(), ControllerError> {
        self.slot(from)?;
        self.slot(to)?;
        if from == to {
            return Ok(());
        }

        let moved = self.slot_mut(from)?.stratagem.take();
        let displaced = std::mem::replace(&mut self.slot_mut(to)?.stratagem, moved);
        self.slot_mut(from)?.stratagem = displaced;

        debug!("Swapped slots {} and {}", from, to);
        self.notify();
        Ok(())
    }

    /// Handle a drag-and-drop onto `target`.
    pub fn drop_onto(&mut self, target: SlotId, payload: &DragPayload) -> Result<(), ControllerError> {
        match payload {
            DragPayload::FromSidebar { name } => self.assign(target, name),
            DragPayload::FromSlot { slot } => self.swap(*slot, target),
        }
    }

    /// Make `slot` wait for its new key.
    ///
    /// A remap already in progress on another slot is cancelled first.
    pub fn start_remap(&mut self, slot: SlotId) -> Result<(), ControllerError> {
        self.slot(slot)?;
        match self.remapping {
            Some(current) if current == slot => return Ok(()),
            Some(_) => {
                self.cancel_remap()?;
            }
            None => {}
        }

        self.slot_mut(slot)?.state = SlotState::Remapping;
        self.remapping = Some(slot);
        info!("Slot {}: waiting for a key", slot);
        Ok(())
    }

    /// Abandon the current remap. Key and label are untouched.
    pub fn cancel_remap(&mut self) -> Result<SlotId, ControllerError> {
        let slot = self.remapping.take().ok_or(ControllerError::NotRemapping)?;
        self.slot_mut(slot)?.state = SlotState::Idle;
        info!("Slot {}: remap cancelled", slot);
        Ok(slot)
    }

    /// Commit `key` as the new key of the remapping slot.
    ///
    /// If another slot owns the key the slot keeps waiting.
    pub fn capture_key(&mut self, key: Key) -> Result<SlotId, ControllerError> {
        let slot = self.remapping.ok_or(ControllerError::NotRemapping)?;
        self.rebind(slot, key)?;
        self.remapping = None;
        self.notify();
        Ok(slot)
    }

    /// Bind `slot` to `key` directly, without entering remap mode.
    pub fn bind(&mut self, slot: SlotId, key: Key) -> Result<(), ControllerError> {
        self.slot(slot)?;
        self.rebind(slot, key)?;
        if self.remapping == Some(slot) {
            self.remapping = None;
        }
        self.notify();
        Ok(())
    }

    fn rebind(&mut self, slot: SlotId, key: Key) -> Result<(), ControllerError> {
        self.bindings.set_binding(slot, key.code())?;
        let label = key_label(key);
        let entry = self.slot_mut(slot)?;
        entry.label = label;
        entry.state = SlotState::Idle;
        info!("Slot {}: bound to key {} ({})", slot, key.code(), entry.label);
        Ok(())
    }

    /// Route a key press: remap capture first, then slot activation.
    pub fn handle_key_press(&mut self, key: Key) -> KeyOutcome {
        if let Some(slot) = self.remapping {
            if key == Key::KEY_ESC {
                return match self.cancel_remap() {
                    Ok(slot) => KeyOutcome::RemapCancelled { slot },
                    Err(_) => KeyOutcome::Ignored,
                };
            }
            return match self.capture_key(key) {
                Ok(slot) => KeyOutcome::Remapped {
                    slot,
                    label: key_label(key),
                },
                Err(error) => {
                    warn!("Slot {}: {}", slot, error);
                    KeyOutcome::RemapRejected { slot, error }
                }
            };
        }

        let Some(slot) = self.bindings.get_slot_for_key(key.code()) else {
            return KeyOutcome::Ignored;
        };
        match self.activation_for(slot) {
            Ok(Some(request)) => KeyOutcome::Activate(request),
            Ok(None) => KeyOutcome::Unassigned { slot },
            Err(e) => {
                warn!("Slot {}: {}", slot, e);
                KeyOutcome::Unassigned { slot }
            }
        }
    }

    /// The playback request for `slot`, or `None` if nothing is assigned.
    pub fn activation_for(&self, slot: SlotId) -> Result<Option<PlaybackRequest>, ControllerError> {
        let entry = self.slot(slot)?;
        let Some(name) = entry.stratagem.as_deref() else {
            return Ok(None);
        };
        let stratagem = self.catalog.get(name)?;
        Ok(Some(PlaybackRequest {
            name: stratagem.name.clone(),
            sequence: stratagem.sequence.clone(),
            key_label: entry.label.clone(),
        }))
    }

    pub fn snapshots(&self) -> Vec<SlotSnapshot> {
        self.slots
            .iter()
            .map(|slot| {
                let sequence = slot
                    .stratagem
                    .as_deref()
                    .and_then(|name| self.catalog.get_sequence(name).ok())
                    .map(format_sequence);
                SlotSnapshot {
                    slot_id: slot.id,
                    key_code: self.bindings.key_for_slot(slot.id),
                    label: match slot.state {
                        SlotState::Idle => slot.label.clone(),
                        SlotState::Remapping => REMAP_PROMPT.to_string(),
                    },
                    stratagem: slot.stratagem.clone(),
                    sequence,
                    icon: slot
                        .stratagem
                        .as_deref()
                        .and_then(|name| self.catalog.icon_path(name)),
                    row: slot.layout.row,
                    col: slot.layout.col,
                    row_span: slot.layout.row_span,
                    col_span: slot.layout.col_span,
                    remapping: slot.state == SlotState::Remapping,
                }
            })
            .collect()
    }

    pub fn update_settings(&mut self, update: &SettingsUpdate) -> Result<(), ControllerError> {
        let mut settings = self.settings.clone();
        update.apply(&mut settings)?;
        self.settings = settings;
        info!(
            "Settings: latency={}ms macros={} mode={} sound={} visual={}",
            self.settings.latency_ms,
            self.settings.macros_enabled,
            self.settings.keybind_mode,
            self.settings.sound_enabled,
            self.settings.visual_enabled
        );
        self.notify();
        Ok(())
    }

    /// Current state as a persistable profile.
    pub fn to_profile(&self) -> Profile {
        Profile {
            settings: self.settings.clone(),
            slots: self
                .slots
                .iter()
                .map(|slot| SlotConfig {
                    slot_id: slot.id,
                    key_code: self.bindings.key_for_slot(slot.id),
                    label: Some(slot.label.clone()),
                    stratagem: slot.stratagem.clone(),
                })
                .collect(),
        }
    }

    fn notify(&mut self) {
        if self.observer.is_none() {
            return;
        }
        let profile = self.to_profile();
        if let Some(observer) = self.observer.as_mut() {
            observer.on_change(&profile);
        }
    }
}
