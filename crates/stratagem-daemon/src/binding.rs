//! Physical key to slot bindings
//!
//! Forward (slot -> key) and reverse (key -> slot) maps are updated
//! together so a key event always routes to exactly the slot that owns it.

use std::collections::HashMap;

use thiserror::Error;

/// Stable identifier of a numpad slot.
pub type SlotId = usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The key already belongs to another slot. Bindings are never stolen.
    #[error("key code {key} is already bound to slot {owner}")]
    KeyInUse { key: u16, owner: SlotId },
}

#[derive(Debug, Clone, Default)]
pub struct KeyBindingStore {
    by_slot: HashMap<SlotId, u16>,
    by_key: HashMap<u16, SlotId>,
}

impl KeyBindingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `slot` to `key_code`, returning the key it was bound to before.
    ///
    /// Fails with [`BindingError::KeyInUse`] if another slot owns the key;
    /// the store is left unchanged in that case.
    pub fn set_binding(&mut self, slot: SlotId, key_code: u16) -> Result<Option<u16>, BindingError> {
        if let Some(&owner) = self.by_key.get(&key_code) {
            if owner != slot {
                return Err(BindingError::KeyInUse {
                    key: key_code,
                    owner,
                });
            }
            return Ok(Some(key_code));
        }

        let previous = self.by_slot.insert(slot, key_code);
        if let Some(old_key) = previous {
            self.by_key.remove(&old_key);
        }
        self.by_key.insert(key_code, slot);

        Ok(previous)
    }

    pub fn get_slot_for_key(&self, key_code: u16) -> Option<SlotId> {
        self.by_key.get(&key_code).copied()
    }

    pub fn key_for_slot(&self, slot: SlotId) -> Option<u16> {
        self.by_slot.get(&slot).copied()
    }

    /// Remove the binding of `slot`, returning the key it had.
    pub fn clear_binding(&mut self, slot: SlotId) -> Option<u16> {
        let key = self.by_slot.remove(&slot)?;
        self.by_key.remove(&key);
        Some(key)
    }

    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }

    /// Check the forward and reverse maps describe the same bindings.
    pub fn is_consistent(&self) -> bool {
        self.by_slot.len() == self.by_key.len()
            && self
                .by_slot
                .iter()
                .all(|(slot, key)| self.by_key.get(key) == Some(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_lookup() {
        let mut store = KeyBindingStore::new();
        assert_eq!(store.set_binding(3, 71), Ok(None));
        assert_eq!(store.get_slot_for_key(71), Some(3));
        assert_eq!(store.key_for_slot(3), Some(71));
        assert_eq!(store.get_slot_for_key(72), None);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_rebind_frees_old_key() {
        let mut store = KeyBindingStore::new();
        store.set_binding(3, 71).unwrap();

        assert_eq!(store.set_binding(3, 30), Ok(Some(71)));
        assert_eq!(store.get_slot_for_key(71), None);
        assert_eq!(store.get_slot_for_key(30), Some(3));
        assert_eq!(store.len(), 1);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_rebind_to_same_key_is_noop() {
        let mut store = KeyBindingStore::new();
        store.set_binding(3, 71).unwrap();
        assert_eq!(store.set_binding(3, 71), Ok(Some(71)));
        assert_eq!(store.get_slot_for_key(71), Some(3));
        assert!(store.is_consistent());
    }

    #[test]
    fn test_conflicting_binding_rejected() {
        let mut store = KeyBindingStore::new();
        store.set_binding(3, 71).unwrap();
        store.set_binding(4, 72).unwrap();

        assert_eq!(
            store.set_binding(4, 71),
            Err(BindingError::KeyInUse { key: 71, owner: 3 })
        );

        // Nothing moved
        assert_eq!(store.get_slot_for_key(71), Some(3));
        assert_eq!(store.get_slot_for_key(72), Some(4));
        assert!(store.is_consistent());
    }

    #[test]
    fn test_clear_binding() {
        let mut store = KeyBindingStore::new();
        store.set_binding(3, 71).unwrap();

        assert_eq!(store.clear_binding(3), Some(71));
        assert_eq!(store.get_slot_for_key(71), None);
        assert_eq!(store.clear_binding(3), None);
        assert!(store.is_empty());

        // The freed key can be taken by another slot
        assert_eq!(store.set_binding(5, 71), Ok(None));
        assert!(store.is_consistent());
    }
}
