//! Physical numpad layout
//!
//! Key codes are Linux evdev codes (`input-event-codes.h`).

/// Fixed position of one slot on the numpad grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    pub slot_id: usize,
    pub key_code: u16,
    pub label: &'static str,
    pub row: u8,
    pub col: u8,
    pub row_span: u8,
    pub col_span: u8,
}

const fn slot(
    slot_id: usize,
    key_code: u16,
    label: &'static str,
    row: u8,
    col: u8,
    row_span: u8,
    col_span: u8,
) -> SlotLayout {
    SlotLayout {
        slot_id,
        key_code,
        label,
        row,
        col,
        row_span,
        col_span,
    }
}

/// The standard 17-key numpad minus NumLock.
pub static NUMPAD_LAYOUT: [SlotLayout; 16] = [
    slot(0, 98, "/", 0, 1, 1, 1),
    slot(1, 55, "*", 0, 2, 1, 1),
    slot(2, 74, "-", 0, 3, 1, 1),
    slot(3, 71, "7", 1, 0, 1, 1),
    slot(4, 72, "8", 1, 1, 1, 1),
    slot(5, 73, "9", 1, 2, 1, 1),
    slot(6, 78, "+", 1, 3, 2, 1),
    slot(7, 75, "4", 2, 0, 1, 1),
    slot(8, 76, "5", 2, 1, 1, 1),
    slot(9, 77, "6", 2, 2, 1, 1),
    slot(10, 79, "1", 3, 0, 1, 1),
    slot(11, 80, "2", 3, 1, 1, 1),
    slot(12, 81, "3", 3, 2, 1, 1),
    slot(13, 96, "Enter", 3, 3, 2, 1),
    slot(14, 82, "0", 4, 0, 1, 2),
    slot(15, 83, ".", 4, 2, 1, 1),
];

/// Look up the layout entry for a slot id.
pub fn layout_for(slot_id: usize) -> Option<&'static SlotLayout> {
    NUMPAD_LAYOUT.iter().find(|s| s.slot_id == slot_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_layout_ids_are_positions() {
        for (i, slot) in NUMPAD_LAYOUT.iter().enumerate() {
            assert_eq!(slot.slot_id, i);
        }
    }

    #[test]
    fn test_layout_key_codes_unique() {
        let codes: HashSet<u16> = NUMPAD_LAYOUT.iter().map(|s| s.key_code).collect();
        assert_eq!(codes.len(), NUMPAD_LAYOUT.len());
    }

    #[test]
    fn test_layout_for() {
        assert_eq!(layout_for(13).map(|s| s.label), Some("Enter"));
        assert!(layout_for(16).is_none());
    }
}
