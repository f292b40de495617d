//! Key names and display labels

use std::str::FromStr;

use evdev::Key;

/// Parse a key name string to an evdev Key
///
/// Accepts the usual names (`KP7`, `Numpad7`, `F1`, `A`, `Up`) and raw
/// `KEY_*` kernel names as an escape hatch.
pub fn parse_key(name: &str) -> Option<Key> {
    let upper = name.trim().to_uppercase();

    match upper.as_str() {
        "CAPSLOCK" | "CAPS_LOCK" | "CAPS" => Some(Key::KEY_CAPSLOCK),
        "ESCAPE" | "ESC" => Some(Key::KEY_ESC),
        "ENTER" | "RETURN" => Some(Key::KEY_ENTER),
        "TAB" => Some(Key::KEY_TAB),
        "SPACE" => Some(Key::KEY_SPACE),
        "BACKSPACE" => Some(Key::KEY_BACKSPACE),

        // Letters
        "A" => Some(Key::KEY_A),
        "B" => Some(Key::KEY_B),
        "C" => Some(Key::KEY_C),
        "D" => Some(Key::KEY_D),
        "E" => Some(Key::KEY_E),
        "F" => Some(Key::KEY_F),
        "G" => Some(Key::KEY_G),
        "H" => Some(Key::KEY_H),
        "I" => Some(Key::KEY_I),
        "J" => Some(Key::KEY_J),
        "K" => Some(Key::KEY_K),
        "L" => Some(Key::KEY_L),
        "M" => Some(Key::KEY_M),
        "N" => Some(Key::KEY_N),
        "O" => Some(Key::KEY_O),
        "P" => Some(Key::KEY_P),
        "Q" => Some(Key::KEY_Q),
        "R" => Some(Key::KEY_R),
        "S" => Some(Key::KEY_S),
        "T" => Some(Key::KEY_T),
        "U" => Some(Key::KEY_U),
        "V" => Some(Key::KEY_V),
        "W" => Some(Key::KEY_W),
        "X" => Some(Key::KEY_X),
        "Y" => Some(Key::KEY_Y),
        "Z" => Some(Key::KEY_Z),

        // Modifiers
        "LEFTCTRL" | "LCTRL" | "CTRL" => Some(Key::KEY_LEFTCTRL),
        "RIGHTCTRL" | "RCTRL" => Some(Key::KEY_RIGHTCTRL),
        "LEFTSHIFT" | "LSHIFT" | "SHIFT" => Some(Key::KEY_LEFTSHIFT),
        "RIGHTSHIFT" | "RSHIFT" => Some(Key::KEY_RIGHTSHIFT),
        "LEFTALT" | "LALT" | "ALT" => Some(Key::KEY_LEFTALT),
        "RIGHTALT" | "RALT" => Some(Key::KEY_RIGHTALT),

        // Number row
        "0" => Some(Key::KEY_0),
        "1" => Some(Key::KEY_1),
        "2" => Some(Key::KEY_2),
        "3" => Some(Key::KEY_3),
        "4" => Some(Key::KEY_4),
        "5" => Some(Key::KEY_5),
        "6" => Some(Key::KEY_6),
        "7" => Some(Key::KEY_7),
        "8" => Some(Key::KEY_8),
        "9" => Some(Key::KEY_9),

        // Symbol keys
        "MINUS" | "-" => Some(Key::KEY_MINUS),
        "EQUALS" | "EQUAL" | "=" => Some(Key::KEY_EQUAL),
        "SEMICOLON" | ";" => Some(Key::KEY_SEMICOLON),
        "COMMA" | "," => Some(Key::KEY_COMMA),
        "DOT" | "PERIOD" | "." => Some(Key::KEY_DOT),
        "SLASH" | "/" => Some(Key::KEY_SLASH),

        // Arrow keys
        "UP" | "UPARROW" => Some(Key::KEY_UP),
        "DOWN" | "DOWNARROW" => Some(Key::KEY_DOWN),
        "LEFT" | "LEFTARROW" => Some(Key::KEY_LEFT),
        "RIGHT" | "RIGHTARROW" => Some(Key::KEY_RIGHT),

        // Navigation keys
        "HOME" => Some(Key::KEY_HOME),
        "END" => Some(Key::KEY_END),
        "PAGEUP" | "PGUP" => Some(Key::KEY_PAGEUP),
        "PAGEDOWN" | "PGDN" | "PGDOWN" => Some(Key::KEY_PAGEDOWN),
        "INSERT" | "INS" => Some(Key::KEY_INSERT),
        "DELETE" | "DEL" => Some(Key::KEY_DELETE),

        // Function keys
        "F1" => Some(Key::KEY_F1),
        "F2" => Some(Key::KEY_F2),
        "F3" => Some(Key::KEY_F3),
        "F4" => Some(Key::KEY_F4),
        "F5" => Some(Key::KEY_F5),
        "F6" => Some(Key::KEY_F6),
        "F7" => Some(Key::KEY_F7),
        "F8" => Some(Key::KEY_F8),
        "F9" => Some(Key::KEY_F9),
        "F10" => Some(Key::KEY_F10),
        "F11" => Some(Key::KEY_F11),
        "F12" => Some(Key::KEY_F12),

        // Numpad keys
        "KP0" | "NUMPAD0" => Some(Key::KEY_KP0),
        "KP1" | "NUMPAD1" => Some(Key::KEY_KP1),
        "KP2" | "NUMPAD2" => Some(Key::KEY_KP2),
        "KP3" | "NUMPAD3" => Some(Key::KEY_KP3),
        "KP4" | "NUMPAD4" => Some(Key::KEY_KP4),
        "KP5" | "NUMPAD5" => Some(Key::KEY_KP5),
        "KP6" | "NUMPAD6" => Some(Key::KEY_KP6),
        "KP7" | "NUMPAD7" => Some(Key::KEY_KP7),
        "KP8" | "NUMPAD8" => Some(Key::KEY_KP8),
        "KP9" | "NUMPAD9" => Some(Key::KEY_KP9),
        "KPDOT" | "KPDECIMAL" | "NUMPAD_DOT" => Some(Key::KEY_KPDOT),
        "KPENTER" | "NUMPAD_ENTER" => Some(Key::KEY_KPENTER),
        "KPPLUS" | "KPADD" | "NUMPAD_PLUS" => Some(Key::KEY_KPPLUS),
        "KPMINUS" | "KPSUBTRACT" | "NUMPAD_MINUS" => Some(Key::KEY_KPMINUS),
        "KPASTERISK" | "KPMULTIPLY" | "NUMPAD_MULTIPLY" => Some(Key::KEY_KPASTERISK),
        "KPSLASH" | "KPDIVIDE" | "NUMPAD_DIVIDE" => Some(Key::KEY_KPSLASH),

        _ => {
            if upper.starts_with("KEY_") {
                match Key::from_str(&upper) {
                    Ok(key) => return Some(key),
                    Err(_) => {
                        tracing::warn!("Unknown evdev key: {}", name);
                        return None;
                    }
                }
            }
            tracing::warn!("Unknown key: {}", name);
            None
        }
    }
}

/// Short label shown on a slot after it is bound to `key`.
///
/// Printable keys show their character, special keys a short tag, and
/// anything else falls back to `KEY`.
pub fn key_label(key: Key) -> String {
    let label = match key {
        Key::KEY_ENTER | Key::KEY_KPENTER => "ENT",
        Key::KEY_SPACE => "SPC",
        Key::KEY_TAB => "TAB",
        Key::KEY_BACKSPACE => "BS",
        Key::KEY_DELETE => "DEL",
        Key::KEY_INSERT => "INS",
        Key::KEY_HOME => "HOME",
        Key::KEY_END => "END",
        Key::KEY_PAGEUP => "PGUP",
        Key::KEY_PAGEDOWN => "PGDN",
        Key::KEY_LEFT => "LEFT",
        Key::KEY_RIGHT => "RGHT",
        Key::KEY_UP => "UP",
        Key::KEY_DOWN => "DOWN",
        Key::KEY_CAPSLOCK => "CAPS",
        Key::KEY_LEFTSHIFT | Key::KEY_RIGHTSHIFT => "SHFT",
        Key::KEY_LEFTCTRL | Key::KEY_RIGHTCTRL => "CTRL",
        Key::KEY_LEFTALT | Key::KEY_RIGHTALT => "ALT",
        Key::KEY_KPSLASH | Key::KEY_SLASH => "/",
        Key::KEY_KPASTERISK => "*",
        Key::KEY_KPMINUS | Key::KEY_MINUS => "-",
        Key::KEY_KPPLUS => "+",
        Key::KEY_KPDOT | Key::KEY_DOT => ".",
        Key::KEY_COMMA => ",",
        Key::KEY_SEMICOLON => ";",
        Key::KEY_EQUAL => "=",
        _ => return printable_label(key).unwrap_or_else(|| "KEY".to_string()),
    };
    label.to_string()
}

/// Letters, digits, numpad digits and function keys from the kernel name.
fn printable_label(key: Key) -> Option<String> {
    let name = format!("{:?}", key);
    let bare = name.strip_prefix("KEY_")?;
    let bare = bare.strip_prefix("KP").unwrap_or(bare);

    let single = bare.len() == 1 && bare.chars().all(|c| c.is_ascii_alphanumeric());
    let function = bare.starts_with('F')
        && bare.len() <= 3
        && bare[1..].chars().all(|c| c.is_ascii_digit())
        && bare.len() > 1;

    if single || function {
        Some(bare.to_string())
    } else {
        None
    }
}
