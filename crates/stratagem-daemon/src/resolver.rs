//! Direction to concrete key translation
//!
//! Switching the keybind mode only changes what the next playback injects;
//! nothing here holds state. Raw direction tokens are checked when the
//! catalog is parsed, so resolution itself cannot fail.

use evdev::Key;
use stratagem_config::{Direction, KeybindMode};

/// The key injected for `direction` under `mode`.
pub fn resolve(direction: Direction, mode: KeybindMode) -> Key {
    match (mode, direction) {
        (KeybindMode::Arrows, Direction::Up) => Key::KEY_UP,
        (KeybindMode::Arrows, Direction::Down) => Key::KEY_DOWN,
        (KeybindMode::Arrows, Direction::Left) => Key::KEY_LEFT,
        (KeybindMode::Arrows, Direction::Right) => Key::KEY_RIGHT,
        (KeybindMode::Wasd, Direction::Up) => Key::KEY_W,
        (KeybindMode::Wasd, Direction::Down) => Key::KEY_S,
        (KeybindMode::Wasd, Direction::Left) => Key::KEY_A,
        (KeybindMode::Wasd, Direction::Right) => Key::KEY_D,
    }
}

/// Resolve a whole sequence, preserving order.
pub fn resolve_sequence(sequence: &[Direction], mode: KeybindMode) -> Vec<Key> {
    sequence.iter().map(|d| resolve(*d, mode)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_arrows_mode() {
        assert_eq!(resolve(Direction::Up, KeybindMode::Arrows), Key::KEY_UP);
        assert_eq!(resolve(Direction::Down, KeybindMode::Arrows), Key::KEY_DOWN);
        assert_eq!(resolve(Direction::Left, KeybindMode::Arrows), Key::KEY_LEFT);
        assert_eq!(resolve(Direction::Right, KeybindMode::Arrows), Key::KEY_RIGHT);
    }

    #[test]
    fn test_wasd_mode() {
        assert_eq!(resolve(Direction::Up, KeybindMode::Wasd), Key::KEY_W);
        assert_eq!(resolve(Direction::Down, KeybindMode::Wasd), Key::KEY_S);
        assert_eq!(resolve(Direction::Left, KeybindMode::Wasd), Key::KEY_A);
        assert_eq!(resolve(Direction::Right, KeybindMode::Wasd), Key::KEY_D);
    }

    #[test]
    fn test_each_mode_is_injective() {
        for mode in [KeybindMode::Arrows, KeybindMode::Wasd] {
            let keys: HashSet<Key> = Direction::ALL.iter().map(|d| resolve(*d, mode)).collect();
            assert_eq!(keys.len(), 4, "{} should map four directions to four keys", mode);
        }
    }

    #[test]
    fn test_resolve_is_deterministic() {
        for mode in [KeybindMode::Arrows, KeybindMode::Wasd] {
            for direction in Direction::ALL {
                assert_eq!(resolve(direction, mode), resolve(direction, mode));
            }
        }
    }

    #[test]
    fn test_tokens_outside_the_set_never_reach_resolve() {
        assert_eq!("RIGHT".parse::<Direction>(), Ok(Direction::Right));
        assert!("sideways".parse::<Direction>().is_err());

        let result = stratagem_config::parse_catalog_str(
            r#"department "Supply" { stratagem "Resupply" "down" "sideways"; }"#,
        );
        assert!(matches!(
            result,
            Err(stratagem_config::ConfigError::InvalidDirections { .. })
        ));
    }

    #[test]
    fn test_resolve_sequence_keeps_order() {
        let sequence = [
            Direction::Down,
            Direction::Down,
            Direction::Up,
            Direction::Right,
        ];
        assert_eq!(
            resolve_sequence(&sequence, KeybindMode::Arrows),
            vec![Key::KEY_DOWN, Key::KEY_DOWN, Key::KEY_UP, Key::KEY_RIGHT]
        );
    }
}
