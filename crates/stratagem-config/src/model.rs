//! Configuration data model

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest accepted step latency in milliseconds.
pub const MIN_LATENCY_MS: u64 = 1;
/// Largest accepted step latency in milliseconds.
pub const MAX_LATENCY_MS: u64 = 1000;

/// One abstract move in a stratagem input sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    /// Arrow glyph used when a sequence is shown to the user.
    pub fn arrow(self) -> char {
        match self {
            Direction::Up => '↑',
            Direction::Down => '↓',
            Direction::Left => '←',
            Direction::Right => '→',
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render a sequence as arrows, e.g. `↓↓↑→`.
pub fn format_sequence(sequence: &[Direction]) -> String {
    sequence.iter().map(|d| d.arrow()).collect()
}

/// Which concrete keys a direction is typed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeybindMode {
    #[default]
    Arrows,
    Wasd,
}

impl KeybindMode {
    pub fn as_str(self) -> &'static str {
        match self {
            KeybindMode::Arrows => "arrows",
            KeybindMode::Wasd => "wasd",
        }
    }
}

impl FromStr for KeybindMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "arrows" | "arrow" => Ok(Self::Arrows),
            "wasd" => Ok(Self::Wasd),
            _ => Err(format!("Unknown keybind mode: {}", s)),
        }
    }
}

impl fmt::Display for KeybindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Global settings, persisted alongside the slot table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Step latency in milliseconds (hold time and gap time per direction)
    pub latency_ms: u64,
    /// Global kill switch for macro playback
    pub macros_enabled: bool,
    pub keybind_mode: KeybindMode,
    /// Beep after a macro completes
    pub sound_enabled: bool,
    /// Status message after a macro completes
    pub visual_enabled: bool,
    pub log_level: LogLevel,
    /// Only listen to keyboards with this name (all keyboards when unset)
    pub device: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            latency_ms: 20,
            macros_enabled: false,
            keybind_mode: KeybindMode::Arrows,
            sound_enabled: false,
            visual_enabled: true,
            log_level: LogLevel::Info,
            device: None,
        }
    }
}

impl Settings {
    /// Delay applied after every press and every release.
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// A named stratagem and its input sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StratagemDef {
    pub name: String,
    pub sequence: Vec<Direction>,
    /// Explicit icon path, overriding the icons directory lookup
    pub icon: Option<PathBuf>,
}

/// A group of stratagems, shown as one collapsible sidebar section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentDef {
    pub name: String,
    pub stratagems: Vec<StratagemDef>,
}

/// Parsed stratagem catalog, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogDef {
    pub departments: Vec<DepartmentDef>,
}

impl CatalogDef {
    pub fn stratagem_count(&self) -> usize {
        self.departments.iter().map(|d| d.stratagems.len()).sum()
    }
}

/// Persisted state of one slot. Missing fields keep the layout default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotConfig {
    pub slot_id: usize,
    pub key_code: Option<u16>,
    pub label: Option<String>,
    pub stratagem: Option<String>,
}

/// The persisted profile: settings plus slot table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub settings: Settings,
    pub slots: Vec<SlotConfig>,
}
