//! KDL parsers for the stratagem catalog and the persisted profile

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, InvalidDirectionInfo};
use crate::layout::{layout_for, NUMPAD_LAYOUT};
use crate::model::*;

/// Catalog compiled into the binary, used when no catalog file exists.
pub const BUILTIN_CATALOG: &str = include_str!("../assets/stratagems.kdl");

/// Department used for `stratagem` nodes written outside any department.
const UNCATEGORIZED: &str = "Uncategorized";

fn parse_document(content: &str) -> Result<kdl::KdlDocument, ConfigError> {
    content.parse().map_err(|e: kdl::KdlError| {
        // kdl uses an older miette version, so we need to extract offset/len manually
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })
}

/// Positional (unnamed) entries of a node.
fn arguments(node: &kdl::KdlNode) -> impl Iterator<Item = &kdl::KdlEntry> {
    node.entries().iter().filter(|e| e.name().is_none())
}

fn property<'a>(node: &'a kdl::KdlNode, name: &str) -> Option<&'a kdl::KdlEntry> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value() == name).unwrap_or(false))
}

fn first_string(node: &kdl::KdlNode) -> Option<&str> {
    arguments(node).next().and_then(|e| e.value().as_string())
}

fn first_i64(node: &kdl::KdlNode) -> Option<i64> {
    arguments(node).next().and_then(|e| e.value().as_i64())
}

fn first_bool(node: &kdl::KdlNode) -> Option<bool> {
    arguments(node).next().and_then(|e| e.value().as_bool())
}

fn require_bool(node: &kdl::KdlNode) -> Result<bool, ConfigError> {
    first_bool(node).ok_or_else(|| ConfigError::Invalid {
        message: format!("'{}' expects true or false", node.name().value()),
    })
}

// ============================================================================
// Catalog
// ============================================================================

/// Parse a catalog file from the given path
pub fn parse_catalog(path: &Path) -> Result<CatalogDef, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog_str(&content)
}

/// Parse the catalog shipped with the binary
pub fn builtin_catalog() -> Result<CatalogDef, ConfigError> {
    parse_catalog_str(BUILTIN_CATALOG)
}

/// Parse a catalog from a string
///
/// Every invalid direction token in the document is reported at once,
/// each with its source location.
pub fn parse_catalog_str(content: &str) -> Result<CatalogDef, ConfigError> {
    let doc = parse_document(content)?;

    let mut catalog = CatalogDef::default();
    let mut invalid = Vec::new();
    let mut seen = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "department" => {
                let name = first_string(node).ok_or_else(|| ConfigError::MissingField {
                    field: "department name (e.g., `department \"Hangar\" { ... }`)".to_string(),
                })?;
                let mut department = DepartmentDef {
                    name: name.to_string(),
                    stratagems: Vec::new(),
                };

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "stratagem" => {
                                if let Some(def) = parse_stratagem(child, &mut invalid)? {
                                    department.stratagems.push(def);
                                }
                            }
                            other => {
                                tracing::warn!("Unknown department option: {}", other);
                            }
                        }
                    }
                }

                catalog.departments.push(department);
            }
            "stratagem" => {
                if let Some(def) = parse_stratagem(node, &mut invalid)? {
                    let index = match catalog
                        .departments
                        .iter()
                        .position(|d| d.name == UNCATEGORIZED)
                    {
                        Some(index) => index,
                        None => {
                            catalog.departments.push(DepartmentDef {
                                name: UNCATEGORIZED.to_string(),
                                stratagems: Vec::new(),
                            });
                            catalog.departments.len() - 1
                        }
                    };
                    catalog.departments[index].stratagems.push(def);
                }
            }
            name => {
                tracing::warn!("Unknown top-level catalog node: {}", name);
            }
        }
    }

    if !invalid.is_empty() {
        return Err(ConfigError::InvalidDirections {
            src: content.to_string(),
            directions: invalid,
        });
    }

    for department in &catalog.departments {
        for stratagem in &department.stratagems {
            if !seen.insert(stratagem.name.as_str()) {
                return Err(ConfigError::DuplicateStratagem {
                    name: stratagem.name.clone(),
                });
            }
        }
    }

    Ok(catalog)
}

/// Parse one `stratagem "Name" "dir" "dir" ... icon="path"` node.
///
/// Returns `Ok(None)` when the node has invalid directions; those are pushed
/// onto `invalid` so the caller can report them together.
fn parse_stratagem(
    node: &kdl::KdlNode,
    invalid: &mut Vec<InvalidDirectionInfo>,
) -> Result<Option<StratagemDef>, ConfigError> {
    let mut args = arguments(node);

    let name = args
        .next()
        .and_then(|e| e.value().as_string())
        .ok_or_else(|| ConfigError::MissingField {
            field: "stratagem name (e.g., `stratagem \"Resupply\" \"down\" ...`)".to_string(),
        })?
        .to_string();

    let mut sequence = Vec::new();
    let mut had_invalid = false;

    for entry in args {
        let token = match entry.value().as_string() {
            Some(token) => token,
            None => {
                return Err(ConfigError::Invalid {
                    message: format!("Stratagem '{}' has a non-string direction", name),
                })
            }
        };

        match token.parse::<Direction>() {
            Ok(direction) => sequence.push(direction),
            Err(_) => {
                had_invalid = true;
                let span = entry.span();
                invalid.push(InvalidDirectionInfo {
                    token: token.to_string(),
                    stratagem: name.clone(),
                    span: miette::SourceSpan::from((span.offset(), span.len())),
                });
            }
        }
    }

    if had_invalid {
        return Ok(None);
    }

    if sequence.is_empty() {
        return Err(ConfigError::Invalid {
            message: format!("Stratagem '{}' has an empty input sequence", name),
        });
    }

    let icon = property(node, "icon")
        .and_then(|e| e.value().as_string())
        .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()));

    Ok(Some(StratagemDef {
        name,
        sequence,
        icon,
    }))
}

// ============================================================================
// Profile
// ============================================================================

/// Parse a profile file from the given path
pub fn parse_profile(path: &Path) -> Result<Profile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_profile_str(&content)
}

/// Parse a profile from a string
pub fn parse_profile_str(content: &str) -> Result<Profile, ConfigError> {
    let doc = parse_document(content)?;

    let mut profile = Profile::default();

    for node in doc.nodes() {
        match node.name().value() {
            "settings" => {
                profile.settings = parse_settings(node)?;
            }
            "slot" => {
                let slot = parse_slot(node)?;
                if profile.slots.iter().any(|s| s.slot_id == slot.slot_id) {
                    return Err(ConfigError::Invalid {
                        message: format!("Slot {} is defined more than once", slot.slot_id),
                    });
                }
                profile.slots.push(slot);
            }
            name => {
                tracing::warn!("Unknown top-level profile node: {}", name);
            }
        }
    }

    check_unique_keys(&profile.slots)?;

    Ok(profile)
}

fn parse_settings(node: &kdl::KdlNode) -> Result<Settings, ConfigError> {
    let mut settings = Settings::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "latency" => {
                    let latency = first_i64(child).ok_or_else(|| ConfigError::Invalid {
                        message: "'latency' expects a number of milliseconds".to_string(),
                    })?;
                    if latency < MIN_LATENCY_MS as i64 || latency > MAX_LATENCY_MS as i64 {
                        return Err(ConfigError::Invalid {
                            message: format!(
                                "latency must be between {} and {} ms, got {}",
                                MIN_LATENCY_MS, MAX_LATENCY_MS, latency
                            ),
                        });
                    }
                    settings.latency_ms = latency as u64;
                }
                "macros-enabled" => settings.macros_enabled = require_bool(child)?,
                "sound-enabled" => settings.sound_enabled = require_bool(child)?,
                "visual-enabled" => settings.visual_enabled = require_bool(child)?,
                "keybind-mode" => {
                    if let Some(val) = first_string(child) {
                        settings.keybind_mode = val
                            .parse()
                            .map_err(|message| ConfigError::Invalid { message })?;
                    }
                }
                "log-level" => {
                    if let Some(val) = first_string(child) {
                        settings.log_level = val
                            .parse()
                            .map_err(|message| ConfigError::Invalid { message })?;
                    }
                }
                "device" => {
                    settings.device = first_string(child).map(|s| s.to_string());
                }
                name => {
                    tracing::warn!("Unknown settings option: {}", name);
                }
            }
        }
    }

    Ok(settings)
}

fn parse_slot(node: &kdl::KdlNode) -> Result<SlotConfig, ConfigError> {
    let slot_id = first_i64(node).ok_or_else(|| ConfigError::MissingField {
        field: "slot id (e.g., `slot 3 { ... }`)".to_string(),
    })?;

    let slot_id = usize::try_from(slot_id)
        .ok()
        .filter(|id| layout_for(*id).is_some())
        .ok_or(ConfigError::UnknownSlot { slot: slot_id })?;

    let mut slot = SlotConfig {
        slot_id,
        ..Default::default()
    };

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "key" => {
                    let code = first_i64(child)
                        .and_then(|c| u16::try_from(c).ok())
                        .ok_or_else(|| ConfigError::Invalid {
                            message: format!("Slot {} has an invalid key code", slot_id),
                        })?;
                    slot.key_code = Some(code);
                }
                "label" => {
                    slot.label = first_string(child).map(|s| s.to_string());
                }
                "stratagem" => {
                    slot.stratagem = first_string(child).map(|s| s.to_string());
                }
                name => {
                    tracing::warn!("Unknown slot option: {}", name);
                }
            }
        }
    }

    Ok(slot)
}

/// Reject profiles where two slots end up on the same physical key,
/// counting layout defaults for slots that do not override their key.
fn check_unique_keys(slots: &[SlotConfig]) -> Result<(), ConfigError> {
    let overrides: HashMap<usize, u16> = slots
        .iter()
        .filter_map(|s| s.key_code.map(|k| (s.slot_id, k)))
        .collect();

    let mut owners: HashMap<u16, usize> = HashMap::new();
    for layout in NUMPAD_LAYOUT.iter() {
        let key = overrides
            .get(&layout.slot_id)
            .copied()
            .unwrap_or(layout.key_code);
        if let Some(first) = owners.insert(key, layout.slot_id) {
            return Err(ConfigError::DuplicateKey {
                key,
                first,
                second: layout.slot_id,
            });
        }
    }

    Ok(())
}
