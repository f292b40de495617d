//! Serialize the profile back to KDL
//!
//! The daemon rewrites the profile after every slot or settings change, so
//! writes go through a temp file and an atomic rename.

use std::path::Path;
use std::time::SystemTime;

use crate::error::ConfigError;
use crate::model::Profile;

/// Format a SystemTime as an ISO 8601 timestamp (UTC).
fn format_timestamp(time: SystemTime) -> String {
    let secs = time
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let days = secs / 86400;
    let remaining = secs % 86400;
    let hours = remaining / 3600;
    let minutes = (remaining % 3600) / 60;
    let seconds = remaining % 60;

    let mut year = 1970;
    let mut remaining_days = days as i64;

    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let days_in_months: [i64; 12] = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1;
    for days_in_month in days_in_months.iter() {
        if remaining_days < *days_in_month {
            break;
        }
        remaining_days -= days_in_month;
        month += 1;
    }
    let day = remaining_days + 1;

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hours, minutes, seconds
    )
}

fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Quote a string as a KDL string literal.
fn kdl_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Render a profile as a KDL document.
pub fn generate_profile(profile: &Profile) -> String {
    let mut output = String::new();
    let settings = &profile.settings;

    output.push_str("// Written by stratagem-mapper\n");
    output.push_str(&format!(
        "// Saved: {}\n\n",
        format_timestamp(SystemTime::now())
    ));

    output.push_str("settings {\n");
    output.push_str(&format!("    latency {}\n", settings.latency_ms));
    output.push_str(&format!("    macros-enabled {}\n", settings.macros_enabled));
    output.push_str(&format!(
        "    keybind-mode {}\n",
        kdl_string(settings.keybind_mode.as_str())
    ));
    output.push_str(&format!("    sound-enabled {}\n", settings.sound_enabled));
    output.push_str(&format!("    visual-enabled {}\n", settings.visual_enabled));
    output.push_str(&format!(
        "    log-level {}\n",
        kdl_string(settings.log_level.as_str())
    ));
    if let Some(device) = &settings.device {
        output.push_str(&format!("    device {}\n", kdl_string(device)));
    }
    output.push_str("}\n");

    for slot in &profile.slots {
        output.push_str(&format!("\nslot {} {{\n", slot.slot_id));
        if let Some(key) = slot.key_code {
            output.push_str(&format!("    key {}\n", key));
        }
        if let Some(label) = &slot.label {
            output.push_str(&format!("    label {}\n", kdl_string(label)));
        }
        if let Some(stratagem) = &slot.stratagem {
            output.push_str(&format!("    stratagem {}\n", kdl_string(stratagem)));
        }
        output.push_str("}\n");
    }

    output
}

/// Validate that the generated KDL can be parsed back by kdl-rs.
fn validate_kdl(content: &str) -> Result<(), ConfigError> {
    content.parse::<kdl::KdlDocument>().map_err(|e| ConfigError::Invalid {
        message: format!(
            "Generated KDL is invalid (this is a bug in stratagem-mapper): {}",
            e
        ),
    })?;
    Ok(())
}

/// Write a profile to `path` using an atomic temp-file rename.
///
/// If validation or the write fails, the original file is preserved.
pub fn write_profile(profile: &Profile, path: &Path) -> Result<(), ConfigError> {
    let content = generate_profile(profile);

    validate_kdl(&content)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Same directory so the rename stays on one filesystem
    let temp_path = path.with_extension("kdl.tmp");

    if let Err(e) = std::fs::write(&temp_path, &content) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }

    tracing::debug!("Wrote profile to {}", path.display());

    Ok(())
}
