//! stratagem-mapper CLI
//!
//! Validates configuration, lists devices and stratagems, and drives the
//! running daemon over its control socket.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::miette;
use stratagem_config::{
    builtin_catalog, format_sequence, parse_catalog, parse_profile, CatalogDef, KeybindMode,
};
use stratagem_daemon::device::enumerate_devices;
use stratagem_daemon::ipc::{self, catalog_listing, DepartmentInfo, IpcRequest, IpcResponse};
use stratagem_daemon::{DragPayload, MacroCatalog, SettingsUpdate, SlotId};

#[derive(Parser, Debug)]
#[command(name = "stratagem")]
#[command(about = "Bind stratagem macros to numpad keys")]
#[command(version)]
struct Cli {
    /// Path to the profile file
    #[arg(short, long, default_value = "~/.config/stratagem-mapper/profile.kdl")]
    profile: String,

    /// Path to the stratagem catalog
    #[arg(short, long, default_value = "~/.config/stratagem-mapper/stratagems.kdl")]
    catalog: String,

    /// Daemon socket (defaults to $XDG_RUNTIME_DIR/stratagem-mapper.sock)
    #[arg(long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the profile and the stratagem catalog
    Validate,

    /// List available input devices
    Devices,

    /// List stratagems by department
    Stratagems {
        /// Only show names containing this text
        #[arg(short, long)]
        search: Option<String>,

        /// Ask the running daemon instead of reading the catalog file
        #[arg(long)]
        live: bool,
    },

    /// Show slots, settings and playback state
    Status,

    /// Put a stratagem on a slot
    Assign { slot: SlotId, stratagem: String },

    /// Remove the stratagem from a slot
    Clear { slot: SlotId },

    /// Exchange the stratagems of two slots
    Swap { from: SlotId, to: SlotId },

    /// Drop a stratagem onto a slot, from the catalog or from another slot
    Drop {
        target: SlotId,

        /// Stratagem name from the catalog
        #[arg(long, conflicts_with = "from_slot", required_unless_present = "from_slot")]
        name: Option<String>,

        /// Slot to take the stratagem from
        #[arg(long)]
        from_slot: Option<SlotId>,
    },

    /// Bind a slot to the next key pressed on the keyboard
    Remap { slot: SlotId },

    /// Abandon a pending remap
    CancelRemap,

    /// Bind a slot to a named key (e.g. KP7, F1, KEY_Q)
    Bind { slot: SlotId, key: String },

    /// Play a slot's stratagem now
    Trigger { slot: SlotId },

    /// Stop the stratagem that is playing
    Cancel,

    /// Change settings
    Set {
        /// Step latency in milliseconds
        #[arg(long)]
        latency: Option<u64>,

        /// Enable or disable macro playback
        #[arg(long)]
        macros: Option<bool>,

        /// Keybind mode: arrows or wasd
        #[arg(long)]
        mode: Option<KeybindMode>,

        /// Beep when a stratagem completes
        #[arg(long)]
        sound: Option<bool>,

        /// Show a status message when a stratagem completes
        #[arg(long)]
        visual: Option<bool>,
    },
}

fn expand(path: &str) -> PathBuf {
    shellexpand::tilde(path).into_owned().into()
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let profile_path = expand(&cli.profile);
    let catalog_path = expand(&cli.catalog);
    let socket = cli.socket.unwrap_or_else(ipc::socket_path);
    tracing::debug!("Using daemon socket {}", socket.display());

    let request = match cli.command {
        Commands::Validate => return cmd_validate(&profile_path, &catalog_path),
        Commands::Devices => return cmd_devices(),
        Commands::Stratagems { search, live: false } => {
            return cmd_stratagems(&catalog_path, search.as_deref())
        }
        Commands::Stratagems { search, live: true } => {
            return cmd_live_stratagems(&socket, search.as_deref()).await
        }
        Commands::Status => return cmd_status(&socket).await,
        Commands::Assign { slot, stratagem } => IpcRequest::Assign { slot, stratagem },
        Commands::Clear { slot } => IpcRequest::Clear { slot },
        Commands::Swap { from, to } => IpcRequest::Swap { from, to },
        Commands::Drop {
            target,
            name,
            from_slot,
        } => IpcRequest::Drop {
            target,
            payload: match (name, from_slot) {
                (Some(name), _) => DragPayload::FromSidebar { name },
                (None, Some(slot)) => DragPayload::FromSlot { slot },
                (None, None) => return Err(miette!("either --name or --from-slot is required")),
            },
        },
        Commands::Remap { slot } => IpcRequest::StartRemap { slot },
        Commands::CancelRemap => IpcRequest::CancelRemap,
        Commands::Bind { slot, key } => IpcRequest::Bind { slot, key },
        Commands::Trigger { slot } => IpcRequest::Trigger { slot },
        Commands::Cancel => IpcRequest::CancelPlayback,
        Commands::Set {
            latency,
            macros,
            mode,
            sound,
            visual,
        } => {
            let settings = SettingsUpdate {
                latency_ms: latency,
                macros_enabled: macros,
                keybind_mode: mode,
                sound_enabled: sound,
                visual_enabled: visual,
            };
            if settings.is_empty() {
                return Err(miette!("nothing to change; pass at least one option"));
            }
            IpcRequest::SetSettings { settings }
        }
    };

    cmd_simple(&socket, request).await
}

async fn send(socket: &Path, request: IpcRequest) -> miette::Result<IpcResponse> {
    match ipc::send_request(socket, &request).await {
        Ok(IpcResponse::Error { message }) => Err(miette!("{}", message)),
        Ok(response) => Ok(response),
        Err(e) => Err(miette!("{:#}", e)),
    }
}

async fn cmd_simple(socket: &Path, request: IpcRequest) -> miette::Result<()> {
    match send(socket, request).await? {
        IpcResponse::Success {
            message: Some(message),
        } => println!("{}", message),
        IpcResponse::Success { message: None } => println!("OK"),
        other => return Err(miette!("Unexpected response from daemon: {:?}", other)),
    }
    Ok(())
}

fn load_catalog(catalog_path: &Path) -> miette::Result<CatalogDef> {
    let result = if catalog_path.exists() {
        parse_catalog(catalog_path)
    } else {
        builtin_catalog()
    };
    result.map_err(miette::Report::new)
}

fn cmd_validate(profile_path: &Path, catalog_path: &Path) -> miette::Result<()> {
    if catalog_path.exists() {
        println!("Validating catalog: {}", catalog_path.display());
    } else {
        println!("No catalog at {}, checking built-in catalog", catalog_path.display());
    }
    let catalog = load_catalog(catalog_path)?;
    println!(
        "  {} stratagem(s) in {} department(s)",
        catalog.stratagem_count(),
        catalog.departments.len()
    );

    if !profile_path.exists() {
        println!("No profile at {} (defaults will be used)", profile_path.display());
        return Ok(());
    }

    println!("Validating profile: {}", profile_path.display());
    let profile = parse_profile(profile_path).map_err(miette::Report::new)?;

    let known = |name: &str| {
        catalog
            .departments
            .iter()
            .flat_map(|d| d.stratagems.iter())
            .any(|s| s.name == name)
    };
    for slot in &profile.slots {
        if let Some(name) = &slot.stratagem {
            if !known(name) {
                println!("  warning: slot {} uses unknown stratagem '{}'", slot.slot_id, name);
            }
        }
    }

    let settings = &profile.settings;
    println!("Profile is valid!");
    println!(
        "  latency {}ms, macros {}, mode {}, sound {}, visual {}",
        settings.latency_ms,
        on_off(settings.macros_enabled),
        settings.keybind_mode,
        on_off(settings.sound_enabled),
        on_off(settings.visual_enabled)
    );
    println!("  {} slot(s) customised", profile.slots.len());
    Ok(())
}

fn cmd_devices() -> miette::Result<()> {
    println!("Available input devices:\n");

    for device in enumerate_devices().map_err(|e| miette!("{:#}", e))? {
        let device_type = if device.keyboard { "keyboard" } else { "other" };
        println!("  {} [{}]", device.name, device_type);
        println!("    Path: {}", device.path.display());
        println!("    ID: {}", device.vendor_product());
        println!();
    }

    Ok(())
}

fn cmd_stratagems(catalog_path: &Path, search: Option<&str>) -> miette::Result<()> {
    let catalog = MacroCatalog::from_def(load_catalog(catalog_path)?);
    print_listing(&catalog_listing(&catalog, search.unwrap_or("")));
    Ok(())
}

async fn cmd_live_stratagems(socket: &Path, search: Option<&str>) -> miette::Result<()> {
    let request = IpcRequest::Catalog {
        search: search.map(str::to_string),
    };
    let IpcResponse::Catalog { departments } = send(socket, request).await? else {
        return Err(miette!("Unexpected response from daemon"));
    };
    print_listing(&departments);
    Ok(())
}

fn print_listing(departments: &[DepartmentInfo]) {
    for department in departments {
        println!("{}", department.name);
        for stratagem in &department.stratagems {
            let icon = stratagem
                .icon
                .as_ref()
                .map(|p| format!("  [{}]", p.display()))
                .unwrap_or_default();
            println!(
                "  {:<32} {}{}",
                stratagem.name,
                format_sequence(&stratagem.sequence),
                icon
            );
        }
    }
}

async fn cmd_status(socket: &Path) -> miette::Result<()> {
    let IpcResponse::Status {
        slots,
        settings,
        remapping,
        playing,
        last_status,
    } = send(socket, IpcRequest::Status).await?
    else {
        return Err(miette!("Unexpected response from daemon"));
    };

    println!(
        "Macros: {}   Mode: {}   Latency: {}ms   Sound: {}   Visual: {}",
        on_off(settings.macros_enabled),
        settings.keybind_mode,
        settings.latency_ms,
        on_off(settings.sound_enabled),
        on_off(settings.visual_enabled)
    );
    if playing {
        println!("Playing a stratagem");
    }
    if let Some(slot) = remapping {
        println!("Slot {} is waiting for a key", slot);
    }
    if let Some(message) = last_status {
        println!("{}", message);
    }
    println!();

    for slot in slots {
        let key = slot
            .key_code
            .map(|k| k.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{:>2}] {:<16} key {:<4} {:<28} {}",
            slot.slot_id,
            slot.label,
            key,
            slot.stratagem.as_deref().unwrap_or("(empty)"),
            slot.sequence.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
