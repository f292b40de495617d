//! stratagem-mapper daemon
//!
//! Watches keyboards for numpad presses and plays the bound stratagem through
//! a virtual keyboard.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stratagem_config::{builtin_catalog, parse_catalog, parse_profile, LogLevel, Profile};
use stratagem_daemon::daemon::{Daemon, ProfileWriter};
use stratagem_daemon::device::{find_speaker, open_keyboards};
use stratagem_daemon::feedback::DaemonFeedback;
use stratagem_daemon::injector::{create_shared_virtual_device, VIRTUAL_DEVICE_NAME};
use stratagem_daemon::ipc::IpcServer;
use stratagem_daemon::player::MacroPlayer;
use stratagem_daemon::{MacroCatalog, SlotAssignmentController};
use tokio::sync::broadcast;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[derive(Parser, Debug)]
#[command(name = "stratagemd")]
#[command(about = "Numpad stratagem macro daemon")]
struct Args {
    /// Profile with settings and slot assignments (created on first change)
    #[arg(short, long, default_value = "~/.config/stratagem-mapper/profile.kdl")]
    profile: String,

    /// Stratagem catalog; the built-in catalog is used if the file is missing
    #[arg(short, long, default_value = "~/.config/stratagem-mapper/stratagems.kdl")]
    catalog: String,

    /// Directory with stratagem SVG icons
    #[arg(long, default_value = "~/.config/stratagem-mapper/icons")]
    icons: String,

    /// Only listen to the keyboard with this name
    #[arg(short, long)]
    device: Option<String>,
}

fn expand(path: &str) -> PathBuf {
    shellexpand::tilde(path).into_owned().into()
}

fn load_profile(path: &Path) -> Result<Profile> {
    if !path.exists() {
        return Ok(Profile::default());
    }
    parse_profile(path).with_context(|| format!("Failed to load profile {}", path.display()))
}

/// Install the subscriber before the profile is read, so its warnings are
/// shown.
///
/// RUST_LOG wins over the profile's log level. Without it, the returned
/// handle swaps in the profile's level once the profile is loaded.
fn init_tracing() -> Option<FilterHandle> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let (filter, handle) = reload::Layer::new(EnvFilter::new(LogLevel::default().as_str()));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    Some(handle)
}

fn apply_log_level(handle: &FilterHandle, level: LogLevel) -> Result<()> {
    handle
        .reload(EnvFilter::new(level.as_str()))
        .context("Failed to apply the profile's log level")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter_handle = init_tracing();

    let profile_path = expand(&args.profile);
    let profile = load_profile(&profile_path)?;
    if let Some(handle) = &filter_handle {
        apply_log_level(handle, profile.settings.log_level)?;
    }

    if profile_path.exists() {
        tracing::info!("Loaded profile from {}", profile_path.display());
    } else {
        tracing::info!(
            "No profile at {}, starting with defaults",
            profile_path.display()
        );
    }

    let catalog_path = expand(&args.catalog);
    let catalog_def = if catalog_path.exists() {
        tracing::info!("Loading stratagems from {}", catalog_path.display());
        parse_catalog(&catalog_path)
            .with_context(|| format!("Failed to load catalog {}", catalog_path.display()))?
    } else {
        tracing::info!("Using built-in stratagem catalog");
        builtin_catalog().context("Built-in catalog is invalid")?
    };

    let mut catalog = MacroCatalog::from_def(catalog_def);
    let icons_dir = expand(&args.icons);
    if icons_dir.is_dir() {
        catalog = catalog.with_icons_dir(icons_dir);
    }
    tracing::info!(
        "Loaded {} stratagem(s) in {} department(s)",
        catalog.len(),
        catalog.departments().len()
    );

    let device_filter = args.device.or_else(|| profile.settings.device.clone());

    let mut controller = SlotAssignmentController::new(Arc::new(catalog), &profile);
    controller.set_observer(ProfileWriter::new(profile_path));

    let sink = create_shared_virtual_device(VIRTUAL_DEVICE_NAME)
        .context("Failed to create virtual keyboard (is /dev/uinput writable?)")?;
    let feedback = Arc::new(match find_speaker() {
        Some((path, speaker)) => {
            tracing::info!("Completion tones on {}", path.display());
            DaemonFeedback::with_speaker(speaker)
        }
        None => {
            tracing::debug!("No PC speaker found, completion tones disabled");
            DaemonFeedback::new()
        }
    });

    let (events, mut display) = broadcast::channel(16);
    tokio::spawn(async move {
        loop {
            match display.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        tracing::debug!("Display update: {}", json);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Missed {} display update(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    let player = MacroPlayer::new(sink, feedback.clone(), events);

    let keyboards = open_keyboards(device_filter.as_deref())?;
    let server = IpcServer::new()?;

    Daemon::new(controller, player, feedback)
        .run(server, keyboards)
        .await
}
