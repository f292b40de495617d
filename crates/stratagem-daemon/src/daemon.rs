//! Event loop
//!
//! The loop exclusively owns the [`SlotAssignmentController`]. Keyboard
//! readers and socket connections send [`LoopEvent`]s over a channel; socket
//! requests carry a oneshot for the reply. Playback runs on its own task with
//! an owned [`PlaybackRequest`], so the loop keeps handling events (including
//! cancellation) while a stratagem plays.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use evdev::{Device, InputEvent, InputEventKind, Key};
use stratagem_config::{write_profile, Profile};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::controller::{ChangeObserver, KeyOutcome, SlotAssignmentController};
use crate::feedback::{DaemonFeedback, FeedbackSink, STATUS_DURATION};
use crate::injector::KeySink;
use crate::ipc::{catalog_listing, handle_ipc_connection, IpcRequest, IpcResponse, IpcServer};
use crate::keys::parse_key;
use crate::player::{MacroPlayer, PlaybackError, PlaybackOptions, PlaybackRequest};

/// Something for the event loop to handle.
#[derive(Debug)]
pub enum LoopEvent {
    /// A key went down on one of the watched keyboards.
    Key(Key),
    /// A control request and where to send the answer.
    Request(IpcRequest, oneshot::Sender<IpcResponse>),
}

/// Persists the profile on every change.
pub struct ProfileWriter {
    path: PathBuf,
}

impl ProfileWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ChangeObserver for ProfileWriter {
    fn on_change(&mut self, profile: &Profile) {
        match write_profile(profile, &self.path) {
            Ok(()) => debug!("Saved profile to {}", self.path.display()),
            Err(e) => error!("Failed to save profile to {}: {}", self.path.display(), e),
        }
    }
}

pub struct Daemon<S> {
    controller: SlotAssignmentController,
    player: MacroPlayer<S>,
    feedback: Arc<DaemonFeedback>,
}

impl<S: KeySink + 'static> Daemon<S> {
    pub fn new(
        controller: SlotAssignmentController,
        player: MacroPlayer<S>,
        feedback: Arc<DaemonFeedback>,
    ) -> Self {
        Self {
            controller,
            player,
            feedback,
        }
    }

    pub fn controller(&self) -> &SlotAssignmentController {
        &self.controller
    }

    /// React to a key press from a watched keyboard.
    pub fn handle_key(&mut self, key: Key) {
        match self.controller.handle_key_press(key) {
            KeyOutcome::Ignored => {}
            KeyOutcome::Remapped { slot, label } => {
                debug!("Slot {} remapped", slot);
                self.feedback
                    .status(&format!("Bound to {}", label), STATUS_DURATION);
            }
            KeyOutcome::RemapCancelled { slot } => {
                debug!("Slot {} remap cancelled by Escape", slot);
            }
            KeyOutcome::RemapRejected { error, .. } => {
                self.feedback.status(&error.to_string(), STATUS_DURATION);
            }
            KeyOutcome::Activate(request) => {
                if let Err(e) = self.start_playback(request) {
                    debug!("Key ignored: {}", e);
                }
            }
            KeyOutcome::Unassigned { slot } => {
                debug!("Slot {} has no stratagem", slot);
            }
        }
    }

    /// Execute a control request against the controller.
    pub fn handle_request(&mut self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::Status => IpcResponse::Status {
                slots: self.controller.snapshots(),
                settings: self.controller.settings().clone(),
                remapping: self.controller.remapping(),
                playing: self.player.is_playing(),
                last_status: self.feedback.current_status(),
            },
            IpcRequest::Catalog { search } => IpcResponse::Catalog {
                departments: catalog_listing(
                    self.controller.catalog(),
                    search.as_deref().unwrap_or(""),
                ),
            },
            IpcRequest::Assign { slot, stratagem } => {
                match self.controller.assign(slot, &stratagem) {
                    Ok(()) => IpcResponse::success(format!("Slot {}: {}", slot, stratagem)),
                    Err(e) => IpcResponse::error(e),
                }
            }
            IpcRequest::Clear { slot } => match self.controller.clear(slot) {
                Ok(()) => IpcResponse::success(format!("Slot {} cleared", slot)),
                Err(e) => IpcResponse::error(e),
            },
            IpcRequest::Swap { from, to } => match self.controller.swap(from, to) {
                Ok(()) => IpcResponse::success(format!("Swapped slots {} and {}", from, to)),
                Err(e) => IpcResponse::error(e),
            },
            IpcRequest::Drop { target, payload } => {
                match self.controller.drop_onto(target, &payload) {
                    Ok(()) => IpcResponse::Success { message: None },
                    Err(e) => IpcResponse::error(e),
                }
            }
            IpcRequest::StartRemap { slot } => match self.controller.start_remap(slot) {
                Ok(()) => IpcResponse::success(format!("Slot {}: press any key", slot)),
                Err(e) => IpcResponse::error(e),
            },
            IpcRequest::CancelRemap => match self.controller.cancel_remap() {
                Ok(slot) => IpcResponse::success(format!("Slot {}: remap cancelled", slot)),
                Err(e) => IpcResponse::error(e),
            },
            IpcRequest::Bind { slot, key } => {
                let Some(parsed) = parse_key(&key) else {
                    return IpcResponse::error(format!("Unknown key: '{}'", key));
                };
                match self.controller.bind(slot, parsed) {
                    Ok(()) => IpcResponse::success(format!("Slot {} bound to {}", slot, key)),
                    Err(e) => IpcResponse::error(e),
                }
            }
            IpcRequest::Trigger { slot } => self.trigger(slot),
            IpcRequest::CancelPlayback => {
                if self.player.is_playing() {
                    self.player.cancel();
                    IpcResponse::success("Playback cancelled")
                } else {
                    IpcResponse::success("Nothing is playing")
                }
            }
            IpcRequest::SetSettings { settings } => {
                match self.controller.update_settings(&settings) {
                    Ok(()) => IpcResponse::Success { message: None },
                    Err(e) => IpcResponse::error(e),
                }
            }
        }
    }

    fn trigger(&mut self, slot: usize) -> IpcResponse {
        let request = match self.controller.activation_for(slot) {
            Ok(Some(request)) => request,
            Ok(None) => return IpcResponse::error(format!("Slot {} has no stratagem", slot)),
            Err(e) => return IpcResponse::error(e),
        };
        if !self.controller.settings().macros_enabled {
            return IpcResponse::error("Macros are disabled");
        }

        let name = request.name.clone();
        match self.start_playback(request) {
            Ok(()) => IpcResponse::success(format!("Playing {}", name)),
            Err(e) => IpcResponse::error(e),
        }
    }

    /// Spawn playback of `request` with the current settings.
    ///
    /// The player is claimed before the task is spawned, so a second trigger
    /// or a cancel handled right after this sees the playback.
    fn start_playback(&self, request: PlaybackRequest) -> Result<(), PlaybackError> {
        let options = PlaybackOptions::from(self.controller.settings());
        if !options.macros_enabled {
            debug!("Macros disabled, '{}' not played", request.name);
            return Ok(());
        }

        let guard = self.player.try_begin()?;
        let player = self.player.clone();
        let feedback = Arc::clone(&self.feedback);

        tokio::spawn(async move {
            match player.play_claimed(guard, &request, &options).await {
                Ok(_) | Err(PlaybackError::Cancelled { .. }) => {}
                Err(e) => {
                    error!("'{}' failed: {}", request.name, e);
                    feedback.status(&format!("✗ {} failed", request.name), STATUS_DURATION);
                }
            }
        });

        Ok(())
    }

    /// Run until SIGINT or SIGTERM.
    ///
    /// The socket file is removed and any playback is cancelled on the way
    /// out.
    pub async fn run(mut self, server: IpcServer, keyboards: Vec<(PathBuf, Device)>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(64);

        let mut readers = Vec::with_capacity(keyboards.len());
        for (path, device) in keyboards {
            readers.push(spawn_keyboard_reader(path, device, tx.clone())?);
        }
        if readers.is_empty() {
            warn!("No keyboards found; only socket requests will be handled");
        }

        let accept_task = spawn_accept_loop(server, tx);
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!("stratagem-mapper daemon running");

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(LoopEvent::Key(key)) => self.handle_key(key),
                    Some(LoopEvent::Request(request, reply)) => {
                        let response = self.handle_request(request);
                        if reply.send(response).is_err() {
                            debug!("IPC client went away before the reply");
                        }
                    }
                    None => break,
                },
                _ = &mut shutdown => {
                    info!("Received SIGINT");
                    break;
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM");
                    break;
                }
            }
        }

        info!("Shutting down...");
        self.player.cancel();

        // Dropping the server removes the socket file.
        accept_task.abort();
        let _ = accept_task.await;
        for reader in readers {
            reader.abort();
        }

        Ok(())
    }
}

/// The key that went down, for key-press events only.
fn key_press(event: &InputEvent) -> Option<Key> {
    match event.kind() {
        InputEventKind::Key(key) if event.value() == 1 => Some(key),
        _ => None,
    }
}

fn spawn_keyboard_reader(
    path: PathBuf,
    device: Device,
    tx: mpsc::Sender<LoopEvent>,
) -> Result<JoinHandle<()>> {
    let name = device.name().unwrap_or("Unknown").to_string();
    let mut stream = device.into_event_stream().with_context(|| {
        format!(
            "Failed to create event stream for device '{}' at {}",
            name,
            path.display()
        )
    })?;

    Ok(tokio::spawn(async move {
        loop {
            match stream.next_event().await {
                Ok(event) => {
                    if let Some(key) = key_press(&event) {
                        if tx.send(LoopEvent::Key(key)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("Stopped reading '{}' ({}): {}", name, path.display(), e);
                    break;
                }
            }
        }
    }))
}

fn spawn_accept_loop(server: IpcServer, tx: mpsc::Sender<LoopEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let stream = match server.accept().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("{:#}", e);
                    continue;
                }
            };

            let tx = tx.clone();
            tokio::spawn(async move {
                let result = handle_ipc_connection(stream, |request| async move {
                    let (reply_tx, reply_rx) = oneshot::channel();
                    if tx.send(LoopEvent::Request(request, reply_tx)).await.is_err() {
                        return IpcResponse::error("Daemon is shutting down");
                    }
                    reply_rx
                        .await
                        .unwrap_or_else(|_| IpcResponse::error("Daemon is shutting down"))
                })
                .await;

                if let Err(e) = result {
                    warn!("IPC connection failed: {:#}", e);
                }
            });
        }
    })
}
