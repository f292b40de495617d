//! Timed playback of stratagem sequences
//!
//! This module provides [`MacroPlayer`], which resolves a sequence of
//! directions to concrete keys and injects them through a [`KeySink`]:
//! press, hold for the step delay, release, wait the step delay.
//!
//! Only one playback runs at a time; a second call while one is in flight
//! fails with [`PlaybackError::Busy`]. A running playback can be stopped with
//! [`MacroPlayer::cancel`]. A pressed key is always released before playback
//! returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use evdev::Key;
use serde::Serialize;
use stratagem_config::{format_sequence, Direction, KeybindMode, Settings};
use thiserror::Error;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

use crate::feedback::{FeedbackSink, STATUS_DURATION, TONE_DURATION, TONE_HZ};
use crate::injector::{InjectError, KeySink, SharedSink};
use crate::resolver::resolve_sequence;

/// What to play, and how to describe it to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    pub name: String,
    pub sequence: Vec<Direction>,
    /// Label of the key that triggered playback
    pub key_label: String,
}

/// The settings that affect a single playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOptions {
    pub mode: KeybindMode,
    pub step_delay: Duration,
    pub macros_enabled: bool,
    pub sound_enabled: bool,
    pub visual_enabled: bool,
}

impl From<&Settings> for PlaybackOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            mode: settings.keybind_mode,
            step_delay: settings.step_delay(),
            macros_enabled: settings.macros_enabled,
            sound_enabled: settings.sound_enabled,
            visual_enabled: settings.visual_enabled,
        }
    }
}

/// Display updates published while playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    /// Sent before the first key is pressed.
    Started {
        name: String,
        sequence: String,
        key_label: String,
    },
    Finished {
        name: String,
    },
    Cancelled {
        name: String,
    },
    Failed {
        name: String,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed { steps: usize, elapsed: Duration },
    /// Macros are switched off; nothing was injected.
    Disabled,
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("a stratagem is already playing")]
    Busy,

    #[error("playback cancelled after {completed_steps} step(s)")]
    Cancelled { completed_steps: usize },

    #[error("key injection failed at step {step} ({key:?})")]
    Injection {
        step: usize,
        key: Key,
        #[source]
        source: InjectError,
    },
}

/// Cancellation flag shared between the player and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Exclusive claim on a [`MacroPlayer`], taken by
/// [`MacroPlayer::try_begin`].
///
/// The player reports busy from the moment the guard is created until it is
/// dropped, so a guard can be taken synchronously and moved into the task
/// that plays.
#[must_use = "dropping the guard releases the player"]
pub struct PlaybackGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for PlaybackGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

/// Plays stratagem sequences through a shared key sink.
///
/// `MacroPlayer` is cheap to clone; clones share the sink, the busy flag and
/// the cancel token, so a clone can be moved into a spawned task while the
/// event loop keeps another to cancel it.
pub struct MacroPlayer<S> {
    sink: SharedSink<S>,
    feedback: Arc<dyn FeedbackSink>,
    events: broadcast::Sender<PlaybackEvent>,
    busy: Arc<AtomicBool>,
    cancel: CancelToken,
}

impl<S> Clone for MacroPlayer<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            feedback: Arc::clone(&self.feedback),
            events: self.events.clone(),
            busy: Arc::clone(&self.busy),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S: KeySink> MacroPlayer<S> {
    /// Create a player. Display updates go to `events`; the caller owns the
    /// channel and decides who subscribes.
    pub fn new(
        sink: SharedSink<S>,
        feedback: Arc<dyn FeedbackSink>,
        events: broadcast::Sender<PlaybackEvent>,
    ) -> Self {
        Self {
            sink,
            feedback,
            events,
            busy: Arc::new(AtomicBool::new(false)),
            cancel: CancelToken::default(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Stop the playback in flight, if any.
    pub fn cancel(&self) {
        if self.is_playing() {
            self.cancel.cancel();
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Claim the player for one playback.
    ///
    /// The cancel token is reset here, so a [`cancel`](Self::cancel) issued
    /// after this returns stops the playback run with the guard, even before
    /// its first key.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::Busy`] if another playback holds the player.
    pub fn try_begin(&self) -> Result<PlaybackGuard, PlaybackError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Ignoring trigger: a stratagem is already playing");
            return Err(PlaybackError::Busy);
        }
        self.cancel.reset();
        Ok(PlaybackGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    /// Play one sequence.
    ///
    /// Takes at least `2 * len * step_delay`. Returns
    /// [`PlaybackOutcome::Disabled`] without touching the sink when macros are
    /// switched off.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::Busy`] if another playback is running
    /// - [`PlaybackError::Cancelled`] if [`cancel`](Self::cancel) was called
    /// - [`PlaybackError::Injection`] if the sink fails; remaining steps are
    ///   skipped
    pub async fn play(
        &self,
        request: &PlaybackRequest,
        options: &PlaybackOptions,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        if !options.macros_enabled {
            debug!("Macros disabled, not playing '{}'", request.name);
            return Ok(PlaybackOutcome::Disabled);
        }

        let guard = self.try_begin()?;
        self.play_claimed(guard, request, options).await
    }

    /// Play one sequence under a guard from [`try_begin`](Self::try_begin).
    ///
    /// The player is released when this returns. The macros-enabled gate is
    /// the caller's job.
    pub async fn play_claimed(
        &self,
        _guard: PlaybackGuard,
        request: &PlaybackRequest,
        options: &PlaybackOptions,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let keys = resolve_sequence(&request.sequence, options.mode);
        self.publish(PlaybackEvent::Started {
            name: request.name.clone(),
            sequence: format_sequence(&request.sequence),
            key_label: request.key_label.clone(),
        });
        info!(
            "Playing '{}' ({}) from key {}",
            request.name,
            format_sequence(&request.sequence),
            request.key_label
        );

        let started = Instant::now();
        match self.inject(&keys, options.step_delay).await {
            Ok(()) => {}
            Err(e @ PlaybackError::Cancelled { .. }) => {
                info!("Playback of '{}' cancelled", request.name);
                self.publish(PlaybackEvent::Cancelled {
                    name: request.name.clone(),
                });
                return Err(e);
            }
            Err(e) => {
                warn!("Playback of '{}' failed: {}", request.name, e);
                self.publish(PlaybackEvent::Failed {
                    name: request.name.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        }
        let elapsed = started.elapsed();
        debug!("Played '{}' in {:?}", request.name, elapsed);

        if options.sound_enabled {
            if let Err(e) = self.feedback.tone(TONE_HZ, TONE_DURATION) {
                debug!("Completion tone unavailable: {}", e);
            }
        }
        if options.visual_enabled {
            self.feedback
                .status(&format!("✓ {} executed", request.name), STATUS_DURATION);
        }

        self.publish(PlaybackEvent::Finished {
            name: request.name.clone(),
        });

        Ok(PlaybackOutcome::Completed {
            steps: keys.len(),
            elapsed,
        })
    }

    async fn inject(&self, keys: &[Key], delay: Duration) -> Result<(), PlaybackError> {
        for (step, &key) in keys.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(PlaybackError::Cancelled {
                    completed_steps: step,
                });
            }

            self.sink
                .lock()
                .await
                .press(key)
                .map_err(|source| PlaybackError::Injection { step, key, source })?;

            let cancelled = self.wait(delay).await;

            self.sink
                .lock()
                .await
                .release(key)
                .map_err(|source| PlaybackError::Injection { step, key, source })?;

            if cancelled || self.wait(delay).await {
                return Err(PlaybackError::Cancelled {
                    completed_steps: step + 1,
                });
            }
        }
        Ok(())
    }

    /// Sleep for `delay`; returns true if cancelled meanwhile.
    async fn wait(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => self.cancel.is_cancelled(),
            _ = self.cancel.cancelled() => true,
        }
    }

    fn publish(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::testing::RecordingFeedback;
    use crate::injector::testing::{KeyAction, RecordingSink};
    use tokio::sync::Mutex;

    fn resupply() -> PlaybackRequest {
        PlaybackRequest {
            name: "Resupply".to_string(),
            sequence: vec![
                Direction::Down,
                Direction::Down,
                Direction::Up,
                Direction::Right,
            ],
            key_label: "7".to_string(),
        }
    }

    fn options(delay_ms: u64) -> PlaybackOptions {
        PlaybackOptions {
            mode: KeybindMode::Arrows,
            step_delay: Duration::from_millis(delay_ms),
            macros_enabled: true,
            sound_enabled: false,
            visual_enabled: false,
        }
    }

    fn player_with(
        sink: RecordingSink,
        feedback: Arc<RecordingFeedback>,
    ) -> (MacroPlayer<RecordingSink>, broadcast::Receiver<PlaybackEvent>) {
        let (tx, rx) = broadcast::channel(16);
        let player = MacroPlayer::new(Arc::new(Mutex::new(sink)), feedback, tx);
        (player, rx)
    }

    #[tokio::test]
    async fn test_resupply_injection_order() {
        let sink = RecordingSink::default();
        let (player, _rx) = player_with(sink.clone(), Arc::new(RecordingFeedback::default()));

        let outcome = player.play(&resupply(), &options(1)).await.unwrap();
        assert!(matches!(outcome, PlaybackOutcome::Completed { steps: 4, .. }));

        use KeyAction::*;
        assert_eq!(
            sink.actions(),
            vec![
                Press(Key::KEY_DOWN),
                Release(Key::KEY_DOWN),
                Press(Key::KEY_DOWN),
                Release(Key::KEY_DOWN),
                Press(Key::KEY_UP),
                Release(Key::KEY_UP),
                Press(Key::KEY_RIGHT),
                Release(Key::KEY_RIGHT),
            ]
        );
    }

    #[tokio::test]
    async fn test_wasd_mode_uses_letter_keys() {
        let sink = RecordingSink::default();
        let (player, _rx) = player_with(sink.clone(), Arc::new(RecordingFeedback::default()));

        let mut opts = options(1);
        opts.mode = KeybindMode::Wasd;
        player.play(&resupply(), &opts).await.unwrap();

        let pressed: Vec<Key> = sink
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                KeyAction::Press(k) => Some(k),
                KeyAction::Release(_) => None,
            })
            .collect();
        assert_eq!(pressed, vec![Key::KEY_S, Key::KEY_S, Key::KEY_W, Key::KEY_D]);
    }

    #[tokio::test]
    async fn test_timing_lower_bound() {
        let delay = Duration::from_millis(5);
        let sink = RecordingSink::default();
        let (player, _rx) = player_with(sink.clone(), Arc::new(RecordingFeedback::default()));

        let outcome = player.play(&resupply(), &options(5)).await.unwrap();
        match outcome {
            PlaybackOutcome::Completed { steps, elapsed } => {
                assert_eq!(steps, 4);
                assert!(elapsed >= delay * 8, "elapsed {:?}", elapsed);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        // Every press is held, and every release is followed by a gap.
        let timed = sink.timed();
        for pair in timed.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= delay);
        }
    }

    #[tokio::test]
    async fn test_disabled_injects_nothing() {
        let sink = RecordingSink::default();
        let feedback = Arc::new(RecordingFeedback::default());
        let (player, mut rx) = player_with(sink.clone(), feedback.clone());

        let mut opts = options(1);
        opts.macros_enabled = false;
        opts.visual_enabled = true;

        let outcome = player.play(&resupply(), &opts).await.unwrap();
        assert_eq!(outcome, PlaybackOutcome::Disabled);
        assert!(sink.actions().is_empty());
        assert!(feedback.status_messages().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_events_and_feedback() {
        let sink = RecordingSink::default();
        let feedback = Arc::new(RecordingFeedback::default());
        let (player, mut rx) = player_with(sink, feedback.clone());

        let mut opts = options(1);
        opts.sound_enabled = true;
        opts.visual_enabled = true;
        player.play(&resupply(), &opts).await.unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            PlaybackEvent::Started {
                name: "Resupply".to_string(),
                sequence: "↓↓↑→".to_string(),
                key_label: "7".to_string(),
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            PlaybackEvent::Finished {
                name: "Resupply".to_string()
            }
        );
        assert_eq!(feedback.tone_count(), 1);
        assert_eq!(feedback.status_messages(), vec!["✓ Resupply executed"]);
    }

    #[tokio::test]
    async fn test_feedback_gated_independently() {
        let feedback = Arc::new(RecordingFeedback::default());
        let (player, _rx) = player_with(RecordingSink::default(), feedback.clone());

        let mut opts = options(1);
        opts.sound_enabled = true;
        opts.visual_enabled = false;
        player.play(&resupply(), &opts).await.unwrap();

        assert_eq!(feedback.tone_count(), 1);
        assert!(feedback.status_messages().is_empty());
    }

    #[tokio::test]
    async fn test_tone_failure_is_swallowed() {
        let feedback = Arc::new(RecordingFeedback::failing_tone());
        let (player, _rx) = player_with(RecordingSink::default(), feedback.clone());

        let mut opts = options(1);
        opts.sound_enabled = true;
        opts.visual_enabled = true;

        let outcome = player.play(&resupply(), &opts).await.unwrap();
        assert!(matches!(outcome, PlaybackOutcome::Completed { .. }));
        assert_eq!(feedback.status_messages(), vec!["✓ Resupply executed"]);
    }

    #[tokio::test]
    async fn test_injection_failure_aborts() {
        // Third call is the second press.
        let sink = RecordingSink::failing_at(2);
        let feedback = Arc::new(RecordingFeedback::default());
        let (player, mut rx) = player_with(sink.clone(), feedback.clone());

        let mut opts = options(1);
        opts.visual_enabled = true;

        let err = player.play(&resupply(), &opts).await.unwrap_err();
        match err {
            PlaybackError::Injection { step, key, .. } => {
                assert_eq!(step, 1);
                assert_eq!(key, Key::KEY_DOWN);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(sink.actions().len(), 2);
        assert!(feedback.status_messages().is_empty());
        assert!(!player.is_playing());

        assert!(matches!(rx.try_recv().unwrap(), PlaybackEvent::Started { .. }));
        assert!(matches!(rx.try_recv().unwrap(), PlaybackEvent::Failed { .. }));
    }

    #[tokio::test]
    async fn test_second_play_is_busy() {
        let (player, _rx) =
            player_with(RecordingSink::default(), Arc::new(RecordingFeedback::default()));

        let background = player.clone();
        let handle = tokio::spawn(async move { background.play(&resupply(), &options(50)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(player.is_playing());
        let err = player.play(&resupply(), &options(1)).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Busy));

        player.cancel();
        let _ = handle.await.unwrap();
        assert!(!player.is_playing());
    }

    #[tokio::test]
    async fn test_try_begin_claims_until_guard_dropped() {
        let sink = RecordingSink::default();
        let (player, mut rx) =
            player_with(sink.clone(), Arc::new(RecordingFeedback::default()));

        let guard = player.try_begin().unwrap();
        assert!(player.is_playing());
        assert!(matches!(player.try_begin(), Err(PlaybackError::Busy)));

        // Cancel lands before the claimed playback presses anything.
        player.cancel();
        let err = player
            .play_claimed(guard, &resupply(), &options(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Cancelled { completed_steps: 0 }));
        assert!(sink.actions().is_empty());
        assert!(!player.is_playing());

        assert!(matches!(rx.try_recv().unwrap(), PlaybackEvent::Started { .. }));
        assert!(matches!(rx.try_recv().unwrap(), PlaybackEvent::Cancelled { .. }));

        // The next claim starts with a fresh cancel token.
        let outcome = player.play(&resupply(), &options(1)).await.unwrap();
        assert!(matches!(outcome, PlaybackOutcome::Completed { steps: 4, .. }));
    }

    #[tokio::test]
    async fn test_cancel_releases_held_key() {
        let sink = RecordingSink::default();
        let (player, mut rx) =
            player_with(sink.clone(), Arc::new(RecordingFeedback::default()));

        let background = player.clone();
        let handle = tokio::spawn(async move { background.play(&resupply(), &options(200)).await });

        // First key is held for 200ms.
        tokio::time::sleep(Duration::from_millis(50)).await;
        player.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, PlaybackError::Cancelled { completed_steps: 1 }));
        assert_eq!(
            sink.actions(),
            vec![
                KeyAction::Press(Key::KEY_DOWN),
                KeyAction::Release(Key::KEY_DOWN)
            ]
        );

        assert!(matches!(rx.try_recv().unwrap(), PlaybackEvent::Started { .. }));
        assert!(matches!(rx.try_recv().unwrap(), PlaybackEvent::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_cancel_when_idle_does_not_affect_next_play() {
        let sink = RecordingSink::default();
        let (player, _rx) = player_with(sink.clone(), Arc::new(RecordingFeedback::default()));

        player.cancel();
        let outcome = player.play(&resupply(), &options(1)).await.unwrap();
        assert!(matches!(outcome, PlaybackOutcome::Completed { steps: 4, .. }));
        assert_eq!(sink.actions().len(), 8);
    }
}
