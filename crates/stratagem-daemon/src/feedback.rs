//! Status and tone feedback
//!
//! Playback and the controller report to a [`FeedbackSink`]. Both calls are
//! best-effort: callers log and drop tone errors.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use evdev::{Device, EventType, InputEvent, SoundType};
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Frequency of the completion tone.
pub const TONE_HZ: u32 = 1000;

/// Length of the completion tone.
pub const TONE_DURATION: Duration = Duration::from_millis(200);

/// How long the "executed" status stays current.
pub const STATUS_DURATION: Duration = Duration::from_millis(1500);

pub trait FeedbackSink: Send + Sync {
    /// Show a transient status message.
    fn status(&self, message: &str, duration: Duration);

    /// Play a tone. Returns immediately; the tone stops on its own.
    fn tone(&self, hz: u32, duration: Duration) -> Result<()>;
}

/// Feedback sink used by the daemon.
///
/// Status messages are logged and the latest one is kept until it expires so
/// `status` requests can report it. Tones go to the speaker device handed to
/// [`with_speaker`](Self::with_speaker); without one, tones fail.
#[derive(Default)]
pub struct DaemonFeedback {
    last_status: Mutex<Option<(String, Instant)>>,
    speaker: Option<Arc<Mutex<Device>>>,
}

impl DaemonFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Play tones on `speaker`, found once at startup with
    /// [`find_speaker`](crate::device::find_speaker).
    pub fn with_speaker(speaker: Device) -> Self {
        Self {
            speaker: Some(Arc::new(Mutex::new(speaker))),
            ..Self::default()
        }
    }

    pub fn has_speaker(&self) -> bool {
        self.speaker.is_some()
    }

    /// The most recent status message, if it has not expired yet.
    pub fn current_status(&self) -> Option<String> {
        let guard = self.last_status.lock().ok()?;
        match guard.as_ref() {
            Some((message, expires)) if Instant::now() < *expires => Some(message.clone()),
            _ => None,
        }
    }
}

impl FeedbackSink for DaemonFeedback {
    fn status(&self, message: &str, duration: Duration) {
        info!("{}", message);
        if let Ok(mut guard) = self.last_status.lock() {
            *guard = Some((message.to_string(), Instant::now() + duration));
        }
    }

    fn tone(&self, hz: u32, duration: Duration) -> Result<()> {
        let speaker = self
            .speaker
            .as_ref()
            .ok_or_else(|| anyhow!("no PC speaker device found"))?;
        let value = i32::try_from(hz).context("tone frequency out of range")?;
        let runtime = Handle::try_current().context("tones need a tokio runtime")?;

        speaker
            .lock()
            .map_err(|_| anyhow!("speaker lock poisoned"))?
            .send_events(&[tone_event(value)])
            .context("failed to start tone")?;

        let speaker = Arc::clone(speaker);
        runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            let stopped = match speaker.lock() {
                Ok(mut device) => device.send_events(&[tone_event(0)]).map_err(anyhow::Error::from),
                Err(_) => Err(anyhow!("speaker lock poisoned")),
            };
            if let Err(e) = stopped {
                debug!("Failed to stop tone: {}", e);
            }
        });

        Ok(())
    }
}

fn tone_event(value: i32) -> InputEvent {
    InputEvent::new(EventType::SOUND, SoundType::SND_TONE.0, value)
}
