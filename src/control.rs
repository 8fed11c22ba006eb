use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::driver::{Command, Mailbox};
use crate::error::MixerError;
use crate::mixer::{Mixer, VoiceId, VoiceIdAllocator};
use crate::sample::Sample;

/// Identifies what a `stop` call should affect.
pub enum StopTarget {
    Id(VoiceId),
    Name(String),
}

/// The public control surface: the thing callers actually hold onto.
///
/// Wraps a [`Mixer`] and, when driven by a push driver, the [`Mailbox`] that
/// feeds it — routing every call through whichever path is in play so
/// callers never need to know which driver is underneath. `close` is
/// idempotent; every other method after `close` still reaches the mixer
/// (closing only stops the driver side, it does not poison the handle).
pub struct Control {
    mixer: Arc<Mixer>,
    mailbox: Option<Arc<Mailbox>>,
    ids: VoiceIdAllocator,
    closed: Arc<AtomicBool>,
}

impl Control {
    /// Build a control surface over a pull-driven mixer (e.g. `cpal`):
    /// every call is applied to `mixer` synchronously on the caller's thread.
    pub fn for_pull(mixer: Arc<Mixer>) -> Self {
        Self {
            mixer,
            mailbox: None,
            ids: VoiceIdAllocator::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a control surface over a push-driven mixer: every call is
    /// enqueued on `mailbox` for the driver thread to apply between chunks.
    pub fn for_push(mixer: Arc<Mixer>, mailbox: Arc<Mailbox>) -> Self {
        Self {
            mixer,
            mailbox: Some(mailbox),
            ids: VoiceIdAllocator::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start playing `sample`. On the pull path this returns the real
    /// admission result synchronously (`Ok(None)` if the polyphony caps
    /// rejected it). On the push path admission happens later, on the
    /// driver thread, so this optimistically returns the allocated id and
    /// the caller may never see it actually sound if it was later rejected —
    /// that tradeoff is inherent to a non-blocking control path.
    pub fn play(&self, sample: Arc<dyn Sample>, repeat: bool) -> Result<Option<VoiceId>, MixerError> {
        let id = self.ids.next();
        match &self.mailbox {
            Some(mailbox) => {
                mailbox.try_push(Command::Play { id, sample, repeat })?;
                Ok(Some(id))
            }
            None => self.mixer.add(id, sample.as_ref(), repeat),
        }
    }

    pub fn stop(&self, target: StopTarget) -> Result<(), MixerError> {
        match &self.mailbox {
            Some(mailbox) => match target {
                StopTarget::Id(id) => mailbox.try_push(Command::StopId(id)),
                StopTarget::Name(name) => mailbox.try_push(Command::StopName(name)),
            },
            None => {
                match target {
                    StopTarget::Id(id) => self.mixer.stop(id),
                    StopTarget::Name(name) => {
                        self.mixer.stop_by_name(&name);
                    }
                }
                Ok(())
            }
        }
    }

    /// Stop every currently playing voice.
    pub fn silence(&self) -> Result<(), MixerError> {
        match &self.mailbox {
            Some(mailbox) => mailbox.try_push(Command::Silence),
            None => {
                self.mixer.clear_all();
                Ok(())
            }
        }
    }

    /// Override the per-name polyphony cap. Applied directly to the mixer
    /// regardless of driver path — it only touches a limits table, not the
    /// active-voice set the mailbox serializes access to.
    pub fn set_limit(&self, name: impl Into<String>, limit: usize) {
        self.mixer.set_limit(name, limit);
    }

    /// Idempotent shutdown. On the push path, enqueues `Command::Close` so
    /// the driver thread exits on its next iteration; on the pull path,
    /// silences the mixer (the `cpal` stream itself is owned and torn down
    /// separately by whoever created it).
    pub fn close(&self) -> Result<(), MixerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match &self.mailbox {
            Some(mailbox) => mailbox.try_push(Command::Close),
            None => {
                self.mixer.clear_all();
                Ok(())
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
