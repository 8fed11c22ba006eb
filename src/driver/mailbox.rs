use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::MixerError;
use crate::mixer::VoiceId;
use crate::sample::Sample;
use std::sync::Arc;

/// A control-surface request destined for the mixer, carried through the
/// [`Mailbox`] to a push driver thread.
pub enum Command {
    Play {
        id: VoiceId,
        sample: Arc<dyn Sample>,
        repeat: bool,
    },
    StopId(VoiceId),
    StopName(String),
    Silence,
    Close,
}

struct Inner {
    queue: VecDeque<Command>,
    capacity: usize,
}

/// Bounded FIFO of pending [`Command`]s.
///
/// Unlike a blocking producer/consumer queue, `push` never blocks: a full
/// mailbox rejects the new command with [`MixerError::MailboxOverflow`]
/// rather than stalling the caller (which may be a real-time-adjacent
/// control thread). The push driver drains the whole backlog between
/// chunks with [`Mailbox::drain`].
pub struct Mailbox {
    inner: Mutex<Inner>,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// Default capacity used when none is configured explicitly.
    pub const DEFAULT_CAPACITY: usize = 100;

    pub fn try_push(&self, command: Command) -> Result<(), MixerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.queue.len() >= inner.capacity {
            tracing::warn!(capacity = inner.capacity, "mailbox full, dropping command");
            return Err(MixerError::MailboxOverflow);
        }
        inner.queue.push_back(command);
        Ok(())
    }

    /// Remove and return every currently-queued command, oldest first.
    pub fn drain(&self) -> Vec<Command> {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
