use crate::sample::ChunkSource;

/// Handle to a playback, assigned by the caller (not the mixer) before
/// admission is attempted. This lets a command-queue driven caller hand out
/// an id synchronously even though the actual admit/reject decision happens
/// later on the driver thread. See [`super::VoiceIdAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub(super) u64);

pub(super) struct VoiceEntry {
    pub name: String,
    pub source: Box<dyn ChunkSource>,
}

/// Monotonic, thread-safe source of fresh [`VoiceId`]s, shared by every
/// caller of `Mixer::add` (both the synchronous pull path and the mailbox
/// feeding a push driver) so ids never collide regardless of which thread
/// allocates them.
#[derive(Clone, Default)]
pub struct VoiceIdAllocator(std::sync::Arc<std::sync::atomic::AtomicU64>);

impl VoiceIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> VoiceId {
        VoiceId(self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }
}
