mod generator;
mod stored;

pub use generator::{GeneratorSample, NoteFactory, NoteProducer};
pub use stored::{StoredSample, StoredSampleBuilder};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::geometry::ChunkSize;

/// A source-side sound: stored PCM, a lazily-synthesized generator, or a
/// concatenation of either (concatenation is just a [`StoredSample`] built
/// from rendered pieces, see [`StoredSample::join`]).
///
/// The mixer never distinguishes between variants; it only calls `chunks`.
pub trait Sample: Send + Sync {
    /// Non-unique label used for per-name limits and name-based stop.
    fn name(&self) -> &str;

    /// Informational length in seconds.
    fn duration(&self) -> f64;

    /// Construct a fresh, independent chunk sequence for one playback.
    ///
    /// `repeat = false` yields a finite sequence ending at end-of-sample;
    /// `repeat = true` yields an unbounded sequence. Either terminates early
    /// once `stop.is_set()` is true on entry to a step.
    fn chunks(&self, chunk_size: ChunkSize, repeat: bool, stop: StopFlag) -> Box<dyn ChunkSource>;
}

/// One playback's lazy chunk iterator. Each chunk is at most `chunk_size`
/// bytes; the mixer pads short chunks and rejects overlong ones.
pub trait ChunkSource: Send {
    /// Produce the next chunk, or `None` once the source is exhausted.
    fn next_chunk(&mut self) -> Option<Vec<u8>>;
}

/// A cheaply-cloned cooperative cancellation flag threaded into a playback's
/// `chunks()` call. The mixer always admits voices with a flag that is never
/// set (it removes voices explicitly instead); the flag exists so a sample's
/// own iterator logic can honor an external stop condition when driven
/// outside the mixer (e.g. in tests or a standalone player).
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// A flag that is permanently unset; used by the mixer, which removes
    /// voices by dropping their iterator rather than by signalling it.
    pub fn never() -> Self {
        Self::new()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
