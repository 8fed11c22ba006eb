use std::sync::Arc;

use crate::geometry::{Channels, ChunkSize, FrameGeometry};
use crate::pcm;

use super::{ChunkSource, Sample, StopFlag};

/// One note's frame-level producer, already enveloped by the caller.
///
/// `Mono` is tee'd to both output channels (duplicated). `Stereo` supplies
/// independent left/right values per frame directly — used by sequenced
/// samples that pan two oscillators to separate channels (e.g. the
/// reference game's two-voice title theme).
pub enum NoteProducer {
    Mono(Box<dyn Iterator<Item = f32> + Send>),
    Stereo(Box<dyn Iterator<Item = (f32, f32)> + Send>),
}

/// Produces the `index`-th note's producer, or `None` once a finite sequence
/// is exhausted. Infinite/stochastic samples (e.g. ambient loops) ignore
/// `index` and always return `Some`; one-shot samples return `Some` only for
/// `index == 0`.
pub type NoteFactory = Arc<dyn Fn(usize) -> Option<NoteProducer> + Send + Sync>;

/// A sample synthesized lazily from an upstream note producer rather than
/// backed by a stored buffer. The crate is deliberately agnostic to how
/// notes are synthesized (oscillators/envelopes/filters are out of scope);
/// it only consumes whatever `NoteFactory` the caller supplies.
pub struct GeneratorSample {
    name: String,
    geometry: FrameGeometry,
    duration: f64,
    factory: NoteFactory,
}

impl GeneratorSample {
    pub fn new(
        name: impl Into<String>,
        geometry: FrameGeometry,
        duration: f64,
        factory: NoteFactory,
    ) -> Self {
        Self {
            name: name.into(),
            geometry,
            duration,
            factory,
        }
    }
}

impl Sample for GeneratorSample {
    fn name(&self) -> &str {
        &self.name
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn chunks(&self, chunk_size: ChunkSize, repeat: bool, stop: StopFlag) -> Box<dyn ChunkSource> {
        Box::new(GeneratorCursor {
            factory: Arc::clone(&self.factory),
            geometry: self.geometry,
            chunk_bytes: chunk_size.bytes(),
            repeat,
            stop,
            note_index: 0,
            current: None,
            pending: Vec::new(),
            finished: false,
        })
    }
}

struct GeneratorCursor {
    factory: NoteFactory,
    geometry: FrameGeometry,
    chunk_bytes: usize,
    repeat: bool,
    stop: StopFlag,
    note_index: usize,
    current: Option<NoteProducer>,
    /// Bytes synthesized but not yet handed out as a full chunk.
    pending: Vec<u8>,
    finished: bool,
}

impl GeneratorCursor {
    fn push_frame(&mut self, left: f32, right: f32) {
        let width = self.geometry.sample_width;
        match self.geometry.channels {
            Channels::Mono => pcm::push_scaled_sample(&mut self.pending, left, width),
            Channels::Stereo => {
                pcm::push_scaled_sample(&mut self.pending, left, width);
                pcm::push_scaled_sample(&mut self.pending, right, width);
            }
        }
    }

    /// Pulls one frame from the current producer. Returns `false` once that
    /// producer is exhausted.
    fn pull_one_frame(&mut self) -> bool {
        match self.current.as_mut() {
            Some(NoteProducer::Mono(it)) => match it.next() {
                Some(v) => {
                    self.push_frame(v, v);
                    true
                }
                None => false,
            },
            Some(NoteProducer::Stereo(it)) => match it.next() {
                Some((l, r)) => {
                    self.push_frame(l, r);
                    true
                }
                None => false,
            },
            None => false,
        }
    }
}

impl ChunkSource for GeneratorCursor {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.finished {
            return None;
        }
        loop {
            if self.stop.is_set() {
                self.finished = true;
                return if self.pending.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.pending))
                };
            }

            if self.current.is_none() {
                match (self.factory)(self.note_index) {
                    Some(producer) => {
                        self.current = Some(producer);
                        self.note_index += 1;
                    }
                    None if self.repeat => {
                        self.note_index = 0;
                        continue;
                    }
                    None => {
                        self.finished = true;
                        return if self.pending.is_empty() {
                            None
                        } else {
                            Some(std::mem::take(&mut self.pending))
                        };
                    }
                }
            }

            while self.pending.len() < self.chunk_bytes {
                if !self.pull_one_frame() {
                    self.current = None;
                    break;
                }
            }

            if self.pending.len() >= self.chunk_bytes {
                let rest = self.pending.split_off(self.chunk_bytes);
                let chunk = std::mem::replace(&mut self.pending, rest);
                return Some(chunk);
            }
            // current note exhausted with a short pending buffer: loop back
            // around to fetch the next note (or end) without emitting a
            // short chunk mid-sequence.
        }
    }
}
