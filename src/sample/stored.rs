use std::sync::Arc;

use crate::error::MixerError;
use crate::geometry::{Channels, ChunkSize, FrameGeometry};
use crate::pcm;

use super::{ChunkSource, Sample, StopFlag};

/// A sample backed by an owned, frame-aligned PCM buffer.
///
/// Shared read-only between every playback (`Arc<[u8]>`); each playback owns
/// its own cursor via the `ChunkSource` it gets from `chunks()`.
pub struct StoredSample {
    name: String,
    geometry: FrameGeometry,
    buffer: Arc<[u8]>,
    duration: f64,
}

impl StoredSample {
    /// `source_channels` describes the channel count of `buffer` as handed
    /// in, before any mono->stereo promotion. The buffer must already match
    /// `geometry.sample_rate` / `sample_width`; this type performs no
    /// resampling or bit-depth conversion, only the mono->stereo duplication
    /// the spec calls for.
    pub fn new(
        name: impl Into<String>,
        geometry: FrameGeometry,
        source_channels: Channels,
        buffer: Vec<u8>,
    ) -> Result<Self, MixerError> {
        let per_channel_frame = geometry.sample_width.bytes() * source_channels.count();
        if per_channel_frame == 0 || buffer.len() % per_channel_frame != 0 {
            return Err(MixerError::Config(format!(
                "buffer length {} is not a multiple of the source frame size {per_channel_frame}",
                buffer.len()
            )));
        }

        let buffer = if source_channels == Channels::Mono && geometry.channels == Channels::Stereo {
            pcm::mono_to_stereo(&buffer, geometry.sample_width)
        } else if source_channels == geometry.channels {
            buffer
        } else {
            return Err(MixerError::Config(format!(
                "cannot adapt {source_channels:?} source to {:?} output",
                geometry.channels
            )));
        };

        geometry.validate_buffer_len(buffer.len())?;

        let frames = buffer.len() / geometry.frame_bytes();
        let duration = frames as f64 / geometry.sample_rate as f64;

        Ok(Self {
            name: name.into(),
            geometry,
            buffer: Arc::from(buffer),
            duration,
        })
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }

    /// Start building a concatenated sample (see [`StoredSampleBuilder`]).
    pub fn builder(name: impl Into<String>, geometry: FrameGeometry) -> StoredSampleBuilder {
        StoredSampleBuilder {
            name: name.into(),
            geometry,
            buffer: Vec::new(),
        }
    }
}

impl Sample for StoredSample {
    fn name(&self) -> &str {
        &self.name
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn chunks(&self, chunk_size: ChunkSize, repeat: bool, stop: StopFlag) -> Box<dyn ChunkSource> {
        if repeat {
            Box::new(RepeatingCursor::new(Arc::clone(&self.buffer), chunk_size, stop))
        } else {
            Box::new(OneShotCursor {
                buffer: Arc::clone(&self.buffer),
                chunk_bytes: chunk_size.bytes(),
                cursor: 0,
                stop,
            })
        }
    }
}

struct OneShotCursor {
    buffer: Arc<[u8]>,
    chunk_bytes: usize,
    cursor: usize,
    stop: StopFlag,
}

impl ChunkSource for OneShotCursor {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.stop.is_set() || self.cursor >= self.buffer.len() {
            return None;
        }
        let end = (self.cursor + self.chunk_bytes).min(self.buffer.len());
        let chunk = self.buffer[self.cursor..end].to_vec();
        self.cursor = end;
        Some(chunk)
    }
}

/// Wraps modulo the buffer length, reading out of a working copy tiled by
/// one extra `chunk_bytes` so that every `chunk_bytes`-length slice starting
/// anywhere in `[0, len)` is contiguous, including ones that wrap the end of
/// the original buffer.
struct RepeatingCursor {
    tiled: Arc<[u8]>,
    original_len: usize,
    chunk_bytes: usize,
    cursor: usize,
    stop: StopFlag,
}

impl RepeatingCursor {
    fn new(buffer: Arc<[u8]>, chunk_size: ChunkSize, stop: StopFlag) -> Self {
        let chunk_bytes = chunk_size.bytes();
        let original_len = buffer.len();
        let tiled = tile_with_overlap(&buffer, chunk_bytes);
        Self {
            tiled,
            original_len,
            chunk_bytes,
            cursor: 0,
            stop,
        }
    }
}

impl ChunkSource for RepeatingCursor {
    fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.stop.is_set() || self.original_len == 0 {
            return None;
        }
        let start = self.cursor % self.original_len;
        let chunk = self.tiled[start..start + self.chunk_bytes].to_vec();
        self.cursor = (self.cursor + self.chunk_bytes) % self.original_len;
        Some(chunk)
    }
}

fn tile_with_overlap(buffer: &[u8], chunk_bytes: usize) -> Arc<[u8]> {
    let len = buffer.len();
    if len == 0 {
        return Arc::from(Vec::new());
    }
    let needed = len + chunk_bytes;
    let mut out = Vec::with_capacity(needed);
    while out.len() < needed {
        out.extend_from_slice(buffer);
    }
    out.truncate(needed);
    Arc::from(out)
}

/// Renders a sequence of sources to completion and concatenates their raw
/// bytes into one owned buffer, used for multi-tone cues such as "extra
/// life" where several synthesized notes are joined into a single stored
/// sample up front.
pub struct StoredSampleBuilder {
    name: String,
    geometry: FrameGeometry,
    buffer: Vec<u8>,
}

impl StoredSampleBuilder {
    /// Render `sample` to completion (non-repeating) and append its bytes.
    pub fn join(mut self, sample: &dyn Sample, render_chunk_size: ChunkSize) -> Self {
        let mut source = sample.chunks(render_chunk_size, false, StopFlag::never());
        while let Some(chunk) = source.next_chunk() {
            self.buffer.extend_from_slice(&chunk);
        }
        self
    }

    pub fn build(self) -> Result<StoredSample, MixerError> {
        StoredSample::new(self.name, self.geometry, self.geometry.channels, self.buffer)
    }
}
