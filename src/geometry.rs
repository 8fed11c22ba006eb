use crate::error::MixerError;

/// Global PCM layout shared by every sample and the mixer's output.
///
/// Fixed for the process lifetime: construct once, thread the value through
/// the registry, mixer and drivers rather than reading it from globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub sample_rate: u32,
    pub sample_width: SampleWidth,
    pub channels: Channels,
}

impl FrameGeometry {
    pub fn new(sample_rate: u32, sample_width: SampleWidth, channels: Channels) -> Self {
        Self {
            sample_rate,
            sample_width,
            channels,
        }
    }

    /// CD-quality default: 44.1 kHz, 16-bit signed, stereo.
    pub const fn cd_quality() -> Self {
        Self {
            sample_rate: 44_100,
            sample_width: SampleWidth::Sixteen,
            channels: Channels::Stereo,
        }
    }

    /// Bytes per frame (one time-coincident sample per channel).
    pub fn frame_bytes(&self) -> usize {
        self.sample_width.bytes() * self.channels.count()
    }

    /// Validate that `len` is a whole number of frames under this geometry.
    pub fn validate_buffer_len(&self, len: usize) -> Result<(), MixerError> {
        let frame_bytes = self.frame_bytes();
        if frame_bytes == 0 || len % frame_bytes != 0 {
            return Err(MixerError::Config(format!(
                "buffer length {len} is not a multiple of the frame size {frame_bytes}"
            )));
        }
        Ok(())
    }
}

/// Bytes per channel per frame. Only these four widths are representable as
/// signed little-endian PCM in common audio device APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleWidth {
    Eight = 1,
    Sixteen = 2,
    TwentyFour = 3,
    ThirtyTwo = 4,
}

impl SampleWidth {
    pub const fn bytes(self) -> usize {
        self as usize
    }

    /// Inclusive signed range representable at this width.
    pub const fn signed_range(self) -> (i64, i64) {
        let bits = self.bytes() as u32 * 8;
        let max = (1i64 << (bits - 1)) - 1;
        let min = -(1i64 << (bits - 1));
        (min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Mono = 1,
    Stereo = 2,
}

impl Channels {
    pub const fn count(self) -> usize {
        self as usize
    }
}

/// A driver-chosen chunk size, validated to be a positive multiple of the frame size.
///
/// Every chunk flowing between a sample, the mixer, and a driver is exactly
/// `bytes()` long, except optionally the final chunk of a one-shot source
/// (padded to this size by the mixer, never by the source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSize(usize);

impl ChunkSize {
    pub fn new(geometry: FrameGeometry, bytes: usize) -> Result<Self, MixerError> {
        let frame_bytes = geometry.frame_bytes();
        if bytes == 0 || bytes % frame_bytes != 0 {
            return Err(MixerError::Config(format!(
                "chunk size {bytes} is not a positive multiple of the frame size {frame_bytes}"
            )));
        }
        Ok(Self(bytes))
    }

    /// A chunk size of approximately `duration_ms` milliseconds under the given geometry.
    pub fn from_duration_ms(geometry: FrameGeometry, duration_ms: u32) -> Result<Self, MixerError> {
        let frames = (geometry.sample_rate as u64 * duration_ms as u64) / 1000;
        let bytes = frames as usize * geometry.frame_bytes();
        Self::new(geometry, bytes.max(geometry.frame_bytes()))
    }

    pub fn bytes(self) -> usize {
        self.0
    }
}
