use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::MixerError;
use crate::geometry::SampleWidth;
use crate::mixer::Mixer;

/// Drives the mixer from `cpal`'s real-time output callback.
///
/// There is no mailbox on this path: the control surface calls `Mixer`
/// methods directly from whatever thread the caller is on, and the only
/// thing the audio callback itself does is call `next_chunk` and copy bytes
/// into the device buffer — the minimum necessary to stay inside cpal's
/// real-time constraints.
pub struct CpalPullDriver {
    _stream: cpal::Stream,
}

impl CpalPullDriver {
    /// Only 16-bit PCM geometries are supported on this path; other widths
    /// would need a per-width cpal sample type dispatch this crate does not
    /// currently carry.
    pub fn spawn(mixer: Arc<Mixer>) -> Result<Self, MixerError> {
        let geometry = mixer.geometry();
        if geometry.sample_width != SampleWidth::Sixteen {
            return Err(MixerError::Config(
                "cpal pull driver requires 16-bit PCM geometry".into(),
            ));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(MixerError::DriverUnavailable)?;

        tracing::debug!(device = %device.name().unwrap_or_default(), "opening cpal output device");

        let config = cpal::StreamConfig {
            channels: geometry.channels.count() as u16,
            sample_rate: cpal::SampleRate(geometry.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut leftover: Vec<i16> = Vec::new();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mut filled = 0;
                    while filled < data.len() {
                        if leftover.is_empty() {
                            match mixer.next_chunk() {
                                Ok(chunk) => leftover = bytes_to_i16(&chunk),
                                Err(e) => {
                                    // Fatal per the mixer's contract, but a
                                    // real-time callback has no thread to
                                    // tear down: surface the error and fall
                                    // back to silence for this callback
                                    // rather than leaving the device buffer
                                    // uninitialized.
                                    tracing::error!(error = %e, "mixer contract violation; emitting silence");
                                    for v in data[filled..].iter_mut() {
                                        *v = 0;
                                    }
                                    filled = data.len();
                                    break;
                                }
                            }
                        }
                        let take = leftover.len().min(data.len() - filled);
                        data[filled..filled + take].copy_from_slice(&leftover[..take]);
                        leftover.drain(..take);
                        filled += take;
                    }
                },
                |err| tracing::error!(error = %err, "cpal output stream error"),
                None,
            )
            .map_err(|e| MixerError::Driver(e.to_string()))?;

        stream.play().map_err(|e| MixerError::Driver(e.to_string()))?;

        Ok(Self { _stream: stream })
    }
}

fn bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}
