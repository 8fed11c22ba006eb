use std::sync::Arc;

use crate::control::{Control, StopTarget};
use crate::driver::{CpalPullDriver, Mailbox, NullSink, PushDriver};
use crate::error::MixerError;
use crate::geometry::{ChunkSize, FrameGeometry};
use crate::mixer::{Mixer, MixerLimits, VoiceId};
use crate::registry::{SampleDescriptor, SampleRegistry};

/// Driver backends `init` will try, in order; the first that constructs
/// successfully wins.
pub enum DriverPreference {
    /// `cpal`'s default output device, driven by its real-time callback.
    Pull,
    /// A push-driver thread discarding its output (`NullSink`). Always
    /// succeeds; callers that want a real device-backed push driver should
    /// construct [`PushDriver`] directly with their own sink instead of
    /// going through `init`.
    Dummy,
}

enum DriverHandle {
    Pull(CpalPullDriver),
    Push(PushDriver),
}

/// The top-level process handle: owns the mixer, the sample registry, and
/// whichever driver `init` managed to start. Dropping it tears the driver
/// down (see [`PushDriver`]'s `Drop`); `shutdown` does so explicitly and
/// idempotently via the same path as [`Control::close`].
pub struct Handle {
    control: Control,
    registry: SampleRegistry,
    _driver: DriverHandle,
}

/// Construct the mixer, populate the registry, and bring up the first
/// working driver from `driver_preference`. Fails with
/// [`MixerError::DriverUnavailable`] only if every preference entry fails —
/// include [`DriverPreference::Dummy`] last to guarantee success.
pub fn init(
    descriptors: Vec<SampleDescriptor>,
    geometry: FrameGeometry,
    chunk_size: ChunkSize,
    limits: MixerLimits,
    driver_preference: &[DriverPreference],
) -> Result<Handle, MixerError> {
    let mixer = Arc::new(Mixer::new(geometry, chunk_size, limits));
    let registry = SampleRegistry::init(descriptors, &mixer);

    for preference in driver_preference {
        match preference {
            DriverPreference::Pull => match CpalPullDriver::spawn(Arc::clone(&mixer)) {
                Ok(driver) => {
                    tracing::debug!("started cpal pull driver");
                    let control = Control::for_pull(Arc::clone(&mixer));
                    return Ok(Handle {
                        control,
                        registry,
                        _driver: DriverHandle::Pull(driver),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cpal pull driver unavailable, trying next preference");
                }
            },
            DriverPreference::Dummy => {
                let mailbox = Arc::new(Mailbox::new(Mailbox::DEFAULT_CAPACITY));
                let driver = PushDriver::spawn(Arc::clone(&mixer), Arc::clone(&mailbox), NullSink);
                tracing::debug!("started dummy (discard) push driver");
                let control = Control::for_push(Arc::clone(&mixer), mailbox);
                return Ok(Handle {
                    control,
                    registry,
                    _driver: DriverHandle::Push(driver),
                });
            }
        }
    }

    Err(MixerError::DriverUnavailable)
}

impl Handle {
    pub fn play_sample(&self, name: &str, repeat: bool) -> Result<Option<VoiceId>, MixerError> {
        self.registry.play(&self.control, name, repeat)
    }

    pub fn stop(&self, target: StopTarget) -> Result<(), MixerError> {
        self.control.stop(target)
    }

    pub fn silence(&self) -> Result<(), MixerError> {
        self.control.silence()
    }

    pub fn set_sample_limit(&self, name: impl Into<String>, limit: usize) {
        self.control.set_limit(name, limit);
    }

    pub fn shutdown(&self) -> Result<(), MixerError> {
        self.control.close()
    }

    pub fn registry(&self) -> &SampleRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Channels, SampleWidth};
    use crate::sample::StoredSample;

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(44_100, SampleWidth::Sixteen, Channels::Stereo)
    }

    #[test]
    fn dummy_preference_always_succeeds_and_plays() {
        let chunk_size = ChunkSize::new(geometry(), 16).unwrap();
        let sample = Arc::new(StoredSample::new("boom", geometry(), Channels::Stereo, vec![0u8; 64]).unwrap());
        let descriptors = vec![SampleDescriptor::new(sample)];
        let handle = init(
            descriptors,
            geometry(),
            chunk_size,
            MixerLimits::default(),
            &[DriverPreference::Dummy],
        )
        .unwrap();

        assert!(handle.play_sample("boom", false).unwrap().is_some());
        assert!(matches!(
            handle.play_sample("missing", false),
            Err(MixerError::Config(_))
        ));
        handle.shutdown().unwrap();
        handle.shutdown().unwrap(); // idempotent
    }
}
