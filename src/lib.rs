/*!
    Real-time polyphonic PCM audio mixer

    Admits named sound sources — stored PCM buffers or lazily-synthesized
    generators — as independent voices, mixes them into a single interleaved
    PCM stream under per-name and global polyphony caps, and hands the
    result to either a `cpal` pull callback or a dedicated push-driver
    thread. The mixer itself is agnostic to where samples come from and
    where rendered audio goes; both are pluggable boundaries.

    Typical usage:

    ```no_run
    use std::sync::Arc;
    use voxmix::{Control, FrameGeometry, Mixer, MixerLimits, SampleRegistry, StoredSample};

    let geometry = FrameGeometry::cd_quality();
    let chunk_size = voxmix::ChunkSize::from_duration_ms(geometry, 20).unwrap();
    let mixer = Arc::new(Mixer::new(geometry, chunk_size, MixerLimits::default()));
    let control = Control::for_pull(Arc::clone(&mixer));

    let boom = Arc::new(
        StoredSample::new("boom", geometry, voxmix::Channels::Stereo, vec![0u8; 4096]).unwrap(),
    );
    control.play(boom, false).unwrap();
    ```
*/

mod control;
mod driver;
mod error;
mod geometry;
mod handle;
mod mixer;
mod pcm;
mod registry;
mod sample;

pub use control::{Control, StopTarget};
pub use driver::{BlockingAudioSink, Command, CpalPullDriver, Mailbox, NullSink, PushDriver, WriteSink};
pub use error::{MixerError, Result};
pub use geometry::{Channels, ChunkSize, FrameGeometry, SampleWidth};
pub use handle::{init, DriverPreference, Handle};
pub use mixer::{Mixer, MixerLimits, VoiceId, VoiceIdAllocator};
pub use registry::{SampleDescriptor, SampleRegistry};
pub use sample::{
    ChunkSource, GeneratorSample, NoteFactory, NoteProducer, Sample, StopFlag, StoredSample,
    StoredSampleBuilder,
};
