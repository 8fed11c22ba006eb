//! Admits a handful of voices through the push driver and writes the mixed
//! PCM to stdout, demonstrating the public control surface end to end
//! without requiring a real audio device.

use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use voxmix::{
    Channels, Control, FrameGeometry, Mixer, MixerLimits, NoteProducer, PushDriver, SampleDescriptor,
    SampleRegistry, StoredSample, WriteSink,
};

fn square_wave(frequency: f32, sample_rate: u32, seconds: f32) -> Box<dyn Iterator<Item = f32> + Send> {
    let frames = (sample_rate as f32 * seconds) as usize;
    let period = (sample_rate as f32 / frequency) as usize;
    Box::new((0..frames).map(move |i| if (i % period.max(1)) < period / 2 { 0.4 } else { -0.4 }))
}

/// Stochastic repeating pattern: each note picks a fresh random frequency in
/// a fixed band, grounded in the reference game's ambient loops (amoeba,
/// magic wall) where every cycle differs slightly but never stops.
fn random_tone_factory() -> voxmix::NoteFactory {
    Arc::new(|_index| {
        let frequency = rand::thread_rng().gen_range(180.0..260.0);
        Some(NoteProducer::Mono(square_wave(frequency, 44_100, 0.3)))
    })
}

fn main() {
    tracing_subscriber::fmt::init();

    let geometry = FrameGeometry::cd_quality();
    let chunk_size = voxmix::ChunkSize::from_duration_ms(geometry, 20).unwrap();
    let mixer = Arc::new(Mixer::new(geometry, chunk_size, MixerLimits::default()));

    let boom = Arc::new(
        StoredSample::new("boom", geometry, Channels::Stereo, vec![0i16; 2205 * 2]
            .into_iter()
            .flat_map(i16::to_le_bytes)
            .collect())
        .unwrap(),
    );

    let amoeba = Arc::new(voxmix::GeneratorSample::new(
        "amoeba",
        geometry,
        0.0,
        random_tone_factory(),
    ));

    let descriptors = vec![
        SampleDescriptor::new(boom),
        SampleDescriptor::new(amoeba).with_limit(1),
    ];
    let registry = SampleRegistry::init(descriptors, &mixer);

    let mailbox = Arc::new(voxmix::Mailbox::new(voxmix::Mailbox::DEFAULT_CAPACITY));
    let control = Control::for_push(Arc::clone(&mixer), Arc::clone(&mailbox));
    let driver = PushDriver::spawn(Arc::clone(&mixer), Arc::clone(&mailbox), WriteSink::new(stdout()));

    registry.play(&control, "amoeba", true).unwrap();
    registry.play(&control, "boom", false).unwrap();

    std::thread::sleep(Duration::from_millis(200));
    control.silence().unwrap();
    control.close().unwrap();
    driver.stop();
}
