//! Exercises the public `Control`/`PushDriver` API over the `NullSink` and
//! an in-memory `WriteSink`, the headless path the crate's test tooling
//! relies on for CI.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use voxmix::{
    BlockingAudioSink, Channels, ChunkSize, Control, FrameGeometry, Mailbox, Mixer, MixerError,
    MixerLimits, NullSink, PushDriver, SampleWidth, StopTarget, StoredSample, WriteSink,
};

fn geometry() -> FrameGeometry {
    FrameGeometry::new(44_100, SampleWidth::Sixteen, Channels::Stereo)
}

fn mixer() -> Arc<Mixer> {
    let chunk = ChunkSize::new(geometry(), 16).unwrap();
    Arc::new(Mixer::new(geometry(), chunk, MixerLimits::default()))
}

fn tone(name: &str) -> Arc<dyn voxmix::Sample> {
    Arc::new(StoredSample::new(name, geometry(), Channels::Stereo, vec![0u8; 4096]).unwrap())
}

#[test]
fn control_over_null_sink_reaches_close_cleanly() {
    let mixer = mixer();
    let mailbox = Arc::new(Mailbox::new(Mailbox::DEFAULT_CAPACITY));
    let control = Control::for_push(Arc::clone(&mixer), Arc::clone(&mailbox));
    let driver = PushDriver::spawn(Arc::clone(&mixer), Arc::clone(&mailbox), NullSink);

    let id = control.play(tone("boom"), false).unwrap().unwrap();
    control.stop(StopTarget::Id(id)).unwrap();
    control.silence().unwrap();
    control.close().unwrap();
    control.close().unwrap(); // idempotent

    driver.stop();
    assert!(control.is_closed());
}

struct SharedWriter(Arc<Mutex<Cursor<Vec<u8>>>>);

impl std::io::Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::Write::write(&mut *self.0.lock().unwrap(), buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        std::io::Write::flush(&mut *self.0.lock().unwrap())
    }
}

#[test]
fn write_sink_receives_mixed_chunks() {
    let mixer = mixer();
    let mailbox = Arc::new(Mailbox::new(Mailbox::DEFAULT_CAPACITY));
    let control = Control::for_push(Arc::clone(&mixer), Arc::clone(&mailbox));

    let backing = Arc::new(Mutex::new(Cursor::new(Vec::new())));
    let sink = WriteSink::new(SharedWriter(Arc::clone(&backing)));
    let driver = PushDriver::spawn(Arc::clone(&mixer), Arc::clone(&mailbox), sink);

    control.play(tone("boom"), false).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    control.close().unwrap();
    driver.stop();

    let written = backing.lock().unwrap().get_ref().len();
    assert!(written > 0);
    assert_eq!(written % 16, 0); // always whole chunks
}

#[test]
fn mailbox_overflow_is_reported_and_command_dropped() {
    let mailbox = Mailbox::new(1);
    mailbox.try_push(voxmix::Command::Silence).unwrap();
    let result = mailbox.try_push(voxmix::Command::Silence);
    assert!(matches!(result, Err(MixerError::MailboxOverflow)));
}
