use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::MixerError;
use crate::mixer::Mixer;

use super::mailbox::{Command, Mailbox};

/// Destination for rendered PCM chunks on the push driver path. Unlike
/// `cpal`'s pull callback, the push driver owns the thread that produces
/// chunks and is responsible for handing each one to a sink, blocking as
/// long as the sink needs.
pub trait BlockingAudioSink: Send {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), MixerError>;
}

/// Discards every chunk. Useful for headless tests and for "mixing runs but
/// nothing audible is wired up yet" bring-up.
pub struct NullSink;

impl BlockingAudioSink for NullSink {
    fn write_chunk(&mut self, _chunk: &[u8]) -> Result<(), MixerError> {
        Ok(())
    }
}

/// Writes every chunk to an arbitrary [`std::io::Write`] — a file, a pipe,
/// or (in tests) an in-memory buffer, so mixer output can be inspected
/// without a real audio device.
pub struct WriteSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> WriteSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> BlockingAudioSink for WriteSink<W> {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), MixerError> {
        self.writer
            .write_all(chunk)
            .map_err(|e| MixerError::Driver(e.to_string()))
    }
}

struct Inner {
    handle: Option<JoinHandle<()>>,
}

/// Drives the mixer from a dedicated thread: drain the mailbox, apply any
/// pending commands, pull one chunk, write it to the sink, repeat. Exits
/// cleanly on `Command::Close` or when told to stop, and joins its thread on
/// `Drop` so no driver outlives its mixer.
pub struct PushDriver {
    mixer: Arc<Mixer>,
    mailbox: Arc<Mailbox>,
    stop_flag: Arc<AtomicBool>,
    inner: Mutex<Inner>,
}

impl PushDriver {
    pub fn spawn<S>(mixer: Arc<Mixer>, mailbox: Arc<Mailbox>, mut sink: S) -> Self
    where
        S: BlockingAudioSink + 'static,
    {
        let stop_flag = Arc::new(AtomicBool::new(false));

        let handle = {
            let mixer = Arc::clone(&mixer);
            let mailbox = Arc::clone(&mailbox);
            let stop = Arc::clone(&stop_flag);
            thread::spawn(move || loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }

                let mut closing = false;
                for command in mailbox.drain() {
                    match command {
                        Command::Play { id, sample, repeat } => {
                            if let Err(e) = mixer.add(id, sample.as_ref(), repeat) {
                                tracing::error!(error = %e, "failed to admit voice");
                            }
                        }
                        Command::StopId(id) => mixer.stop(id),
                        Command::StopName(name) => {
                            mixer.stop_by_name(&name);
                        }
                        Command::Silence => mixer.clear_all(),
                        Command::Close => closing = true,
                    }
                }

                if closing {
                    break;
                }

                let chunk = match mixer.next_chunk() {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        tracing::error!(error = %e, "mixer contract violation, stopping push driver");
                        break;
                    }
                };
                if let Err(e) = sink.write_chunk(&chunk) {
                    tracing::error!(error = %e, "push driver sink failed, stopping");
                    break;
                }
            })
        };

        Self {
            mixer,
            mailbox,
            stop_flag,
            inner: Mutex::new(Inner { handle: Some(handle) }),
        }
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Stop the driver thread and join it. Idempotent.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        if let Some(handle) = inner.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PushDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Channels, ChunkSize, FrameGeometry, SampleWidth};
    use crate::mixer::{MixerLimits, VoiceIdAllocator};
    use crate::sample::StoredSample;
    use std::sync::Mutex as StdMutex;

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(44_100, SampleWidth::Sixteen, Channels::Stereo)
    }

    struct CountingSink {
        chunks: Arc<StdMutex<usize>>,
    }

    impl BlockingAudioSink for CountingSink {
        fn write_chunk(&mut self, _chunk: &[u8]) -> Result<(), MixerError> {
            *self.chunks.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn play_command_is_applied_and_chunks_flow_until_close() {
        let chunk_size = ChunkSize::new(geometry(), 16).unwrap();
        let mixer = Arc::new(Mixer::new(geometry(), chunk_size, MixerLimits::default()));
        let mailbox = Arc::new(Mailbox::new(Mailbox::DEFAULT_CAPACITY));
        let count = Arc::new(StdMutex::new(0));
        let sink = CountingSink { chunks: Arc::clone(&count) };

        let sample: Arc<dyn crate::sample::Sample> =
            Arc::new(StoredSample::new("boom", geometry(), Channels::Stereo, vec![0u8; 4096]).unwrap());

        let ids = VoiceIdAllocator::new();
        let driver = PushDriver::spawn(Arc::clone(&mixer), Arc::clone(&mailbox), sink);
        mailbox
            .try_push(Command::Play { id: ids.next(), sample, repeat: false })
            .unwrap();

        // give the driver thread a few iterations to drain the mailbox and mix
        std::thread::sleep(std::time::Duration::from_millis(50));
        mailbox.try_push(Command::Close).unwrap();
        driver.stop();

        assert!(*count.lock().unwrap() > 0);
    }
}
