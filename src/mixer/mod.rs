mod voice;

pub use voice::{VoiceId, VoiceIdAllocator};
use voice::VoiceEntry;

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::error::MixerError;
use crate::geometry::{ChunkSize, FrameGeometry};
use crate::pcm;
use crate::sample::{Sample, StopFlag};

/// Per-name and global polyphony caps, matching the reference game's
/// defaults: at most 4 concurrent voices per sample name, at most 8
/// concurrent voices in total. A repeating (looping) voice is exclusive
/// regardless of these caps — only one repeating voice per name may be
/// admitted at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerLimits {
    pub per_name_default: usize,
    pub global: usize,
}

impl Default for MixerLimits {
    fn default() -> Self {
        Self {
            per_name_default: 4,
            global: 8,
        }
    }
}

struct MixerState {
    voices: HashMap<VoiceId, VoiceEntry>,
    per_name_count: HashMap<String, usize>,
    per_name_limit: HashMap<String, usize>,
    /// ids drained out of `voices` for the `next_chunk` mix window
    /// currently in flight, mapped to their name. `voices` is empty for
    /// these ids while they're out being mixed with the lock released, so
    /// a concurrent `stop`/`stop_by_name` consults this map instead to
    /// find them.
    in_flight: HashMap<VoiceId, String>,
    /// in-flight ids that were stopped while out being mixed. Honored by
    /// `next_chunk` when it reconciles survivors: a tombstoned id is
    /// dropped instead of resurrected.
    tombstones: HashSet<VoiceId>,
    /// Bumped by `clear_all`. If this changes between when `next_chunk`
    /// snapshots the voice map and when it reconciles, a concurrent
    /// silence happened mid-mix and the entire snapshot is discarded
    /// rather than partially resurrected.
    epoch: u64,
}

impl MixerState {
    fn global_count(&self) -> usize {
        self.per_name_count.values().sum()
    }

    fn limit_for(&self, name: &str, default_limit: usize) -> usize {
        self.per_name_limit.get(name).copied().unwrap_or(default_limit)
    }
}

/// The real-time mixing core: admits/removes voices under a single lock,
/// and renders mixed PCM chunks with the lock released.
///
/// Every public method is safe to call from any thread; `next_chunk` is the
/// one expected to run on (or be called from) the audio thread.
pub struct Mixer {
    geometry: FrameGeometry,
    chunk_size: ChunkSize,
    limits: MixerLimits,
    state: Mutex<MixerState>,
}

impl Mixer {
    pub fn new(geometry: FrameGeometry, chunk_size: ChunkSize, limits: MixerLimits) -> Self {
        Self {
            geometry,
            chunk_size,
            limits,
            state: Mutex::new(MixerState {
                voices: HashMap::new(),
                per_name_count: HashMap::new(),
                per_name_limit: HashMap::new(),
                in_flight: HashMap::new(),
                tombstones: HashSet::new(),
                epoch: 0,
            }),
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn chunk_size(&self) -> ChunkSize {
        self.chunk_size
    }

    /// Override the per-name polyphony cap for `name`. Takes effect on the
    /// next admission attempt; does not affect already-admitted voices.
    pub fn set_limit(&self, name: impl Into<String>, limit: usize) {
        let mut state = self.state.lock();
        state.per_name_limit.insert(name.into(), limit);
    }

    /// Attempt to admit a new playback of `sample` under the caller-supplied
    /// `id` (see [`VoiceIdAllocator`] — ids are allocated by the caller, not
    /// the mixer, so a command-queue driven caller can hand one out before
    /// the admission decision is actually made).
    ///
    /// Returns `Ok(None)` when the polyphony caps reject admission — this is
    /// an expected, routine outcome, not an error. Returns `Ok(Some(id))`
    /// (always the same `id` passed in) on success.
    pub fn add(&self, id: VoiceId, sample: &dyn Sample, repeat: bool) -> Result<Option<VoiceId>, MixerError> {
        let name = sample.name().to_string();
        let mut state = self.state.lock();

        let count = state.per_name_count.get(&name).copied().unwrap_or(0);
        if repeat && count >= 1 {
            tracing::warn!(sample = %name, "admission rejected: repeating voice already active");
            return Ok(None);
        }
        let limit = state.limit_for(&name, self.limits.per_name_default);
        if count >= limit {
            tracing::warn!(sample = %name, count, limit, "admission rejected: per-name cap reached");
            return Ok(None);
        }
        if state.global_count() >= self.limits.global {
            tracing::warn!(sample = %name, "admission rejected: global polyphony cap reached");
            return Ok(None);
        }

        let source = sample.chunks(self.chunk_size, repeat, StopFlag::never());
        state.voices.insert(id, VoiceEntry { name: name.clone(), source });
        *state.per_name_count.entry(name.clone()).or_insert(0) += 1;
        tracing::debug!(sample = %name, voice = id.0, "voice admitted");
        Ok(Some(id))
    }

    /// Stop a single voice by id. Idempotent: stopping an id that is not
    /// (or no longer) active is a no-op, not an error.
    ///
    /// If `id` is currently out of `voices` because a `next_chunk` mix
    /// window is in flight, it is tombstoned instead: `next_chunk`'s
    /// reconciliation step drops it rather than resurrecting it, so the
    /// stop is never lost to that race.
    pub fn stop(&self, id: VoiceId) {
        let mut state = self.state.lock();
        if let Some(entry) = state.voices.remove(&id) {
            Self::decrement_by(&mut state.per_name_count, &entry.name, 1);
        } else if state.in_flight.contains_key(&id) {
            state.tombstones.insert(id);
        }
    }

    /// Stop every voice currently playing `name`. Returns the number of
    /// voices removed, including any in-flight ones tombstoned for a
    /// pending `next_chunk` reconciliation (see [`Self::stop`]).
    pub fn stop_by_name(&self, name: &str) -> usize {
        let mut state = self.state.lock();
        let resident: Vec<VoiceId> = state
            .voices
            .iter()
            .filter(|(_, v)| v.name == name)
            .map(|(id, _)| *id)
            .collect();
        for id in &resident {
            state.voices.remove(id);
        }
        let in_flight: Vec<VoiceId> = state
            .in_flight
            .iter()
            .filter(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
            .collect();
        for id in &in_flight {
            state.tombstones.insert(*id);
        }
        if !resident.is_empty() {
            Self::decrement_by(&mut state.per_name_count, name, resident.len());
        }
        resident.len() + in_flight.len()
    }

    /// Stop every active voice, including any currently out being mixed.
    ///
    /// Bumps `epoch` so an in-flight `next_chunk` discards its whole
    /// snapshot on reconciliation instead of resurrecting voices that were
    /// just silenced.
    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        state.voices.clear();
        state.per_name_count.clear();
        state.epoch = state.epoch.wrapping_add(1);
    }

    /// Number of currently active voices playing `name`.
    pub fn count_for(&self, name: &str) -> usize {
        self.state.lock().per_name_count.get(name).copied().unwrap_or(0)
    }

    /// Total currently active voices.
    pub fn active_count(&self) -> usize {
        self.state.lock().voices.len()
    }

    fn decrement_by(counts: &mut HashMap<String, usize>, name: &str, n: usize) {
        if let Some(c) = counts.get_mut(name) {
            *c = c.saturating_sub(n);
        }
    }

    /// Render exactly one `chunk_size`-byte frame of mixed PCM.
    ///
    /// Voices are taken out of the map, mixed without holding the lock, then
    /// reconciled back in under a second, short critical section. Because
    /// the lock is released during the mix, a concurrent `stop` /
    /// `stop_by_name` / `clear_all` can't find the affected voices in
    /// `voices` — they record tombstones (or, for `clear_all`, bump
    /// `epoch`) instead, and this reconciliation is what actually honors
    /// them: a tombstoned survivor is dropped rather than resurrected, and
    /// if `epoch` moved since the snapshot was taken the whole snapshot is
    /// discarded, so a concurrent stop or silence is never lost to the race.
    ///
    /// A voice whose source yields more than `chunk_size` bytes is a fatal
    /// contract violation: the offending voice is dropped and `Err` is
    /// returned so the caller (a driver) can act on it — surfacing an
    /// internal error and, per the driver's discretion, terminating.
    pub fn next_chunk(&self) -> Result<Vec<u8>, MixerError> {
        let chunk_bytes = self.chunk_size.bytes();
        let mut out = vec![0u8; chunk_bytes];

        let (snapshot, epoch_at_start): (Vec<(VoiceId, VoiceEntry)>, u64) = {
            let mut state = self.state.lock();
            let snapshot: Vec<(VoiceId, VoiceEntry)> = state.voices.drain().collect();
            state.in_flight = snapshot.iter().map(|(id, e)| (*id, e.name.clone())).collect();
            (snapshot, state.epoch)
        };

        let mut survivors = Vec::with_capacity(snapshot.len());
        let mut ended: Vec<(VoiceId, String)> = Vec::new();
        let mut violation: Option<MixerError> = None;

        for (id, mut entry) in snapshot {
            match entry.source.next_chunk() {
                Some(mut chunk) => {
                    if chunk.len() > chunk_bytes {
                        tracing::error!(
                            sample = %entry.name,
                            expected = chunk_bytes,
                            got = chunk.len(),
                            "contract violation: voice dropped"
                        );
                        if violation.is_none() {
                            violation = Some(MixerError::ContractViolation {
                                name: entry.name.clone(),
                                expected: chunk_bytes,
                                got: chunk.len(),
                            });
                        }
                        ended.push((id, entry.name));
                        continue;
                    }
                    if chunk.len() < chunk_bytes {
                        chunk.resize(chunk_bytes, 0);
                    }
                    pcm::saturating_add(&mut out, &chunk, self.geometry.sample_width);
                    survivors.push((id, entry));
                }
                None => {
                    tracing::debug!(sample = %entry.name, voice = id.0, "voice ended");
                    ended.push((id, entry.name));
                }
            }
        }

        {
            let mut state = self.state.lock();
            if state.epoch != epoch_at_start {
                // a concurrent clear_all fired mid-mix: every voice from
                // this snapshot is gone regardless of outcome, and
                // per_name_count already reflects that reset (plus
                // whatever was admitted since) — nothing from this
                // snapshot is applied on top of it.
                tracing::debug!(
                    dropped = survivors.len(),
                    "mix window discarded by concurrent silence"
                );
            } else {
                for (id, entry) in survivors {
                    if state.tombstones.remove(&id) {
                        Self::decrement_by(&mut state.per_name_count, &entry.name, 1);
                    } else {
                        state.voices.insert(id, entry);
                    }
                }
                for (id, name) in ended {
                    state.tombstones.remove(&id);
                    Self::decrement_by(&mut state.per_name_count, &name, 1);
                }
            }
            state.in_flight.clear();
            state.tombstones.clear();
        }

        match violation {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("geometry", &self.geometry)
            .field("chunk_size", &self.chunk_size)
            .field("active", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Channels, SampleWidth};
    use crate::sample::{ChunkSource, StoredSample};
    use std::sync::Arc as StdArc;

    fn geometry() -> FrameGeometry {
        FrameGeometry::new(44_100, SampleWidth::Sixteen, Channels::Stereo)
    }

    fn chunk(bytes: usize) -> ChunkSize {
        ChunkSize::new(geometry(), bytes).unwrap()
    }

    fn tone(name: &str, frames: usize) -> StdArc<dyn Sample> {
        let buf = vec![0u8; frames * geometry().frame_bytes()];
        StdArc::new(StoredSample::new(name, geometry(), Channels::Stereo, buf).unwrap())
    }

    #[test]
    fn per_name_cap_rejects_fifth_concurrent_voice() {
        let mixer = Mixer::new(geometry(), chunk(16), MixerLimits::default());
        let ids = VoiceIdAllocator::new();
        let boom = tone("boom", 1000);
        for _ in 0..4 {
            assert!(mixer.add(ids.next(), boom.as_ref(), false).unwrap().is_some());
        }
        assert!(mixer.add(ids.next(), boom.as_ref(), false).unwrap().is_none());
    }

    #[test]
    fn global_cap_rejects_ninth_concurrent_voice() {
        let mixer = Mixer::new(geometry(), chunk(16), MixerLimits::default());
        let ids = VoiceIdAllocator::new();
        for i in 0..8 {
            let s = tone(&format!("s{i}"), 1000);
            assert!(mixer.add(ids.next(), s.as_ref(), false).unwrap().is_some());
        }
        let one_more = tone("overflow", 1000);
        assert!(mixer.add(ids.next(), one_more.as_ref(), false).unwrap().is_none());
    }

    #[test]
    fn repeating_voice_is_exclusive_per_name() {
        let mixer = Mixer::new(geometry(), chunk(16), MixerLimits::default());
        let ids = VoiceIdAllocator::new();
        let amoeba = tone("amoeba", 1000);
        assert!(mixer.add(ids.next(), amoeba.as_ref(), true).unwrap().is_some());
        assert!(mixer.add(ids.next(), amoeba.as_ref(), true).unwrap().is_none());
    }

    #[test]
    fn stop_is_idempotent() {
        let mixer = Mixer::new(geometry(), chunk(16), MixerLimits::default());
        let ids = VoiceIdAllocator::new();
        let s = tone("x", 1000);
        let id = mixer.add(ids.next(), s.as_ref(), false).unwrap().unwrap();
        mixer.stop(id);
        mixer.stop(id); // no panic, no-op
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn stop_by_name_clears_all_matching_voices_and_count() {
        let mixer = Mixer::new(geometry(), chunk(16), MixerLimits::default());
        let ids = VoiceIdAllocator::new();
        let boom = tone("boom", 1000);
        for _ in 0..3 {
            mixer.add(ids.next(), boom.as_ref(), false).unwrap();
        }
        assert_eq!(mixer.stop_by_name("boom"), 3);
        assert_eq!(mixer.count_for("boom"), 0);
        let chunk = mixer.next_chunk().unwrap();
        assert!(chunk.iter().all(|&b| b == 0));
    }

    #[test]
    fn next_chunk_pads_short_tail_and_removes_exhausted_voice() {
        let mixer = Mixer::new(geometry(), chunk(16), MixerLimits::default());
        let ids = VoiceIdAllocator::new();
        let s = tone("tick", 2); // 2 stereo frames = 8 bytes, shorter than chunk
        mixer.add(ids.next(), s.as_ref(), false).unwrap();
        let c = mixer.next_chunk().unwrap();
        assert_eq!(c.len(), 16);
        assert_eq!(mixer.active_count(), 0);
    }

    #[test]
    fn overlapping_voices_sum_with_saturation() {
        let mixer = Mixer::new(geometry(), chunk(4), MixerLimits::default());
        let ids = VoiceIdAllocator::new();
        let frame = (i16::MAX / 2).to_le_bytes();
        let buf = [frame, frame].concat(); // one stereo frame at half scale
        let a = StdArc::new(StoredSample::new("a", geometry(), Channels::Stereo, buf.clone()).unwrap());
        let b = StdArc::new(StoredSample::new("b", geometry(), Channels::Stereo, buf).unwrap());
        mixer.add(ids.next(), a.as_ref(), false).unwrap();
        mixer.add(ids.next(), b.as_ref(), false).unwrap();
        let out = mixer.next_chunk().unwrap();
        let left = i16::from_le_bytes([out[0], out[1]]);
        assert!(left > i16::MAX / 2); // summed, not replaced
    }

    #[test]
    fn set_limit_overrides_default_per_name_cap() {
        let mixer = Mixer::new(geometry(), chunk(16), MixerLimits::default());
        let ids = VoiceIdAllocator::new();
        mixer.set_limit("boom", 1);
        let boom = tone("boom", 1000);
        assert!(mixer.add(ids.next(), boom.as_ref(), false).unwrap().is_some());
        assert!(mixer.add(ids.next(), boom.as_ref(), false).unwrap().is_none());
    }

    /// A `ChunkSource` that rendezvous with the test thread inside
    /// `next_chunk`, so a `stop`/`clear_all` call can be made to land
    /// exactly while the voice is drained out of the mixer's map for
    /// mixing — the race the tombstone/epoch mechanism exists to close.
    struct GateCursor {
        entered_tx: std::sync::mpsc::SyncSender<()>,
        resume_rx: std::sync::mpsc::Receiver<()>,
        payload: Option<Vec<u8>>,
    }

    impl ChunkSource for GateCursor {
        fn next_chunk(&mut self) -> Option<Vec<u8>> {
            let _ = self.entered_tx.send(());
            let _ = self.resume_rx.recv();
            self.payload.take()
        }
    }

    struct GateSample {
        entered_tx: std::sync::mpsc::SyncSender<()>,
        resume_rx: std::sync::Mutex<Option<std::sync::mpsc::Receiver<()>>>,
        payload: Vec<u8>,
    }

    impl Sample for GateSample {
        fn name(&self) -> &str {
            "gated"
        }

        fn duration(&self) -> f64 {
            0.0
        }

        fn chunks(&self, _chunk_size: ChunkSize, _repeat: bool, _stop: StopFlag) -> Box<dyn ChunkSource> {
            let resume_rx = self
                .resume_rx
                .lock()
                .unwrap()
                .take()
                .expect("GateSample.chunks() called once per test");
            Box::new(GateCursor {
                entered_tx: self.entered_tx.clone(),
                resume_rx,
                payload: Some(self.payload.clone()),
            })
        }
    }

    #[test]
    fn stop_racing_an_in_flight_mix_window_is_not_lost() {
        use std::sync::mpsc::sync_channel;
        use std::sync::Arc;
        use std::thread;

        let mixer = Arc::new(Mixer::new(geometry(), chunk(16), MixerLimits::default()));
        let ids = VoiceIdAllocator::new();

        let (entered_tx, entered_rx) = sync_channel::<()>(0);
        let (resume_tx, resume_rx) = sync_channel::<()>(0);
        let sample = GateSample {
            entered_tx,
            resume_rx: std::sync::Mutex::new(Some(resume_rx)),
            payload: vec![0xABu8; 16],
        };
        let id = mixer.add(ids.next(), &sample, false).unwrap().unwrap();

        let mix_thread_mixer = Arc::clone(&mixer);
        let handle = thread::spawn(move || mix_thread_mixer.next_chunk());

        // Block until the mix thread has drained the voice out of `voices`
        // and is parked inside its `ChunkSource::next_chunk`.
        entered_rx.recv().unwrap();

        // `voices` is empty right now: a naive `remove` would find nothing
        // and the voice would be silently resurrected when the mix window
        // reinserts its survivors below.
        mixer.stop(id);

        resume_tx.send(()).unwrap();
        let first_chunk = handle.join().unwrap().unwrap();
        // the chunk already being assembled when `stop` raced it still
        // carries the voice's audio — only *subsequent* chunks must be
        // free of it.
        assert!(first_chunk.iter().any(|&b| b != 0));

        assert_eq!(mixer.active_count(), 0);
        assert_eq!(mixer.count_for("gated"), 0);

        let second_chunk = mixer.next_chunk().unwrap();
        assert!(second_chunk.iter().all(|&b| b == 0));
    }

    #[test]
    fn silence_racing_an_in_flight_mix_window_discards_the_whole_snapshot() {
        use std::sync::mpsc::sync_channel;
        use std::sync::Arc;
        use std::thread;

        let mixer = Arc::new(Mixer::new(geometry(), chunk(16), MixerLimits::default()));
        let ids = VoiceIdAllocator::new();

        let (entered_tx, entered_rx) = sync_channel::<()>(0);
        let (resume_tx, resume_rx) = sync_channel::<()>(0);
        let sample = GateSample {
            entered_tx,
            resume_rx: std::sync::Mutex::new(Some(resume_rx)),
            payload: vec![0xCDu8; 16],
        };
        mixer.add(ids.next(), &sample, false).unwrap();

        let mix_thread_mixer = Arc::clone(&mixer);
        let handle = thread::spawn(move || mix_thread_mixer.next_chunk());

        entered_rx.recv().unwrap();
        mixer.clear_all();
        resume_tx.send(()).unwrap();
        handle.join().unwrap().unwrap();

        // the silenced voice must not have been resurrected, and the
        // per-name count clear_all reset must not have been clobbered by
        // the in-flight mix window's reconciliation.
        assert_eq!(mixer.active_count(), 0);
        assert_eq!(mixer.count_for("gated"), 0);
        let chunk = mixer.next_chunk().unwrap();
        assert!(chunk.iter().all(|&b| b == 0));
    }
}
