use std::collections::HashMap;
use std::sync::Arc;

use crate::control::Control;
use crate::error::MixerError;
use crate::mixer::{Mixer, VoiceId};
use crate::sample::Sample;

/// One entry of the registry's static init list: a sample plus an optional
/// per-name polyphony override (falls back to the mixer's default when
/// `None`).
pub struct SampleDescriptor {
    pub name: String,
    pub sample: Arc<dyn Sample>,
    pub per_name_limit: Option<usize>,
}

impl SampleDescriptor {
    pub fn new(sample: Arc<dyn Sample>) -> Self {
        Self {
            name: sample.name().to_string(),
            sample,
            per_name_limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.per_name_limit = Some(limit);
        self
    }
}

/// Name-addressable catalog of samples, populated once at init. The loader
/// boundary (decoding bytes off disk, synthesizing a generator's upstream
/// producer) is entirely the caller's concern — the registry only ever
/// receives already-constructed [`Sample`] values.
pub struct SampleRegistry {
    samples: HashMap<String, Arc<dyn Sample>>,
}

impl SampleRegistry {
    /// Register every descriptor, pushing any per-name limit override into
    /// `mixer` so the cap is in effect before the first `play` call.
    pub fn init(descriptors: Vec<SampleDescriptor>, mixer: &Mixer) -> Self {
        let mut samples = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if let Some(limit) = descriptor.per_name_limit {
                mixer.set_limit(descriptor.name.clone(), limit);
            }
            samples.insert(descriptor.name, descriptor.sample);
        }
        Self { samples }
    }

    /// Look up a sample by name without playing it.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Sample>, MixerError> {
        self.samples
            .get(name)
            .cloned()
            .ok_or_else(|| MixerError::Config(format!("unknown sample name: {name}")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.samples.keys().map(String::as_str)
    }

    /// Look up `name` and play it through `control`. Unlike polyphony
    /// rejection (a routine `Ok(None)`), an unknown name is a loud
    /// configuration error — it means the caller asked for a sample that was
    /// never registered, which is always a bug, not a runtime condition.
    pub fn play(&self, control: &Control, name: &str, repeat: bool) -> Result<Option<VoiceId>, MixerError> {
        let sample = self.get(name)?;
        control.play(sample, repeat)
    }
}
