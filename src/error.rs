use thiserror::Error;

/// Everything that can go wrong in the mixer, its samples, and its drivers.
///
/// Admission rejection (polyphony/per-name caps) is deliberately *not* a
/// variant here: it is expressed structurally as `Option::None` from
/// [`crate::Mixer::add`], since callers treat it as routine, not exceptional.
#[derive(Debug, Error)]
pub enum MixerError {
    /// Frame geometry mismatch, invalid sample width, or unknown registry name.
    #[error("config error: {0}")]
    Config(String),

    /// No output driver from the preference list could be constructed.
    #[error("no audio output driver available")]
    DriverUnavailable,

    /// The bounded command mailbox was full; the enqueued command was dropped.
    #[error("command mailbox overflow, command dropped")]
    MailboxOverflow,

    /// A sample's `chunks()` iterator yielded more than `chunk_size` bytes in one step.
    #[error("contract violation: source {name:?} yielded {got} bytes, expected at most {expected}")]
    ContractViolation {
        name: String,
        expected: usize,
        got: usize,
    },

    /// A failure reported by the concrete output driver (device open, stream build, write).
    #[error("driver error: {0}")]
    Driver(String),
}

pub type Result<T> = std::result::Result<T, MixerError>;
