mod mailbox;
mod pull;
mod push;

pub use mailbox::{Command, Mailbox};
pub use pull::CpalPullDriver;
pub use push::{BlockingAudioSink, NullSink, PushDriver, WriteSink};
