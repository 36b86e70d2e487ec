// Audio playback module
// Uses Symphonia for decoding and cpal for output

pub mod decoder;
pub mod engine;
pub mod error;
pub mod handle;
pub mod output;
pub mod resample;

pub use engine::{AudioEngine, EngineHandle};
pub use handle::{EventSink, HandleEvent, HandleEventKind, HandleFactory, LoadStatus, PlaybackHandle};
