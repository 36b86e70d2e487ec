// Playback handle abstraction
// A handle is one loadable, seekable, playable stem resource owned by the controller

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::library::catalog::Track;
use crate::player::stem::Stem;

/// Load state of a handle's media resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum LoadStatus {
    Loading,
    Ready,
    Unavailable(String),
}

impl LoadStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, LoadStatus::Ready)
    }
}

/// Runtime object wrapping one stem's audio resource
///
/// Positions and durations are in seconds. A handle whose resource is not
/// loaded (or failed to load) reports a duration and position of 0.
pub trait PlaybackHandle {
    fn stem(&self) -> Stem;

    fn status(&self) -> LoadStatus;

    fn position(&self) -> f64;

    fn set_position(&mut self, seconds: f64);

    fn duration(&self) -> f64;

    /// Volume in 0.0..=1.0, independent of the mute flag
    fn volume(&self) -> f32;

    fn set_volume(&mut self, volume: f32);

    fn is_muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    fn is_playing(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);

    /// Drop output already queued but not yet heard. Called on user seeks and pauses.
    fn flush_output(&mut self) {}

    /// Stop output and free the resource. Must be safe to call repeatedly.
    fn release(&mut self);
}

/// Creates handles for the stems of a track
pub trait HandleFactory {
    type Handle: PlaybackHandle;

    fn open(&mut self, track: &Track, stem: Stem, events: EventSink) -> Self::Handle;
}

/// Asynchronous notification from the host media stack
#[derive(Debug, Clone, PartialEq)]
pub struct HandleEvent {
    /// Which controller instance the originating handle belongs to
    pub generation: u64,
    pub stem: Stem,
    pub kind: HandleEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HandleEventKind {
    Loaded { duration: f64 },
    LoadFailed { reason: String },
    TimeUpdate { position: f64 },
    Ended,
}

/// Sending half handed to each handle; tags events with a generation
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: UnboundedSender<HandleEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: UnboundedSender<HandleEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver an event. Dropped silently once the session is gone.
    pub fn emit(&self, stem: Stem, kind: HandleEventKind) {
        let _ = self.tx.send(HandleEvent {
            generation: self.generation,
            stem,
            kind,
        });
    }
}
