// Scripted playback handles for tests
use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::handle::{EventSink, HandleFactory, LoadStatus, PlaybackHandle};
use crate::library::catalog::Track;
use crate::player::stem::{Stem, StemMap};

#[derive(Debug, Clone)]
pub struct FakeState {
    pub position: f64,
    pub duration: f64,
    pub volume: f32,
    pub muted: bool,
    pub playing: bool,
    pub released: bool,
    pub status: LoadStatus,
    /// Number of set_position calls received
    pub seeks: u32,
    /// Number of flush_output calls received
    pub flushes: u32,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            position: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
            playing: false,
            released: false,
            status: LoadStatus::Loading,
            seeks: 0,
            flushes: 0,
        }
    }
}

pub type SharedFake = Arc<Mutex<FakeState>>;

#[derive(Debug)]
pub struct FakeHandle {
    stem: Stem,
    state: SharedFake,
}

impl FakeHandle {
    pub fn new(stem: Stem, state: SharedFake) -> Self {
        Self { stem, state }
    }
}

impl PlaybackHandle for FakeHandle {
    fn stem(&self) -> Stem {
        self.stem
    }

    fn status(&self) -> LoadStatus {
        self.state.lock().status.clone()
    }

    fn position(&self) -> f64 {
        self.state.lock().position
    }

    fn set_position(&mut self, seconds: f64) {
        let mut state = self.state.lock();
        state.position = seconds;
        state.seeks += 1;
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().volume = volume;
    }

    fn is_muted(&self) -> bool {
        self.state.lock().muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.state.lock().muted = muted;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn play(&mut self) {
        self.state.lock().playing = true;
    }

    fn pause(&mut self) {
        self.state.lock().playing = false;
    }

    fn flush_output(&mut self) {
        self.state.lock().flushes += 1;
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.released = true;
    }
}

/// Four loaded handles sharing the given duration, plus their shared states
pub fn loaded_handles(duration: f64) -> (StemMap<FakeHandle>, StemMap<SharedFake>) {
    let states = StemMap::from_fn(|_| {
        Arc::new(Mutex::new(FakeState {
            duration,
            status: LoadStatus::Ready,
            ..FakeState::default()
        }))
    });
    let handles = StemMap::from_fn(|stem| FakeHandle::new(stem, states[stem].clone()));
    (handles, states)
}

/// Factory recording every handle it opens. Clones share the record.
#[derive(Clone, Default)]
pub struct FakeFactory {
    opened: Arc<Mutex<Vec<(String, Stem, SharedFake, EventSink)>>>,
}

impl FakeFactory {
    /// Most recently opened state for a track's stem
    pub fn state(&self, track_id: &str, stem: Stem) -> Option<SharedFake> {
        self.opened
            .lock()
            .iter()
            .rev()
            .find(|(id, s, _, _)| id == track_id && *s == stem)
            .map(|(_, _, state, _)| state.clone())
    }

    /// Event sink handed to the most recently opened handle for a track's stem
    pub fn sink(&self, track_id: &str, stem: Stem) -> Option<EventSink> {
        self.opened
            .lock()
            .iter()
            .rev()
            .find(|(id, s, _, _)| id == track_id && *s == stem)
            .map(|(_, _, _, sink)| sink.clone())
    }

    pub fn opened_count(&self) -> usize {
        self.opened.lock().len()
    }
}

impl HandleFactory for FakeFactory {
    type Handle = FakeHandle;

    fn open(&mut self, track: &Track, stem: Stem, events: EventSink) -> FakeHandle {
        let state: SharedFake = Arc::default();
        self.opened
            .lock()
            .push((track.id.clone(), stem, state.clone(), events));
        FakeHandle::new(stem, state)
    }
}
