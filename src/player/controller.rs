// Stem playback controller
// Owns one playback handle per stem and keeps them in sync with the master clock

use crate::audio::handle::{
    EventSink, HandleEvent, HandleEventKind, HandleFactory, LoadStatus, PlaybackHandle,
};
use crate::library::catalog::Track;
use crate::player::stem::{Stem, StemMap};

/// Maximum drift (seconds) tolerated before a handle is re-seeked
pub const DEFAULT_SYNC_TOLERANCE: f64 = 0.1;

pub struct StemPlayer<H: PlaybackHandle> {
    track: Track,
    generation: u64,
    handles: StemMap<H>,
    muted: StemMap<bool>,
    status: StemMap<LoadStatus>,
    is_playing: bool,
    current_time: f64,
    tolerance: f64,
    torn_down: bool,
}

impl<H: PlaybackHandle> StemPlayer<H> {
    /// Take ownership of already-created handles. Transport starts paused at 0.
    pub fn new(track: Track, generation: u64, mut handles: StemMap<H>) -> Self {
        for handle in handles.values_mut() {
            handle.pause();
            handle.set_muted(false);
        }
        let status = handles.map(|_, h| h.status());

        Self {
            track,
            generation,
            handles,
            muted: StemMap::default(),
            status,
            is_playing: false,
            current_time: 0.0,
            tolerance: DEFAULT_SYNC_TOLERANCE,
            torn_down: false,
        }
    }

    /// Create one handle per stem for `track` through `factory`
    pub fn open<F>(track: &Track, factory: &mut F, events: EventSink) -> Self
    where
        F: HandleFactory<Handle = H>,
    {
        let generation = events.generation();
        let handles = StemMap::from_fn(|stem| factory.open(track, stem, events.clone()));
        log::info!("[Player] Opened '{}' (generation {})", track.id, generation);
        Self::new(track.clone(), generation, handles)
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        if tolerance.is_finite() && tolerance >= 0.0 {
            self.tolerance = tolerance;
        }
        self
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Master position last observed or commanded
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Duration of the master stem, 0 until it has loaded
    pub fn duration(&self) -> f64 {
        let duration = self.handles[Stem::MASTER].duration();
        if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn is_muted(&self, stem: Stem) -> bool {
        self.muted[stem]
    }

    pub fn volume(&self, stem: Stem) -> f32 {
        self.handles[stem].volume()
    }

    pub fn status(&self, stem: Stem) -> &LoadStatus {
        &self.status[stem]
    }

    pub fn handle(&self, stem: Stem) -> &H {
        &self.handles[stem]
    }

    pub fn play(&mut self) {
        if self.torn_down {
            return;
        }
        // Replaying a finished track starts over
        let duration = self.duration();
        if duration > 0.0 && self.current_time >= duration {
            self.seek(0.0);
        }
        self.is_playing = true;
        for handle in self.handles.values_mut() {
            handle.play();
        }
    }

    pub fn pause(&mut self) {
        self.is_playing = false;
        for handle in self.handles.values_mut() {
            handle.pause();
            handle.flush_output();
        }
    }

    pub fn toggle_playback(&mut self) -> bool {
        if self.is_playing {
            self.pause();
        } else {
            self.play();
        }
        self.is_playing
    }

    /// Move the master position to `target` and re-seek every handle that is
    /// out of tolerance. Returns the position actually applied.
    pub fn seek(&mut self, target: f64) -> f64 {
        if !target.is_finite() {
            log::warn!("[Player] Ignoring seek to non-finite position {}", target);
            return self.current_time;
        }

        let mut target = target.max(0.0);
        let duration = self.duration();
        if duration > 0.0 {
            target = target.min(duration);
        }

        self.current_time = target;
        self.correct_drift(target);
        for handle in self.handles.values_mut() {
            handle.flush_output();
        }
        target
    }

    /// Seek relative to the current master position
    pub fn skip(&mut self, delta: f64) -> f64 {
        self.seek(self.current_time + delta)
    }

    /// Read the master handle's position and pull every handle back within
    /// tolerance of it. Returns the new master time.
    pub fn resynchronize(&mut self) -> f64 {
        if self.torn_down {
            return self.current_time;
        }

        let master = self.handles[Stem::MASTER].position();
        if master.is_finite() {
            self.current_time = master;
            self.correct_drift(master);
        }
        self.current_time
    }

    fn correct_drift(&mut self, target: f64) {
        let tolerance = self.tolerance;
        for (stem, handle) in self.handles.iter_mut() {
            let drift = (handle.position() - target).abs();
            if drift > tolerance {
                log::trace!("[Player] {} drifted {:.3}s, seeking to {:.3}", stem, drift, target);
                handle.set_position(target);
            }
        }
    }

    /// Flip a stem's mute flag; the volume attribute is left untouched
    pub fn toggle_mute(&mut self, stem: Stem) -> bool {
        let handle = &mut self.handles[stem];
        let muted = !handle.is_muted();
        handle.set_muted(muted);
        self.muted[stem] = muted;
        muted
    }

    /// Set a stem's volume, clamped to 0.0..=1.0. NaN is rejected and leaves the
    /// volume unchanged. Returns the volume in effect afterwards.
    pub fn set_volume(&mut self, stem: Stem, volume: f32) -> f32 {
        let handle = &mut self.handles[stem];
        if volume.is_nan() {
            log::warn!("[Player] Rejecting NaN volume for {}", stem);
            return handle.volume();
        }
        let volume = volume.clamp(0.0, 1.0);
        handle.set_volume(volume);
        volume
    }

    /// Apply a host notification. Events from other generations are ignored;
    /// returns whether the event was applied.
    pub fn handle_event(&mut self, event: &HandleEvent) -> bool {
        if event.generation != self.generation || self.torn_down {
            return false;
        }

        match &event.kind {
            HandleEventKind::Loaded { duration } => {
                log::info!("[Player] {} loaded ({:.2}s)", event.stem, duration);
                self.status[event.stem] = LoadStatus::Ready;
            }
            HandleEventKind::LoadFailed { reason } => {
                log::warn!("[Player] {} unavailable: {}", event.stem, reason);
                self.status[event.stem] = LoadStatus::Unavailable(reason.clone());
            }
            HandleEventKind::TimeUpdate { .. } => {
                if event.stem == Stem::MASTER {
                    self.resynchronize();
                }
            }
            HandleEventKind::Ended => {
                if event.stem == Stem::MASTER {
                    self.pause();
                    self.current_time = self.duration();
                }
            }
        }
        true
    }

    /// Stop every handle and release its resource. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if !self.torn_down {
            log::info!("[Player] Tearing down '{}'", self.track.id);
        }
        self.is_playing = false;
        for handle in self.handles.values_mut() {
            handle.release();
        }
        self.torn_down = true;
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }
}

impl<H: PlaybackHandle> Drop for StemPlayer<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}
