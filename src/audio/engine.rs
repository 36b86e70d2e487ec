// Playback engine backed by cpal
// Stems are decoded in the background, then mixed block by block into the output ring buffer

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use super::decoder::{AudioDecoder, DecodedAudio};
use super::error::{AudioError, AudioResult};
use super::handle::{EventSink, HandleEventKind, HandleFactory, LoadStatus, PlaybackHandle};
use super::output::{AudioOutput, OutputWriter};
use super::resample::prepare_for_output;
use crate::library::catalog::{MediaLayout, Track};
use crate::player::stem::Stem;

/// Frames mixed per feeder iteration
const BLOCK_FRAMES: usize = 512;

/// Feeder back-off while the ring buffer is full or nothing plays
const FEEDER_IDLE: Duration = Duration::from_millis(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

impl OutputFormat {
    fn frames_to_secs(&self, frames: usize) -> f64 {
        frames as f64 / self.sample_rate as f64
    }

    fn secs_to_frames(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * self.sample_rate as f64) as usize
    }
}

/// State of one stem, shared between its handle, its loader and the feeder
struct Voice {
    stem: Stem,
    /// Interleaved samples in the output format, empty until loaded
    samples: Arc<[f32]>,
    frames: usize,
    position: usize,
    volume: f32,
    muted: bool,
    playing: bool,
    released: bool,
    status: LoadStatus,
    frames_since_update: usize,
    events: EventSink,
}

type SharedVoice = Arc<Mutex<Voice>>;

impl Voice {
    fn new(stem: Stem, volume: f32, events: EventSink) -> Self {
        Self {
            stem,
            samples: Arc::from(Vec::new()),
            frames: 0,
            position: 0,
            volume,
            muted: false,
            playing: false,
            released: false,
            status: LoadStatus::Loading,
            frames_since_update: 0,
            events,
        }
    }

    /// Add this voice's next block into `out`. Returns false if it contributed nothing.
    fn mix_into(&mut self, out: &mut [f32], format: OutputFormat, update_frames: usize) -> bool {
        if !self.playing || self.released || self.frames == 0 {
            return false;
        }

        // A position set before the samples arrived may lie past the end
        self.position = self.position.min(self.frames);

        let channels = format.channels;
        let block = out.len() / channels;
        let n = block.min(self.frames - self.position);
        let gain = if self.muted { 0.0 } else { self.volume };

        let start = self.position * channels;
        let source = &self.samples[start..start + n * channels];
        for (o, s) in out[..n * channels].iter_mut().zip(source) {
            *o += s * gain;
        }

        self.position += n;
        self.frames_since_update += n;

        if self.position >= self.frames {
            self.playing = false;
            self.frames_since_update = 0;
            self.events.emit(
                self.stem,
                HandleEventKind::TimeUpdate {
                    position: format.frames_to_secs(self.position),
                },
            );
            self.events.emit(self.stem, HandleEventKind::Ended);
        } else if self.frames_since_update >= update_frames {
            self.frames_since_update = 0;
            self.events.emit(
                self.stem,
                HandleEventKind::TimeUpdate {
                    position: format.frames_to_secs(self.position),
                },
            );
        }
        n > 0
    }

    /// Take decoded samples in the output format, keeping any earlier seek in range
    fn install(&mut self, audio: DecodedAudio, format: OutputFormat) -> f64 {
        self.frames = audio.frames();
        self.samples = Arc::from(audio.samples);
        self.position = self.position.min(self.frames);
        self.status = LoadStatus::Ready;
        format.frames_to_secs(self.frames)
    }
}

/// Owns the output device and the feeder thread; opens handles for stems
pub struct AudioEngine {
    output: AudioOutput,
    layout: MediaLayout,
    format: OutputFormat,
    default_volume: f32,
    voices: Arc<Mutex<Vec<SharedVoice>>>,
    running: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
}

impl AudioEngine {
    /// Open the default output device and start mixing.
    /// `update_interval` is the cadence of TimeUpdate notifications.
    pub fn new(
        layout: MediaLayout,
        default_volume: f32,
        update_interval: Duration,
    ) -> AudioResult<Self> {
        let output = AudioOutput::new()?;
        let format = OutputFormat {
            sample_rate: output.sample_rate(),
            channels: output.channels().max(1) as usize,
        };

        let update_frames =
            ((format.sample_rate as f64 * update_interval.as_secs_f64()) as usize).max(1);
        let voices: Arc<Mutex<Vec<SharedVoice>>> = Arc::default();
        let running = Arc::new(AtomicBool::new(true));

        let feeder = {
            let writer = output.writer();
            let voices = voices.clone();
            let running = running.clone();
            std::thread::Builder::new()
                .name("stem-feeder".to_string())
                .spawn(move || feeder_loop(writer, voices, running, format, update_frames))
                .map_err(|e| AudioError::StreamPlay(format!("Failed to spawn feeder: {}", e)))?
        };

        log::info!(
            "[Engine] Started ({} Hz, {} channels, updates every {} frames)",
            format.sample_rate,
            format.channels,
            update_frames
        );

        Ok(Self {
            output,
            layout,
            format,
            default_volume: default_volume.clamp(0.0, 1.0),
            voices,
            running,
            feeder: Some(feeder),
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.output.set_volume(volume);
    }

    /// Number of voices the feeder still mixes
    pub fn active_voices(&self) -> usize {
        self.voices.lock().iter().filter(|v| !v.lock().released).count()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(feeder) = self.feeder.take() {
            if feeder.join().is_err() {
                log::error!("[Engine] Feeder thread panicked");
            }
        }
    }
}

impl HandleFactory for AudioEngine {
    type Handle = EngineHandle;

    fn open(&mut self, track: &Track, stem: Stem, events: EventSink) -> EngineHandle {
        let path = self.layout.stem_path(track, stem);
        let voice = Arc::new(Mutex::new(Voice::new(stem, self.default_volume, events)));
        self.voices.lock().push(voice.clone());

        let loader_voice = voice.clone();
        let format = self.format;
        rayon::spawn(move || load_voice(path, loader_voice, format));

        EngineHandle {
            stem,
            voice,
            format: self.format,
            writer: self.output.writer(),
        }
    }
}

/// Decode and convert a stem, then hand the samples to its voice
fn load_voice(path: PathBuf, voice: SharedVoice, format: OutputFormat) {
    log::debug!("[Engine] Loading {:?}", path);
    let result = AudioDecoder::decode_file(&path)
        .and_then(|audio| prepare_for_output(audio, format.sample_rate, format.channels));

    let mut voice = voice.lock();
    if voice.released {
        return;
    }

    match result {
        Ok(audio) => {
            let duration = voice.install(audio, format);
            log::info!("[Engine] Loaded {:?} ({:.2}s)", path, duration);
            voice.events.emit(voice.stem, HandleEventKind::Loaded { duration });
        }
        Err(e) => {
            log::warn!("[Engine] Failed to load {:?}: {}", path, e);
            let reason = e.to_string();
            voice.status = LoadStatus::Unavailable(reason.clone());
            voice.events.emit(voice.stem, HandleEventKind::LoadFailed { reason });
        }
    }
}

fn feeder_loop(
    writer: OutputWriter,
    voices: Arc<Mutex<Vec<SharedVoice>>>,
    running: Arc<AtomicBool>,
    format: OutputFormat,
    update_frames: usize,
) {
    let mut block = vec![0.0f32; BLOCK_FRAMES * format.channels];

    while running.load(Ordering::Acquire) {
        if writer.available_space() < block.len() {
            std::thread::sleep(FEEDER_IDLE);
            continue;
        }

        block.fill(0.0);
        let mut audible = false;
        {
            let mut voices = voices.lock();
            voices.retain(|v| !v.lock().released);
            for voice in voices.iter() {
                audible |= voice.lock().mix_into(&mut block, format, update_frames);
            }
        }

        if audible {
            writer.write(&block);
        } else {
            std::thread::sleep(FEEDER_IDLE);
        }
    }
}

/// Handle to one stem voice of the engine
pub struct EngineHandle {
    stem: Stem,
    voice: SharedVoice,
    format: OutputFormat,
    writer: OutputWriter,
}

impl PlaybackHandle for EngineHandle {
    fn stem(&self) -> Stem {
        self.stem
    }

    fn status(&self) -> LoadStatus {
        self.voice.lock().status.clone()
    }

    fn position(&self) -> f64 {
        self.format.frames_to_secs(self.voice.lock().position)
    }

    fn set_position(&mut self, seconds: f64) {
        let mut voice = self.voice.lock();
        let mut frame = self.format.secs_to_frames(seconds);
        if voice.frames > 0 {
            frame = frame.min(voice.frames);
        }
        voice.position = frame;
        voice.frames_since_update = 0;
    }

    fn duration(&self) -> f64 {
        self.format.frames_to_secs(self.voice.lock().frames)
    }

    fn volume(&self) -> f32 {
        self.voice.lock().volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.voice.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn is_muted(&self) -> bool {
        self.voice.lock().muted
    }

    fn set_muted(&mut self, muted: bool) {
        self.voice.lock().muted = muted;
    }

    fn is_playing(&self) -> bool {
        self.voice.lock().playing
    }

    fn play(&mut self) {
        let mut voice = self.voice.lock();
        if voice.released {
            return;
        }
        // Playing from the end restarts the stem
        if voice.frames > 0 && voice.position >= voice.frames {
            voice.position = 0;
        }
        voice.playing = true;
    }

    fn pause(&mut self) {
        self.voice.lock().playing = false;
    }

    fn flush_output(&mut self) {
        self.writer.clear();
    }

    fn release(&mut self) {
        let mut voice = self.voice.lock();
        if voice.released {
            return;
        }
        voice.playing = false;
        voice.released = true;
        voice.samples = Arc::from(Vec::new());
        voice.frames = 0;
        voice.position = 0;
        drop(voice);
        // Drop audio already queued for this track
        self.writer.clear();
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::handle::HandleEvent;
    use tokio::sync::mpsc;

    const FORMAT: OutputFormat = OutputFormat {
        sample_rate: 1000,
        channels: 2,
    };

    fn loaded_voice(frames: usize) -> (Voice, mpsc::UnboundedReceiver<HandleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut voice = Voice::new(Stem::Drums, 0.5, EventSink::new(3, tx));
        voice.samples = Arc::from(vec![1.0f32; frames * 2]);
        voice.frames = frames;
        voice.status = LoadStatus::Ready;
        (voice, rx)
    }

    #[test]
    fn test_paused_voice_does_not_advance() {
        let (mut voice, _rx) = loaded_voice(100);
        let mut out = vec![0.0; 20];
        assert!(!voice.mix_into(&mut out, FORMAT, 50));
        assert_eq!(voice.position, 0);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_mix_applies_volume_and_mute() {
        let (mut voice, _rx) = loaded_voice(100);
        voice.playing = true;
        let mut out = vec![0.0; 20];
        assert!(voice.mix_into(&mut out, FORMAT, 50));
        assert_eq!(voice.position, 10);
        assert!(out.iter().all(|s| *s == 0.5));

        voice.muted = true;
        let mut out = vec![0.0; 20];
        voice.mix_into(&mut out, FORMAT, 50);
        assert_eq!(voice.position, 20);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_time_updates_follow_interval() {
        let (mut voice, mut rx) = loaded_voice(1000);
        voice.playing = true;
        let mut out = vec![0.0; 40];
        for _ in 0..6 {
            voice.mix_into(&mut out, FORMAT, 50);
        }
        // 120 frames mixed in blocks of 20 at an interval of 50 frames
        let mut positions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.generation, 3);
            if let HandleEventKind::TimeUpdate { position } = event.kind {
                positions.push(position);
            }
        }
        assert_eq!(positions, vec![0.06, 0.12]);
    }

    #[test]
    fn test_voice_reports_end() {
        let (mut voice, mut rx) = loaded_voice(15);
        voice.playing = true;
        let mut out = vec![0.0; 20];
        voice.mix_into(&mut out, FORMAT, 1000);
        voice.mix_into(&mut out, FORMAT, 1000);
        assert!(!voice.playing);
        assert_eq!(voice.position, 15);

        let kinds: Vec<HandleEventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![HandleEventKind::TimeUpdate { position: 0.015 }, HandleEventKind::Ended]
        );
    }

    #[test]
    fn test_unloaded_voice_stays_at_zero() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut voice = Voice::new(Stem::Bass, 1.0, EventSink::new(1, tx));
        voice.playing = true;
        let mut out = vec![0.0; 20];
        assert!(!voice.mix_into(&mut out, FORMAT, 10));
        assert_eq!(voice.position, 0);
    }

    #[test]
    fn test_seek_past_end_before_load_is_clamped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut voice = Voice::new(Stem::Vocals, 1.0, EventSink::new(2, tx));
        // 300s requested while nothing is loaded yet
        voice.position = FORMAT.secs_to_frames(300.0);

        let duration = voice.install(
            DecodedAudio {
                samples: vec![0.25; 200 * 2],
                sample_rate: FORMAT.sample_rate,
                channels: FORMAT.channels,
            },
            FORMAT,
        );
        assert_eq!(duration, 0.2);
        assert_eq!(voice.position, 200);

        voice.playing = true;
        let mut out = vec![0.0; 20];
        assert!(!voice.mix_into(&mut out, FORMAT, 50));
        assert!(!voice.playing);
        assert!(out.iter().all(|s| *s == 0.0));
        let kinds: Vec<HandleEventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![HandleEventKind::TimeUpdate { position: 0.2 }, HandleEventKind::Ended]
        );
    }

    #[test]
    fn test_out_of_range_position_does_not_panic_mixing() {
        let (mut voice, _rx) = loaded_voice(100);
        voice.position = usize::MAX;
        voice.playing = true;
        let mut out = vec![0.0; 20];
        voice.mix_into(&mut out, FORMAT, 50);
        assert_eq!(voice.position, 100);
    }

    #[test]
    fn test_missing_file_fails_load() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let voice = Arc::new(Mutex::new(Voice::new(Stem::Other, 1.0, EventSink::new(9, tx))));
        load_voice(PathBuf::from("no/such/other.m4a"), voice.clone(), FORMAT);

        assert!(matches!(voice.lock().status, LoadStatus::Unavailable(_)));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.stem, Stem::Other);
        assert!(matches!(event.kind, HandleEventKind::LoadFailed { .. }));
    }
}
