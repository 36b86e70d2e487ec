// Metronome
// Periodic click scheduler, independent of the stem player

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::audio::decoder::AudioDecoder;
use crate::audio::error::AudioResult;
use crate::audio::output::{AudioOutput, OutputWriter};
use crate::audio::resample::prepare_for_output;
use crate::error::{PlayerError, PlayerResult};

pub const DEFAULT_BPM: u32 = 120;
pub const MAX_BPM: u32 = 300;

/// Something that can make a click
pub trait ClickSink: Send + Sync + 'static {
    /// False until the click sound is available
    fn is_ready(&self) -> bool;

    fn click(&self);
}

/// A decoded click sample played through its own output
pub struct ClickSound {
    samples: Arc<[f32]>,
    writer: OutputWriter,
}

impl ClickSound {
    pub fn load(path: &Path, output: &AudioOutput) -> AudioResult<Self> {
        let audio = AudioDecoder::decode_file(path)?;
        let audio = prepare_for_output(audio, output.sample_rate(), output.channels() as usize)?;
        log::info!("[Metronome] Loaded click sound {:?}", path);
        Ok(Self {
            samples: Arc::from(audio.samples),
            writer: output.writer(),
        })
    }
}

impl ClickSink for ClickSound {
    fn is_ready(&self) -> bool {
        !self.samples.is_empty()
    }

    fn click(&self) {
        // A click that doesn't fit is dropped rather than delayed
        if self.writer.available_space() >= self.samples.len() {
            self.writer.write(&self.samples);
        }
    }
}

pub struct Metronome {
    bpm: u32,
    sink: Option<Arc<dyn ClickSink>>,
    task: Option<JoinHandle<()>>,
}

impl Default for Metronome {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

impl Metronome {
    pub fn new(bpm: u32) -> Self {
        Self {
            bpm: bpm.clamp(1, MAX_BPM),
            sink: None,
            task: None,
        }
    }

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Non-positive values become 1 BPM. A running metronome picks up the new tempo.
    pub fn set_bpm(&mut self, bpm: i64) -> u32 {
        self.bpm = bpm.clamp(1, MAX_BPM as i64) as u32;
        if self.is_running() {
            if let Some(sink) = self.sink.clone() {
                self.spawn(sink);
            }
        }
        self.bpm
    }

    /// Time between clicks
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm as f64)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Start clicking; the first click lands one interval from now.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, sink: Arc<dyn ClickSink>) -> PlayerResult<()> {
        if !sink.is_ready() {
            log::error!("[Metronome] Click sound not loaded yet");
            return Err(PlayerError::ClickNotLoaded);
        }
        self.sink = Some(sink.clone());
        self.spawn(sink);
        log::info!("[Metronome] Started at {} BPM", self.bpm);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::info!("[Metronome] Stopped");
        }
    }

    fn spawn(&mut self, sink: Arc<dyn ClickSink>) {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let period = self.interval();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                sink.click();
            }
        }));
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        self.stop();
    }
}
