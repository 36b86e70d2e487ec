// Audio output using cpal
// Handles cross-platform audio output with a ring buffer

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{HeapRb, traits::{Consumer, Observer, Producer, Split}};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::error::{AudioError, AudioResult};

const RING_BUFFER_SIZE: usize = 48000 * 2 / 4; // ~250ms of stereo audio at 48kHz

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Owns the device stream. The stream stays on the thread that opened it;
/// other threads feed it through an `OutputWriter`.
pub struct AudioOutput {
    _stream: Stream,
    writer: OutputWriter,
    sample_rate: u32,
    channels: u16,
    volume: Arc<Mutex<f32>>,
}

/// Cloneable, thread-safe producer side of the output ring buffer
#[derive(Clone)]
pub struct OutputWriter {
    producer: Arc<Mutex<RingProducer>>,
    clear_flag: Arc<AtomicBool>,
}

impl AudioOutput {
    /// Create a new audio output with default device
    pub fn new() -> AudioResult<Self> {
        let host = cpal::default_host();

        let device = host.default_output_device().ok_or(AudioError::NoOutputDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::OutputConfig(e.to_string()))?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        // Create ring buffer for passing samples to audio thread
        let rb = HeapRb::<f32>::new(RING_BUFFER_SIZE);
        let (producer, consumer) = rb.split();
        let producer = Arc::new(Mutex::new(producer));
        let consumer = Arc::new(Mutex::new(consumer));

        let volume = Arc::new(Mutex::new(1.0f32));
        let clear_flag = Arc::new(AtomicBool::new(false));

        let stream_config: StreamConfig = config.config();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(
                &device, &stream_config, consumer, volume.clone(), clear_flag.clone(),
            )?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(
                &device, &stream_config, consumer, volume.clone(), clear_flag.clone(),
            )?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(
                &device, &stream_config, consumer, volume.clone(), clear_flag.clone(),
            )?,
            format => return Err(AudioError::UnsupportedFormat(format!("{:?}", format))),
        };

        stream.play().map_err(|e| AudioError::StreamPlay(e.to_string()))?;

        log::info!(
            "[Output] Opened default device: {} Hz, {} channels",
            sample_rate,
            channels
        );

        Ok(Self {
            _stream: stream,
            writer: OutputWriter {
                producer,
                clear_flag,
            },
            sample_rate,
            channels,
            volume,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        consumer: Arc<Mutex<RingConsumer>>,
        volume: Arc<Mutex<f32>>,
        clear_flag: Arc<AtomicBool>,
    ) -> AudioResult<Stream> {
        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut consumer = consumer.lock();
                    let vol = *volume.lock();

                    // If clear flag is set, drain the buffer and output silence
                    if clear_flag.swap(false, Ordering::SeqCst) {
                        while consumer.try_pop().is_some() {}
                    }

                    for sample in data.iter_mut() {
                        let value = consumer.try_pop().unwrap_or(0.0) * vol;
                        *sample = T::from_sample(value);
                    }
                },
                move |err| {
                    log::error!("[Output] Audio output error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuild(e.to_string()))
    }

    pub fn writer(&self) -> OutputWriter {
        self.writer.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Set the output volume (0.0 to 1.0)
    pub fn set_volume(&self, vol: f32) {
        *self.volume.lock() = vol.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }
}

impl OutputWriter {
    /// Write samples to the output buffer
    /// Returns the number of samples actually written
    pub fn write(&self, samples: &[f32]) -> usize {
        self.producer.lock().push_slice(samples)
    }

    /// Get available space in the buffer
    pub fn available_space(&self) -> usize {
        self.producer.lock().vacant_len()
    }

    /// Drop whatever is buffered (after a seek)
    pub fn clear(&self) {
        // Set flag so audio callback drains buffer on next call
        self.clear_flag.store(true, Ordering::SeqCst);
    }
}
