// Sample rate conversion and channel remapping
// Brings a decoded stem to the output device's rate and channel count

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::decoder::DecodedAudio;
use super::error::{AudioError, AudioResult};

pub fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }
    planes
}

pub fn interleave(planes: &[Vec<f32>]) -> Vec<f32> {
    let frames = planes.iter().map(|p| p.len()).min().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            samples.push(plane[frame]);
        }
    }
    samples
}

/// Map interleaved audio from `from` channels to `to` channels.
/// Downmix to mono averages; otherwise output channel c reads input channel c % from.
pub fn remix_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    let from = from.max(1);
    let to = to.max(1);
    if from == to {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                out.push(frame[ch % from]);
            }
        }
    }
    out
}

/// Resample to `target_rate`, keeping the channel count
pub fn resample(audio: DecodedAudio, target_rate: u32) -> AudioResult<DecodedAudio> {
    if audio.sample_rate == target_rate || audio.frames() == 0 {
        return Ok(audio);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / audio.sample_rate as f64;
    let frames = audio.frames();

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, frames, audio.channels)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let input = deinterleave(&audio.samples, audio.channels);
    let mut output = resampler
        .process(&input, None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    // Ensure output matches the expected length
    let expected = (frames as f64 * ratio).round() as usize;
    for plane in output.iter_mut() {
        plane.resize(expected, 0.0);
    }

    Ok(DecodedAudio {
        samples: interleave(&output),
        sample_rate: target_rate,
        channels: audio.channels,
    })
}

/// Resample and remap a decoded stem for an output of the given format
pub fn prepare_for_output(
    audio: DecodedAudio,
    sample_rate: u32,
    channels: usize,
) -> AudioResult<DecodedAudio> {
    let audio = resample(audio, sample_rate)?;
    let samples = remix_channels(&audio.samples, audio.channels, channels);
    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels: channels.max(1),
    })
}
