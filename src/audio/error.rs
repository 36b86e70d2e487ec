// Audio error types
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while decoding a resource or driving the output device
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio file {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to probe file format: {0}")]
    Probe(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Failed to decode audio: {0}")]
    Decode(String),

    #[error("Seek failed: {0}")]
    Seek(String),

    #[error("Failed to resample audio: {0}")]
    Resample(String),

    #[error("No output device available")]
    NoOutputDevice,

    #[error("Failed to get default output config: {0}")]
    OutputConfig(String),

    #[error("Failed to build output stream: {0}")]
    StreamBuild(String),

    #[error("Failed to start stream: {0}")]
    StreamPlay(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
