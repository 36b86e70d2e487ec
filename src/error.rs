// Crate-level error taxonomy
use std::path::PathBuf;
use thiserror::Error;

use crate::audio::error::AudioError;
use crate::player::stem::UnknownStem;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Unknown track: {0}")]
    UnknownTrack(String),

    #[error(transparent)]
    UnknownStem(#[from] UnknownStem),

    #[error("No track is loaded")]
    NoTrackLoaded,

    #[error("Player session has shut down")]
    SessionClosed,

    #[error("Click sound is not loaded")]
    ClickNotLoaded,

    #[error("Failed to access settings at {path:?}: {source}")]
    SettingsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    SettingsParse(#[from] serde_json::Error),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

pub type PlayerResult<T> = Result<T, PlayerError>;
