// Track catalog and per-stem media layout
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PlayerError, PlayerResult};
use crate::player::stem::Stem;

/// Tracks shipped with the player
const BUILTIN_TRACKS: &[&str] = &["Ate_Que_A_Casa_Esteja_Cheia", "Belief", "Nivel_Raso"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Identifier, also the track's folder name under the media root
    pub id: String,
    pub title: String,
}

impl Track {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let title = display_title(&id);
        Self { id, title }
    }
}

/// "Nivel_Raso" -> "Nivel Raso"
pub fn display_title(id: &str) -> String {
    id.split('_').collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
}

impl Catalog {
    pub fn builtin() -> Self {
        Self {
            tracks: BUILTIN_TRACKS.iter().map(|id| Track::new(*id)).collect(),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, id: &str) -> PlayerResult<&Track> {
        self.tracks
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| PlayerError::UnknownTrack(id.to_string()))
    }

    /// Append tracks not already present, keeping existing order
    pub fn merge<I: IntoIterator<Item = Track>>(&mut self, tracks: I) -> usize {
        let mut added = 0;
        for track in tracks {
            if !self.tracks.iter().any(|t| t.id == track.id) {
                self.tracks.push(track);
                added += 1;
            }
        }
        added
    }
}

/// Where a track's stem files live: `<root>/<track>/<stem>.<extension>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLayout {
    pub root: PathBuf,
    pub extension: String,
}

impl MediaLayout {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn track_dir(&self, track: &Track) -> PathBuf {
        self.root.join(&track.id)
    }

    pub fn stem_path(&self, track: &Track, stem: Stem) -> PathBuf {
        self.track_dir(track)
            .join(format!("{}.{}", stem.name(), self.extension))
    }

    /// True if `dir` holds a file for every stem
    pub fn is_complete(&self, dir: &Path) -> bool {
        Stem::ALL
            .iter()
            .all(|stem| dir.join(format!("{}.{}", stem.name(), self.extension)).is_file())
    }
}
