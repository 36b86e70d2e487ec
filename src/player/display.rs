// Display boundary: everything a presentation layer needs to render the player
use serde::Serialize;

use crate::audio::handle::{LoadStatus, PlaybackHandle};
use crate::player::controller::StemPlayer;
use crate::player::stem::Stem;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StemView {
    pub stem: Stem,
    pub label: &'static str,
    /// Position of a 0..=100 volume control
    pub volume_percent: u8,
    pub muted: bool,
    /// Muted, or unmuted at volume 0. Both render with the muted icon.
    pub silent: bool,
    pub status: LoadStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerView {
    pub track_id: String,
    pub title: String,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub current_time_label: String,
    pub duration_label: String,
    pub stems: Vec<StemView>,
}

impl PlayerView {
    pub fn stem(&self, stem: Stem) -> Option<&StemView> {
        self.stems.iter().find(|v| v.stem == stem)
    }
}

impl<H: PlaybackHandle> StemPlayer<H> {
    pub fn view(&self) -> PlayerView {
        let stems = Stem::ALL
            .into_iter()
            .map(|stem| {
                let volume = self.volume(stem);
                let muted = self.is_muted(stem);
                StemView {
                    stem,
                    label: stem.label(),
                    volume_percent: volume_to_percent(volume),
                    muted,
                    silent: muted || volume == 0.0,
                    status: self.status(stem).clone(),
                }
            })
            .collect();

        PlayerView {
            track_id: self.track().id.clone(),
            title: self.track().title.clone(),
            is_playing: self.is_playing(),
            current_time: self.current_time(),
            duration: self.duration(),
            current_time_label: format_time(self.current_time()),
            duration_label: format_time(self.duration()),
            stems,
        }
    }
}

/// `m:ss`, minutes unpadded. Negative or non-finite input renders as 0:00.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// Map a 0..=100 control value onto a handle volume
pub fn percent_to_volume(percent: f32) -> f32 {
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0) / 100.0
}

pub fn volume_to_percent(volume: f32) -> u8 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u8
}
