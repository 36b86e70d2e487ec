// Settings management and persistence
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PlayerError, PlayerResult};
use crate::library::catalog::MediaLayout;

/// Overrides the directory holding settings.json
pub const CONFIG_DIR_ENV: &str = "STEMSLOTH_CONFIG_DIR";

/// Library settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    pub media_root: PathBuf,
    pub stem_extension: String, // e.g. "m4a"
    pub scan_media_root: bool,  // Add stem folders found under media_root to the catalog
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("stems"),
            stem_extension: "m4a".to_string(),
            scan_media_root: false,
        }
    }
}

impl LibrarySettings {
    pub fn layout(&self) -> MediaLayout {
        MediaLayout::new(self.media_root.clone(), self.stem_extension.clone())
    }
}

/// What drives resynchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Position updates reported by the master stem
    MasterUpdates,
    /// A fixed timer owned by the session
    FixedInterval,
}

/// Synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub mode: SyncMode,
    pub tolerance_seconds: f64,
    pub interval_ms: u64, // Position update cadence, 250ms matches browser timeupdate
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::MasterUpdates,
            tolerance_seconds: 0.1,
            interval_ms: 250,
        }
    }
}

/// Playback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub default_volume: f32, // 0.0-1.0, applied to every stem on load
    pub master_volume: f32,  // 0.0-1.0, output device gain
    pub skip_seconds: f64,   // Rewind / fast-forward step
    pub sync: SyncSettings,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            default_volume: 1.0,
            master_volume: 1.0,
            skip_seconds: 10.0,
            sync: SyncSettings::default(),
        }
    }
}

/// Metronome settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    pub bpm: u32,
    pub click_path: PathBuf,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        Self {
            bpm: 120,
            click_path: PathBuf::from("stems/click.m4a"),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub version: i32, // Settings schema version for future migrations
    pub library: LibrarySettings,
    pub playback: PlaybackSettings,
    pub metronome: MetronomeSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            version: 1,
            library: LibrarySettings::default(),
            playback: PlaybackSettings::default(),
            metronome: MetronomeSettings::default(),
        }
    }
}

impl AppSettings {
    /// Directory holding settings.json: $STEMSLOTH_CONFIG_DIR, else the user config dir
    pub fn config_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return PathBuf::from(dir);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stemsloth")
    }

    /// Get the settings file path
    pub fn get_settings_path(app_dir: &Path) -> PathBuf {
        app_dir.join("settings.json")
    }

    /// Load settings from file, or return defaults if file doesn't exist
    pub fn load(app_dir: &Path) -> PlayerResult<Self> {
        let path = Self::get_settings_path(app_dir);

        if !path.exists() {
            log::info!("[Settings] No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|source| PlayerError::SettingsIo {
            path: path.clone(),
            source,
        })?;

        let settings: AppSettings = serde_json::from_str(&content)?;

        log::info!("[Settings] Loaded settings from {:?}", path);
        Ok(settings.sanitized())
    }

    /// Load settings, writing the defaults out when no file exists yet
    pub fn load_or_init(app_dir: &Path) -> PlayerResult<Self> {
        let existed = Self::get_settings_path(app_dir).exists();
        let settings = Self::load(app_dir)?;
        if !existed {
            settings.save(app_dir)?;
        }
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, app_dir: &Path) -> PlayerResult<()> {
        // Ensure directory exists
        fs::create_dir_all(app_dir).map_err(|source| PlayerError::SettingsIo {
            path: app_dir.to_path_buf(),
            source,
        })?;

        let path = Self::get_settings_path(app_dir);
        let content = serde_json::to_string_pretty(self)?;

        fs::write(&path, content).map_err(|source| PlayerError::SettingsIo {
            path: path.clone(),
            source,
        })?;

        log::info!("[Settings] Saved settings to {:?}", path);
        Ok(())
    }

    /// Pull hand-edited values back into their valid ranges
    fn sanitized(mut self) -> Self {
        let playback = &mut self.playback;
        playback.default_volume = clamp_unit(playback.default_volume, 1.0);
        playback.master_volume = clamp_unit(playback.master_volume, 1.0);
        if !playback.skip_seconds.is_finite() || playback.skip_seconds <= 0.0 {
            playback.skip_seconds = PlaybackSettings::default().skip_seconds;
        }

        let sync = &mut playback.sync;
        if !sync.tolerance_seconds.is_finite() || sync.tolerance_seconds < 0.0 {
            sync.tolerance_seconds = SyncSettings::default().tolerance_seconds;
        }
        sync.interval_ms = sync.interval_ms.clamp(10, 5000);

        self.metronome.bpm = self.metronome.bpm.clamp(1, crate::metronome::MAX_BPM);
        self
    }
}

fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(0.0, 1.0)
    }
}
