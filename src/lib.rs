// Stemsloth - Stem Player
// Module declarations
pub mod audio;
pub mod commands;
pub mod error;
pub mod library;
pub mod metronome;
pub mod player;
pub mod settings;

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use audio::engine::AudioEngine;
use audio::output::AudioOutput;
use commands::Console;
use library::{Catalog, DirectoryScanner};
use metronome::{ClickSink, ClickSound, Metronome};
use player::session::{PlayerSession, SessionConfig};
use settings::AppSettings;

/// Load the click sound on its own output so the metronome never competes with the stem mix
fn open_click(settings: &AppSettings) -> Option<(AudioOutput, Arc<dyn ClickSink>)> {
    let output = match AudioOutput::new() {
        Ok(output) => output,
        Err(e) => {
            log::warn!("[Metronome] No output for click sound: {}", e);
            return None;
        }
    };
    match ClickSound::load(&settings.metronome.click_path, &output) {
        Ok(click) => Some((output, Arc::new(click))),
        Err(e) => {
            log::warn!("[Metronome] Failed to load click sound: {}", e);
            None
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    let config_dir = AppSettings::config_dir();
    let settings = AppSettings::load_or_init(&config_dir)
        .with_context(|| format!("Failed to load settings from {:?}", config_dir))?;

    let layout = settings.library.layout();
    let mut catalog = Catalog::builtin();
    if settings.library.scan_media_root {
        match DirectoryScanner::scan(&layout) {
            Ok(found) => {
                let added = catalog.merge(found);
                log::info!("[Library] Added {} tracks from {:?}", added, layout.root);
            }
            Err(e) => log::warn!("[Library] Scan failed: {:#}", e),
        }
    }

    let engine = AudioEngine::new(
        layout,
        settings.playback.default_volume,
        Duration::from_millis(settings.playback.sync.interval_ms.max(1)),
    )
    .context("Failed to initialize audio engine")?;
    engine.set_master_volume(settings.playback.master_volume);

    // The cpal streams aren't Send, so everything runs on this thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;

    runtime.block_on(async move {
        let (_click_output, click) = match open_click(&settings) {
            Some((output, click)) => (Some(output), Some(click)),
            None => (None, None),
        };

        let (session, handle) = PlayerSession::new(
            engine,
            catalog.clone(),
            SessionConfig::from_settings(&settings.playback),
        );
        let console = Console::new(
            handle.clone(),
            catalog,
            Metronome::new(settings.metronome.bpm),
            click,
        );

        let (_, console_result) = tokio::join!(session.run(), console.run());
        handle.shutdown();
        console_result
    })
}
