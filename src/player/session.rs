// Player session
// Single event loop applying presentation commands and host notifications to the controller

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::audio::handle::{EventSink, HandleEvent, HandleEventKind, HandleFactory};
use crate::error::{PlayerError, PlayerResult};
use crate::library::catalog::{Catalog, Track};
use crate::player::controller::{StemPlayer, DEFAULT_SYNC_TOLERANCE};
use crate::player::display::PlayerView;
use crate::player::stem::Stem;
use crate::settings::settings::PlaybackSettings;
use crate::settings::SyncMode;

/// Something the presentation layer asks the player to do
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    /// Select a track from the catalog, replacing the current one
    Open(String),
    Play,
    Pause,
    TogglePlayback,
    Seek(f64),
    SkipForward,
    SkipBackward,
    SetVolume(Stem, f32),
    ToggleMute(Stem),
    Status,
    /// Tear down the current track without selecting another
    Close,
}

type Reply = oneshot::Sender<PlayerResult<Option<PlayerView>>>;

enum Message {
    Request(PlayerCommand, Reply),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub tolerance: f64,
    pub sync_mode: SyncMode,
    pub sync_interval: Duration,
    pub skip_seconds: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_SYNC_TOLERANCE,
            sync_mode: SyncMode::MasterUpdates,
            sync_interval: Duration::from_millis(250),
            skip_seconds: 10.0,
        }
    }
}

impl SessionConfig {
    pub fn from_settings(playback: &PlaybackSettings) -> Self {
        Self {
            tolerance: playback.sync.tolerance_seconds,
            sync_mode: playback.sync.mode,
            sync_interval: Duration::from_millis(playback.sync.interval_ms.max(1)),
            skip_seconds: playback.skip_seconds,
        }
    }
}

/// Cloneable client of a running session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl SessionHandle {
    /// Send a command and wait for the resulting view (None when no track is open)
    pub async fn send(&self, command: PlayerCommand) -> PlayerResult<Option<PlayerView>> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Message::Request(command, reply))
            .map_err(|_| PlayerError::SessionClosed)?;
        response.await.map_err(|_| PlayerError::SessionClosed)?
    }

    /// Like `send`, for commands that need an open track
    async fn send_for_view(&self, command: PlayerCommand) -> PlayerResult<PlayerView> {
        self.send(command).await?.ok_or(PlayerError::NoTrackLoaded)
    }

    pub async fn open(&self, track_id: &str) -> PlayerResult<PlayerView> {
        self.send_for_view(PlayerCommand::Open(track_id.to_string())).await
    }

    pub async fn play(&self) -> PlayerResult<PlayerView> {
        self.send_for_view(PlayerCommand::Play).await
    }

    pub async fn pause(&self) -> PlayerResult<PlayerView> {
        self.send_for_view(PlayerCommand::Pause).await
    }

    pub async fn seek(&self, seconds: f64) -> PlayerResult<PlayerView> {
        self.send_for_view(PlayerCommand::Seek(seconds)).await
    }

    pub async fn set_volume(&self, stem: Stem, volume: f32) -> PlayerResult<PlayerView> {
        self.send_for_view(PlayerCommand::SetVolume(stem, volume)).await
    }

    pub async fn toggle_mute(&self, stem: Stem) -> PlayerResult<PlayerView> {
        self.send_for_view(PlayerCommand::ToggleMute(stem)).await
    }

    pub async fn status(&self) -> PlayerResult<Option<PlayerView>> {
        self.send(PlayerCommand::Status).await
    }

    /// Ask the loop to tear down and exit
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }
}

pub struct PlayerSession<F: HandleFactory> {
    factory: F,
    catalog: Catalog,
    config: SessionConfig,
    player: Option<StemPlayer<F::Handle>>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<HandleEvent>,
    events_rx: mpsc::UnboundedReceiver<HandleEvent>,
    requests: mpsc::UnboundedReceiver<Message>,
}

impl<F: HandleFactory> PlayerSession<F> {
    pub fn new(factory: F, catalog: Catalog, config: SessionConfig) -> (Self, SessionHandle) {
        let (tx, requests) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            factory,
            catalog,
            config,
            player: None,
            generation: 0,
            events_tx,
            events_rx,
            requests,
        };
        (session, SessionHandle { tx })
    }

    /// Process requests and notifications until shut down or every handle is dropped
    pub async fn run(mut self) {
        let fixed_interval = self.config.sync_mode == SyncMode::FixedInterval;
        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        log::info!("[Session] Running ({:?})", self.config.sync_mode);

        loop {
            tokio::select! {
                // Host notifications queued before a request are applied first
                biased;

                Some(event) = self.events_rx.recv() => self.on_event(event),
                message = self.requests.recv() => match message {
                    Some(Message::Request(command, reply)) => {
                        let result = self.apply(command);
                        let _ = reply.send(result);
                    }
                    Some(Message::Shutdown) | None => break,
                },
                _ = ticker.tick(), if fixed_interval => self.on_tick(),
            }
        }

        self.close();
        log::info!("[Session] Stopped");
    }

    fn apply(&mut self, command: PlayerCommand) -> PlayerResult<Option<PlayerView>> {
        match command {
            PlayerCommand::Open(track_id) => {
                let track = self.catalog.get(&track_id)?.clone();
                self.open(&track);
            }
            PlayerCommand::Status => {}
            PlayerCommand::Close => self.close(),
            command => {
                let skip = self.config.skip_seconds;
                let player = self.player.as_mut().ok_or(PlayerError::NoTrackLoaded)?;
                match command {
                    PlayerCommand::Play => player.play(),
                    PlayerCommand::Pause => player.pause(),
                    PlayerCommand::TogglePlayback => {
                        player.toggle_playback();
                    }
                    PlayerCommand::Seek(seconds) => {
                        player.seek(seconds);
                    }
                    PlayerCommand::SkipForward => {
                        player.skip(skip);
                    }
                    PlayerCommand::SkipBackward => {
                        player.skip(-skip);
                    }
                    PlayerCommand::SetVolume(stem, volume) => {
                        player.set_volume(stem, volume);
                    }
                    PlayerCommand::ToggleMute(stem) => {
                        player.toggle_mute(stem);
                    }
                    PlayerCommand::Open(_) | PlayerCommand::Status | PlayerCommand::Close => {}
                }
            }
        }
        Ok(self.player.as_ref().map(|p| p.view()))
    }

    fn open(&mut self, track: &Track) {
        // The previous track's handles are released before new ones exist
        self.close();
        self.generation += 1;
        let sink = EventSink::new(self.generation, self.events_tx.clone());
        let player = StemPlayer::open(track, &mut self.factory, sink)
            .with_tolerance(self.config.tolerance);
        self.player = Some(player);
    }

    fn close(&mut self) {
        if let Some(mut player) = self.player.take() {
            player.teardown();
        }
    }

    fn on_event(&mut self, event: HandleEvent) {
        let Some(player) = self.player.as_mut() else {
            return;
        };
        // The timer drives resynchronization in fixed-interval mode
        if self.config.sync_mode == SyncMode::FixedInterval
            && matches!(event.kind, HandleEventKind::TimeUpdate { .. })
        {
            return;
        }
        if !player.handle_event(&event) {
            log::trace!("[Session] Dropped stale event for generation {}", event.generation);
        }
    }

    fn on_tick(&mut self) {
        if let Some(player) = self.player.as_mut() {
            if player.is_playing() {
                player.resynchronize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::handle::LoadStatus;
    use crate::player::testing::FakeFactory;

    fn start(config: SessionConfig) -> (SessionHandle, FakeFactory, tokio::task::JoinHandle<()>) {
        let factory = FakeFactory::default();
        let (session, handle) = PlayerSession::new(factory.clone(), Catalog::builtin(), config);
        let task = tokio::spawn(session.run());
        (handle, factory, task)
    }

    #[tokio::test]
    async fn test_commands_need_an_open_track() {
        let (handle, _factory, _task) = start(SessionConfig::default());
        assert!(handle.status().await.unwrap().is_none());
        assert!(matches!(handle.play().await, Err(PlayerError::NoTrackLoaded)));
        assert!(matches!(
            handle.open("Nope").await,
            Err(PlayerError::UnknownTrack(_))
        ));
    }

    #[tokio::test]
    async fn test_open_and_play() {
        let (handle, factory, _task) = start(SessionConfig::default());
        let view = handle.open("Belief").await.unwrap();
        assert_eq!(view.title, "Belief");
        assert!(!view.is_playing);
        assert!(view.stems.iter().all(|s| s.status == LoadStatus::Loading));

        let view = handle.play().await.unwrap();
        assert!(view.is_playing);
        for stem in Stem::ALL {
            assert!(factory.state("Belief", stem).unwrap().lock().playing);
        }

        let view = handle.pause().await.unwrap();
        assert!(!view.is_playing);
    }

    #[tokio::test]
    async fn test_master_update_resynchronizes_drifted_stem() {
        let (handle, factory, _task) = start(SessionConfig::default());
        handle.open("Belief").await.unwrap();
        for stem in Stem::ALL {
            factory.state("Belief", stem).unwrap().lock().duration = 240.0;
        }
        handle.play().await.unwrap();

        factory.state("Belief", Stem::Vocals).unwrap().lock().position = 12.34;
        factory.state("Belief", Stem::Drums).unwrap().lock().position = 12.20;
        factory
            .sink("Belief", Stem::Vocals)
            .unwrap()
            .emit(Stem::Vocals, HandleEventKind::TimeUpdate { position: 12.34 });

        let view = handle.status().await.unwrap().unwrap();
        assert_eq!(view.current_time, 12.34);
        let drums = factory.state("Belief", Stem::Drums).unwrap().lock().position;
        assert!((drums - 12.34).abs() < 0.1);
    }

    #[tokio::test]
    async fn test_load_failure_is_local_to_one_stem() {
        let (handle, factory, _task) = start(SessionConfig::default());
        handle.open("Nivel_Raso").await.unwrap();
        let sink = factory.sink("Nivel_Raso", Stem::Bass).unwrap();
        sink.emit(Stem::Vocals, HandleEventKind::Loaded { duration: 100.0 });
        sink.emit(
            Stem::Bass,
            HandleEventKind::LoadFailed { reason: "file not found".to_string() },
        );

        let view = handle.status().await.unwrap().unwrap();
        assert_eq!(view.stem(Stem::Vocals).unwrap().status, LoadStatus::Ready);
        assert_eq!(
            view.stem(Stem::Bass).unwrap().status,
            LoadStatus::Unavailable("file not found".to_string())
        );
        assert_eq!(view.stem(Stem::Drums).unwrap().status, LoadStatus::Loading);
    }

    #[tokio::test]
    async fn test_switching_tracks_releases_previous_handles() {
        let (handle, factory, _task) = start(SessionConfig::default());
        handle.open("Belief").await.unwrap();
        handle.play().await.unwrap();
        let old_sink = factory.sink("Belief", Stem::Vocals).unwrap();

        let view = handle.open("Nivel_Raso").await.unwrap();
        assert_eq!(view.track_id, "Nivel_Raso");
        assert!(!view.is_playing);
        for stem in Stem::ALL {
            let old = factory.state("Belief", stem).unwrap();
            assert!(old.lock().released && !old.lock().playing);
        }

        // Late events of the old track don't touch the new one
        factory.state("Nivel_Raso", Stem::Vocals).unwrap().lock().position = 3.0;
        old_sink.emit(Stem::Vocals, HandleEventKind::TimeUpdate { position: 99.0 });
        let view = handle.status().await.unwrap().unwrap();
        assert_eq!(view.current_time, 0.0);
    }

    #[tokio::test]
    async fn test_skip_uses_configured_step() {
        let config = SessionConfig {
            skip_seconds: 5.0,
            ..SessionConfig::default()
        };
        let (handle, factory, _task) = start(config);
        handle.open("Belief").await.unwrap();
        factory.state("Belief", Stem::Vocals).unwrap().lock().duration = 60.0;

        handle.seek(20.0).await.unwrap();
        let view = handle.send(PlayerCommand::SkipForward).await.unwrap().unwrap();
        assert_eq!(view.current_time, 25.0);
        let view = handle.send(PlayerCommand::SkipBackward).await.unwrap().unwrap();
        assert_eq!(view.current_time, 20.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_mode_resyncs_on_timer() {
        let config = SessionConfig {
            sync_mode: SyncMode::FixedInterval,
            ..SessionConfig::default()
        };
        let (handle, factory, _task) = start(config);
        handle.open("Belief").await.unwrap();
        handle.play().await.unwrap();

        factory.state("Belief", Stem::Vocals).unwrap().lock().position = 7.5;
        factory.state("Belief", Stem::Other).unwrap().lock().position = 7.0;

        // Master updates are not the trigger in this mode
        factory
            .sink("Belief", Stem::Vocals)
            .unwrap()
            .emit(Stem::Vocals, HandleEventKind::TimeUpdate { position: 7.5 });
        tokio::task::yield_now().await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        let view = handle.status().await.unwrap().unwrap();
        assert_eq!(view.current_time, 7.5);
        assert_eq!(factory.state("Belief", Stem::Other).unwrap().lock().position, 7.5);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down() {
        let (handle, factory, task) = start(SessionConfig::default());
        handle.open("Belief").await.unwrap();
        handle.play().await.unwrap();
        handle.shutdown();
        task.await.unwrap();

        assert!(factory.state("Belief", Stem::Vocals).unwrap().lock().released);
        assert!(matches!(handle.status().await, Err(PlayerError::SessionClosed)));
    }
}
