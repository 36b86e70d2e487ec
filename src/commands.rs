// Console command handlers
// Text front end standing in for the presentation layer

use std::fmt::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::audio::handle::LoadStatus;
use crate::library::catalog::Catalog;
use crate::metronome::{ClickSink, Metronome};
use crate::player::display::{percent_to_volume, PlayerView};
use crate::player::session::{PlayerCommand, SessionHandle};
use crate::player::stem::Stem;

const HELP: &str = "\
commands:
  tracks                     list the catalog
  open <track>               load a track's stems
  play | pause | toggle      transport
  seek <m:ss | seconds>      jump to a position
  ff | rw                    skip forward / back
  vol <stem> <0-100>         set a stem's volume
  mute <stem>                toggle a stem's mute
  status                     show the player
  metronome start|stop       click track
  metronome bpm <n>          set the tempo
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum MetronomeCommand {
    Start,
    Stop,
    Bpm(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Help,
    Tracks,
    Player(PlayerCommand),
    Metronome(MetronomeCommand),
    Quit,
}

/// Parse "1:23", "1:23.5" or "83.5" into seconds
pub fn parse_time(input: &str) -> Result<f64, String> {
    let input = input.trim();
    let seconds = match input.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: u64 = minutes
                .parse()
                .map_err(|_| format!("Invalid minutes in '{}'", input))?;
            let seconds: f64 = seconds
                .parse()
                .map_err(|_| format!("Invalid seconds in '{}'", input))?;
            if !(0.0..60.0).contains(&seconds) {
                return Err(format!("Seconds out of range in '{}'", input));
            }
            minutes as f64 * 60.0 + seconds
        }
        None => input
            .parse::<f64>()
            .map_err(|_| format!("Invalid time '{}'", input))?,
    };

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("Invalid time '{}'", input));
    }
    Ok(seconds)
}

fn parse_stem(input: Option<&str>) -> Result<Stem, String> {
    input
        .ok_or_else(|| "Missing stem name".to_string())?
        .parse::<Stem>()
        .map_err(|e| e.to_string())
}

pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("Empty command".to_string());
    };

    let command = match verb.to_lowercase().as_str() {
        "help" | "?" => ConsoleCommand::Help,
        "tracks" | "ls" => ConsoleCommand::Tracks,
        "open" => {
            let track = words.next().ok_or_else(|| "Missing track name".to_string())?;
            ConsoleCommand::Player(PlayerCommand::Open(track.to_string()))
        }
        "play" => ConsoleCommand::Player(PlayerCommand::Play),
        "pause" => ConsoleCommand::Player(PlayerCommand::Pause),
        "toggle" | "p" => ConsoleCommand::Player(PlayerCommand::TogglePlayback),
        "seek" => {
            let time = words.next().ok_or_else(|| "Missing time".to_string())?;
            ConsoleCommand::Player(PlayerCommand::Seek(parse_time(time)?))
        }
        "ff" => ConsoleCommand::Player(PlayerCommand::SkipForward),
        "rw" => ConsoleCommand::Player(PlayerCommand::SkipBackward),
        "vol" | "volume" => {
            let stem = parse_stem(words.next())?;
            let percent: f32 = words
                .next()
                .ok_or_else(|| "Missing volume".to_string())?
                .parse()
                .map_err(|e| format!("Invalid volume: {}", e))?;
            ConsoleCommand::Player(PlayerCommand::SetVolume(stem, percent_to_volume(percent)))
        }
        "mute" => ConsoleCommand::Player(PlayerCommand::ToggleMute(parse_stem(words.next())?)),
        "status" | "s" => ConsoleCommand::Player(PlayerCommand::Status),
        "close" => ConsoleCommand::Player(PlayerCommand::Close),
        "metronome" | "m" => match words.next() {
            Some("start") => ConsoleCommand::Metronome(MetronomeCommand::Start),
            Some("stop") => ConsoleCommand::Metronome(MetronomeCommand::Stop),
            Some("bpm") => {
                let bpm = words
                    .next()
                    .ok_or_else(|| "Missing BPM".to_string())?
                    .parse::<i64>()
                    .map_err(|e| format!("Invalid BPM: {}", e))?;
                ConsoleCommand::Metronome(MetronomeCommand::Bpm(bpm))
            }
            _ => return Err("Usage: metronome start|stop|bpm <n>".to_string()),
        },
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(format!("Unknown command '{}' (try 'help')", other)),
    };

    Ok(command)
}

/// Text rendering of the player for the console
pub fn render_view(view: &PlayerView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}  [{}]  {} / {}",
        view.title,
        if view.is_playing { "playing" } else { "paused" },
        view.current_time_label,
        view.duration_label
    );
    for stem in &view.stems {
        let level = if stem.silent {
            "muted".to_string()
        } else {
            stem.volume_percent.to_string()
        };
        let _ = write!(
            out,
            "  [{}] {:<7} {:>5}",
            if stem.muted { "M" } else { "U" },
            stem.label,
            level
        );
        match &stem.status {
            LoadStatus::Ready => {}
            LoadStatus::Loading => out.push_str("  (loading)"),
            LoadStatus::Unavailable(reason) => {
                let _ = write!(out, "  (unavailable: {})", reason);
            }
        }
        out.push('\n');
    }
    out
}

pub struct Console {
    session: SessionHandle,
    catalog: Catalog,
    metronome: Metronome,
    click: Option<Arc<dyn ClickSink>>,
}

impl Console {
    pub fn new(
        session: SessionHandle,
        catalog: Catalog,
        metronome: Metronome,
        click: Option<Arc<dyn ClickSink>>,
    ) -> Self {
        Self {
            session,
            catalog,
            metronome,
            click,
        }
    }

    /// Run one command, returning the text to print
    pub async fn execute(&mut self, command: ConsoleCommand) -> Result<String, String> {
        match command {
            ConsoleCommand::Help => Ok(HELP.to_string()),
            ConsoleCommand::Tracks => Ok(self
                .catalog
                .tracks()
                .iter()
                .map(|t| format!("  {:<32} {}\n", t.id, t.title))
                .collect()),
            ConsoleCommand::Player(command) => {
                let view = self
                    .session
                    .send(command)
                    .await
                    .map_err(|e| format!("Player error: {}", e))?;
                Ok(view.map(|v| render_view(&v)).unwrap_or_else(|| "No track loaded".to_string()))
            }
            ConsoleCommand::Metronome(MetronomeCommand::Start) => {
                let click = self
                    .click
                    .clone()
                    .ok_or_else(|| "Click sound is not loaded".to_string())?;
                self.metronome
                    .start(click)
                    .map_err(|e| format!("Failed to start metronome: {}", e))?;
                Ok(format!("Metronome running at {} BPM", self.metronome.bpm()))
            }
            ConsoleCommand::Metronome(MetronomeCommand::Stop) => {
                self.metronome.stop();
                Ok("Metronome stopped".to_string())
            }
            ConsoleCommand::Metronome(MetronomeCommand::Bpm(bpm)) => {
                let bpm = self.metronome.set_bpm(bpm);
                Ok(format!(
                    "Metronome at {} BPM ({} ms per beat)",
                    bpm,
                    self.metronome.interval().as_millis()
                ))
            }
            ConsoleCommand::Quit => Ok(String::new()),
        }
    }

    /// Read commands from stdin until `quit` or end of input
    pub async fn run(self) -> anyhow::Result<()> {
        println!("{}", HELP);
        self.run_with(BufReader::new(tokio::io::stdin())).await
    }

    /// Serve commands from `input`. The session is shut down however reading ends.
    pub async fn run_with<R: AsyncBufRead + Unpin>(mut self, input: R) -> anyhow::Result<()> {
        let result = self.serve(input).await;
        if let Err(e) = &result {
            log::error!("[Console] Input failed: {}", e);
        }
        self.metronome.stop();
        self.session.shutdown();
        result
    }

    async fn serve<R: AsyncBufRead + Unpin>(&mut self, input: R) -> anyhow::Result<()> {
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(ConsoleCommand::Quit) => break,
                Ok(command) => match self.execute(command).await {
                    Ok(text) => println!("{}", text.trim_end()),
                    Err(e) => eprintln!("{}", e),
                },
                Err(e) => eprintln!("{}", e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::session::{PlayerSession, SessionConfig};
    use crate::player::testing::FakeFactory;

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("83.5"), Ok(83.5));
        assert_eq!(parse_time("1:23"), Ok(83.0));
        assert_eq!(parse_time("0:07.5"), Ok(7.5));
        assert!(parse_time("1:75").is_err());
        assert!(parse_time("-4").is_err());
        assert!(parse_time("abc").is_err());
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_command("open Belief"),
            Ok(ConsoleCommand::Player(PlayerCommand::Open("Belief".to_string())))
        );
        assert_eq!(
            parse_command("vol Bass 70"),
            Ok(ConsoleCommand::Player(PlayerCommand::SetVolume(Stem::Bass, 0.7)))
        );
        assert_eq!(
            parse_command("vol drums 250"),
            Ok(ConsoleCommand::Player(PlayerCommand::SetVolume(Stem::Drums, 1.0)))
        );
        assert_eq!(
            parse_command("seek 2:05"),
            Ok(ConsoleCommand::Player(PlayerCommand::Seek(125.0)))
        );
        assert_eq!(
            parse_command("metronome bpm 90"),
            Ok(ConsoleCommand::Metronome(MetronomeCommand::Bpm(90)))
        );
        assert_eq!(parse_command("QUIT"), Ok(ConsoleCommand::Quit));
        assert!(parse_command("mute guitar").is_err());
        assert!(parse_command("vol bass").is_err());
        assert!(parse_command("dance").is_err());
        assert!(parse_command("   ").is_err());
    }

    #[tokio::test]
    async fn test_console_drives_session() {
        let (session, handle) =
            PlayerSession::new(FakeFactory::default(), Catalog::builtin(), SessionConfig::default());
        tokio::spawn(session.run());
        let mut console = Console::new(handle, Catalog::builtin(), Metronome::default(), None);

        let text = console.execute(ConsoleCommand::Tracks).await.unwrap();
        assert!(text.contains("Ate Que A Casa Esteja Cheia"));

        let text = console.execute(parse_command("status").unwrap()).await.unwrap();
        assert_eq!(text, "No track loaded");

        console.execute(parse_command("open Belief").unwrap()).await.unwrap();
        let text = console.execute(parse_command("mute bass").unwrap()).await.unwrap();
        assert!(text.contains("[M] Bass    muted"));
        assert!(text.contains("Belief  [paused]  0:00 / 0:00"));

        let err = console
            .execute(ConsoleCommand::Metronome(MetronomeCommand::Start))
            .await
            .unwrap_err();
        assert!(err.contains("not loaded"));
    }

    #[tokio::test]
    async fn test_unreadable_input_still_shuts_session_down() {
        let factory = FakeFactory::default();
        let (session, handle) =
            PlayerSession::new(factory.clone(), Catalog::builtin(), SessionConfig::default());
        let task = tokio::spawn(session.run());
        let console = Console::new(handle.clone(), Catalog::builtin(), Metronome::default(), None);

        let input: &[u8] = b"open Belief\nplay\n\xff\xfe\n";
        assert!(console.run_with(input).await.is_err());

        // The session exits even though this handle is still alive
        task.await.unwrap();
        assert!(factory.state("Belief", Stem::Vocals).unwrap().lock().released);
        assert!(handle.status().await.is_err());
    }

    #[tokio::test]
    async fn test_quit_shuts_session_down() {
        let (session, handle) =
            PlayerSession::new(FakeFactory::default(), Catalog::builtin(), SessionConfig::default());
        let task = tokio::spawn(session.run());
        let console = Console::new(handle.clone(), Catalog::builtin(), Metronome::default(), None);

        let input: &[u8] = b"tracks\nbogus\nquit\nplay\n";
        console.run_with(input).await.unwrap();
        task.await.unwrap();
    }
}
