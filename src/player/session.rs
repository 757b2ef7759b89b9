use rand::rngs::StdRng;
use rand::Rng;
use std::time::Duration;

use super::controller::{PlayIntent, PlaybackController, Toggle};
use super::playlist::Track;
use super::transport::{FeedbackCue, Transport, TransportEvent};
use crate::audio::analyzer::SpectrumAnalyzer;
use crate::vu::animation::{AnimationLoop, Tick};
use crate::vu::meter::{VuGrid, VuMeter};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    TogglePlayPause,
    Previous,
    Next,
    VolumeUp,
    VolumeDown,
    SetVolume(f32),
    RevealUnreleased,
    ListPlaylist,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        let mut parts = line.split_whitespace();
        let command = match parts.next()? {
            "p" | "play" | "pause" => Command::TogglePlayPause,
            "b" | "prev" => Command::Previous,
            "n" | "next" => Command::Next,
            "+" => Command::VolumeUp,
            "-" => Command::VolumeDown,
            "v" | "vol" => Command::SetVolume(parts.next()?.parse().ok()?),
            "u" | "unreleased" => Command::RevealUnreleased,
            "l" | "list" => Command::ListPlaylist,
            "q" | "quit" => Command::Quit,
            _ => return None,
        };
        Some(command)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// What the front end shows for the current frame.
#[derive(Clone, Debug)]
pub struct Status<'a> {
    pub button_label: &'static str,
    pub title: &'a str,
    pub elapsed: Duration,
    pub total: Option<Duration>,
    pub volume: f32,
    pub grid: &'a VuGrid,
}

/// One listening session: playlist and transport state, the analysis graph
/// and the meter it drives.
pub struct PlayerSession<T, R = StdRng> {
    controller: PlaybackController<T, R>,
    analyzer: SpectrumAnalyzer,
    meter: VuMeter,
    animation: AnimationLoop,
    unreleased: Vec<Track>,
    unreleased_revealed: bool,
    audio_enabled: bool,
}

impl<T, R> PlayerSession<T, R>
where
    T: Transport + FeedbackCue,
    R: Rng,
{
    pub fn new(controller: PlaybackController<T, R>, bars: usize, unreleased: Vec<Track>) -> Self {
        Self {
            controller,
            analyzer: SpectrumAnalyzer::new(),
            meter: VuMeter::new(bars),
            animation: AnimationLoop::new(),
            unreleased,
            unreleased_revealed: false,
            audio_enabled: false,
        }
    }

    pub fn controller(&self) -> &PlaybackController<T, R> {
        &self.controller
    }

    #[cfg(test)]
    pub fn analyzer(&self) -> &SpectrumAnalyzer {
        &self.analyzer
    }

    pub fn animation(&self) -> &AnimationLoop {
        &self.animation
    }

    #[cfg(test)]
    pub fn grid(&self) -> &VuGrid {
        self.meter.grid()
    }

    /// Loads a random track and attempts playback.
    pub fn start(&mut self) {
        self.controller.start();
    }

    /// First user interaction: playback may start and analysis can attach.
    pub fn enable_audio(&mut self) {
        if self.audio_enabled {
            return;
        }
        self.audio_enabled = true;
        if !self.controller.is_playing() && !self.controller.has_pending_play() {
            self.controller.play();
        }
        self.analyzer.attach(self.controller.transport().tap());
        self.animation.start();
    }

    pub fn handle_command(&mut self, command: Command) -> Flow {
        if command == Command::Quit {
            return Flow::Quit;
        }
        self.enable_audio();

        match command {
            Command::TogglePlayPause => {
                if self.controller.toggle_play_pause() == Toggle::Paused {
                    self.analyzer.suspend();
                }
            }
            Command::Previous => {
                self.controller.previous();
            }
            Command::Next => {
                self.controller.next();
            }
            Command::VolumeUp => {
                self.controller.step_volume(1);
            }
            Command::VolumeDown => {
                self.controller.step_volume(-1);
            }
            Command::SetVolume(volume) => {
                self.controller.set_volume(volume);
            }
            Command::RevealUnreleased => {
                self.reveal_unreleased();
            }
            Command::ListPlaylist | Command::Quit => {}
        }
        Flow::Continue
    }

    /// Adds the hidden tracks once and jumps to the last of them.
    pub fn reveal_unreleased(&mut self) -> bool {
        if self.unreleased_revealed {
            log::info!("Unreleased tracks are already in the playlist");
            return false;
        }
        self.unreleased_revealed = true;
        let tracks = std::mem::take(&mut self.unreleased);
        self.controller.extend_playlist(tracks).is_some()
    }

    pub fn poll_transport(&mut self) {
        let events = self.controller.transport_mut().poll_events();
        for event in events {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PlayResolved { ticket, result } => {
                let Some(intent) = self.controller.resolve_play(ticket, result) else {
                    return;
                };
                if intent == PlayIntent::Resume || self.audio_enabled {
                    self.analyzer.attach(self.controller.transport().tap());
                }
                self.analyzer.resume();
                self.animation.start();
            }
            TransportEvent::MetadataLoaded(duration) => {
                log::debug!("Track length {:.1}s", duration.as_secs_f32());
            }
            TransportEvent::Ended => {
                log::info!("Finished: {}", self.controller.current_track().title);
                self.controller.on_track_ended();
            }
        }
    }

    /// Runs one display frame of the meter animation.
    pub fn frame(&mut self) -> Tick {
        let playing = self.controller.is_playing() && !self.controller.transport().is_paused();
        self.animation.tick(playing, &mut self.analyzer, &mut self.meter)
    }

    pub fn status(&self) -> Status<'_> {
        let transport = self.controller.transport();
        Status {
            button_label: self.controller.button_label(),
            title: &self.controller.current_track().title,
            elapsed: transport.current_time(),
            total: transport.duration(),
            volume: self.controller.state().volume(),
            grid: self.meter.grid(),
        }
    }
}
