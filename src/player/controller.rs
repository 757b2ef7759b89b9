use rand::rngs::StdRng;
use rand::Rng;
use std::path::PathBuf;

use super::playlist::{Playlist, Track};
use super::transport::{FeedbackCue, PlayTicket, PlaybackError, Transport};

const VOLUME_STEPS: u8 = 10;
const CUE_RATE_MIN: f32 = 0.8;
const CUE_RATE_MAX: f32 = 1.2;

/// Why a play attempt was made, reported back once it succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayIntent {
    /// A track change (initial load, prev/next, auto-advance, extension).
    Load,
    /// The user resumed from pause.
    Resume,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Toggle {
    Requested(PlayTicket),
    Paused,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackState {
    pub current_track_index: usize,
    pub is_playing: bool,
    volume_steps: u8,
}

impl PlaybackState {
    pub fn volume(&self) -> f32 {
        f32::from(self.volume_steps) / f32::from(VOLUME_STEPS)
    }
}

#[derive(Clone, Copy, Debug)]
struct PendingPlay {
    ticket: PlayTicket,
    intent: PlayIntent,
}

/// Owns the playlist, transport state and track selection policy.
pub struct PlaybackController<T, R = StdRng> {
    transport: T,
    playlist: Playlist,
    asset_base: PathBuf,
    state: PlaybackState,
    rng: R,
    next_ticket: u64,
    pending: Option<PendingPlay>,
}

impl<T, R> PlaybackController<T, R>
where
    T: Transport + FeedbackCue,
    R: Rng,
{
    pub fn new(
        mut transport: T,
        playlist: Playlist,
        asset_base: impl Into<PathBuf>,
        initial_volume: f32,
        rng: R,
    ) -> Self {
        let volume_steps = quantize_volume(initial_volume).unwrap_or(2);
        transport.set_volume(f32::from(volume_steps) / f32::from(VOLUME_STEPS));
        Self {
            transport,
            playlist,
            asset_base: asset_base.into(),
            state: PlaybackState {
                current_track_index: 0,
                is_playing: false,
                volume_steps,
            },
            rng,
            next_ticket: 0,
            pending: None,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn has_pending_play(&self) -> bool {
        self.pending.is_some()
    }

    pub fn current_track(&self) -> &Track {
        self.playlist.track(self.state.current_track_index)
    }

    pub fn button_label(&self) -> &'static str {
        if self.state.is_playing {
            "Pause"
        } else {
            "Play"
        }
    }

    /// Loads a uniformly random track, as on page open.
    pub fn start(&mut self) -> PlayTicket {
        let index = self.rng.random_range(0..self.playlist.len());
        self.load_track(index)
    }

    /// Makes `index` current and attempts playback. The index wraps modulo
    /// the playlist length.
    pub fn load_track(&mut self, index: usize) -> PlayTicket {
        let index = index % self.playlist.len();
        self.state.current_track_index = index;
        self.state.is_playing = false;

        let track = self.playlist.track(index);
        let path = track.resolve(&self.asset_base);
        log::info!("Loading track {}: {}", index, track.title);
        self.transport.set_source(&path);
        self.request_play(PlayIntent::Load)
    }

    /// Attempts playback of the current source (first user interaction).
    pub fn play(&mut self) -> PlayTicket {
        self.request_play(PlayIntent::Resume)
    }

    /// A play attempt still in flight counts as playing, so toggling during a
    /// load cancels it.
    pub fn toggle_play_pause(&mut self) -> Toggle {
        if self.transport.is_paused() && self.pending.is_none() {
            Toggle::Requested(self.request_play(PlayIntent::Resume))
        } else {
            self.transport.pause();
            self.state.is_playing = false;
            self.pending = None;
            Toggle::Paused
        }
    }

    pub fn previous(&mut self) -> PlayTicket {
        let index = self.playlist.previous_index(self.state.current_track_index);
        self.load_track(index)
    }

    pub fn next(&mut self) -> PlayTicket {
        let index = self.playlist.next_index(self.state.current_track_index);
        self.load_track(index)
    }

    /// Picks a random track other than the one that just finished. A
    /// single-track playlist replays that track.
    pub fn on_track_ended(&mut self) -> PlayTicket {
        let len = self.playlist.len();
        let current = self.state.current_track_index;
        let index = if len > 1 {
            let pick = self.rng.random_range(0..len - 1);
            if pick >= current {
                pick + 1
            } else {
                pick
            }
        } else {
            0
        };
        self.load_track(index)
    }

    /// Snaps to the nearest 0.1 step within [0, 1] and plays the feedback cue.
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        let Some(steps) = quantize_volume(volume) else {
            log::warn!("Ignoring non-finite volume {}", volume);
            return self.state.volume();
        };
        self.state.volume_steps = steps;
        let volume = self.state.volume();
        self.transport.set_volume(volume);

        let rate = self.rng.random_range(CUE_RATE_MIN..=CUE_RATE_MAX);
        self.transport.play_cue(rate);
        volume
    }

    pub fn step_volume(&mut self, delta: i8) -> f32 {
        let steps = (i16::from(self.state.volume_steps) + i16::from(delta))
            .clamp(0, i16::from(VOLUME_STEPS));
        self.set_volume(steps as f32 / f32::from(VOLUME_STEPS))
    }

    /// Appends `tracks` and jumps to the last one. Nothing happens for an
    /// empty list.
    pub fn extend_playlist(&mut self, tracks: Vec<Track>) -> Option<PlayTicket> {
        if tracks.is_empty() {
            log::warn!("No tracks to add to the playlist");
            return None;
        }
        let added = tracks.len();
        self.playlist.extend(tracks);
        log::info!(
            "Added {} track(s) to the playlist ({} total)",
            added,
            self.playlist.len()
        );
        Some(self.load_track(self.playlist.len() - 1))
    }

    /// Applies the outcome of a play attempt. Returns the intent when the
    /// latest attempt started playback; stale outcomes are ignored.
    pub fn resolve_play(
        &mut self,
        ticket: PlayTicket,
        result: Result<(), PlaybackError>,
    ) -> Option<PlayIntent> {
        let pending = match self.pending {
            Some(pending) if pending.ticket == ticket => pending,
            _ => {
                log::debug!("Ignoring superseded play attempt {:?}", ticket);
                return None;
            }
        };
        self.pending = None;

        match result {
            Ok(()) => {
                self.state.is_playing = true;
                Some(pending.intent)
            }
            Err(e) => {
                log::warn!("Playback was prevented: {}", e);
                self.state.is_playing = false;
                None
            }
        }
    }

    fn request_play(&mut self, intent: PlayIntent) -> PlayTicket {
        self.next_ticket += 1;
        let ticket = PlayTicket(self.next_ticket);
        self.pending = Some(PendingPlay { ticket, intent });
        self.transport.request_play(ticket);
        ticket
    }
}

fn quantize_volume(volume: f32) -> Option<u8> {
    if !volume.is_finite() {
        return None;
    }
    Some((volume.clamp(0.0, 1.0) * f32::from(VOLUME_STEPS)).round() as u8)
}
