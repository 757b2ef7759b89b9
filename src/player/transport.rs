use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::audio::tap::SampleTap;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("platform refused playback: {0}")]
    PlatformDenied(String),
    #[error("cannot load {}: {reason}", path.display())]
    ResourceUnavailable { path: PathBuf, reason: String },
}

/// Identifies one play attempt. Only the latest ticket's outcome counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayTicket(pub u64);

#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    PlayResolved {
        ticket: PlayTicket,
        result: Result<(), PlaybackError>,
    },
    MetadataLoaded(Duration),
    Ended,
}

/// The single playable audio element shared by the player components.
///
/// Starting playback is asynchronous: `request_play` returns at once and the
/// outcome is delivered later through `poll_events`.
pub trait Transport {
    fn set_source(&mut self, path: &Path);
    fn request_play(&mut self, ticket: PlayTicket);
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    fn set_volume(&mut self, volume: f32);
    fn current_time(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    /// Live signal for analysis, if the platform exposes one.
    fn tap(&self) -> Option<SampleTap>;
    fn poll_events(&mut self) -> Vec<TransportEvent>;
}

/// Short audible acknowledgement for control changes.
pub trait FeedbackCue {
    fn play_cue(&mut self, playback_rate: f32);
}

#[cfg(test)]
pub mod scripted {
    //! In-memory transport whose play attempts resolve when the test says so.

    use super::*;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub struct ScriptedTransport {
        pub source: Option<PathBuf>,
        pub sources_loaded: Vec<PathBuf>,
        pub pending: VecDeque<PlayTicket>,
        pub events: Vec<TransportEvent>,
        pub paused: bool,
        pub volume: f32,
        pub deny_all: bool,
        pub auto_resolve: bool,
        pub tap: Option<SampleTap>,
        pub cue_rates: Vec<f32>,
    }

    impl ScriptedTransport {
        /// Resolves every play request successfully as soon as it is polled.
        pub fn granting() -> Self {
            Self {
                paused: true,
                auto_resolve: true,
                tap: Some(SampleTap::new(1024)),
                ..Self::default()
            }
        }

        pub fn denying() -> Self {
            Self {
                deny_all: true,
                ..Self::granting()
            }
        }

        /// Holds play requests until `resolve` is called.
        pub fn manual() -> Self {
            Self {
                auto_resolve: false,
                ..Self::granting()
            }
        }

        pub fn resolve(&mut self, ticket: PlayTicket, result: Result<(), PlaybackError>) {
            self.pending.retain(|t| *t != ticket);
            if result.is_ok() {
                self.paused = false;
            }
            self.events.push(TransportEvent::PlayResolved { ticket, result });
        }

        pub fn finish_track(&mut self) {
            self.paused = true;
            self.events.push(TransportEvent::Ended);
        }
    }

    impl Transport for ScriptedTransport {
        fn set_source(&mut self, path: &Path) {
            self.paused = true;
            self.source = Some(path.to_path_buf());
            self.sources_loaded.push(path.to_path_buf());
        }

        fn request_play(&mut self, ticket: PlayTicket) {
            self.pending.push_back(ticket);
        }

        fn pause(&mut self) {
            self.paused = true;
        }

        fn is_paused(&self) -> bool {
            self.paused
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }

        fn current_time(&self) -> Duration {
            Duration::from_secs(83)
        }

        fn duration(&self) -> Option<Duration> {
            None
        }

        fn tap(&self) -> Option<SampleTap> {
            self.tap.clone()
        }

        fn poll_events(&mut self) -> Vec<TransportEvent> {
            if self.auto_resolve {
                while let Some(ticket) = self.pending.pop_front() {
                    let result = if self.deny_all {
                        Err(PlaybackError::PlatformDenied("autoplay blocked".into()))
                    } else {
                        Ok(())
                    };
                    self.resolve(ticket, result);
                }
            }
            std::mem::take(&mut self.events)
        }
    }

    impl FeedbackCue for ScriptedTransport {
        fn play_cue(&mut self, playback_rate: f32) {
            self.cue_rates.push(playback_rate);
        }
    }
}
