use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::f32::consts::TAU;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::decode::{decode_audio, AudioData};
use super::resample::resample;
use super::tap::SampleTap;
use crate::audio::analyzer::FFT_SIZE;
use crate::player::transport::{
    FeedbackCue, PlayTicket, PlaybackError, Transport, TransportEvent,
};

const CUE_FREQUENCY: f32 = 880.0;
const CUE_LENGTH: Duration = Duration::from_millis(45);
const CUE_GAIN: f32 = 0.5;

/// Short decaying sine, pitched by the requested playback rate.
struct CueVoice {
    phase: f32,
    step: f32,
    remaining: usize,
    total: usize,
}

impl CueVoice {
    fn new(rate: f32, sample_rate: u32) -> Self {
        let total = (CUE_LENGTH.as_secs_f32() * sample_rate as f32) as usize;
        Self {
            phase: 0.0,
            step: TAU * CUE_FREQUENCY * rate / sample_rate as f32,
            remaining: total,
            total: total.max(1),
        }
    }

    fn next_sample(&mut self) -> Option<f32> {
        if self.remaining == 0 {
            return None;
        }
        let envelope = self.remaining as f32 / self.total as f32;
        let sample = self.phase.sin() * envelope * envelope * CUE_GAIN;
        self.phase = (self.phase + self.step) % TAU;
        self.remaining -= 1;
        Some(sample)
    }
}

/// State shared with the output callback.
#[derive(Default)]
struct Shared {
    track: Option<Arc<AudioData>>,
    cursor: usize,
    playing: bool,
    volume: f32,
    ended: bool,
    cue: Option<CueVoice>,
}

impl Shared {
    /// Writes one output frame of music and returns its mono level.
    fn music_frame(&mut self, frame: &mut [f32]) -> f32 {
        let Some(track) = self.track.as_deref().filter(|_| self.playing) else {
            frame.fill(0.0);
            return 0.0;
        };
        if self.cursor >= track.frames() {
            self.playing = false;
            self.ended = true;
            frame.fill(0.0);
            return 0.0;
        }

        let base = self.cursor * track.channels;
        let source = &track.samples[base..base + track.channels];
        let mono = source.iter().sum::<f32>() / track.channels as f32 * self.volume;
        if frame.len() == 1 {
            frame[0] = mono;
        } else {
            for (c, out) in frame.iter_mut().enumerate() {
                *out = source[c.min(track.channels - 1)] * self.volume;
            }
        }

        self.cursor += 1;
        if self.cursor >= track.frames() {
            self.playing = false;
            self.ended = true;
        }
        mono
    }

    fn fill(&mut self, data: &mut [f32], channels: usize, mono: &mut Vec<f32>) {
        mono.clear();
        for frame in data.chunks_mut(channels) {
            mono.push(self.music_frame(frame));
            if let Some(cue) = self.cue.as_mut() {
                match cue.next_sample() {
                    Some(s) => frame.iter_mut().for_each(|out| *out += s),
                    None => self.cue = None,
                }
            }
        }
    }
}

struct LoadRequest {
    generation: u64,
    path: PathBuf,
}

struct Loaded {
    generation: u64,
    path: PathBuf,
    result: Result<AudioData>,
}

/// Decodes requested tracks one at a time. Requests queued behind the one
/// being decoded collapse into the newest.
fn run_decoder(
    requests: Receiver<LoadRequest>,
    loaded: Sender<Loaded>,
    mut load: impl FnMut(&Path) -> Result<AudioData>,
) {
    while let Ok(mut request) = requests.recv() {
        while let Ok(newer) = requests.try_recv() {
            log::debug!("Skipping superseded load of {}", request.path.display());
            request = newer;
        }
        let result = load(&request.path);
        let sent = loaded.send(Loaded {
            generation: request.generation,
            path: request.path,
            result,
        });
        // Receiver gone means the player is shutting down
        if sent.is_err() {
            break;
        }
    }
}

fn play_stream(stream: &cpal::Stream) -> Result<(), PlaybackError> {
    stream
        .play()
        .map_err(|e| PlaybackError::PlatformDenied(e.to_string()))
}

/// Load progress and play tickets for the current source. Starting the
/// device is passed in by the caller.
struct SourceState {
    shared: Arc<Mutex<Shared>>,
    generation: u64,
    source: Option<PathBuf>,
    ready: bool,
    load_error: Option<String>,
    waiting: Option<PlayTicket>,
    duration: Option<Duration>,
    events: Vec<TransportEvent>,
}

impl SourceState {
    fn new(shared: Arc<Mutex<Shared>>) -> Self {
        Self {
            shared,
            generation: 0,
            source: None,
            ready: false,
            load_error: None,
            waiting: None,
            duration: None,
            events: Vec::new(),
        }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forgets the previous source and returns the generation its decode
    /// must carry.
    fn replace(&mut self, path: &Path) -> u64 {
        self.generation += 1;
        self.source = Some(path.to_path_buf());
        self.ready = false;
        self.load_error = None;
        self.waiting = None;
        self.duration = None;
        let mut shared = self.shared();
        shared.track = None;
        shared.cursor = 0;
        shared.playing = false;
        shared.ended = false;
        self.generation
    }

    fn request_play(
        &mut self,
        ticket: PlayTicket,
        play: impl FnOnce() -> Result<(), PlaybackError>,
    ) {
        if self.ready {
            self.start(ticket, play);
        } else if let (Some(path), Some(reason)) = (&self.source, &self.load_error) {
            let error = PlaybackError::ResourceUnavailable {
                path: path.clone(),
                reason: reason.clone(),
            };
            self.events.push(TransportEvent::PlayResolved {
                ticket,
                result: Err(error),
            });
        } else if self.source.is_some() {
            self.waiting = Some(ticket);
        } else {
            self.events.push(TransportEvent::PlayResolved {
                ticket,
                result: Err(PlaybackError::PlatformDenied("no source loaded".into())),
            });
        }
    }

    fn pause(&mut self) {
        self.waiting = None;
        self.shared().playing = false;
    }

    fn start(&mut self, ticket: PlayTicket, play: impl FnOnce() -> Result<(), PlaybackError>) {
        let result = play();
        if result.is_ok() {
            let mut shared = self.shared();
            let finished = shared
                .track
                .as_ref()
                .is_some_and(|t| shared.cursor >= t.frames());
            if finished {
                shared.cursor = 0;
                shared.ended = false;
            }
            shared.playing = true;
        }
        self.events.push(TransportEvent::PlayResolved { ticket, result });
    }

    fn install(&mut self, loaded: Loaded, play: impl FnOnce() -> Result<(), PlaybackError>) {
        if loaded.generation != self.generation {
            log::debug!("Dropping stale decode of {}", loaded.path.display());
            return;
        }
        let result = loaded.result.and_then(|audio| {
            if audio.frames() == 0 {
                bail!("no audio frames decoded");
            }
            Ok(audio)
        });
        match result {
            Ok(audio) => {
                let duration = Duration::from_secs_f32(audio.duration_secs());
                self.shared().track = Some(Arc::new(audio));
                self.ready = true;
                self.duration = Some(duration);
                self.events.push(TransportEvent::MetadataLoaded(duration));
                if let Some(ticket) = self.waiting.take() {
                    self.start(ticket, play);
                }
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                self.load_error = Some(reason.clone());
                if let Some(ticket) = self.waiting.take() {
                    let error = PlaybackError::ResourceUnavailable {
                        path: loaded.path,
                        reason,
                    };
                    self.events.push(TransportEvent::PlayResolved {
                        ticket,
                        result: Err(error),
                    });
                } else {
                    log::warn!("Failed to load {}: {}", loaded.path.display(), reason);
                }
            }
        }
    }

    fn take_events(&mut self) -> Vec<TransportEvent> {
        let ended = std::mem::take(&mut self.shared().ended);
        if ended {
            self.events.push(TransportEvent::Ended);
        }
        std::mem::take(&mut self.events)
    }
}

/// Plays decoded tracks through the default output device.
pub struct CpalTransport {
    stream: cpal::Stream,
    state: SourceState,
    tap: SampleTap,
    sample_rate: u32,
    requests: Sender<LoadRequest>,
    loaded: Receiver<Loaded>,
}

impl CpalTransport {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No audio output device found")?;
        let supported = device
            .default_output_config()
            .context("Failed to get audio output config")?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            bail!(
                "Unsupported output sample format {:?} (need f32)",
                supported.sample_format()
            );
        }

        let config: cpal::StreamConfig = supported.into();
        let channels = usize::from(config.channels);
        let sample_rate = config.sample_rate.0;
        log::info!(
            "Audio: {} @ {}Hz, {} ch",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate,
            channels
        );

        let shared = Arc::new(Mutex::new(Shared::default()));
        let tap = SampleTap::new(FFT_SIZE * 4);

        let callback_shared = Arc::clone(&shared);
        let callback_tap = tap.clone();
        let mut mono = Vec::new();
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut shared = callback_shared
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner);
                    shared.fill(data, channels, &mut mono);
                    drop(shared);
                    callback_tap.push(&mono);
                },
                |err| log::error!("Audio output error: {}", err),
                None,
            )
            .context("Failed to build audio output stream")?;

        let (requests, request_rx) = channel();
        let (loaded_tx, loaded) = channel();
        std::thread::spawn(move || {
            run_decoder(request_rx, loaded_tx, |path| {
                decode_audio(path).and_then(|audio| resample(audio, sample_rate))
            })
        });

        Ok(Self {
            stream,
            state: SourceState::new(shared),
            tap,
            sample_rate,
            requests,
            loaded,
        })
    }
}

impl Transport for CpalTransport {
    fn set_source(&mut self, path: &Path) {
        let generation = self.state.replace(path);
        self.tap.clear();
        let request = LoadRequest {
            generation,
            path: path.to_path_buf(),
        };
        if self.requests.send(request).is_err() {
            let loaded = Loaded {
                generation,
                path: path.to_path_buf(),
                result: Err(anyhow!("decoder thread stopped")),
            };
            self.state.install(loaded, || Ok(()));
        }
    }

    fn request_play(&mut self, ticket: PlayTicket) {
        let stream = &self.stream;
        self.state.request_play(ticket, || play_stream(stream));
    }

    fn pause(&mut self) {
        self.state.pause();
    }

    fn is_paused(&self) -> bool {
        !self.state.shared().playing
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.shared().volume = volume;
    }

    fn current_time(&self) -> Duration {
        let cursor = self.state.shared().cursor;
        Duration::from_secs_f64(cursor as f64 / f64::from(self.sample_rate))
    }

    fn duration(&self) -> Option<Duration> {
        self.state.duration
    }

    fn tap(&self) -> Option<SampleTap> {
        Some(self.tap.clone())
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let stream = &self.stream;
        while let Ok(loaded) = self.loaded.try_recv() {
            self.state.install(loaded, || play_stream(stream));
        }
        self.state.take_events()
    }
}

impl FeedbackCue for CpalTransport {
    fn play_cue(&mut self, playback_rate: f32) {
        if let Err(e) = self.stream.play() {
            log::warn!("Turn sound playback failed: {}", e);
            return;
        }
        self.state.shared().cue = Some(CueVoice::new(playback_rate, self.sample_rate));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared_with(samples: Vec<f32>, channels: usize) -> Shared {
        Shared {
            track: Some(Arc::new(AudioData {
                samples,
                channels,
                sample_rate: 48000,
            })),
            playing: true,
            volume: 1.0,
            ..Shared::default()
        }
    }

    #[test]
    fn mono_source_fills_every_output_channel() {
        let mut shared = shared_with(vec![0.5, 0.25], 1);
        shared.volume = 0.5;
        let mut data = [9.0; 4];
        let mut mono = Vec::new();
        shared.fill(&mut data, 2, &mut mono);
        assert_eq!(data, [0.25, 0.25, 0.125, 0.125]);
        assert_eq!(mono, vec![0.25, 0.125]);
    }

    #[test]
    fn running_out_of_samples_ends_the_track() {
        let mut shared = shared_with(vec![0.1, 0.2, 0.3, 0.4], 2);
        let mut data = [9.0; 6];
        let mut mono = Vec::new();
        shared.fill(&mut data, 2, &mut mono);
        assert_eq!(&data[4..], &[0.0, 0.0]);
        assert!(shared.ended);
        assert!(!shared.playing);
    }

    #[test]
    fn paused_output_is_silent() {
        let mut shared = shared_with(vec![0.7; 8], 2);
        shared.playing = false;
        let mut data = [9.0; 4];
        let mut mono = Vec::new();
        shared.fill(&mut data, 2, &mut mono);
        assert_eq!(data, [0.0; 4]);
        assert_eq!(shared.cursor, 0);
    }

    #[test]
    fn empty_track_ends_at_once() {
        let mut shared = shared_with(Vec::new(), 2);
        let mut data = [9.0; 4];
        let mut mono = Vec::new();
        shared.fill(&mut data, 2, &mut mono);
        assert_eq!(data, [0.0; 4]);
        assert!(shared.ended);
        assert!(!shared.playing);
    }

    #[test]
    fn stereo_track_downmixes_for_mono_output() {
        let mut shared = shared_with(vec![0.25, 0.75, 1.0, 0.5], 2);
        let mut data = [9.0; 2];
        let mut mono = Vec::new();
        shared.fill(&mut data, 1, &mut mono);
        assert_eq!(data, [0.5, 0.75]);
        assert_eq!(mono, vec![0.5, 0.75]);
    }

    #[test]
    fn cue_decays_to_nothing() {
        let mut cue = CueVoice::new(1.0, 48000);
        let samples: Vec<f32> = std::iter::from_fn(|| cue.next_sample()).collect();
        assert_eq!(samples.len(), CueVoice::new(1.0, 48000).remaining);
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|s| s.abs() <= CUE_GAIN));
    }

    fn source_state() -> SourceState {
        SourceState::new(Arc::new(Mutex::new(Shared::default())))
    }

    fn stereo(frames: usize) -> AudioData {
        AudioData {
            samples: vec![0.1; frames * 2],
            channels: 2,
            sample_rate: 48000,
        }
    }

    fn decoded(generation: u64, path: &str, result: Result<AudioData>) -> Loaded {
        Loaded {
            generation,
            path: PathBuf::from(path),
            result,
        }
    }

    fn granted() -> Result<(), PlaybackError> {
        Ok(())
    }

    #[test]
    fn waiting_ticket_starts_once_decoded() {
        let mut state = source_state();
        let generation = state.replace(Path::new("a.mp3"));
        state.request_play(PlayTicket(1), granted);
        assert!(state.take_events().is_empty());

        state.install(decoded(generation, "a.mp3", Ok(stereo(4))), granted);
        let events = state.take_events();
        assert!(matches!(events[0], TransportEvent::MetadataLoaded(_)));
        assert_eq!(
            events[1],
            TransportEvent::PlayResolved {
                ticket: PlayTicket(1),
                result: Ok(())
            }
        );
        assert!(state.shared().playing);
    }

    #[test]
    fn stale_decode_is_dropped() {
        let mut state = source_state();
        let old = state.replace(Path::new("a.mp3"));
        let current = state.replace(Path::new("b.mp3"));
        state.request_play(PlayTicket(2), granted);

        state.install(decoded(old, "a.mp3", Ok(stereo(4))), granted);
        assert!(state.take_events().is_empty());
        assert!(state.shared().track.is_none());
        assert_eq!(state.duration, None);

        state.install(decoded(current, "b.mp3", Ok(stereo(4))), granted);
        assert_eq!(state.take_events().len(), 2);
        assert!(state.shared().playing);
    }

    #[test]
    fn failed_decode_makes_source_unavailable() {
        let mut state = source_state();
        let generation = state.replace(Path::new("a.mp3"));
        state.request_play(PlayTicket(1), granted);
        state.install(
            decoded(generation, "a.mp3", Err(anyhow!("bad header"))),
            granted,
        );
        let unavailable = PlaybackError::ResourceUnavailable {
            path: PathBuf::from("a.mp3"),
            reason: "bad header".into(),
        };
        assert_eq!(
            state.take_events(),
            vec![TransportEvent::PlayResolved {
                ticket: PlayTicket(1),
                result: Err(unavailable.clone())
            }]
        );

        // Later attempts on the same source fail without waiting
        state.request_play(PlayTicket(2), granted);
        assert_eq!(
            state.take_events(),
            vec![TransportEvent::PlayResolved {
                ticket: PlayTicket(2),
                result: Err(unavailable)
            }]
        );
    }

    #[test]
    fn empty_decode_is_unavailable() {
        let mut state = source_state();
        let generation = state.replace(Path::new("a.mp3"));
        state.request_play(PlayTicket(1), granted);
        state.install(decoded(generation, "a.mp3", Ok(stereo(0))), granted);
        let events = state.take_events();
        assert!(matches!(
            events.as_slice(),
            [TransportEvent::PlayResolved {
                result: Err(PlaybackError::ResourceUnavailable { .. }),
                ..
            }]
        ));
        assert!(!state.shared().playing);
    }

    #[test]
    fn play_without_source_is_denied() {
        let mut state = source_state();
        state.request_play(PlayTicket(1), granted);
        assert!(matches!(
            state.take_events().as_slice(),
            [TransportEvent::PlayResolved {
                result: Err(PlaybackError::PlatformDenied(_)),
                ..
            }]
        ));
    }

    #[test]
    fn ready_source_reports_device_refusal() {
        let mut state = source_state();
        let generation = state.replace(Path::new("a.mp3"));
        state.install(decoded(generation, "a.mp3", Ok(stereo(4))), granted);
        state.take_events();

        state.request_play(PlayTicket(1), || {
            Err(PlaybackError::PlatformDenied("device gone".into()))
        });
        assert_eq!(
            state.take_events(),
            vec![TransportEvent::PlayResolved {
                ticket: PlayTicket(1),
                result: Err(PlaybackError::PlatformDenied("device gone".into()))
            }]
        );
        assert!(!state.shared().playing);
    }

    #[test]
    fn finished_track_rewinds_without_a_stale_end() {
        let mut state = source_state();
        let generation = state.replace(Path::new("a.mp3"));
        state.install(decoded(generation, "a.mp3", Ok(stereo(4))), granted);
        state.take_events();
        {
            let mut shared = state.shared();
            shared.cursor = 4;
            shared.ended = true;
        }

        state.request_play(PlayTicket(1), granted);
        assert_eq!(state.shared().cursor, 0);
        let events = state.take_events();
        assert_eq!(events.len(), 1);
        assert!(!events.contains(&TransportEvent::Ended));
        assert!(state.shared().playing);
    }

    #[test]
    fn pause_cancels_waiting_ticket() {
        let mut state = source_state();
        let generation = state.replace(Path::new("a.mp3"));
        state.request_play(PlayTicket(1), granted);
        state.pause();
        state.install(decoded(generation, "a.mp3", Ok(stereo(4))), granted);
        let events = state.take_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TransportEvent::MetadataLoaded(_)));
        assert!(!state.shared().playing);
    }

    #[test]
    fn decoder_skips_superseded_requests() {
        let (requests, request_rx) = channel();
        let (loaded_tx, loaded) = channel();
        for (generation, path) in [(1, "a.mp3"), (2, "b.mp3"), (3, "c.mp3")] {
            let request = LoadRequest {
                generation,
                path: PathBuf::from(path),
            };
            requests.send(request).unwrap();
        }
        drop(requests);

        let mut decoded_paths = Vec::new();
        run_decoder(request_rx, loaded_tx, |path| {
            decoded_paths.push(path.to_path_buf());
            Ok(stereo(1))
        });

        assert_eq!(decoded_paths, vec![PathBuf::from("c.mp3")]);
        let results: Vec<Loaded> = loaded.try_iter().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].generation, 3);
    }
}
