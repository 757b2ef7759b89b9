use crate::audio::analyzer::SpectrumAnalyzer;

use super::meter::VuMeter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// No frame was outstanding.
    Idle,
    /// Snapshot rendered and the next frame scheduled.
    Rendered,
    /// Playback stopped: grid reset and the loop ended.
    Reset,
}

/// Per-frame meter refresh with at most one outstanding frame request.
#[derive(Debug, Default)]
pub struct AnimationLoop {
    scheduled: bool,
    rendered_frames: u64,
}

impl AnimationLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a frame unless one is already outstanding.
    pub fn start(&mut self) -> bool {
        if self.scheduled {
            return false;
        }
        self.scheduled = true;
        true
    }

    #[cfg(test)]
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    pub fn rendered_frames(&self) -> u64 {
        self.rendered_frames
    }

    /// Runs the outstanding frame, if any. Reschedules only while playing.
    pub fn tick(
        &mut self,
        playing: bool,
        analyzer: &mut SpectrumAnalyzer,
        meter: &mut VuMeter,
    ) -> Tick {
        if !self.scheduled {
            return Tick::Idle;
        }
        self.scheduled = false;

        let snapshot = if playing { analyzer.snapshot() } else { None };
        match snapshot {
            Some(snapshot) => {
                meter.update(snapshot);
                self.rendered_frames += 1;
                self.scheduled = true;
                Tick::Rendered
            }
            None => {
                meter.reset();
                Tick::Reset
            }
        }
    }
}
