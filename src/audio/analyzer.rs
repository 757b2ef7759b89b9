use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use super::tap::SampleTap;

pub const FFT_SIZE: usize = 256;
pub const FREQUENCY_BIN_COUNT: usize = FFT_SIZE / 2;
/// Lower than the usual 0.8 so the meter reacts to transients.
pub const SMOOTHING: f32 = 0.6;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;

struct Graph {
    tap: SampleTap,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    samples: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

/// Byte-scaled frequency magnitudes of the live output signal.
pub struct SpectrumAnalyzer {
    graph: Option<Graph>,
    suspended: bool,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            graph: None,
            suspended: false,
        }
    }

    #[cfg(test)]
    pub fn is_attached(&self) -> bool {
        self.graph.is_some()
    }

    #[cfg(test)]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Builds the analysis graph once. Returns whether a graph is attached
    /// after the call; a missing tap is logged and leaves it detached.
    pub fn attach(&mut self, tap: Option<SampleTap>) -> bool {
        if self.graph.is_some() {
            log::debug!("Spectrum analyzer already attached");
            return true;
        }
        let Some(tap) = tap else {
            log::warn!("Audio analysis unavailable: transport exposes no signal tap");
            return false;
        };

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        self.graph = Some(Graph {
            tap,
            fft,
            window: blackman_window(FFT_SIZE),
            samples: vec![0.0; FFT_SIZE],
            spectrum: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            scratch,
            smoothed: vec![0.0; FREQUENCY_BIN_COUNT],
            bytes: vec![0; FREQUENCY_BIN_COUNT],
        });
        self.suspended = false;
        log::info!(
            "Spectrum analyzer attached (fft_size={}, smoothing={:.1})",
            FFT_SIZE,
            SMOOTHING
        );
        true
    }

    pub fn suspend(&mut self) {
        if self.graph.is_some() && !self.suspended {
            self.suspended = true;
            log::debug!("Spectrum analyzer suspended");
        }
    }

    pub fn resume(&mut self) {
        if self.graph.is_some() && self.suspended {
            self.suspended = false;
            log::debug!("Spectrum analyzer resumed");
        }
    }

    /// Latest frequency snapshot, valid until the next call. While suspended
    /// the previous snapshot is returned unchanged.
    pub fn snapshot(&mut self) -> Option<&[u8]> {
        let graph = self.graph.as_mut()?;
        if !self.suspended {
            graph.process();
        }
        Some(graph.bytes.as_slice())
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    fn process(&mut self) {
        self.tap.copy_latest(&mut self.samples);
        for ((bin, &s), &w) in self.spectrum.iter_mut().zip(&self.samples).zip(&self.window) {
            *bin = Complex::new(s * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / FFT_SIZE as f32;
        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (k, (smoothed, byte)) in self.smoothed.iter_mut().zip(self.bytes.iter_mut()).enumerate() {
            let magnitude = self.spectrum[k].norm() * scale;
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;
            *byte = if *smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                (255.0 / range * (db - MIN_DECIBELS)).clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42, 0.5, 0.08);
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}
