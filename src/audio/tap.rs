use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Bounded window of the most recent mono samples sent to the output device.
///
/// The output callback pushes, the analyzer reads. Cloning shares the buffer.
#[derive(Clone, Debug)]
pub struct SampleTap {
    inner: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, samples: &[f32]) {
        let mut ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = samples.len().saturating_sub(self.capacity);
        for &s in &samples[skip..] {
            if ring.len() == self.capacity {
                ring.pop_front();
            }
            ring.push_back(s);
        }
    }

    /// Fills `out` with the latest samples, oldest first. Missing history is
    /// left as leading zeros.
    pub fn copy_latest(&self, out: &mut [f32]) {
        let ring = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let available = ring.len().min(out.len());
        let pad = out.len() - available;
        out[..pad].fill(0.0);
        for (dst, src) in out[pad..].iter_mut().zip(ring.iter().skip(ring.len() - available)) {
            *dst = *src;
        }
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
