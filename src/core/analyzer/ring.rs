use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

struct RingState {
    buffer: Vec<f32>,
    write_pos: usize,
    total_written: u64,
}

/// Fixed-size history of the most recent mono input samples
#[derive(Clone)]
pub struct SampleRing {
    state: Arc<Mutex<RingState>>,
    sample_rate: Arc<AtomicU32>,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RingState {
                buffer: vec![0.0; capacity.max(1)],
                write_pos: 0,
                total_written: 0,
            })),
            sample_rate: Arc::new(AtomicU32::new(44100)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut state) = self.state.lock() {
            let len = state.buffer.len();
            for &sample in samples {
                let pos = state.write_pos;
                state.buffer[pos] = sample;
                state.write_pos = (pos + 1) % len;
            }
            state.total_written += samples.len() as u64;
        }
    }

    pub fn total_written(&self) -> u64 {
        self.state.lock().map(|s| s.total_written).unwrap_or(0)
    }

    /// Copy the newest `out.len()` samples, oldest first, into `out`.
    /// Returns the write counter at the time of the copy.
    pub fn snapshot(&self, out: &mut [f32]) -> u64 {
        let state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return 0,
        };
        let len = state.buffer.len();
        let count = out.len().min(len);
        let start = (state.write_pos + len - count) % len;
        for (i, slot) in out.iter_mut().take(count).enumerate() {
            *slot = state.buffer[(start + i) % len];
        }
        for slot in out.iter_mut().skip(count) {
            *slot = 0.0;
        }
        state.total_written
    }

    /// Forget everything written so far
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.buffer.iter_mut().for_each(|s| *s = 0.0);
            state.write_pos = 0;
            state.total_written = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_returns_newest_samples_in_order() {
        let ring = SampleRing::new(4);
        ring.push(&[1.0, 2.0, 3.0]);
        ring.push(&[4.0, 5.0]);

        let mut window = [0.0; 3];
        let written = ring.snapshot(&mut window);
        assert_eq!(written, 5);
        assert_eq!(window, [3.0, 4.0, 5.0]);
    }

    #[test]
    fn clear_resets_counter() {
        let ring = SampleRing::new(8);
        ring.push(&[0.3; 5]);
        ring.clear();
        assert_eq!(ring.total_written(), 0);
    }
}
